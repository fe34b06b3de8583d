use crate::transport;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] transport::Error),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("invalid scan parameters: {0}")]
    InvalidParameters(&'static str),

    #[error("contract violation: {0}")]
    Contract(&'static str),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("no usable calibration strip found in the scanned window")]
    StripNotFound,

    #[error("scan cancelled")]
    Cancelled,

    #[error("device still warming up after {0} retries")]
    WarmingUp(u32),
}

impl From<rusb::Error> for Error {
    fn from(error: rusb::Error) -> Self {
        transport::Error::from(error).into()
    }
}
