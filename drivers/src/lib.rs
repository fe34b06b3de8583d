pub mod asic;
pub mod calibration;
pub mod device;
pub mod devices;
pub mod error;
pub mod model;
pub mod motor;
pub mod pipeline;
pub mod program;
pub mod regs;
pub mod sensor;
pub mod session;
pub mod transport;

pub use crate::device::Device;
pub use crate::devices::list_devices;
pub use crate::devices::open;
pub use crate::devices::Type;
pub use crate::error::Error;
pub use crate::model::Model;
pub use crate::session::ScanFlags;
pub use crate::session::ScanParams;
pub use crate::session::ScanSession;

pub use bincode;
pub use genesys_types as types;
pub use libc;
pub use libusb1_sys;
pub use rusb;
