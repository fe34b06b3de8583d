use rusb::UsbContext;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Rusb(#[from] rusb::Error),

    #[error("device with serial {0} not found")]
    Serial(String),

    #[error("device not found")]
    Device,

    #[error("short write ({requested} bytes requested, {written} bytes written)")]
    ShortWrite { requested: usize, written: usize },

    #[error("short read ({requested} bytes requested, {read} bytes read)")]
    ShortRead { requested: usize, read: usize },

    #[error("malformed response while reading register {0:#06x}")]
    RegisterResponse(u16),
}

/// Blocking byte transport to the scanner ASIC. Register access moves single
/// bytes; `write_memory` reaches the ASIC's internal RAM (slope tables, gamma
/// tables, shading coefficients) through its own address space; `read_data`
/// drains the scan data endpoint.
pub trait Transport {
    fn write_register(&mut self, address: u16, value: u8) -> Result<(), Error>;

    fn read_register(&mut self, address: u16) -> Result<u8, Error>;

    fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<(), Error>;

    /// Returns the number of bytes read, which may be less than the buffer
    /// length at the end of a scan.
    fn read_data(&mut self, buffer: &mut [u8]) -> Result<usize, Error>;
}

/// Monotonic time seam so that bounded polling loops run under a fake clock
/// in tests instead of sleeping for real.
pub trait Clock {
    fn now(&self) -> std::time::Duration;

    fn sleep(&mut self, duration: std::time::Duration);
}

#[derive(Debug)]
pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> std::time::Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: std::time::Duration) {
        std::thread::sleep(duration);
    }
}

const COMMAND_OUT_ENDPOINT: u8 = 0x02;
const COMMAND_IN_ENDPOINT: u8 = 0x82;
const DATA_IN_ENDPOINT: u8 = 0x81;

const COMMAND_READ_REGISTER: u8 = 0x47;
const COMMAND_WRITE_REGISTER: u8 = 0x48;
const COMMAND_WRITE_MEMORY: u8 = 0x49;

const TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);
const DATA_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// rusb-backed transport. Commands are 8-byte frames on the control bulk
/// endpoint; scan data arrives on a dedicated IN endpoint.
pub struct UsbTransport {
    handle: rusb::DeviceHandle<rusb::Context>,
}

impl UsbTransport {
    pub fn open(
        context: &rusb::Context,
        vendor_id: u16,
        product_id: u16,
        serial: Option<&str>,
    ) -> Result<Self, Error> {
        for device in context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(_) => continue,
            };
            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }
            let mut handle = device.open()?;
            handle.claim_interface(0)?;
            match serial {
                Some(serial) => {
                    let languages = handle.read_languages(TIMEOUT)?;
                    if let Some(language) = languages.first() {
                        let device_serial =
                            handle.read_serial_number_string(*language, &descriptor, TIMEOUT)?;
                        if device_serial == serial {
                            return Ok(Self { handle });
                        }
                    }
                }
                None => return Ok(Self { handle }),
            }
        }
        Err(match serial {
            Some(serial) => Error::Serial(serial.to_owned()),
            None => Error::Device,
        })
    }

    pub fn from_handle(handle: rusb::DeviceHandle<rusb::Context>) -> Self {
        Self { handle }
    }

    pub fn speed(&self) -> rusb::Speed {
        self.handle.device().speed()
    }

    fn command(&mut self, frame: &[u8]) -> Result<(), Error> {
        let written = self.handle.write_bulk(COMMAND_OUT_ENDPOINT, frame, TIMEOUT)?;
        if written != frame.len() {
            return Err(Error::ShortWrite {
                requested: frame.len(),
                written,
            });
        }
        Ok(())
    }
}

impl Transport for UsbTransport {
    fn write_register(&mut self, address: u16, value: u8) -> Result<(), Error> {
        let [address_low, address_high] = address.to_le_bytes();
        self.command(&[
            COMMAND_WRITE_REGISTER,
            address_low,
            address_high,
            value,
            0x00,
            0x00,
            0x00,
            0x00,
        ])
    }

    fn read_register(&mut self, address: u16) -> Result<u8, Error> {
        let [address_low, address_high] = address.to_le_bytes();
        self.command(&[
            COMMAND_READ_REGISTER,
            address_low,
            address_high,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
        ])?;
        let mut buffer = [0u8; 2];
        let read = self
            .handle
            .read_bulk(COMMAND_IN_ENDPOINT, &mut buffer, TIMEOUT)?;
        if read != buffer.len() || buffer[0] != address_low {
            return Err(Error::RegisterResponse(address));
        }
        Ok(buffer[1])
    }

    fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        let [a0, a1, a2, a3] = address.to_le_bytes();
        let [l0, l1, l2, _] = (data.len() as u32).to_le_bytes();
        self.command(&[COMMAND_WRITE_MEMORY, a0, a1, a2, a3, l0, l1, l2])?;
        let written = self.handle.write_bulk(COMMAND_OUT_ENDPOINT, data, TIMEOUT)?;
        if written != data.len() {
            return Err(Error::ShortWrite {
                requested: data.len(),
                written,
            });
        }
        Ok(())
    }

    fn read_data(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        Ok(self
            .handle
            .read_bulk(DATA_IN_ENDPOINT, buffer, DATA_TIMEOUT)?)
    }
}
