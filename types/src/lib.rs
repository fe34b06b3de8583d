#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScanColorMode {
    Lineart = 0,
    Gray = 1,
    Color = 2,
}

impl ScanColorMode {
    pub fn channels(self) -> u32 {
        match self {
            Self::Lineart | Self::Gray => 1,
            Self::Color => 3,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScanMethod {
    Flatbed = 0,
    Adf = 1,
    Transparency = 2,
    TransparencyInfrared = 3,
}

impl ScanMethod {
    pub fn uses_transparency_adapter(self) -> bool {
        matches!(self, Self::Transparency | Self::TransparencyInfrared)
    }
}

/// Which channel a one-channel gray scan is extracted from.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColorFilter {
    Red = 0,
    Green = 1,
    Blue = 2,
    None = 3,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColorOrder {
    Rgb = 0,
    Bgr = 1,
}

/// Sensor technology. CIS sensors scan each color as a separate monochrome
/// pass of the same physical row; CCD sensors capture the channels together
/// but with a physical line offset between them.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SensorKind {
    Ccd = 0,
    Cis = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelFormat {
    pub channels: u32,
    pub depth: u32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        (self.channels * self.depth) as usize / 8
    }
}
