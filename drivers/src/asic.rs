#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AsicFamily {
    Gl646,
    Gl841,
    Gl843,
    Gl845,
    Gl846,
    Gl847,
    Gl124,
}

/// How a family addresses the sensor's active window when computing the
/// start/end pixel registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WindowAddressing {
    /// Window coordinates are full-sensor optical pixels (GL646/GL841).
    FullSensor,
    /// Window coordinates are divided by the CCD size divisor and must keep
    /// even parity when the sensor halves are staggered (GL843/GL845).
    SizeDivided,
    /// Window coordinates are per-segment: the multi-segment sensor sees the
    /// same window repeated in every segment (GL846/GL847/GL124).
    Segmented,
}

/// Capability record for one ASIC generation. Register semantics are not
/// binary compatible across generations, so everything whose address or
/// width moves lives here and the register programmer stays generic.
#[derive(Debug)]
pub struct AsicTable {
    pub family: AsicFamily,

    // register addresses
    pub status: u16,
    pub linecnt: u16,
    pub feedl: u16,
    pub exposure: u16,
    /// 2 or 3 consecutive byte registers, most significant first.
    pub exposure_bytes: u16,
    pub start_pixel: u16,
    pub end_pixel: u16,
    pub step_count: u16,
    pub fast_step_count: u16,
    pub z1: u16,
    pub z2: u16,
    pub frontend_base: u16,

    // internal memory layout for addressed table writes
    pub slope_table_base: u32,
    pub slope_table_stride: u32,
    pub slope_table_max_size: usize,
    pub gamma_table_base: u32,
    pub shading_base: u32,

    // quirks
    pub window: WindowAddressing,
    /// Pipeline ring buffers are rounded up to a multiple of this (USB
    /// packet/DMA optimum for the generation).
    pub buffer_alignment: usize,
    pub has_hw_shading: bool,
}

impl AsicFamily {
    pub fn table(self) -> &'static AsicTable {
        match self {
            Self::Gl646 => &GL646,
            Self::Gl841 => &GL841,
            Self::Gl843 => &GL843,
            Self::Gl845 => &GL845,
            Self::Gl846 => &GL846,
            Self::Gl847 => &GL847,
            Self::Gl124 => &GL124,
        }
    }
}

pub static GL646: AsicTable = AsicTable {
    family: AsicFamily::Gl646,
    status: 0x41,
    linecnt: 0x21,
    feedl: 0x3d,
    exposure: 0x38,
    exposure_bytes: 2,
    start_pixel: 0x30,
    end_pixel: 0x32,
    step_count: 0x6b,
    fast_step_count: 0x6c,
    z1: 0x60,
    z2: 0x62,
    frontend_base: 0x50,
    slope_table_base: 0x0001_0000,
    slope_table_stride: 0x0000_0200,
    slope_table_max_size: 255,
    gamma_table_base: 0x0001_8000,
    shading_base: 0x0002_0000,
    window: WindowAddressing::FullSensor,
    buffer_alignment: 512,
    has_hw_shading: true,
};

pub static GL841: AsicTable = AsicTable {
    family: AsicFamily::Gl841,
    status: 0x41,
    linecnt: 0x25,
    feedl: 0x3d,
    exposure: 0x38,
    exposure_bytes: 2,
    start_pixel: 0x30,
    end_pixel: 0x32,
    step_count: 0x21,
    fast_step_count: 0x22,
    z1: 0x60,
    z2: 0x62,
    frontend_base: 0x50,
    slope_table_base: 0x0002_0000,
    slope_table_stride: 0x0000_0400,
    slope_table_max_size: 1024,
    gamma_table_base: 0x0002_8000,
    shading_base: 0x0003_0000,
    window: WindowAddressing::FullSensor,
    buffer_alignment: 512,
    has_hw_shading: true,
};

pub static GL843: AsicTable = AsicTable {
    family: AsicFamily::Gl843,
    status: 0x41,
    linecnt: 0x25,
    feedl: 0x3d,
    exposure: 0x10,
    exposure_bytes: 3,
    start_pixel: 0x30,
    end_pixel: 0x32,
    step_count: 0x21,
    fast_step_count: 0x22,
    z1: 0x60,
    z2: 0x62,
    frontend_base: 0x50,
    slope_table_base: 0x0004_0000,
    slope_table_stride: 0x0000_8000,
    slope_table_max_size: 1024,
    gamma_table_base: 0x0005_8000,
    shading_base: 0x0006_0000,
    window: WindowAddressing::SizeDivided,
    buffer_alignment: 512,
    has_hw_shading: true,
};

pub static GL845: AsicTable = AsicTable {
    family: AsicFamily::Gl845,
    status: 0x41,
    linecnt: 0x25,
    feedl: 0x3d,
    exposure: 0x10,
    exposure_bytes: 3,
    start_pixel: 0x30,
    end_pixel: 0x32,
    step_count: 0x21,
    fast_step_count: 0x22,
    z1: 0x60,
    z2: 0x62,
    frontend_base: 0x50,
    slope_table_base: 0x1000_0000,
    slope_table_stride: 0x0000_4000,
    slope_table_max_size: 1024,
    gamma_table_base: 0x1001_8000,
    shading_base: 0x1002_0000,
    window: WindowAddressing::SizeDivided,
    buffer_alignment: 1024,
    has_hw_shading: true,
};

pub static GL846: AsicTable = AsicTable {
    family: AsicFamily::Gl846,
    status: 0x101,
    linecnt: 0x25,
    feedl: 0x3d,
    exposure: 0x10,
    exposure_bytes: 3,
    start_pixel: 0x30,
    end_pixel: 0x32,
    step_count: 0x21,
    fast_step_count: 0x22,
    z1: 0x60,
    z2: 0x62,
    frontend_base: 0x50,
    slope_table_base: 0x1000_0000,
    slope_table_stride: 0x0000_4000,
    slope_table_max_size: 1024,
    gamma_table_base: 0x1001_8000,
    shading_base: 0x1002_0000,
    window: WindowAddressing::Segmented,
    buffer_alignment: 1024,
    has_hw_shading: true,
};

pub static GL847: AsicTable = AsicTable {
    family: AsicFamily::Gl847,
    status: 0x101,
    linecnt: 0x25,
    feedl: 0x3d,
    exposure: 0x10,
    exposure_bytes: 3,
    start_pixel: 0x30,
    end_pixel: 0x32,
    step_count: 0x21,
    fast_step_count: 0x22,
    z1: 0x60,
    z2: 0x62,
    frontend_base: 0x50,
    slope_table_base: 0x1000_0000,
    slope_table_stride: 0x0000_4000,
    slope_table_max_size: 1024,
    gamma_table_base: 0x1001_8000,
    shading_base: 0x1002_0000,
    window: WindowAddressing::Segmented,
    buffer_alignment: 1024,
    has_hw_shading: false,
};

pub static GL124: AsicTable = AsicTable {
    family: AsicFamily::Gl124,
    status: 0x101,
    linecnt: 0x25,
    feedl: 0x3d,
    exposure: 0x10,
    exposure_bytes: 3,
    start_pixel: 0x30,
    end_pixel: 0x32,
    step_count: 0x21,
    fast_step_count: 0x22,
    z1: 0x60,
    z2: 0x62,
    frontend_base: 0x50,
    slope_table_base: 0x1000_0000,
    slope_table_stride: 0x0000_4000,
    slope_table_max_size: 1024,
    gamma_table_base: 0x1001_8000,
    shading_base: 0x1002_0000,
    window: WindowAddressing::Segmented,
    buffer_alignment: 1024,
    has_hw_shading: false,
};
