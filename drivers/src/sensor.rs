use genesys_types::ColorOrder;
use genesys_types::SensorKind;

/// Stagger configuration: some sensors drive two physically offset pixel rows
/// as one logical row at high resolutions, and the two halves land on
/// different scan lines until the pipeline re-interleaves them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StaggerConfig {
    /// Smallest x resolution at which the halves interleave; 0 disables
    /// staggering for the sensor.
    pub min_resolution: u32,
    /// Line distance between the two halves, in lines at the motor's base
    /// y resolution.
    pub lines_at_base: u32,
}

impl StaggerConfig {
    pub const NONE: Self = Self {
        min_resolution: 0,
        lines_at_base: 0,
    };

    pub fn staggered_lines(&self, xres: u32, yres: u32, base_ydpi: u32) -> u32 {
        if self.min_resolution == 0 || xres < self.min_resolution {
            return 0;
        }
        (self.lines_at_base * yres) / base_ydpi
    }
}

/// Multi-segment sensor layout. Segments cover disjoint parts of the scan
/// width but their bytes arrive interleaved in groups of
/// `conseq_pixel_dist` pixels.
// no Deserialize: capability tables are compiled in, never parsed
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SegmentLayout {
    pub count: u32,
    /// Smallest x resolution at which the sensor actually splits into
    /// segments; below it the first segment covers the whole width.
    pub min_resolution: u32,
    /// Permutation mapping output position to source segment.
    pub order: &'static [u32],
    pub conseq_pixel_dist: u32,
}

impl SegmentLayout {
    pub const SINGLE: Self = Self {
        count: 1,
        min_resolution: 0,
        order: &[0],
        conseq_pixel_dist: 0,
    };

    pub fn count_at(&self, xres: u32) -> u32 {
        if self.count > 1 && xres >= self.min_resolution {
            self.count
        } else {
            1
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationReference {
    /// Mean value the darkest pixels should settle at after offset
    /// calibration (in 8-bit units).
    pub dark_target: f32,
    /// Mean value the middle of a white strip should reach after gain
    /// calibration (in 8-bit units).
    pub white_target: f32,
    /// LED calibration keeps every channel average inside this band.
    pub led_floor: f32,
    pub led_ceiling: f32,
}

/// Immutable per-model sensor capability record, loaded once at attach time
/// and shared read-only by every session for the device.
#[derive(Debug, Clone)]
pub struct Sensor {
    pub name: &'static str,
    pub kind: SensorKind,
    pub optical_resolution: u32,
    /// Hardware dpi values register bits can select, ascending.
    pub register_dpi_set: &'static [u32],
    /// 2 when the sensor can run its optics at half size for low
    /// resolutions, 1 otherwise.
    pub max_ccd_size_divisor: u32,
    pub dummy_pixels: u32,
    pub black_pixels: u32,
    pub sensor_pixels: u32,
    /// Base exposure per channel (red, green, blue), LED calibration's
    /// starting point.
    pub exposure: [u32; 3],
    pub exposure_lperiod: u32,
    pub segments: SegmentLayout,
    pub stagger: StaggerConfig,
    pub color_order: ColorOrder,
    pub gamma: [f32; 3],
    pub calibration: CalibrationReference,
    /// Sensor timing overlay applied verbatim on top of the family's
    /// defaults when programming a scan.
    pub custom_registers: &'static [(u16, u8)],
}

impl Sensor {
    pub fn ccd_size_divisor_for(&self, xres: u32) -> u32 {
        if self.max_ccd_size_divisor > 1 && xres * 2 <= self.optical_resolution {
            self.max_ccd_size_divisor
        } else {
            1
        }
    }

    /// Smallest selectable hardware dpi that covers the requested
    /// resolution, capped at the sensor's fastest setting.
    pub fn register_dpi_for(&self, xres: u32) -> u32 {
        for dpi in self.register_dpi_set {
            if *dpi >= xres {
                return *dpi;
            }
        }
        // unwrap: a sensor always has at least one selectable dpi
        *self.register_dpi_set.last().unwrap()
    }
}

/// Analog front-end chip type; the two families use different gain laws and
/// code ranges.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FrontendKind {
    Wolfson,
    AnalogDevices,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendDescriptor {
    pub kind: FrontendKind,
    pub offset_code_max: u8,
    pub gain_code_max: u8,
}

impl FrontendDescriptor {
    pub const WOLFSON: Self = Self {
        kind: FrontendKind::Wolfson,
        offset_code_max: 255,
        gain_code_max: 255,
    };

    pub const ANALOG_DEVICES: Self = Self {
        kind: FrontendKind::AnalogDevices,
        offset_code_max: 63,
        gain_code_max: 63,
    };
}

/// Mutable per-channel analog front-end state. The calibration engine
/// adjusts these codes and pushes them through `Device::set_fe` whenever
/// they change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontend {
    pub descriptor: FrontendDescriptor,
    pub offset: [u8; 3],
    pub gain: [u8; 3],
}

impl Frontend {
    pub fn new(descriptor: FrontendDescriptor) -> Self {
        Self {
            descriptor,
            offset: [0; 3],
            gain: [0; 3],
        }
    }
}
