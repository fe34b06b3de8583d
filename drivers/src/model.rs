use crate::asic::AsicFamily;
use crate::motor::Motor;
use crate::sensor::FrontendDescriptor;
use crate::sensor::Sensor;
use genesys_types::SensorKind;

/// Immutable per-model capability record; the registry hands out `&'static`
/// references to these, one per supported scanner.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub asic: AsicFamily,
    pub sensor: Sensor,
    pub frontend: FrontendDescriptor,
    pub motor: Motor,
    /// Physical light-path delay between the red, green and blue sensor
    /// rows, in lines at the motor's base y resolution.
    pub ld_shift: [u32; 3],
    /// Some ASIC/sensor combinations cannot address the scan window from the
    /// hardware shading engine and must correct in software.
    pub use_host_side_calib: bool,
    /// The raw 16-bit wire format is byte-swapped relative to the host on
    /// these models.
    pub swap_16bit_data: bool,
    pub default_registers: &'static [(u16, u8)],
}

impl Model {
    pub fn is_cis(&self) -> bool {
        self.sensor.kind == SensorKind::Cis
    }
}
