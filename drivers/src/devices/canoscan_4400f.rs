use crate::asic::AsicFamily;
use crate::model::Model;
use crate::motor::Motor;
use crate::motor::MotorProfile;
use crate::motor::MotorSlope;
use crate::motor::StepType;
use crate::sensor::CalibrationReference;
use crate::sensor::FrontendDescriptor;
use crate::sensor::SegmentLayout;
use crate::sensor::Sensor;
use crate::sensor::StaggerConfig;
use genesys_types::ColorOrder;
use genesys_types::SensorKind;

/// Canon CanoScan 4400F: GL843 with a 4800 dpi staggered CCD and a Wolfson
/// analog front-end.
pub static MODEL: Model = Model {
    name: "canon-canoscan-4400f",
    vendor_id: 0x04a9,
    product_id: 0x2228,
    asic: AsicFamily::Gl843,
    sensor: Sensor {
        name: "ccd-4400f",
        kind: SensorKind::Ccd,
        optical_resolution: 4800,
        register_dpi_set: &[600, 1200, 2400, 4800],
        max_ccd_size_divisor: 2,
        dummy_pixels: 20,
        black_pixels: 50,
        sensor_pixels: 40800,
        exposure: [0, 0, 0],
        exposure_lperiod: 11640,
        segments: SegmentLayout::SINGLE,
        stagger: StaggerConfig {
            min_resolution: 2400,
            lines_at_base: 4,
        },
        color_order: ColorOrder::Rgb,
        gamma: [2.2, 2.2, 2.2],
        calibration: CalibrationReference {
            dark_target: 8.0,
            white_target: 210.0,
            led_floor: 120.0,
            led_ceiling: 160.0,
        },
        custom_registers: &[
            (0x16, 0x33),
            (0x17, 0x0c),
            (0x18, 0x13),
            (0x19, 0x2a),
            (0x1a, 0x24),
            (0x1b, 0x00),
            (0x1c, 0x00),
            (0x1d, 0x84),
        ],
    },
    frontend: FrontendDescriptor::WOLFSON,
    motor: Motor {
        base_ydpi: 4800,
        min_ydpi: 300,
        profiles: &[
            MotorProfile {
                slope: MotorSlope {
                    initial_speed_w: 500,
                    max_speed_w: 5000,
                    acceleration_w_per_step: 100,
                },
                step_type: StepType::Half,
                max_exposure: 0,
                min_resolution: 0,
                max_resolution: 1200,
                methods: &[],
            },
            MotorProfile {
                slope: MotorSlope {
                    initial_speed_w: 300,
                    max_speed_w: 2800,
                    acceleration_w_per_step: 50,
                },
                step_type: StepType::Quarter,
                max_exposure: 0,
                min_resolution: 1201,
                max_resolution: 0,
                methods: &[],
            },
        ],
    },
    ld_shift: [24, 12, 0],
    use_host_side_calib: false,
    swap_16bit_data: false,
    default_registers: &[
        (0x01, 0x00),
        (0x02, 0x10),
        (0x03, 0x10),
        (0x04, 0x00),
        (0x05, 0x00),
        (0x06, 0xd8),
        (0x08, 0x00),
        (0x09, 0x00),
        (0x0a, 0x18),
        (0x0b, 0x69),
        (0x0d, 0x00),
        (0x0e, 0x00),
        (0x0f, 0x00),
    ],
};
