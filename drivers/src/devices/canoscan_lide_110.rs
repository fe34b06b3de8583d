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

/// Canon CanoScan LiDE 110: GL124 with a two-segment 2400 dpi CIS.
pub static MODEL: Model = Model {
    name: "canon-canoscan-lide-110",
    vendor_id: 0x04a9,
    product_id: 0x1909,
    asic: AsicFamily::Gl124,
    sensor: Sensor {
        name: "cis-lide-110",
        kind: SensorKind::Cis,
        optical_resolution: 2400,
        register_dpi_set: &[600, 1200, 2400],
        max_ccd_size_divisor: 1,
        dummy_pixels: 16,
        black_pixels: 87,
        sensor_pixels: 20864,
        exposure: [1333, 1045, 1272],
        exposure_lperiod: 2768,
        segments: SegmentLayout {
            count: 2,
            min_resolution: 1200,
            order: &[0, 1],
            conseq_pixel_dist: 5168,
        },
        stagger: StaggerConfig::NONE,
        color_order: ColorOrder::Rgb,
        gamma: [1.7, 1.7, 1.7],
        calibration: CalibrationReference {
            dark_target: 4.0,
            white_target: 200.0,
            led_floor: 130.0,
            led_ceiling: 170.0,
        },
        custom_registers: &[
            (0x16, 0x15),
            (0x17, 0x04),
            (0x18, 0x00),
            (0x19, 0x01),
            (0x1a, 0x30),
            (0x1b, 0x00),
            (0x1c, 0x02),
            (0x1d, 0x01),
        ],
    },
    frontend: FrontendDescriptor::ANALOG_DEVICES,
    motor: Motor {
        base_ydpi: 4800,
        min_ydpi: 150,
        profiles: &[
            MotorProfile {
                slope: MotorSlope {
                    initial_speed_w: 300,
                    max_speed_w: 3600,
                    acceleration_w_per_step: 60,
                },
                step_type: StepType::Half,
                max_exposure: 2500,
                min_resolution: 0,
                max_resolution: 0,
                methods: &[],
            },
            MotorProfile {
                slope: MotorSlope {
                    initial_speed_w: 200,
                    max_speed_w: 1600,
                    acceleration_w_per_step: 30,
                },
                step_type: StepType::Quarter,
                max_exposure: 0,
                min_resolution: 0,
                max_resolution: 0,
                methods: &[],
            },
        ],
    },
    ld_shift: [0, 0, 0],
    use_host_side_calib: true,
    swap_16bit_data: false,
    default_registers: &[
        (0x01, 0xa2),
        (0x02, 0x90),
        (0x03, 0x50),
        (0x04, 0x03),
        (0x05, 0x00),
        (0x06, 0x50),
        (0x08, 0x00),
        (0x09, 0x00),
        (0x0a, 0x00),
        (0x0b, 0x2a),
        (0x0d, 0x00),
        (0x0e, 0x00),
        (0x0f, 0x00),
    ],
};
