use genesys_drivers::asic::AsicFamily;
use genesys_drivers::bincode;
use genesys_drivers::model::Model;
use genesys_drivers::motor::Motor;
use genesys_drivers::motor::MotorProfile;
use genesys_drivers::motor::MotorSlope;
use genesys_drivers::motor::StepType;
use genesys_drivers::sensor::CalibrationReference;
use genesys_drivers::sensor::FrontendDescriptor;
use genesys_drivers::sensor::SegmentLayout;
use genesys_drivers::sensor::Sensor;
use genesys_drivers::sensor::StaggerConfig;
use genesys_drivers::types::ColorFilter;
use genesys_drivers::types::ColorOrder;
use genesys_drivers::types::ScanColorMode;
use genesys_drivers::types::ScanMethod;
use genesys_drivers::types::SensorKind;
use genesys_drivers::Error;
use genesys_drivers::ScanFlags;
use genesys_drivers::ScanParams;
use genesys_drivers::ScanSession;

fn flatbed_model(sensor: Sensor) -> Model {
    Model {
        name: "test-flatbed",
        vendor_id: 0x04a9,
        product_id: 0xffff,
        asic: AsicFamily::Gl843,
        sensor,
        frontend: FrontendDescriptor::WOLFSON,
        motor: Motor {
            base_ydpi: 600,
            min_ydpi: 150,
            profiles: &[MotorProfile {
                slope: MotorSlope {
                    initial_speed_w: 500,
                    max_speed_w: 5000,
                    acceleration_w_per_step: 100,
                },
                step_type: StepType::Half,
                max_exposure: 0,
                min_resolution: 0,
                max_resolution: 0,
                methods: &[],
            }],
        },
        ld_shift: [0, 0, 0],
        use_host_side_calib: false,
        swap_16bit_data: false,
        default_registers: &[],
    }
}

fn ccd_600(max_ccd_size_divisor: u32) -> Sensor {
    Sensor {
        name: "test-ccd-600",
        kind: SensorKind::Ccd,
        optical_resolution: 600,
        register_dpi_set: &[600],
        max_ccd_size_divisor,
        dummy_pixels: 0,
        black_pixels: 0,
        sensor_pixels: 5100,
        exposure: [0, 0, 0],
        exposure_lperiod: 5000,
        segments: SegmentLayout::SINGLE,
        stagger: StaggerConfig::NONE,
        color_order: ColorOrder::Rgb,
        gamma: [2.2, 2.2, 2.2],
        calibration: CalibrationReference {
            dark_target: 8.0,
            white_target: 210.0,
            led_floor: 120.0,
            led_ceiling: 160.0,
        },
        custom_registers: &[],
    }
}

fn color_params(xres: u32, pixels: u32) -> ScanParams {
    ScanParams {
        xres,
        yres: xres,
        startx: 0,
        starty: 0,
        pixels,
        requested_pixels: 0,
        lines: 100,
        depth: 8,
        channels: 3,
        mode: ScanColorMode::Color,
        method: ScanMethod::Flatbed,
        color_filter: ColorFilter::None,
        flags: ScanFlags::IGNORE_LINE_DISTANCE,
    }
}

#[test]
fn half_resolution_doubles_optical_pixels() {
    let model = flatbed_model(ccd_600(1));
    let session = ScanSession::compute(&model, &model.sensor, color_params(300, 2550)).unwrap();
    assert_eq!(session.optical_pixels, 5100);
    assert_eq!(session.output_pixels, 2550);
    assert_eq!(session.requested_pixels, 2550);
    assert!(!session.needs_shrink);
}

#[test]
fn odd_width_rounds_up_without_losing_pixels() {
    let model = flatbed_model(ccd_600(1));
    let session = ScanSession::compute(&model, &model.sensor, color_params(300, 2551)).unwrap();
    assert_eq!(session.optical_pixels, 5102);
    assert!(session.output_pixels >= 2551);
    assert_eq!(session.requested_pixels, session.output_pixels);
}

#[test]
fn explicit_requested_pixels_forces_shrink() {
    let model = flatbed_model(ccd_600(1));
    let mut params = color_params(300, 2551);
    params.requested_pixels = 2551;
    let session = ScanSession::compute(&model, &model.sensor, params).unwrap();
    if session.output_pixels != 2551 {
        assert!(session.needs_shrink);
    }
    assert_eq!(session.final_line_bytes, 2551 * 3);
}

#[test]
fn ccd_size_divisor_engages_at_low_resolution() {
    let model = flatbed_model(ccd_600(2));
    let session = ScanSession::compute(&model, &model.sensor, color_params(150, 600)).unwrap();
    assert_eq!(session.ccd_size_divisor, 2);
    assert_eq!(session.optical_resolution, 300);
    // optical pixels align to 2 * divisor
    assert_eq!(session.optical_pixels % 4, 0);

    let session = ScanSession::compute(&model, &model.sensor, color_params(600, 600)).unwrap();
    assert_eq!(session.ccd_size_divisor, 1);
}

#[test]
fn staggered_window_start_is_even() {
    let mut sensor = ccd_600(1);
    sensor.dummy_pixels = 13;
    sensor.stagger = StaggerConfig {
        min_resolution: 600,
        lines_at_base: 4,
    };
    let model = flatbed_model(sensor);
    let mut params = color_params(600, 600);
    params.startx = 34;
    let session = ScanSession::compute(&model, &model.sensor, params).unwrap();
    assert!(session.num_staggered_lines > 0);
    // 13 dummy pixels + 34 requested gives an odd start, clamped down
    assert_eq!(session.pixel_startx, 46);
}

#[test]
fn color_shift_lines_scale_with_y_resolution() {
    let mut model = flatbed_model(ccd_600(1));
    model.ld_shift = [24, 12, 0];
    let mut params = color_params(300, 600);
    params.flags = ScanFlags::empty();
    let session = ScanSession::compute(&model, &model.sensor, params).unwrap();
    // yres 300 over base 600 halves the physical shift
    assert_eq!(session.color_shift_lines, [12, 6, 0]);
    assert_eq!(session.max_color_shift_lines, 12);
    assert_eq!(session.output_line_count, 100 + 12);
    assert!(session.needs_ccd_shift);

    params.flags = ScanFlags::IGNORE_LINE_DISTANCE;
    let session = ScanSession::compute(&model, &model.sensor, params).unwrap();
    assert_eq!(session.color_shift_lines, [0, 0, 0]);
}

#[test]
fn cis_reads_one_channel_per_line() {
    let mut sensor = ccd_600(1);
    sensor.kind = SensorKind::Cis;
    let model = flatbed_model(sensor);
    let session = ScanSession::compute(&model, &model.sensor, color_params(300, 600)).unwrap();
    assert_eq!(
        session.output_line_bytes_raw,
        session.output_pixels as usize
    );
    assert_eq!(
        session.output_line_bytes,
        session.output_pixels as usize * 3
    );
    // three monochrome hardware lines per output line
    assert_eq!(
        session.total_bytes,
        session.output_line_bytes_raw as u64 * session.output_line_count as u64 * 3
    );
    assert!(session.needs_reorder);
}

#[test]
fn segmented_sensor_splits_the_window() {
    let mut sensor = ccd_600(1);
    sensor.kind = SensorKind::Cis;
    sensor.optical_resolution = 1200;
    sensor.register_dpi_set = &[600, 1200];
    sensor.segments = SegmentLayout {
        count: 2,
        min_resolution: 1200,
        order: &[0, 1],
        conseq_pixel_dist: 64,
    };
    let model = flatbed_model(sensor);
    let session = ScanSession::compute(&model, &model.sensor, color_params(1200, 1024)).unwrap();
    assert_eq!(session.segment_count, 2);
    assert_eq!(session.conseq_pixel_dist, 64);
    assert_eq!(session.segment_pixels * 2, session.optical_pixels);

    // below the segment threshold the sensor reads as one segment
    let session = ScanSession::compute(&model, &model.sensor, color_params(600, 512)).unwrap();
    assert_eq!(session.segment_count, 1);
    assert_eq!(session.conseq_pixel_dist, 0);
}

#[test]
fn lineart_depth_normalizes_to_gray() {
    let model = flatbed_model(ccd_600(1));
    let mut params = color_params(300, 600);
    params.depth = 1;
    params.channels = 1;
    params.mode = ScanColorMode::Lineart;
    let session = ScanSession::compute(&model, &model.sensor, params).unwrap();
    assert_eq!(session.params.depth, 8);
}

#[test]
fn invalid_parameters_are_rejected() {
    let model = flatbed_model(ccd_600(1));

    let mut params = color_params(300, 600);
    params.depth = 4;
    assert!(matches!(
        ScanSession::compute(&model, &model.sensor, params),
        Err(Error::InvalidParameters(_))
    ));

    let mut params = color_params(300, 600);
    params.channels = 2;
    assert!(matches!(
        ScanSession::compute(&model, &model.sensor, params),
        Err(Error::InvalidParameters(_))
    ));

    let mut params = color_params(300, 600);
    params.pixels = 0;
    assert!(ScanSession::compute(&model, &model.sensor, params).is_err());
}

#[test]
fn buffers_hold_whole_lines_and_reach_alignment() {
    let model = flatbed_model(ccd_600(1));
    let session = ScanSession::compute(&model, &model.sensor, color_params(300, 600)).unwrap();
    assert_eq!(session.buffer_size_read % session.output_line_bytes_raw, 0);
    assert!(session.buffer_size_read >= session.output_line_bytes_raw);
    assert_eq!(session.buffer_size_out % session.final_line_bytes, 0);
}

#[test]
fn params_deserialize_from_bincode() {
    let params = color_params(300, 2550);
    let bytes = bincode::serialize(&params).unwrap();
    let decoded = ScanParams::deserialize_bincode(&bytes).unwrap();
    assert_eq!(decoded, params);
}
