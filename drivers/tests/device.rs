use genesys_drivers::device::Device;
use genesys_drivers::devices::canoscan_4400f;
use genesys_drivers::devices::canoscan_lide_110;
use genesys_drivers::regs::Status;
use genesys_drivers::transport;
use genesys_drivers::transport::Clock;
use genesys_drivers::transport::Transport;
use genesys_drivers::types::ColorFilter;
use genesys_drivers::types::ScanColorMode;
use genesys_drivers::types::ScanMethod;
use genesys_drivers::Error;
use genesys_drivers::ScanFlags;
use genesys_drivers::ScanParams;

const STATUS_ADDRESS: u16 = 0x41;

/// Register state shared between a test and the transport it hands to the
/// device, so committed values stay inspectable after the device takes
/// ownership.
type SharedRegisters = std::rc::Rc<std::cell::RefCell<std::collections::BTreeMap<u16, u8>>>;
type WriteLog = std::rc::Rc<std::cell::RefCell<Vec<(u16, u8)>>>;

/// In-memory scanner double: registers are a map, the status register is a
/// script-controlled byte, scan data is a deterministic counter stream.
struct MockTransport {
    status: u8,
    registers: SharedRegisters,
    writes: WriteLog,
    data_counter: u8,
}

impl MockTransport {
    fn new(status: Status) -> Self {
        Self {
            status: status.bits(),
            registers: SharedRegisters::default(),
            writes: WriteLog::default(),
            data_counter: 0,
        }
    }

    fn registers(&self) -> SharedRegisters {
        self.registers.clone()
    }

    fn write_log(&self) -> WriteLog {
        self.writes.clone()
    }
}

impl Transport for MockTransport {
    fn write_register(&mut self, address: u16, value: u8) -> Result<(), transport::Error> {
        self.registers.borrow_mut().insert(address, value);
        self.writes.borrow_mut().push((address, value));
        Ok(())
    }

    fn read_register(&mut self, address: u16) -> Result<u8, transport::Error> {
        if address == STATUS_ADDRESS {
            return Ok(self.status);
        }
        Ok(self.registers.borrow().get(&address).copied().unwrap_or(0))
    }

    fn write_memory(&mut self, _address: u32, _data: &[u8]) -> Result<(), transport::Error> {
        Ok(())
    }

    fn read_data(&mut self, buffer: &mut [u8]) -> Result<usize, transport::Error> {
        for byte in buffer.iter_mut() {
            *byte = self.data_counter;
            self.data_counter = self.data_counter.wrapping_add(1);
        }
        Ok(buffer.len())
    }
}

/// Clock whose time only advances when the code under test sleeps, so
/// timeout paths run instantly.
struct FakeClock {
    now: std::time::Duration,
    slept: std::time::Duration,
}

impl FakeClock {
    fn new() -> Self {
        Self {
            now: std::time::Duration::ZERO,
            slept: std::time::Duration::ZERO,
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> std::time::Duration {
        self.now
    }

    fn sleep(&mut self, duration: std::time::Duration) {
        self.now += duration;
        self.slept += duration;
    }
}

fn scan_params(pixels: u32, lines: u32) -> ScanParams {
    ScanParams {
        xres: 300,
        yres: 300,
        startx: 0,
        starty: 0,
        pixels,
        requested_pixels: 0,
        lines,
        depth: 8,
        channels: 3,
        mode: ScanColorMode::Color,
        method: ScanMethod::Flatbed,
        color_filter: ColorFilter::None,
        flags: ScanFlags::IGNORE_LINE_DISTANCE | ScanFlags::DISABLE_SHADING,
    }
}

#[test]
fn scan_produces_the_requested_lines() {
    let transport = MockTransport::new(Status::AT_HOME);
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    let (session, image) = device.scan(scan_params(64, 4)).unwrap();
    assert_eq!(image.len(), session.final_line_bytes * 4);
}

#[test]
fn begin_scan_reports_a_cold_lamp_after_one_retry() {
    // the buffer never fills, so both trigger attempts time out
    let transport = MockTransport::new(Status::AT_HOME | Status::BUFFER_EMPTY);
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    assert!(matches!(device.begin_scan(), Err(Error::WarmingUp(1))));
}

#[test]
fn head_park_times_out_when_the_home_sensor_never_trips() {
    let transport = MockTransport::new(Status::empty());
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    assert!(matches!(
        device.move_back_home(true),
        Err(Error::Timeout(_))
    ));
}

#[test]
fn move_back_home_is_a_no_op_at_the_park_position() {
    let transport = MockTransport::new(Status::AT_HOME);
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    device.move_back_home(true).unwrap();
}

#[test]
fn a_raised_cancel_flag_aborts_before_hardware_is_touched() {
    let transport = MockTransport::new(Status::AT_HOME);
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    device
        .cancel_flag()
        .store(true, std::sync::atomic::Ordering::Relaxed);
    assert!(matches!(
        device.scan(scan_params(64, 4)),
        Err(Error::Cancelled)
    ));
}

#[test]
fn offset_calibration_leaves_the_motor_unpowered() {
    let transport = MockTransport::new(Status::AT_HOME);
    let registers = transport.registers();
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    device.offset_calibration().unwrap();
    // the model default powers the motor; a stationary sub-scan must not
    let motorctl = registers
        .borrow()
        .get(&genesys_drivers::regs::REG_MOTORCTL)
        .copied()
        .unwrap_or(0);
    assert_eq!(motorctl & genesys_drivers::regs::MOTORCTL_MTRPWR, 0);
}

#[test]
fn calibration_does_not_clobber_the_live_register_image() {
    let transport = MockTransport::new(Status::AT_HOME);
    let registers = transport.registers();
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    let session = genesys_drivers::ScanSession::compute(
        &canoscan_4400f::MODEL,
        &canoscan_4400f::MODEL.sensor,
        scan_params(64, 4),
    )
    .unwrap();
    device
        .init_regs_for_scan(&session, canoscan_4400f::MODEL.sensor.exposure_lperiod)
        .unwrap();
    device.offset_calibration().unwrap();
    // committing the live image must still program the 4-line scan with a
    // powered motor, not the stationary 1-line calibration setup
    device.begin_scan().unwrap();
    let registers = registers.borrow();
    let linecnt = [
        registers.get(&0x25).copied().unwrap_or(0),
        registers.get(&0x26).copied().unwrap_or(0),
        registers.get(&0x27).copied().unwrap_or(0),
    ];
    assert_eq!(linecnt, [0, 0, 4]);
    let motorctl = registers
        .get(&genesys_drivers::regs::REG_MOTORCTL)
        .copied()
        .unwrap_or(0);
    assert_ne!(motorctl & genesys_drivers::regs::MOTORCTL_MTRPWR, 0);
}

#[test]
fn shading_references_are_captured_with_the_lamp_off() {
    let transport = MockTransport::new(Status::AT_HOME);
    let writes = transport.write_log();
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    device.shading_calibration().unwrap();
    let lamp_writes: Vec<u8> = writes
        .borrow()
        .iter()
        .filter(|(address, _)| *address == genesys_drivers::regs::REG_LAMPCTL)
        .map(|(_, value)| *value & genesys_drivers::regs::LAMPCTL_LAMPPWR)
        .collect();
    // dark reference with the lamp off, then white reference with it on
    assert_eq!(
        lamp_writes,
        vec![0, genesys_drivers::regs::LAMPCTL_LAMPPWR]
    );
}

#[test]
fn full_calibration_equalizes_cis_gains() {
    let transport = MockTransport::new(Status::AT_HOME);
    let mut device = Device::new(&canoscan_lide_110::MODEL, transport, FakeClock::new());
    device.calibrate().unwrap();
    // the analog chain settles before the led balance runs, and a cis
    // sensor ends up with one shared gain code
    let gain = device.frontend().gain;
    assert_eq!(gain[0], gain[1]);
    assert_eq!(gain[1], gain[2]);
}

#[test]
fn led_calibration_rejects_ccd_models() {
    let transport = MockTransport::new(Status::AT_HOME);
    let mut device = Device::new(&canoscan_4400f::MODEL, transport, FakeClock::new());
    assert!(matches!(
        device.led_calibration(),
        Err(Error::Unsupported(_))
    ));
}
