use crate::calibration;
use crate::calibration::ShadingData;
use crate::error::Error;
use crate::model::Model;
use crate::pipeline;
use crate::pipeline::RowSource;
use crate::pipeline::TransportSource;
use crate::program;
use crate::program::MotorFlags;
use crate::regs;
use crate::regs::RegisterSet;
use crate::regs::Status;
use crate::sensor::Frontend;
use crate::session::ScanFlags;
use crate::session::ScanParams;
use crate::session::ScanSession;
use crate::transport::Clock;
use crate::transport::Transport;
use genesys_types::ColorFilter;
use genesys_types::ScanColorMode;
use genesys_types::ScanMethod;

/// Poll period for hardware status loops.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// A motor that is still running this long after the stop command is stuck.
const MOTOR_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Parking the head crosses the whole bed at the slowest speed.
const HOME_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(200);

/// How long the buffer may stay empty after a scan trigger before we assume
/// the lamp is still warming up.
const DATA_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

const WARMUP_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Reference rows averaged for each shading target.
const SHADING_LINES: u32 = 16;

/// Window scanned while looking for the calibration strip or the start
/// mark, in lines at the search resolution.
const SEARCH_LINES: u32 = 200;

/// A strip row counts as black below this fraction of the white target and
/// as white above it.
const STRIP_THRESHOLD: f32 = 0.5;

/// Flags shared by every calibration sub-scan: stationary, raw samples,
/// no host post-processing.
const DIAGNOSTIC_FLAGS: ScanFlags = ScanFlags::SINGLE_LINE
    .union(ScanFlags::DISABLE_SHADING)
    .union(ScanFlags::DISABLE_GAMMA)
    .union(ScanFlags::IGNORE_LINE_DISTANCE)
    .union(ScanFlags::DISABLE_BUFFER_FULL_MOVE);

/// One attached scanner. Owns the transport, the mirrored register image
/// and the analog front-end state; every hardware interaction goes through
/// here so the image never drifts from the chip.
pub struct Device<T: Transport, C: Clock> {
    model: &'static Model,
    transport: T,
    clock: C,
    frontend: Frontend,
    regs: RegisterSet,
    /// Separate register image for calibration sub-scans, so calibration
    /// never clobbers the image programmed for the user's scan.
    calib_regs: RegisterSet,
    calibrating: bool,
    led_exposure: [u32; 3],
    shading: Option<ShadingData>,
    cancel: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl<T: Transport, C: Clock> Device<T, C> {
    pub fn new(model: &'static Model, transport: T, clock: C) -> Self {
        Self {
            model,
            transport,
            clock,
            frontend: Frontend::new(model.frontend.clone()),
            regs: RegisterSet::from_table(model.default_registers),
            calib_regs: RegisterSet::from_table(model.default_registers),
            calibrating: false,
            led_exposure: model.sensor.exposure,
            shading: None,
            cancel: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn model(&self) -> &'static Model {
        self.model
    }

    pub fn frontend(&self) -> &Frontend {
        &self.frontend
    }

    /// Shared flag a controlling thread can raise to abort the running
    /// operation at the next row or poll boundary.
    pub fn cancel_flag(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.cancel.clone()
    }

    fn ensure_not_cancelled(&self) -> Result<(), Error> {
        if self.cancel.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub fn read_status(&mut self) -> Result<Status, Error> {
        let table = self.model.asic.table();
        Ok(regs::read_status(&mut self.transport, table.status)?)
    }

    /// Home-sensor and status refresh for frontends that expose them.
    pub fn update_hardware_sensors(&mut self) -> Result<Status, Error> {
        let status = self.read_status()?;
        log::trace!("hardware status {:?}", status);
        Ok(status)
    }

    fn wait_for<Predicate>(
        &mut self,
        what: &'static str,
        timeout: std::time::Duration,
        predicate: Predicate,
    ) -> Result<Status, Error>
    where
        Predicate: Fn(Status) -> bool,
    {
        let deadline = self.clock.now() + timeout;
        loop {
            self.ensure_not_cancelled()?;
            let status = self.read_status()?;
            if predicate(status) {
                return Ok(status);
            }
            if self.clock.now() >= deadline {
                return Err(Error::Timeout(what));
            }
            self.clock.sleep(POLL_INTERVAL);
        }
    }

    /// Resets the mirrored register image to the model's defaults and pushes
    /// it to the chip wholesale.
    pub fn asic_boot(&mut self) -> Result<(), Error> {
        self.regs = RegisterSet::from_table(self.model.default_registers);
        self.regs.commit(&mut self.transport)?;
        Ok(())
    }

    /// Cold-boots the ASIC into the model's default register image and
    /// brings the analog chain and gamma tables to a known state.
    pub fn init(&mut self) -> Result<(), Error> {
        let status = self.read_status()?;
        if status.contains(Status::REPLUGGED) {
            log::debug!("{}: chip reports replug, full boot", self.model.name);
        }
        self.asic_boot()?;
        self.set_fe()?;
        self.send_gamma_table()?;
        self.move_back_home(true)?;
        log::info!("{}: initialized", self.model.name);
        Ok(())
    }

    /// Pushes the current front-end offset and gain codes to the chip.
    /// Offsets live at the frontend base address, gains right after.
    pub fn set_fe(&mut self) -> Result<(), Error> {
        let base = self.model.asic.table().frontend_base;
        for channel in 0..3u16 {
            self.transport
                .write_register(base + channel, self.frontend.offset[channel as usize])?;
            self.transport
                .write_register(base + 3 + channel, self.frontend.gain[channel as usize])?;
        }
        Ok(())
    }

    /// Synthesizes the per-channel gamma lookup tables from the sensor's
    /// gamma values and uploads them to the chip's table memory.
    pub fn send_gamma_table(&mut self) -> Result<(), Error> {
        const ENTRIES: usize = 256;
        let mut bytes = Vec::with_capacity(ENTRIES * 2 * 3);
        for gamma in self.model.sensor.gamma {
            for entry in 0..ENTRIES {
                let normalized = entry as f32 / (ENTRIES - 1) as f32;
                let value = (normalized.powf(1.0 / gamma) * f32::from(u16::MAX)).round() as u16;
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        let table = self.model.asic.table();
        self.transport.write_memory(table.gamma_table_base, &bytes)?;
        Ok(())
    }

    /// Uploads dark/white coefficients to the hardware shading engine.
    pub fn send_shading_data(&mut self, shading: &ShadingData) -> Result<(), Error> {
        let table = self.model.asic.table();
        if !table.has_hw_shading {
            return Err(Error::Unsupported(
                "this chip has no hardware shading engine",
            ));
        }
        self.transport
            .write_memory(table.shading_base, &shading.to_hw_bytes())?;
        Ok(())
    }

    /// Exposure the next scan should run at: the LED balance result for CIS
    /// sensors, the sensor's fixed line period otherwise.
    fn scan_exposure(&self) -> u32 {
        if self.model.is_cis() {
            // unwrap: array is non-empty
            let led = *self.led_exposure.iter().max().unwrap();
            led.max(self.model.sensor.exposure_lperiod)
        } else {
            self.model.sensor.exposure_lperiod
        }
    }

    /// CIS chips expose one 16-bit exposure field per LED color right after
    /// the family's exposure base register.
    fn program_led_exposure(&self, regs_out: &mut RegisterSet) {
        let base = self.model.asic.table().exposure;
        for (channel, exposure) in self.led_exposure.iter().enumerate() {
            regs_out.set_wide(base + channel as u16 * 2, *exposure, 2);
        }
    }

    fn motor_flags(params: &ScanParams) -> MotorFlags {
        let mut flags = MotorFlags::empty();
        if params.flags.contains(ScanFlags::SINGLE_LINE) {
            return MotorFlags::STATIONARY;
        }
        if params.flags.contains(ScanFlags::REVERSE) {
            flags |= MotorFlags::REVERSE;
        }
        if params.flags.contains(ScanFlags::FEEDING) {
            flags |= MotorFlags::FEED;
        }
        if params.flags.contains(ScanFlags::DISABLE_BUFFER_FULL_MOVE) {
            flags |= MotorFlags::DISABLE_BUFFER_FULL_MOVE;
        } else {
            flags |= MotorFlags::AUTO_GO_HOME;
        }
        flags
    }

    /// Builds a fresh register image for a computed session: model defaults,
    /// then the optical window, then the motor program. Nothing is written
    /// to hardware except the slope tables.
    fn build_regs(&mut self, session: &ScanSession, exposure: u32) -> Result<RegisterSet, Error> {
        let table = self.model.asic.table();
        let mut regs_out = RegisterSet::from_table(self.model.default_registers);
        program::init_optical_regs(&mut regs_out, table, &self.model.sensor, session, exposure)?;
        if self.model.is_cis() {
            self.program_led_exposure(&mut regs_out);
        }
        let profile = self.model.motor.select_profile(
            exposure,
            session.params.yres,
            session.params.method,
        )?;
        program::init_motor_regs(
            &mut self.transport,
            &mut regs_out,
            table,
            &self.model.motor,
            profile,
            exposure,
            session.params.yres,
            session.params.starty,
            Self::motor_flags(&session.params),
        )?;
        Ok(regs_out)
    }

    /// Rebuilds the scan register image for a computed session.
    pub fn init_regs_for_scan(
        &mut self,
        session: &ScanSession,
        exposure: u32,
    ) -> Result<(), Error> {
        self.regs = self.build_regs(session, exposure)?;
        Ok(())
    }

    /// The register image the current operation commits and mutates.
    fn active_image(&mut self) -> &mut RegisterSet {
        if self.calibrating {
            &mut self.calib_regs
        } else {
            &mut self.regs
        }
    }

    fn write_scan_bit(&mut self, enabled: bool) -> Result<(), Error> {
        let image = self.active_image();
        image.set_bit(regs::REG_SCANCTL, regs::SCANCTL_SCAN, enabled);
        let value = image.get(regs::REG_SCANCTL);
        self.transport.write_register(regs::REG_SCANCTL, value)?;
        Ok(())
    }

    /// Commits the active register image and starts acquisition. A scanner
    /// whose lamp is still warming up produces no data at first; one retry
    /// after a settle delay covers that before giving up.
    pub fn begin_scan(&mut self) -> Result<(), Error> {
        if self.calibrating {
            self.calib_regs.commit(&mut self.transport)?;
        } else {
            self.regs.commit(&mut self.transport)?;
        }
        self.write_scan_bit(true)?;
        match self.wait_for("scan data", DATA_TIMEOUT, |status| {
            !status.contains(Status::BUFFER_EMPTY)
        }) {
            Ok(_) => Ok(()),
            Err(Error::Timeout(_)) => {
                log::warn!(
                    "{}: no data after scan trigger, retrying after lamp warm-up",
                    self.model.name
                );
                self.write_scan_bit(false)?;
                self.clock.sleep(WARMUP_DELAY);
                self.write_scan_bit(true)?;
                self.wait_for("scan data", DATA_TIMEOUT, |status| {
                    !status.contains(Status::BUFFER_EMPTY)
                })
                .map_err(|error| match error {
                    Error::Timeout(_) => Error::WarmingUp(1),
                    other => other,
                })?;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Stops acquisition and waits for the motor to come to rest, unless the
    /// motor program parks the head on its own.
    pub fn end_scan(&mut self) -> Result<(), Error> {
        self.write_scan_bit(false)?;
        let parking = self.active_image().get(regs::REG_MOTORCTL) & regs::MOTORCTL_AGOHOME != 0;
        if !parking {
            self.wait_for("motor stop", MOTOR_STOP_TIMEOUT, |status| {
                !status.contains(Status::MOTOR_ENABLED)
            })?;
        }
        Ok(())
    }

    /// Sends the head back to the park position.
    pub fn move_back_home(&mut self, wait: bool) -> Result<(), Error> {
        let status = self.read_status()?;
        if status.contains(Status::AT_HOME) {
            return Ok(());
        }
        log::debug!("{}: moving back home", self.model.name);
        let control = regs::MOTORCTL_MTRPWR
            | regs::MOTORCTL_AGOHOME
            | regs::MOTORCTL_FASTFED
            | regs::MOTORCTL_MTRREV;
        self.regs.set(regs::REG_MOTORCTL, control);
        self.transport.write_register(regs::REG_MOTORCTL, control)?;
        self.transport.write_register(regs::REG_MOVE, 0x01)?;
        if wait {
            self.wait_for("head park", HOME_TIMEOUT, |status| {
                status.contains(Status::AT_HOME)
            })?;
        }
        Ok(())
    }

    /// Repositioning move that produces no image data.
    pub fn feed(&mut self, steps: u32) -> Result<(), Error> {
        let exposure = self.scan_exposure();
        let table = self.model.asic.table();
        let mut regs_out = RegisterSet::from_table(self.model.default_registers);
        let profile = self.model.motor.select_profile(
            exposure,
            self.model.motor.min_ydpi,
            ScanMethod::Flatbed,
        )?;
        program::init_motor_regs(
            &mut self.transport,
            &mut regs_out,
            table,
            &self.model.motor,
            profile,
            exposure,
            self.model.motor.min_ydpi,
            steps,
            MotorFlags::FEED,
        )?;
        regs_out.commit(&mut self.transport)?;
        self.transport.write_register(regs::REG_MOVE, 0x01)?;
        self.wait_for("feed completion", MOTOR_STOP_TIMEOUT, |status| {
            status.contains(Status::FEED_FINISHED)
        })?;
        Ok(())
    }

    /// A short full-width color session used by all calibration sub-scans.
    /// Flag differences between sub-scans come in whole through `flags`.
    fn calibration_session(
        &self,
        depth: u32,
        lines: u32,
        flags: ScanFlags,
    ) -> Result<ScanSession, Error> {
        let sensor = &self.model.sensor;
        // unwrap: a sensor always has at least one selectable dpi
        let resolution = *sensor.register_dpi_set.first().unwrap();
        let pixels = sensor.sensor_pixels * resolution / sensor.optical_resolution;
        ScanSession::compute(
            self.model,
            sensor,
            ScanParams {
                xres: resolution,
                yres: resolution,
                startx: 0,
                starty: 0,
                pixels,
                requested_pixels: pixels,
                lines,
                depth,
                channels: 3,
                mode: ScanColorMode::Color,
                method: ScanMethod::Flatbed,
                color_filter: ColorFilter::None,
                flags,
            },
        )
    }

    /// Runs one sub-scan against the calibration register image and returns
    /// the reassembled rows.
    fn capture_rows(
        &mut self,
        session: &ScanSession,
        exposure: u32,
        lines: usize,
    ) -> Result<Vec<u8>, Error> {
        self.calibrating = true;
        let result = self.capture_rows_inner(session, exposure, lines);
        self.calibrating = false;
        result
    }

    fn capture_rows_inner(
        &mut self,
        session: &ScanSession,
        exposure: u32,
        lines: usize,
    ) -> Result<Vec<u8>, Error> {
        self.calib_regs = self.build_regs(session, exposure)?;
        self.set_fe()?;
        self.begin_scan()?;
        let model = self.model;
        let source = TransportSource::new(&mut self.transport, session);
        let mut stage =
            pipeline::build_pipeline(model, &model.sensor, session, None, Box::new(source))?;
        let image = pipeline::read_image(stage.as_mut(), lines)?;
        drop(stage);
        self.end_scan()?;
        Ok(image)
    }

    /// Nulls the analog offset so unlit pixels read the sensor's dark
    /// target. Returns the chosen per-channel codes.
    pub fn offset_calibration(&mut self) -> Result<[u8; 3], Error> {
        let session = self.calibration_session(8, 1, DIAGNOSTIC_FLAGS)?;
        let exposure = self.scan_exposure();
        let code_max = self.frontend.descriptor.offset_code_max;
        let target = self.model.sensor.calibration.dark_target;
        let channels = session.params.channels as usize;
        let offsets = calibration::calibrate_offset(code_max, target, |codes| {
            self.frontend.offset = codes;
            let row = self.capture_rows(&session, exposure, 1)?;
            let pixels = row.len() / channels;
            Ok(calibration::dark_average(
                &row,
                channels,
                (pixels / 20).max(1),
            ))
        })?;
        self.frontend.offset = offsets;
        self.set_fe()?;
        log::debug!("{}: offset codes {:?}", self.model.name, offsets);
        Ok(offsets)
    }

    /// Single-measurement gain calibration against the white target; CIS
    /// sensors get one shared code so the LED balance stays meaningful.
    pub fn coarse_gain_calibration(&mut self) -> Result<[u8; 3], Error> {
        let session = self.calibration_session(8, 1, DIAGNOSTIC_FLAGS)?;
        let exposure = self.scan_exposure();
        let kind = self.frontend.descriptor.kind;
        let code_max = self.frontend.descriptor.gain_code_max;
        let target = self.model.sensor.calibration.white_target;
        let channels = session.params.channels as usize;
        let row = self.capture_rows(&session, exposure, 1)?;
        let measured = calibration::middle_average(&row, channels);
        let gains = calibration::coarse_gain(kind, code_max, self.model.is_cis(), measured, target);
        self.frontend.gain = gains;
        self.set_fe()?;
        log::debug!(
            "{}: measured {:?}, gain codes {:?}",
            self.model.name,
            measured,
            gains
        );
        Ok(gains)
    }

    /// Balances the CIS LED exposures so all three channels land in the
    /// sensor's target band.
    pub fn led_calibration(&mut self) -> Result<[u32; 3], Error> {
        if !self.model.is_cis() {
            return Err(Error::Unsupported(
                "led calibration only applies to cis sensors",
            ));
        }
        let session = self.calibration_session(8, 1, DIAGNOSTIC_FLAGS)?;
        let floor = self.model.sensor.calibration.led_floor;
        let ceiling = self.model.sensor.calibration.led_ceiling;
        let channels = session.params.channels as usize;
        let initial = self.led_exposure;
        let exposure = calibration::calibrate_led(initial, floor, ceiling, |candidate| {
            self.led_exposure = candidate;
            // unwrap: array is non-empty
            let line_period = *candidate.iter().max().unwrap();
            let row = self.capture_rows(&session, line_period, 1)?;
            Ok(calibration::middle_average(&row, channels))
        })?;
        self.led_exposure = exposure;
        log::debug!("{}: led exposure {:?}", self.model.name, exposure);
        Ok(exposure)
    }

    fn rows_to_samples(image: &[u8], stride: usize) -> Vec<Vec<u16>> {
        image
            .chunks_exact(stride)
            .map(|row| {
                row.chunks_exact(2)
                    // unwrap: chunk has exactly two bytes
                    .map(|sample| u16::from_le_bytes(sample.try_into().unwrap()))
                    .collect()
            })
            .collect()
    }

    /// Captures dark and white reference rows over the calibration strip
    /// and turns them into per-pixel correction coefficients. The result is
    /// uploaded to the hardware engine when the chip has one and the model
    /// can use it, and kept for the host-side stage otherwise.
    pub fn shading_calibration(&mut self) -> Result<(), Error> {
        let exposure = self.scan_exposure();

        let dark_session = self.calibration_session(
            16,
            SHADING_LINES,
            DIAGNOSTIC_FLAGS | ScanFlags::DISABLE_LAMP,
        )?;
        let dark_image = self.capture_rows(&dark_session, exposure, SHADING_LINES as usize)?;

        let white_session = self.calibration_session(16, SHADING_LINES, DIAGNOSTIC_FLAGS)?;
        let white_image = self.capture_rows(&white_session, exposure, SHADING_LINES as usize)?;

        let stride = white_session.final_line_bytes;
        let channels = white_session.params.channels;
        let pixels = stride / (channels as usize * 2);
        let white_target =
            (self.model.sensor.calibration.white_target * 256.0).min(f32::from(u16::MAX)) as u16;
        let shading = ShadingData::compute(
            pixels,
            channels,
            white_target,
            &Self::rows_to_samples(&dark_image, stride),
            &Self::rows_to_samples(&white_image, stride),
        );
        let table = self.model.asic.table();
        if table.has_hw_shading && !self.model.use_host_side_calib {
            self.send_shading_data(&shading)?;
        }
        self.shading = Some(shading);
        Ok(())
    }

    /// Full calibration sequence in dependency order: analog offset and
    /// gain first, then the LED balance they feed into, then shading on the
    /// settled analog chain.
    pub fn calibrate(&mut self) -> Result<(), Error> {
        self.offset_calibration()?;
        self.coarse_gain_calibration()?;
        if self.model.is_cis() {
            self.led_calibration()?;
        }
        self.shading_calibration()?;
        Ok(())
    }

    fn search_rows(&mut self) -> Result<(Vec<u8>, usize), Error> {
        // search passes need the motor running, so the stationary flag is
        // left out of the diagnostic set
        let session = self.calibration_session(
            8,
            SEARCH_LINES,
            DIAGNOSTIC_FLAGS.difference(ScanFlags::SINGLE_LINE),
        )?;
        let exposure = self.scan_exposure();
        let image = self.capture_rows(&session, exposure, SEARCH_LINES as usize)?;
        Ok((image, session.final_line_bytes))
    }

    /// Scans forward looking for the black or white calibration strip.
    /// Returns the line offset of the first matching row.
    pub fn search_strip(&mut self, dark: bool) -> Result<u32, Error> {
        let threshold = self.model.sensor.calibration.white_target * STRIP_THRESHOLD;
        let (image, stride) = self.search_rows()?;
        for (line, row) in image.chunks_exact(stride).enumerate() {
            let average = calibration::middle_average(row, 3);
            let brightness = (average[0] + average[1] + average[2]) / 3.0;
            let matched = if dark {
                brightness < threshold
            } else {
                brightness >= threshold
            };
            if matched {
                log::debug!(
                    "{}: found {} strip at line {}",
                    self.model.name,
                    if dark { "black" } else { "white" },
                    line
                );
                return Ok(line as u32);
            }
        }
        Err(Error::StripNotFound)
    }

    /// Locates the start mark: the first white row after the black home
    /// strip, measured from the park position.
    pub fn search_start_position(&mut self) -> Result<u32, Error> {
        let threshold = self.model.sensor.calibration.white_target * STRIP_THRESHOLD;
        let (image, stride) = self.search_rows()?;
        let mut seen_dark = false;
        for (line, row) in image.chunks_exact(stride).enumerate() {
            let average = calibration::middle_average(row, 3);
            let brightness = (average[0] + average[1] + average[2]) / 3.0;
            if brightness < threshold {
                seen_dark = true;
            } else if seen_dark {
                return Ok(line as u32);
            }
        }
        Err(Error::StripNotFound)
    }

    /// Runs a complete scan: compiles the session, programs the chip, pulls
    /// the data through the reassembly pipeline and parks the head.
    pub fn scan(&mut self, params: ScanParams) -> Result<(ScanSession, Vec<u8>), Error> {
        self.ensure_not_cancelled()?;
        let session = ScanSession::compute(self.model, &self.model.sensor, params)?;
        let exposure = self.scan_exposure();
        self.init_regs_for_scan(&session, exposure)?;
        self.set_fe()?;
        self.begin_scan()?;

        let model = self.model;
        let cancel = self.cancel.clone();
        let shading = self.shading.as_ref();
        let source = TransportSource::new(&mut self.transport, &session);
        let mut stage =
            pipeline::build_pipeline(model, &model.sensor, &session, shading, Box::new(source))?;
        let stride = stage.row_bytes();
        let lines = session.params.lines as usize;
        let mut image = vec![0u8; stride * lines];
        let mut produced = 0;
        for line in 0..lines {
            if cancel.load(std::sync::atomic::Ordering::Relaxed) {
                drop(stage);
                self.end_scan()?;
                self.move_back_home(false)?;
                return Err(Error::Cancelled);
            }
            if !stage.next_row(&mut image[line * stride..(line + 1) * stride])? {
                break;
            }
            produced += 1;
        }
        drop(stage);
        image.truncate(produced * stride);

        self.end_scan()?;
        self.move_back_home(false)?;
        log::info!(
            "{}: scanned {} lines of {} bytes",
            self.model.name,
            produced,
            stride
        );
        Ok((session, image))
    }
}
