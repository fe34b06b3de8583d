use crate::asic::AsicTable;
use crate::error::Error;
use crate::motor;
use crate::motor::Motor;
use crate::motor::MotorProfile;
use crate::regs;
use crate::regs::RegisterSet;
use crate::sensor::Sensor;
use crate::session::ScanFlags;
use crate::session::ScanSession;
use crate::transport::Transport;
use genesys_types::ColorFilter;
use genesys_types::ScanColorMode;
use genesys_types::ScanMethod;
use genesys_types::SensorKind;

bitflags::bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct MotorFlags: u32 {
        const AUTO_GO_HOME = 1 << 0;
        const DISABLE_BUFFER_FULL_MOVE = 1 << 1;
        /// Repositioning move that produces no data.
        const FEED = 1 << 2;
        const REVERSE = 1 << 3;
        /// Stationary diagnostic scan; the motor stays unpowered and no
        /// slope tables are programmed.
        const STATIONARY = 1 << 4;
    }
}

/// Slope-table slots in the ASIC's table memory.
const TABLE_SCAN: u32 = 0;
const TABLE_BACKTRACK: u32 = 1;
const TABLE_FAST: u32 = 2;
const TABLE_FAST_BACKTRACK: u32 = 3;

fn dpihw_bits(register_dpi: u32) -> Result<u8, Error> {
    Ok(match register_dpi {
        600 => regs::DPICTL_DPIHW_600,
        1200 => regs::DPICTL_DPIHW_1200,
        2400 => regs::DPICTL_DPIHW_2400,
        4800 => regs::DPICTL_DPIHW_4800,
        _ => return Err(Error::Contract("hardware dpi is not a selectable value")),
    })
}

fn filter_bits(filter: ColorFilter) -> u8 {
    let value = match filter {
        ColorFilter::None => 0b00,
        ColorFilter::Red => 0b01,
        ColorFilter::Green => 0b10,
        ColorFilter::Blue => 0b11,
    };
    value << regs::PIXELCTL_FILTER_SHIFT
}

/// Fills the sensor-side registers for a computed session. Only the
/// in-memory image is touched; committing to hardware is the caller's
/// explicit step.
pub fn init_optical_regs(
    regs_out: &mut RegisterSet,
    table: &AsicTable,
    sensor: &Sensor,
    session: &ScanSession,
    exposure: u32,
) -> Result<(), Error> {
    for (address, value) in sensor.custom_registers {
        regs_out.set(*address, *value);
    }

    regs_out.update(
        regs::REG_DPICTL,
        regs::DPICTL_DPIHW_MASK,
        dpihw_bits(session.register_dpi)?,
    );
    regs_out.set_wide(table.exposure, exposure, table.exposure_bytes);
    regs_out.set_wide(table.start_pixel, session.pixel_startx, 2);
    regs_out.set_wide(table.end_pixel, session.pixel_endx, 2);

    let hw_line_count = if sensor.kind == SensorKind::Cis {
        session.output_line_count * session.params.channels
    } else {
        session.output_line_count
    };
    regs_out.set_wide(table.linecnt, hw_line_count, 3);

    // no supported generation runs the gamma tables at 16 bits per sample
    let gamma_enabled = !session.params.flags.contains(ScanFlags::DISABLE_GAMMA)
        && session.params.depth != 16;
    regs_out.set_bit(regs::REG_DPICTL, regs::DPICTL_GMMENB, gamma_enabled);
    regs_out.set_bit(regs::REG_SCANCTL, regs::SCANCTL_DVDSET, gamma_enabled);

    regs_out.set_bit(
        regs::REG_PIXELCTL,
        regs::PIXELCTL_BITSET,
        session.params.depth == 16,
    );
    regs_out.set_bit(
        regs::REG_PIXELCTL,
        regs::PIXELCTL_LINEART,
        session.params.mode == ScanColorMode::Lineart,
    );
    if session.params.channels == 1 {
        regs_out.update(
            regs::REG_PIXELCTL,
            regs::PIXELCTL_FILTER_MASK,
            filter_bits(session.params.color_filter),
        );
    } else {
        regs_out.update(regs::REG_PIXELCTL, regs::PIXELCTL_FILTER_MASK, 0);
    }

    regs_out.set_bit(
        regs::REG_SCANCTL,
        regs::SCANCTL_CISSET,
        sensor.kind == SensorKind::Cis,
    );

    let lamp_on = !session.params.flags.contains(ScanFlags::DISABLE_LAMP);
    regs_out.set_bit(regs::REG_LAMPCTL, regs::LAMPCTL_LAMPPWR, lamp_on);
    regs_out.set_bit(
        regs::REG_LAMPCTL,
        regs::LAMPCTL_XPASEL,
        session.params.method.uses_transparency_adapter()
            || session.params.flags.contains(ScanFlags::USE_XPA),
    );
    Ok(())
}

fn send_slope_table<T: Transport>(
    transport: &mut T,
    table: &AsicTable,
    slot: u32,
    slope_table: &motor::SlopeTable,
) -> Result<(), Error> {
    let bytes = slope_table.to_bytes();
    if bytes.len() > table.slope_table_stride as usize {
        return Err(Error::Contract("slope table exceeds its memory slot"));
    }
    transport.write_memory(
        table.slope_table_base + table.slope_table_stride * slot,
        &bytes,
    )?;
    Ok(())
}

/// Fills the motor-side registers and uploads the slope tables. The scan
/// table is reused for backtracking; a second table generated at the motor's
/// lowest resolution drives fast repositioning moves. Stationary diagnostic
/// scans only drop motor power.
pub fn init_motor_regs<T: Transport>(
    transport: &mut T,
    regs_out: &mut RegisterSet,
    table: &AsicTable,
    motor_caps: &Motor,
    profile: &MotorProfile,
    exposure: u32,
    yres: u32,
    feed_steps: u32,
    flags: MotorFlags,
) -> Result<(), Error> {
    if flags.contains(MotorFlags::STATIONARY) {
        regs_out.set_bit(regs::REG_MOTORCTL, regs::MOTORCTL_MTRPWR, false);
        regs_out.set_bit(regs::REG_MOTORCTL, regs::MOTORCTL_AGOHOME, false);
        return Ok(());
    }
    let multiplier = profile.step_type.multiplier();
    let scan_speed = motor::target_speed_w(exposure, yres, motor_caps.base_ydpi);
    let scan_table =
        motor::create_slope_table(profile, scan_speed, multiplier, table.slope_table_max_size)?;

    let fast_profile =
        motor_caps.select_profile(exposure, motor_caps.min_ydpi, ScanMethod::Flatbed)?;
    let fast_speed = motor::target_speed_w(exposure, motor_caps.min_ydpi, motor_caps.base_ydpi);
    let fast_table = motor::create_slope_table(
        fast_profile,
        fast_speed.max(fast_profile.slope.max_speed_w),
        fast_profile.step_type.multiplier(),
        table.slope_table_max_size,
    )?;

    send_slope_table(transport, table, TABLE_SCAN, &scan_table)?;
    send_slope_table(transport, table, TABLE_BACKTRACK, &scan_table)?;
    send_slope_table(transport, table, TABLE_FAST, &fast_table)?;
    send_slope_table(transport, table, TABLE_FAST_BACKTRACK, &fast_table)?;

    regs_out.set(
        table.step_count,
        (scan_table.table.len() as u32 / multiplier).min(0xff) as u8,
    );
    regs_out.set(
        table.fast_step_count,
        (fast_table.table.len() as u32 / fast_profile.step_type.multiplier()).min(0xff) as u8,
    );

    let fast_fed = !flags.contains(MotorFlags::FEED)
        && feed_steps > 2 * (scan_table.physical_steps + fast_table.physical_steps);
    let feedl = motor::corrected_feed_steps(
        feed_steps,
        &scan_table,
        fast_fed.then_some(&fast_table),
    );
    regs_out.set_wide(table.feedl, feedl, 3);

    regs_out.set_wide(
        table.z1,
        motor::calculate_zmod(fast_fed, exposure, scan_table.pixeltime_sum),
        2,
    );
    regs_out.set_wide(
        table.z2,
        motor::calculate_zmod(fast_fed, exposure, fast_table.pixeltime_sum),
        2,
    );

    regs_out.set_bit(regs::REG_MOTORCTL, regs::MOTORCTL_MTRPWR, true);
    regs_out.set_bit(regs::REG_MOTORCTL, regs::MOTORCTL_FASTFED, fast_fed);
    regs_out.set_bit(
        regs::REG_MOTORCTL,
        regs::MOTORCTL_MTRREV,
        flags.contains(MotorFlags::REVERSE),
    );
    regs_out.set_bit(
        regs::REG_MOTORCTL,
        regs::MOTORCTL_AGOHOME,
        flags.contains(MotorFlags::AUTO_GO_HOME),
    );
    regs_out.set_bit(
        regs::REG_MOTORCTL,
        regs::MOTORCTL_ACDCDIS,
        flags.contains(MotorFlags::DISABLE_BUFFER_FULL_MOVE),
    );
    Ok(())
}
