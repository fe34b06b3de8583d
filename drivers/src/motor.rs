use crate::error::Error;
use genesys_types::ScanMethod;

/// Physical microsteps per motor step table entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StepType {
    Full,
    Half,
    Quarter,
    Eighth,
}

impl StepType {
    pub fn multiplier(self) -> u32 {
        match self {
            Self::Full => 1,
            Self::Half => 2,
            Self::Quarter => 4,
            Self::Eighth => 8,
        }
    }
}

/// Acceleration curve in "w" speed units (higher value means faster; the
/// step interval sent to hardware is the reciprocal, see `step_interval`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MotorSlope {
    /// Speed the motor can start at from standstill.
    pub initial_speed_w: u32,
    /// Fastest speed the motor supports.
    pub max_speed_w: u32,
    /// Speed gained per slope-table entry while accelerating.
    pub acceleration_w_per_step: u32,
}

// no Deserialize: capability tables are compiled in, never parsed
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MotorProfile {
    pub slope: MotorSlope,
    pub step_type: StepType,
    /// Largest exposure the profile is rated for; 0 matches any exposure.
    pub max_exposure: u32,
    /// Applicable y-resolution band; max 0 means unbounded.
    pub min_resolution: u32,
    pub max_resolution: u32,
    /// Scan methods the profile applies to; empty means any.
    pub methods: &'static [ScanMethod],
}

impl MotorProfile {
    fn matches(&self, yres: u32, method: ScanMethod) -> bool {
        if yres < self.min_resolution {
            return false;
        }
        if self.max_resolution != 0 && yres > self.max_resolution {
            return false;
        }
        self.methods.is_empty() || self.methods.contains(&method)
    }
}

/// Per-model motor capability record.
#[derive(Debug, Clone)]
pub struct Motor {
    pub base_ydpi: u32,
    /// Lowest y resolution the motor supports; fast repositioning tables are
    /// generated at this resolution.
    pub min_ydpi: u32,
    pub profiles: &'static [MotorProfile],
}

impl Motor {
    /// Picks the best-matching profile: among applicable profiles whose
    /// `max_exposure` is still large enough, the one with the smallest
    /// `max_exposure` wins; a `max_exposure` of 0 is the unconditional
    /// fallback.
    pub fn select_profile(
        &self,
        exposure: u32,
        yres: u32,
        method: ScanMethod,
    ) -> Result<&'static MotorProfile, Error> {
        let mut best: Option<&'static MotorProfile> = None;
        let mut fallback: Option<&'static MotorProfile> = None;
        for profile in self.profiles {
            if !profile.matches(yres, method) {
                continue;
            }
            if profile.max_exposure == 0 {
                fallback.get_or_insert(profile);
                continue;
            }
            if profile.max_exposure >= exposure
                && best.map_or(true, |current| profile.max_exposure < current.max_exposure)
            {
                best = Some(profile);
            }
        }
        best.or(fallback)
            .ok_or(Error::Contract("no motor profile matches the scan"))
    }
}

/// Cruise speed a scan requires, in w units.
pub fn target_speed_w(exposure: u32, dpi: u32, base_dpi: u32) -> u32 {
    (exposure * dpi) / base_dpi
}

const SPEED_SCALE: u32 = 1 << 24;

/// Pulse interval for a speed, as stored in the hardware slope table.
pub fn step_interval(speed_w: u32) -> u16 {
    (SPEED_SCALE / speed_w.max(1)).min(u16::MAX as u32) as u16
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlopeTable {
    /// Per-entry pulse intervals, non-increasing then constant.
    pub table: Vec<u16>,
    /// Entries spent accelerating (the rest run at cruise speed).
    pub acceleration_steps: usize,
    /// Physical microsteps covered by the whole table.
    pub physical_steps: u32,
    /// Sum of all intervals, used for the Z1/Z2 remainder correction.
    pub pixeltime_sum: u64,
}

impl SlopeTable {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.table.len() * 2);
        for interval in &self.table {
            bytes.extend_from_slice(&interval.to_le_bytes());
        }
        bytes
    }
}

/// Builds the acceleration ramp for a profile. The cruise speed is the
/// requested target clipped to the profile's `max_speed_w`; a target below
/// the start speed degenerates to a constant table. The table never exceeds
/// `max_size` entries and its length is padded to a multiple of
/// `step_multiplier`.
pub fn create_slope_table(
    profile: &MotorProfile,
    target_speed_w: u32,
    step_multiplier: u32,
    max_size: usize,
) -> Result<SlopeTable, Error> {
    let capacity = max_size - max_size % step_multiplier.max(1) as usize;
    if step_multiplier == 0 || capacity == 0 {
        return Err(Error::Contract("slope table shape must be non-empty"));
    }
    let slope = &profile.slope;
    let cruise = target_speed_w.min(slope.max_speed_w).max(1);
    let mut table = Vec::new();
    let mut acceleration_steps = 0usize;
    if cruise > slope.initial_speed_w {
        let mut speed = slope.initial_speed_w.max(1);
        while speed < cruise && table.len() < capacity - 1 {
            table.push(step_interval(speed));
            speed += slope.acceleration_w_per_step.max(1);
        }
        acceleration_steps = table.len();
        if speed < cruise {
            log::warn!(
                "slope table truncated at {} entries before reaching speed {} (reached {})",
                table.len(),
                cruise,
                speed
            );
        }
    }
    table.push(step_interval(cruise));
    while table.len() % step_multiplier as usize != 0 {
        table.push(step_interval(cruise));
    }
    debug_assert!(table.len() <= capacity);
    let pixeltime_sum = table.iter().map(|interval| *interval as u64).sum();
    let physical_steps = table.len() as u32 * step_multiplier;
    Ok(SlopeTable {
        table,
        acceleration_steps,
        physical_steps,
        pixeltime_sum,
    })
}

/// Z1/Z2 deceleration-phase correction: the remainder of the ramp time
/// against the line period, so the first line after acceleration starts on
/// an exposure boundary. When fast feed is engaged the ramp runs twice.
pub fn calculate_zmod(fast_fed: bool, exposure: u32, pixeltime_sum: u64) -> u32 {
    if exposure == 0 {
        return 0;
    }
    let mut sum = pixeltime_sum;
    if fast_fed {
        sum *= 2;
    }
    (sum % exposure as u64) as u32
}

/// Feed distance left for the constant-speed phase once the acceleration and
/// deceleration ramps are accounted for. Never returns less than 3 steps so
/// the feed register stays meaningful.
pub fn corrected_feed_steps(
    feed_steps: u32,
    scan_table: &SlopeTable,
    fast_table: Option<&SlopeTable>,
) -> u32 {
    let mut consumed = 2 * scan_table.physical_steps;
    if let Some(fast_table) = fast_table {
        consumed += 2 * fast_table.physical_steps;
    }
    feed_steps.saturating_sub(consumed).max(3)
}
