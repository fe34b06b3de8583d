use crate::error::Error;
use crate::sensor::FrontendKind;

pub const OFFSET_MAX_ITERATIONS: u32 = 32;
pub const LED_MAX_ITERATIONS: u32 = 100;
/// Channel averages must agree within this fraction of the brightest one.
pub const LED_BALANCE_TOLERANCE: f32 = 0.05;
/// Empirically safe LED exposure range; values outside it over- or
/// under-drive the ADC.
pub const LED_EXPOSURE_MIN: u32 = 50;
pub const LED_EXPOSURE_MAX: u32 = 3000;

/// Mean of the `darkest` lowest samples of each channel in an interleaved
/// row; the statistic offset calibration drives to its dark target.
pub fn dark_average(row: &[u8], channels: usize, darkest: usize) -> [f32; 3] {
    let mut result = [0.0f32; 3];
    if row.is_empty() || channels == 0 {
        return result;
    }
    for channel in 0..channels.min(3) {
        let mut samples: Vec<u8> = row
            .iter()
            .skip(channel)
            .step_by(channels)
            .copied()
            .collect();
        if samples.is_empty() {
            continue;
        }
        samples.sort_unstable();
        let count = darkest.min(samples.len()).max(1);
        let sum: u32 = samples[..count].iter().map(|sample| *sample as u32).sum();
        result[channel] = sum as f32 / count as f32;
    }
    result
}

/// Mean of the middle 50% of each channel, skipping the dark margins; the
/// statistic coarse gain calibration uses.
pub fn middle_average(row: &[u8], channels: usize) -> [f32; 3] {
    let mut result = [0.0f32; 3];
    if row.is_empty() || channels == 0 {
        return result;
    }
    let pixels = row.len() / channels;
    let start = pixels / 4;
    let end = (pixels - pixels / 4).max(start + 1);
    for channel in 0..channels.min(3) {
        let mut sum = 0u32;
        for pixel in start..end {
            sum += row[pixel * channels + channel] as u32;
        }
        result[channel] = sum as f32 / (end - start) as f32;
    }
    result
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct ChannelSearch {
    bottom: u8,
    top: u8,
    bottom_average: f32,
    top_average: f32,
    increasing: bool,
}

impl ChannelSearch {
    fn width(&self) -> u8 {
        self.top - self.bottom
    }

    fn best(&self, target: f32) -> u8 {
        if (self.bottom_average - target).abs() <= (self.top_average - target).abs() {
            self.bottom
        } else {
            self.top
        }
    }
}

/// Binary-searches the per-channel ADC offset code so the dark average hits
/// `target`. Each channel is bisected independently against its own bounds;
/// the direction the average moves with the code decides which bound to
/// replace. Hard-capped at [`OFFSET_MAX_ITERATIONS`] measurements, so it
/// terminates even when the device response is pathological.
pub fn calibrate_offset<Measure>(
    code_max: u8,
    target: f32,
    mut measure: Measure,
) -> Result<[u8; 3], Error>
where
    Measure: FnMut([u8; 3]) -> Result<[f32; 3], Error>,
{
    let bottom_average = measure([0; 3])?;
    let top_average = measure([code_max; 3])?;
    let mut channels = [0usize; 3].map(|_| ChannelSearch {
        bottom: 0,
        top: code_max,
        bottom_average: 0.0,
        top_average: 0.0,
        increasing: false,
    });
    for (index, channel) in channels.iter_mut().enumerate() {
        channel.bottom_average = bottom_average[index];
        channel.top_average = top_average[index];
        channel.increasing = top_average[index] >= bottom_average[index];
    }

    for iteration in 2..OFFSET_MAX_ITERATIONS {
        if channels.iter().all(|channel| channel.width() <= 1) {
            break;
        }
        let codes =
            channels.map(|channel| ((channel.bottom as u16 + channel.top as u16) / 2) as u8);
        let averages = measure(codes)?;
        log::trace!(
            "offset calibration iteration {}: codes {:?} averages {:?}",
            iteration,
            codes,
            averages
        );
        for (index, channel) in channels.iter_mut().enumerate() {
            if channel.width() <= 1 {
                continue;
            }
            if (averages[index] > target) == channel.increasing {
                channel.top = codes[index];
                channel.top_average = averages[index];
            } else {
                channel.bottom = codes[index];
                channel.bottom_average = averages[index];
            }
        }
    }
    Ok(channels.map(|channel| channel.best(target)))
}

/// Multiplicative gain needed to lift `measured` to `target`.
pub fn compute_frontend_gain(measured: f32, target: f32) -> f32 {
    if measured <= 0.0 {
        1.0
    } else {
        target / measured
    }
}

/// Maps a gain factor to the front-end's code, per chip law.
pub fn gain_code(kind: FrontendKind, gain: f32, code_max: u8) -> u8 {
    let code = match kind {
        // WM8199-style: code 283 - 208 / gain
        FrontendKind::Wolfson => 283.0 - 208.0 / gain.max(0.74),
        // AD98xx PGA: gain = 1 + code / 32
        FrontendKind::AnalogDevices => (gain - 1.0) * 32.0,
    };
    code.round().clamp(0.0, code_max as f32) as u8
}

/// Closed-form coarse gain from a single measurement per channel. CIS
/// sensors share one physical LED array, so their channels are forced to
/// the smallest of the three codes.
pub fn coarse_gain(
    kind: FrontendKind,
    code_max: u8,
    force_equal: bool,
    measured: [f32; 3],
    target: f32,
) -> [u8; 3] {
    let mut codes =
        measured.map(|value| gain_code(kind, compute_frontend_gain(value, target), code_max));
    if force_equal {
        // unwrap: array is non-empty
        let minimum = *codes.iter().min().unwrap();
        codes = [minimum; 3];
    }
    codes
}

/// Iteratively balances the per-channel LED exposure until the averages sit
/// inside [floor, ceiling] and mutually within the balance tolerance.
/// Bounded at [`LED_MAX_ITERATIONS`]; non-convergence keeps the best-effort
/// values rather than failing the scan.
pub fn calibrate_led<Measure>(
    initial: [u32; 3],
    floor: f32,
    ceiling: f32,
    mut measure: Measure,
) -> Result<[u32; 3], Error>
where
    Measure: FnMut([u32; 3]) -> Result<[f32; 3], Error>,
{
    let clamp = |exposure: f32| {
        (exposure.round() as u32).clamp(LED_EXPOSURE_MIN, LED_EXPOSURE_MAX)
    };
    let mut exposure = initial.map(|value| value.clamp(LED_EXPOSURE_MIN, LED_EXPOSURE_MAX));
    let target = (floor + ceiling) / 2.0;
    for iteration in 0..LED_MAX_ITERATIONS {
        let averages = measure(exposure)?;
        let brightest = averages.iter().cloned().fold(f32::MIN, f32::max);
        let darkest = averages.iter().cloned().fold(f32::MAX, f32::min);
        let balanced = brightest > 0.0 && (brightest - darkest) <= LED_BALANCE_TOLERANCE * brightest;
        let bounded = averages
            .iter()
            .all(|average| *average >= floor && *average <= ceiling);
        log::trace!(
            "led calibration iteration {}: exposure {:?} averages {:?}",
            iteration,
            exposure,
            averages
        );
        if balanced && bounded {
            return Ok(exposure);
        }
        let mut next = [0u32; 3];
        for channel in 0..3 {
            next[channel] =
                clamp(exposure[channel] as f32 * target / averages[channel].max(1.0));
        }
        if next == exposure {
            // already pinned against the exposure bounds
            break;
        }
        exposure = next;
    }
    log::warn!(
        "led calibration did not fully converge, keeping exposure {:?}",
        exposure
    );
    Ok(exposure)
}

/// Per-pixel, per-channel dark/white reference data captured from the
/// calibration strip. Either uploaded to the ASIC's shading RAM or applied
/// host-side as a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadingData {
    pub pixels: usize,
    pub channels: u32,
    /// Correction aims every fully lit pixel at this 16-bit level.
    pub white_target: u16,
    pub dark: Vec<u16>,
    pub white: Vec<u16>,
}

impl ShadingData {
    /// Averages the captured reference rows. Rows are interleaved 16-bit
    /// samples, `pixels * channels` long.
    pub fn compute(
        pixels: usize,
        channels: u32,
        white_target: u16,
        dark_rows: &[Vec<u16>],
        white_rows: &[Vec<u16>],
    ) -> Self {
        let width = pixels * channels as usize;
        let average = |rows: &[Vec<u16>]| -> Vec<u16> {
            if rows.is_empty() {
                return vec![0; width];
            }
            let mut sums = vec![0u64; width];
            for row in rows {
                for (sum, sample) in sums.iter_mut().zip(row.iter()) {
                    *sum += *sample as u64;
                }
            }
            sums.into_iter()
                .map(|sum| (sum / rows.len() as u64) as u16)
                .collect()
        };
        Self {
            pixels,
            channels,
            white_target,
            dark: average(dark_rows),
            white: average(white_rows),
        }
    }

    /// Linear correction of one sample against its references.
    pub fn correct(&self, index: usize, raw: u16) -> u16 {
        let dark = self.dark[index] as i64;
        let white = self.white[index] as i64;
        let span = white - dark;
        if span <= 0 {
            return raw;
        }
        let corrected = (raw as i64 - dark) * self.white_target as i64 / span;
        corrected.clamp(0, u16::MAX as i64) as u16
    }

    /// Wire format for the ASIC's shading RAM: little-endian dark then white
    /// coefficient per pixel-channel.
    pub fn to_hw_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.dark.len() * 4);
        for (dark, white) in self.dark.iter().zip(self.white.iter()) {
            bytes.extend_from_slice(&dark.to_le_bytes());
            bytes.extend_from_slice(&white.to_le_bytes());
        }
        bytes
    }
}
