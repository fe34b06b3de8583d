use crate::asic::WindowAddressing;
use crate::error::Error;
use crate::model::Model;
use crate::sensor::Sensor;
use genesys_types::ColorFilter;
use genesys_types::ColorOrder;
use genesys_types::PixelFormat;
use genesys_types::ScanColorMode;
use genesys_types::ScanMethod;
use genesys_types::SensorKind;

bitflags::bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ScanFlags: u32 {
        const DISABLE_SHADING = 1 << 0;
        const DISABLE_GAMMA = 1 << 1;
        /// Stationary diagnostic capture; the motor stays unpowered.
        const SINGLE_LINE = 1 << 2;
        /// Move paper without producing data.
        const FEEDING = 1 << 3;
        const REVERSE = 1 << 4;
        /// Force the transparency-adapter lamp regardless of the method.
        const USE_XPA = 1 << 5;
        const IGNORE_LINE_DISTANCE = 1 << 6;
        const DISABLE_BUFFER_FULL_MOVE = 1 << 7;
        /// Keep the visible lamp off (infrared-only capture).
        const DISABLE_LAMP = 1 << 8;
    }
}

impl serde::Serialize for ScanFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> serde::Deserialize<'de> for ScanFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self::from_bits_retain(
            <u32 as serde::Deserialize>::deserialize(deserializer)?,
        ))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScanParams {
    pub xres: u32,
    pub yres: u32,
    pub startx: u32,
    pub starty: u32,
    /// Requested width at `xres`, before hardware rounding.
    pub pixels: u32,
    /// Exact width the host needs; 0 means "whatever the rounding yields".
    pub requested_pixels: u32,
    pub lines: u32,
    /// 1, 8 or 16 on entry; 1 normalizes to 8 during session computation.
    pub depth: u32,
    pub channels: u32,
    pub mode: ScanColorMode,
    pub method: ScanMethod,
    pub color_filter: ColorFilter,
    pub flags: ScanFlags,
}

impl ScanParams {
    pub fn deserialize_bincode(data: &[u8]) -> bincode::Result<ScanParams> {
        bincode::deserialize(data)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.depth != 8 && self.depth != 16 {
            return Err(Error::InvalidParameters("depth must be 8 or 16"));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(Error::InvalidParameters("channel count must be 1 or 3"));
        }
        if self.channels != self.mode.channels() {
            return Err(Error::InvalidParameters(
                "channel count does not match the color mode",
            ));
        }
        if self.xres == 0 || self.yres == 0 {
            return Err(Error::InvalidParameters("resolution must be non-zero"));
        }
        if self.pixels == 0 || self.lines == 0 {
            return Err(Error::InvalidParameters("scan area must be non-empty"));
        }
        Ok(())
    }
}

/// Everything the register programmer and the reassembly pipeline need,
/// derived once from a scan request. A session can only be obtained through
/// [`ScanSession::compute`], so partially initialized sessions are
/// unrepresentable; the struct is never mutated after computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    pub params: ScanParams,

    /// Hardware dpi selected in the dpi register set.
    pub register_dpi: u32,
    pub hwdpi_divisor: u32,
    pub ccd_size_divisor: u32,
    /// Sensor resolution after the size divisor.
    pub optical_resolution: u32,
    pub output_resolution: u32,

    /// Pixels the sensor captures per line, rounded up for burst transfers.
    pub optical_pixels: u32,
    /// Pixels the hardware emits per line; may exceed the request slightly.
    pub output_pixels: u32,
    /// Exact width the host asked for; the shrink stage resamples to it.
    pub requested_pixels: u32,

    pub num_staggered_lines: u32,
    pub color_shift_lines: [u32; 3],
    pub max_color_shift_lines: u32,
    /// Lines to over-scan so shift and stagger stages have history.
    pub output_line_count: u32,

    pub segment_count: u32,
    pub conseq_pixel_dist: u32,
    /// Pixels each segment contributes per line.
    pub segment_pixels: u32,

    pub pixel_startx: u32,
    pub pixel_endx: u32,

    /// Line stride as read from hardware (single channel for CIS).
    pub output_line_bytes_raw: usize,
    /// Line stride after channel merge, before shrink.
    pub output_line_bytes: usize,
    /// Line stride of the delivered image.
    pub final_line_bytes: usize,
    /// Total bytes the hardware will produce for the whole scan.
    pub total_bytes: u64,

    pub buffer_size_read: usize,
    pub buffer_size_shrink: usize,
    pub buffer_size_lines: usize,
    pub buffer_size_out: usize,

    pub needs_reorder: bool,
    pub needs_ccd_shift: bool,
    pub needs_shrink: bool,

    _computed: (),
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn round_up(value: u32, multiple: u32) -> u32 {
    ceil_div(value, multiple) * multiple
}

/// Smallest multiple of `stride` that holds `lines` lines and reaches the
/// family's transfer alignment optimum.
fn buffer_size(lines: usize, stride: usize, alignment: usize) -> usize {
    let minimum_lines = lines.max(if stride == 0 {
        0
    } else {
        (alignment + stride - 1) / stride
    });
    stride * minimum_lines.max(1)
}

impl ScanSession {
    pub fn compute(model: &Model, sensor: &Sensor, params: ScanParams) -> Result<Self, Error> {
        let mut params = params;
        if params.depth == 1 {
            // lineart is captured as gray and thresholded downstream
            params.depth = 8;
        }
        params.validate()?;
        let table = model.asic.table();

        let ccd_size_divisor = sensor.ccd_size_divisor_for(params.xres);
        let register_dpi = sensor.register_dpi_for(params.xres * ccd_size_divisor);
        let hwdpi_divisor = (sensor.optical_resolution / register_dpi).max(1);
        let optical_resolution = sensor.optical_resolution / ccd_size_divisor;
        let output_resolution = params.xres.min(optical_resolution);

        let alignment = 2 * ccd_size_divisor;
        let optical_pixels = round_up(
            ceil_div(params.pixels * optical_resolution, output_resolution),
            alignment,
        );
        let output_pixels = optical_pixels * output_resolution / optical_resolution;
        let requested_pixels = if params.requested_pixels != 0 {
            params.requested_pixels
        } else {
            output_pixels
        };

        let num_staggered_lines = if ccd_size_divisor == 1 {
            sensor
                .stagger
                .staggered_lines(params.xres, params.yres, model.motor.base_ydpi)
        } else {
            0
        };

        let color_shift_lines = if params.channels == 3
            && !params.flags.contains(ScanFlags::IGNORE_LINE_DISTANCE)
        {
            let scale = |lines: u32| (lines * params.yres) / model.motor.base_ydpi;
            [
                scale(model.ld_shift[0]),
                scale(model.ld_shift[1]),
                scale(model.ld_shift[2]),
            ]
        } else {
            [0; 3]
        };
        // unwrap: array is non-empty
        let max_color_shift_lines = *color_shift_lines.iter().max().unwrap();
        let output_line_count = params.lines + max_color_shift_lines + num_staggered_lines;

        let segment_count = sensor.segments.count_at(params.xres);
        let (conseq_pixel_dist, segment_pixels) = if segment_count > 1 {
            (
                sensor.segments.conseq_pixel_dist,
                optical_pixels / segment_count,
            )
        } else {
            (0, optical_pixels)
        };

        let startx_optical =
            sensor.dummy_pixels + params.startx * sensor.optical_resolution / params.xres;
        let (pixel_startx, pixel_endx) = match table.window {
            WindowAddressing::FullSensor => {
                (startx_optical, startx_optical + optical_pixels)
            }
            WindowAddressing::SizeDivided => {
                let mut start = startx_optical / ccd_size_divisor;
                if num_staggered_lines > 0 {
                    // staggered halves require even window parity
                    start &= !1;
                }
                (start, start + optical_pixels / ccd_size_divisor)
            }
            WindowAddressing::Segmented => {
                let start = startx_optical / segment_count;
                (start, start + optical_pixels / segment_count)
            }
        };

        let bytes_per_sample = (params.depth / 8) as usize;
        let hw_channels = if sensor.kind == SensorKind::Cis {
            1
        } else {
            params.channels
        };
        let output_line_bytes_raw = output_pixels as usize * hw_channels as usize * bytes_per_sample;
        let output_line_bytes = output_pixels as usize * params.channels as usize * bytes_per_sample;
        let final_line_bytes =
            requested_pixels as usize * params.channels as usize * bytes_per_sample;
        let hw_line_count = if sensor.kind == SensorKind::Cis {
            output_line_count * params.channels
        } else {
            output_line_count
        };
        let total_bytes = output_line_bytes_raw as u64 * hw_line_count as u64;

        let history_lines = (max_color_shift_lines + num_staggered_lines + 1) as usize;
        let buffer_size_read = buffer_size(8, output_line_bytes_raw, table.buffer_alignment);
        let buffer_size_shrink = buffer_size(8, output_line_bytes, table.buffer_alignment);
        let buffer_size_lines =
            buffer_size(history_lines, output_line_bytes, table.buffer_alignment);
        let buffer_size_out = buffer_size(8, final_line_bytes, table.buffer_alignment);

        let needs_reorder = segment_count > 1
            || sensor.color_order != ColorOrder::Rgb
            || (sensor.kind == SensorKind::Cis && params.channels == 3);
        let needs_ccd_shift = max_color_shift_lines > 0 || num_staggered_lines > 0;
        let needs_shrink = requested_pixels != output_pixels;

        Ok(Self {
            params,
            register_dpi,
            hwdpi_divisor,
            ccd_size_divisor,
            optical_resolution,
            output_resolution,
            optical_pixels,
            output_pixels,
            requested_pixels,
            num_staggered_lines,
            color_shift_lines,
            max_color_shift_lines,
            output_line_count,
            segment_count,
            conseq_pixel_dist,
            segment_pixels,
            pixel_startx,
            pixel_endx,
            output_line_bytes_raw,
            output_line_bytes,
            final_line_bytes,
            total_bytes,
            buffer_size_read,
            buffer_size_shrink,
            buffer_size_lines,
            buffer_size_out,
            needs_reorder,
            needs_ccd_shift,
            needs_shrink,
            _computed: (),
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat {
            channels: self.params.channels,
            depth: self.params.depth,
        }
    }
}
