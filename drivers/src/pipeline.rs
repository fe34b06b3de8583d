use crate::calibration::ShadingData;
use crate::error::Error;
use crate::model::Model;
use crate::sensor::Sensor;
use crate::session::ScanFlags;
use crate::session::ScanSession;
use crate::transport::Transport;
use genesys_types::ColorOrder;
use genesys_types::SensorKind;

/// A pull-based row transform. Stages are deterministic and restartable:
/// the same input rows always produce the same output rows, and no stage
/// keeps state beyond its own history window.
pub trait RowSource {
    fn row_bytes(&self) -> usize;

    /// Fills `out` (exactly `row_bytes` long) with the next row. Returns
    /// `false` once the stream is exhausted.
    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error>;
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn row_bytes(&self) -> usize {
        (**self).row_bytes()
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        (**self).next_row(out)
    }
}

/// Drains `lines` rows into a contiguous buffer; stops early if the stream
/// ends first.
pub fn read_image(source: &mut dyn RowSource, lines: usize) -> Result<Vec<u8>, Error> {
    let stride = source.row_bytes();
    let mut image = vec![0u8; stride * lines];
    let mut produced = 0;
    for line in 0..lines {
        if !source.next_row(&mut image[line * stride..(line + 1) * stride])? {
            break;
        }
        produced += 1;
    }
    image.truncate(produced * stride);
    Ok(image)
}

/// Feeds rows from an in-memory buffer; the entry point for tests and for
/// strip searches that re-analyze a captured image.
pub struct VecSource {
    data: Vec<u8>,
    row_bytes: usize,
    offset: usize,
}

impl VecSource {
    pub fn new(data: Vec<u8>, row_bytes: usize) -> Self {
        Self {
            data,
            row_bytes,
            offset: 0,
        }
    }
}

impl RowSource for VecSource {
    fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        if self.offset + self.row_bytes > self.data.len() {
            return Ok(false);
        }
        out.copy_from_slice(&self.data[self.offset..self.offset + self.row_bytes]);
        self.offset += self.row_bytes;
        Ok(true)
    }
}

/// Pulls fixed-size chunks from the hardware bulk-read endpoint and serves
/// them row by row, tracking how many bytes the session still owes.
pub struct TransportSource<'a, T: Transport> {
    transport: &'a mut T,
    row_bytes: usize,
    chunk: Vec<u8>,
    filled: usize,
    consumed: usize,
    remaining: u64,
}

impl<'a, T: Transport> TransportSource<'a, T> {
    pub fn new(transport: &'a mut T, session: &ScanSession) -> Self {
        Self {
            transport,
            row_bytes: session.output_line_bytes_raw,
            chunk: vec![0u8; session.buffer_size_read],
            filled: 0,
            consumed: 0,
            remaining: session.total_bytes,
        }
    }

    fn refill(&mut self) -> Result<(), Error> {
        let wanted = (self.chunk.len() as u64).min(self.remaining) as usize;
        let mut filled = 0;
        while filled < wanted {
            let read = self.transport.read_data(&mut self.chunk[filled..wanted])?;
            if read == 0 {
                return Err(Error::Timeout("scan data from the bulk endpoint"));
            }
            filled += read;
        }
        self.filled = filled;
        self.consumed = 0;
        self.remaining -= filled as u64;
        Ok(())
    }
}

impl<'a, T: Transport> RowSource for TransportSource<'a, T> {
    fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        let mut written = 0;
        while written < self.row_bytes {
            if self.consumed == self.filled {
                if self.remaining == 0 {
                    return Ok(false);
                }
                self.refill()?;
            }
            let available = (self.filled - self.consumed).min(self.row_bytes - written);
            out[written..written + available]
                .copy_from_slice(&self.chunk[self.consumed..self.consumed + available]);
            self.consumed += available;
            written += available;
        }
        Ok(true)
    }
}

/// Swaps the byte order of 16-bit samples for models whose raw wire format
/// is inverted relative to the host.
pub struct EndianSwap16<S: RowSource> {
    source: S,
}

impl<S: RowSource> EndianSwap16<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: RowSource> RowSource for EndianSwap16<S> {
    fn row_bytes(&self) -> usize {
        self.source.row_bytes()
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        if !self.source.next_row(out)? {
            return Ok(false);
        }
        for pair in out.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
        Ok(true)
    }
}

/// Reassembles a row from a multi-segment sensor. The wire carries the
/// segments' contributions interleaved in groups of `conseq_pixel_dist`
/// pixels; `order` maps output slots to source segments.
pub struct Desegment<S: RowSource> {
    source: S,
    segment_count: usize,
    order: Vec<usize>,
    group_bytes: usize,
    row: Vec<u8>,
}

impl<S: RowSource> Desegment<S> {
    pub fn new(
        source: S,
        segment_count: usize,
        order: &[u32],
        conseq_pixel_dist: usize,
        bytes_per_pixel: usize,
    ) -> Result<Self, Error> {
        if order.len() != segment_count || segment_count == 0 || conseq_pixel_dist == 0 {
            return Err(Error::Contract("segment layout is inconsistent"));
        }
        if (0..segment_count).any(|segment| !order.contains(&(segment as u32))) {
            return Err(Error::Contract("segment order is not a permutation"));
        }
        let row = vec![0u8; source.row_bytes()];
        Ok(Self {
            source,
            segment_count,
            order: order.iter().map(|segment| *segment as usize).collect(),
            group_bytes: conseq_pixel_dist * bytes_per_pixel,
            row,
        })
    }
}

impl<S: RowSource> RowSource for Desegment<S> {
    fn row_bytes(&self) -> usize {
        self.source.row_bytes()
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        if !self.source.next_row(&mut self.row)? {
            return Ok(false);
        }
        let groups = self.row.len() / self.group_bytes;
        let groups_per_segment = groups / self.segment_count;
        for group in 0..groups {
            let segment = group % self.segment_count;
            let pass = group / self.segment_count;
            // unwrap: order is a permutation of 0..segment_count
            let slot = self
                .order
                .iter()
                .position(|source| *source == segment)
                .unwrap();
            let out_group = slot * groups_per_segment + pass;
            out[out_group * self.group_bytes..(out_group + 1) * self.group_bytes]
                .copy_from_slice(&self.row[group * self.group_bytes..(group + 1) * self.group_bytes]);
        }
        // pass through any tail bytes that do not form a full group
        let tail = groups * self.group_bytes;
        out[tail..].copy_from_slice(&self.row[tail..]);
        Ok(true)
    }
}

/// Merges the three consecutive monochrome passes of a CIS sensor into one
/// interleaved RGB row, honoring the order the sensor emits them in.
pub struct MergeMonoLines<S: RowSource> {
    source: S,
    bytes_per_sample: usize,
    /// channel index of each incoming line, in arrival order
    line_channels: [usize; 3],
    lines: [Vec<u8>; 3],
}

impl<S: RowSource> MergeMonoLines<S> {
    pub fn new(source: S, color_order: ColorOrder, bytes_per_sample: usize) -> Self {
        let line = vec![0u8; source.row_bytes()];
        Self {
            source,
            bytes_per_sample,
            line_channels: match color_order {
                ColorOrder::Rgb => [0, 1, 2],
                ColorOrder::Bgr => [2, 1, 0],
            },
            lines: [line.clone(), line.clone(), line],
        }
    }
}

impl<S: RowSource> RowSource for MergeMonoLines<S> {
    fn row_bytes(&self) -> usize {
        self.source.row_bytes() * 3
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        for line in 0..3 {
            let buffer = &mut self.lines[line];
            if !self.source.next_row(buffer)? {
                return Ok(false);
            }
        }
        let pixels = self.source.row_bytes() / self.bytes_per_sample;
        for (line, channel) in self.line_channels.into_iter().enumerate() {
            for pixel in 0..pixels {
                let src = pixel * self.bytes_per_sample;
                let dst = (pixel * 3 + channel) * self.bytes_per_sample;
                out[dst..dst + self.bytes_per_sample]
                    .copy_from_slice(&self.lines[line][src..src + self.bytes_per_sample]);
            }
        }
        Ok(true)
    }
}

/// Normalizes BGR-interleaved rows to RGB.
pub struct BgrToRgb<S: RowSource> {
    source: S,
    bytes_per_sample: usize,
}

impl<S: RowSource> BgrToRgb<S> {
    pub fn new(source: S, bytes_per_sample: usize) -> Self {
        Self {
            source,
            bytes_per_sample,
        }
    }
}

impl<S: RowSource> RowSource for BgrToRgb<S> {
    fn row_bytes(&self) -> usize {
        self.source.row_bytes()
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        if !self.source.next_row(out)? {
            return Ok(false);
        }
        let pixel_bytes = 3 * self.bytes_per_sample;
        for pixel in out.chunks_exact_mut(pixel_bytes) {
            for byte in 0..self.bytes_per_sample {
                pixel.swap(byte, 2 * self.bytes_per_sample + byte);
            }
        }
        Ok(true)
    }
}

/// Compensates the physical line distance between the R/G/B sensor rows:
/// output row `y` takes channel `c` from input row `y + shift[c]`. A zero
/// shift is the identity.
pub struct ColorShift<S: RowSource> {
    source: S,
    shift: [usize; 3],
    max_shift: usize,
    bytes_per_sample: usize,
    history: std::collections::VecDeque<Vec<u8>>,
}

impl<S: RowSource> ColorShift<S> {
    pub fn new(source: S, shift: [u32; 3], bytes_per_sample: usize) -> Self {
        let shift = shift.map(|lines| lines as usize);
        // unwrap: array is non-empty
        let max_shift = *shift.iter().max().unwrap();
        Self {
            source,
            shift,
            max_shift,
            bytes_per_sample,
            history: std::collections::VecDeque::new(),
        }
    }
}

impl<S: RowSource> RowSource for ColorShift<S> {
    fn row_bytes(&self) -> usize {
        self.source.row_bytes()
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        while self.history.len() <= self.max_shift {
            let mut row = vec![0u8; self.source.row_bytes()];
            if !self.source.next_row(&mut row)? {
                return Ok(false);
            }
            self.history.push_back(row);
        }
        let pixels = self.source.row_bytes() / (3 * self.bytes_per_sample);
        for channel in 0..3 {
            let row = &self.history[self.shift[channel]];
            for pixel in 0..pixels {
                let offset = (pixel * 3 + channel) * self.bytes_per_sample;
                out[offset..offset + self.bytes_per_sample]
                    .copy_from_slice(&row[offset..offset + self.bytes_per_sample]);
            }
        }
        self.history.pop_front();
        Ok(true)
    }
}

/// Re-interleaves the two half-pixel-offset sensor halves: even pixel
/// columns come from the current row, odd columns from the row `shift`
/// lines later. A zero shift is the identity.
pub struct Destagger<S: RowSource> {
    source: S,
    shift: usize,
    pixel_bytes: usize,
    history: std::collections::VecDeque<Vec<u8>>,
}

impl<S: RowSource> Destagger<S> {
    pub fn new(source: S, shift: u32, pixel_bytes: usize) -> Self {
        Self {
            source,
            shift: shift as usize,
            pixel_bytes,
            history: std::collections::VecDeque::new(),
        }
    }
}

impl<S: RowSource> RowSource for Destagger<S> {
    fn row_bytes(&self) -> usize {
        self.source.row_bytes()
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        while self.history.len() <= self.shift {
            let mut row = vec![0u8; self.source.row_bytes()];
            if !self.source.next_row(&mut row)? {
                return Ok(false);
            }
            self.history.push_back(row);
        }
        let near = &self.history[0];
        let far = &self.history[self.shift];
        let pixels = self.source.row_bytes() / self.pixel_bytes;
        for pixel in 0..pixels {
            let offset = pixel * self.pixel_bytes;
            let row = if pixel % 2 == 0 { near } else { far };
            out[offset..offset + self.pixel_bytes]
                .copy_from_slice(&row[offset..offset + self.pixel_bytes]);
        }
        self.history.pop_front();
        Ok(true)
    }
}

/// Applies the captured dark/white references as a per-pixel linear
/// correction, for configurations whose hardware shading engine cannot
/// address the window.
pub struct ApplyShading<'a, S: RowSource> {
    source: S,
    shading: &'a ShadingData,
    depth: u32,
}

impl<'a, S: RowSource> ApplyShading<'a, S> {
    pub fn new(source: S, shading: &'a ShadingData, depth: u32) -> Self {
        Self {
            source,
            shading,
            depth,
        }
    }
}

impl<'a, S: RowSource> RowSource for ApplyShading<'a, S> {
    fn row_bytes(&self) -> usize {
        self.source.row_bytes()
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        if !self.source.next_row(out)? {
            return Ok(false);
        }
        if self.depth == 16 {
            for (index, sample) in out.chunks_exact_mut(2).enumerate() {
                // unwrap: chunk has exactly two bytes
                let raw = u16::from_le_bytes(sample.try_into().unwrap());
                sample.copy_from_slice(&self.shading.correct(index, raw).to_le_bytes());
            }
        } else {
            for (index, sample) in out.iter_mut().enumerate() {
                let corrected = self.shading.correct(index, (*sample as u16) << 8);
                *sample = (corrected >> 8) as u8;
            }
        }
        Ok(true)
    }
}

/// Resamples rows to the exact width the caller asked for, compensating the
/// optical/output pixel rounding of the session compiler.
pub struct Rescale<S: RowSource> {
    source: S,
    pixels_in: usize,
    pixels_out: usize,
    pixel_bytes: usize,
    row: Vec<u8>,
}

impl<S: RowSource> Rescale<S> {
    pub fn new(source: S, pixels_in: usize, pixels_out: usize, pixel_bytes: usize) -> Self {
        let row = vec![0u8; source.row_bytes()];
        Self {
            source,
            pixels_in,
            pixels_out,
            pixel_bytes,
            row,
        }
    }
}

impl<S: RowSource> RowSource for Rescale<S> {
    fn row_bytes(&self) -> usize {
        self.pixels_out * self.pixel_bytes
    }

    fn next_row(&mut self, out: &mut [u8]) -> Result<bool, Error> {
        if !self.source.next_row(&mut self.row)? {
            return Ok(false);
        }
        for pixel in 0..self.pixels_out {
            let src_pixel = pixel * self.pixels_in / self.pixels_out;
            let src = src_pixel * self.pixel_bytes;
            let dst = pixel * self.pixel_bytes;
            out[dst..dst + self.pixel_bytes]
                .copy_from_slice(&self.row[src..src + self.pixel_bytes]);
        }
        Ok(true)
    }
}

/// Composes the stages a session needs, in hardware-to-host order.
pub fn build_pipeline<'a>(
    model: &Model,
    sensor: &Sensor,
    session: &ScanSession,
    shading: Option<&'a ShadingData>,
    source: Box<dyn RowSource + 'a>,
) -> Result<Box<dyn RowSource + 'a>, Error> {
    let format = session.pixel_format();
    let bytes_per_sample = (format.depth / 8) as usize;
    let pixel_bytes = format.bytes_per_pixel();
    let mut stage: Box<dyn RowSource + 'a> = source;

    if format.depth == 16 && model.swap_16bit_data {
        stage = Box::new(EndianSwap16::new(stage));
    }
    if session.segment_count > 1 {
        stage = Box::new(Desegment::new(
            stage,
            session.segment_count as usize,
            sensor.segments.order,
            session.conseq_pixel_dist as usize,
            bytes_per_sample,
        )?);
    }
    if sensor.kind == SensorKind::Cis && session.params.channels == 3 {
        stage = Box::new(MergeMonoLines::new(
            stage,
            sensor.color_order,
            bytes_per_sample,
        ));
    } else if sensor.color_order == ColorOrder::Bgr && session.params.channels == 3 {
        stage = Box::new(BgrToRgb::new(stage, bytes_per_sample));
    }
    if session.params.channels == 3 && session.max_color_shift_lines > 0 {
        stage = Box::new(ColorShift::new(
            stage,
            session.color_shift_lines,
            bytes_per_sample,
        ));
    }
    if session.num_staggered_lines > 0 {
        stage = Box::new(Destagger::new(
            stage,
            session.num_staggered_lines,
            pixel_bytes,
        ));
    }
    if let Some(shading) = shading {
        if model.use_host_side_calib
            && !session.params.flags.contains(ScanFlags::DISABLE_SHADING)
        {
            stage = Box::new(ApplyShading::new(stage, shading, session.params.depth));
        }
    }
    if session.needs_shrink {
        stage = Box::new(Rescale::new(
            stage,
            session.output_pixels as usize,
            session.requested_pixels as usize,
            pixel_bytes,
        ));
    }
    Ok(stage)
}

/// Debug dump in PNM format, the traditional inspection point for raw and
/// intermediate scanner data.
pub fn write_pnm_file(
    path: &std::path::Path,
    data: &[u8],
    channels: u32,
    depth: u32,
    width: usize,
    height: usize,
) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let magic = if channels == 3 { "P6" } else { "P5" };
    let maximum = if depth == 16 { 65535 } else { 255 };
    writeln!(file, "{}\n{} {}\n{}", magic, width, height, maximum)?;
    if depth == 16 {
        // PNM is big-endian
        for sample in data.chunks_exact(2) {
            file.write_all(&[sample[1], sample[0]])?;
        }
    } else {
        file.write_all(data)?;
    }
    Ok(())
}
