use genesys_drivers::calibration::ShadingData;
use genesys_drivers::pipeline::read_image;
use genesys_drivers::pipeline::ApplyShading;
use genesys_drivers::pipeline::BgrToRgb;
use genesys_drivers::pipeline::ColorShift;
use genesys_drivers::pipeline::Desegment;
use genesys_drivers::pipeline::Destagger;
use genesys_drivers::pipeline::EndianSwap16;
use genesys_drivers::pipeline::MergeMonoLines;
use genesys_drivers::pipeline::Rescale;
use genesys_drivers::pipeline::RowSource;
use genesys_drivers::pipeline::VecSource;
use genesys_drivers::types::ColorOrder;

fn collect(source: &mut dyn RowSource, lines: usize) -> Vec<Vec<u8>> {
    let image = read_image(source, lines).unwrap();
    image
        .chunks(source.row_bytes())
        .map(|row| row.to_vec())
        .collect()
}

#[test]
fn vec_source_serves_whole_rows_then_ends() {
    let mut source = VecSource::new(vec![1, 2, 3, 4, 5, 6, 7], 3);
    let mut row = [0u8; 3];
    assert!(source.next_row(&mut row).unwrap());
    assert_eq!(row, [1, 2, 3]);
    assert!(source.next_row(&mut row).unwrap());
    assert_eq!(row, [4, 5, 6]);
    // the trailing partial row is not served
    assert!(!source.next_row(&mut row).unwrap());
}

#[test]
fn desegment_restores_the_physical_pixel_order() {
    // two segments, four-pixel groups; segment 1's data arrives first in
    // each interleaved pair but belongs to the right half of the image
    let row = vec![
        b'A', b'A', b'A', b'A', // segment 0, group 0
        b'B', b'B', b'B', b'B', // segment 1, group 0
    ];
    let source = VecSource::new(row, 8);
    let mut stage = Desegment::new(source, 2, &[1, 0], 4, 1).unwrap();
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], b"BBBBAAAA");
}

#[test]
fn desegment_interleaves_multiple_groups_per_segment() {
    let row = vec![
        10, 11, // segment 0, group 0
        20, 21, // segment 1, group 0
        12, 13, // segment 0, group 1
        22, 23, // segment 1, group 1
    ];
    let source = VecSource::new(row, 8);
    let mut stage = Desegment::new(source, 2, &[0, 1], 2, 1).unwrap();
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![10, 11, 12, 13, 20, 21, 22, 23]);
}

#[test]
fn desegment_rejects_inconsistent_layouts() {
    assert!(Desegment::new(VecSource::new(vec![0; 8], 8), 2, &[0], 4, 1).is_err());
    assert!(Desegment::new(VecSource::new(vec![0; 8], 8), 2, &[0, 1], 0, 1).is_err());
}

#[test]
fn merge_mono_lines_interleaves_cis_passes() {
    // three monochrome passes (R, G, B) of a two-pixel row
    let data = vec![
        1, 2, // red pass
        3, 4, // green pass
        5, 6, // blue pass
    ];
    let source = VecSource::new(data, 2);
    let mut stage = MergeMonoLines::new(source, ColorOrder::Rgb, 1);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![1, 3, 5, 2, 4, 6]);
}

#[test]
fn merge_mono_lines_honors_bgr_arrival_order() {
    let data = vec![
        5, 6, // blue pass arrives first
        3, 4, // green
        1, 2, // red
    ];
    let source = VecSource::new(data, 2);
    let mut stage = MergeMonoLines::new(source, ColorOrder::Bgr, 1);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![1, 3, 5, 2, 4, 6]);
}

#[test]
fn bgr_rows_normalize_to_rgb() {
    let source = VecSource::new(vec![3, 2, 1, 6, 5, 4], 6);
    let mut stage = BgrToRgb::new(source, 1);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn bgr_swap_handles_16_bit_samples() {
    // one BGR pixel of little-endian 16-bit samples
    let source = VecSource::new(vec![0x00, 0x30, 0x00, 0x20, 0x00, 0x10], 6);
    let mut stage = BgrToRgb::new(source, 2);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![0x00, 0x10, 0x00, 0x20, 0x00, 0x30]);
}

#[test]
fn endian_swap_inverts_16_bit_samples() {
    let source = VecSource::new(vec![0x12, 0x34, 0x56, 0x78], 4);
    let mut stage = EndianSwap16::new(source);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![0x34, 0x12, 0x78, 0x56]);
}

#[test]
fn zero_color_shift_is_the_identity() {
    let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
    let source = VecSource::new(data.clone(), 6);
    let mut stage = ColorShift::new(source, [0, 0, 0], 1);
    let rows = collect(&mut stage, 2);
    assert_eq!(rows[0], data[..6]);
    assert_eq!(rows[1], data[6..]);
}

#[test]
fn color_shift_realigns_channels_across_lines() {
    // one pixel per row; channel value encodes (channel, line)
    let lines: Vec<u8> = (0..4)
        .flat_map(|line| vec![10 + line, 20 + line, 30 + line])
        .collect();
    let source = VecSource::new(lines, 3);
    // red arrives two lines early, green one line early
    let mut stage = ColorShift::new(source, [2, 1, 0], 1);
    let rows = collect(&mut stage, 2);
    // output line 0 reads red from input line 2, green from 1, blue from 0
    assert_eq!(rows[0], vec![12, 21, 30]);
    assert_eq!(rows[1], vec![13, 22, 31]);
}

#[test]
fn color_shift_ends_when_history_runs_out() {
    let source = VecSource::new(vec![0; 9], 3);
    let mut stage = ColorShift::new(source, [2, 1, 0], 1);
    // 3 input lines with a 2-line shift yield a single complete line
    assert_eq!(collect(&mut stage, 10).len(), 1);
}

#[test]
fn zero_stagger_is_the_identity() {
    let data = vec![1, 2, 3, 4, 5, 6, 7, 8];
    let source = VecSource::new(data.clone(), 4);
    let mut stage = Destagger::new(source, 0, 1);
    let rows = collect(&mut stage, 2);
    assert_eq!(rows[0], data[..4]);
    assert_eq!(rows[1], data[4..]);
}

#[test]
fn destagger_reinterleaves_the_sensor_halves() {
    // staggered capture of rows whose value encodes the source line: even
    // pixel columns carry line y, odd columns line y + 1
    let data = vec![
        0, 10, 0, 10, // line 0: even pixels of row 0, odd pixels of row 1
        1, 11, 1, 11, // line 1
        2, 12, 2, 12, // line 2
    ];
    let source = VecSource::new(data, 4);
    let mut stage = Destagger::new(source, 1, 1);
    let rows = collect(&mut stage, 2);
    // even columns come from the current line, odd from the next
    assert_eq!(rows[0], vec![0, 11, 0, 11]);
    assert_eq!(rows[1], vec![1, 12, 1, 12]);
}

#[test]
fn shading_stage_corrects_8_bit_rows() {
    let shading = ShadingData {
        pixels: 2,
        channels: 1,
        white_target: 0xff00,
        dark: vec![0, 0],
        white: vec![0x8000, 0x8000],
    };
    // half-scale white reference doubles the samples
    let source = VecSource::new(vec![0x20, 0x40], 2);
    let mut stage = ApplyShading::new(source, &shading, 8);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![0x3f, 0x7f]);
}

#[test]
fn shading_stage_corrects_16_bit_rows() {
    let shading = ShadingData {
        pixels: 1,
        channels: 1,
        white_target: 0xe000,
        dark: vec![0x1000],
        white: vec![0x9000],
    };
    let raw = 0x5000u16.to_le_bytes().to_vec();
    let source = VecSource::new(raw, 2);
    let mut stage = ApplyShading::new(source, &shading, 16);
    let rows = collect(&mut stage, 1);
    // (0x5000 - 0x1000) * 0xe000 / 0x8000 = 0x7000
    assert_eq!(rows[0], 0x7000u16.to_le_bytes().to_vec());
}

#[test]
fn rescale_drops_pixels_evenly() {
    let source = VecSource::new(vec![10, 20, 30, 40], 4);
    let mut stage = Rescale::new(source, 4, 2, 1);
    assert_eq!(stage.row_bytes(), 2);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![10, 30]);
}

#[test]
fn rescale_is_the_identity_at_equal_widths() {
    let source = VecSource::new(vec![1, 2, 3], 3);
    let mut stage = Rescale::new(source, 3, 3, 1);
    let rows = collect(&mut stage, 1);
    assert_eq!(rows[0], vec![1, 2, 3]);
}

#[test]
fn read_image_stops_at_the_end_of_the_stream() {
    let mut source = VecSource::new(vec![0; 10], 4);
    let image = read_image(&mut source, 5).unwrap();
    assert_eq!(image.len(), 8);
}

#[test]
fn stages_compose() {
    // segmented 16-bit capture: swap endianness, then reassemble segments
    let row: Vec<u8> = [0x0304u16, 0x0102, 0x0405, 0x0203]
        .iter()
        .flat_map(|sample| sample.to_be_bytes())
        .collect();
    let source = VecSource::new(row, 8);
    let swapped = EndianSwap16::new(source);
    let mut stage = Desegment::new(swapped, 2, &[1, 0], 1, 2).unwrap();
    let rows = collect(&mut stage, 1);
    let samples: Vec<u16> = rows[0]
        .chunks_exact(2)
        .map(|sample| u16::from_le_bytes([sample[0], sample[1]]))
        .collect();
    assert_eq!(samples, vec![0x0102, 0x0203, 0x0304, 0x0405]);
}

#[test]
fn pnm_dump_writes_a_readable_header_and_big_endian_samples() {
    let path = std::env::temp_dir().join("genesys-pipeline-dump-test.pnm");
    let data: Vec<u8> = [0x0102u16, 0xa0b0]
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    genesys_drivers::pipeline::write_pnm_file(&path, &data, 1, 16, 2, 1).unwrap();
    let written = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(&written[..13], b"P5\n2 1\n65535\n");
    assert_eq!(&written[13..], &[0x01, 0x02, 0xa0, 0xb0]);
}
