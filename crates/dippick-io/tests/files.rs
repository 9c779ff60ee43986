//! Round trips through real files under the cargo target tmpdir.
#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::path::PathBuf;

use dippick_io::{
    FileDumpSink, IoError, decode_raster, load_pyramid, octave_path, read_dump,
    write_display_png,
};
use dippick_pipeline::{
    DebugSink, DumpStage, FloatImage, RgbImage, SampleFormat, TileShape, TileSource,
};
use image::{ImageBuffer, Luma, Rgb};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn gray16(width: u32, height: u32) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    ImageBuffer::from_fn(width, height, |x, y| {
        Luma([u16::try_from(y * 100 + x).unwrap()])
    })
}

#[test]
fn sixteen_bit_png_keeps_raw_counts() {
    let dir = scratch_dir("gray16");
    let path = dir.join("log.png");
    gray16(8, 4).save(&path).unwrap();

    let (image, format) = decode_raster(&path).unwrap();
    assert_eq!(format, SampleFormat::GRAY16);
    assert_eq!(image.dimensions(), (8, 4));
    assert_eq!(image.get_pixel(3, 2).0[0], 203.0);
}

#[test]
fn single_file_builds_requested_octaves() {
    let dir = scratch_dir("single");
    let path = dir.join("log.png");
    gray16(16, 40).save(&path).unwrap();

    let pyramid = load_pyramid(path.to_str().unwrap(), Some(3), TileShape::new(8, 8)).unwrap();
    let descriptor = pyramid.descriptor();
    assert_eq!(descriptor.depth(), 3);
    assert_eq!(descriptor.octave(2).unwrap().height, 10);

    let auto = load_pyramid(path.to_str().unwrap(), None, TileShape::default()).unwrap();
    assert_eq!(auto.descriptor().depth(), 1);
}

#[test]
fn pattern_reads_one_file_per_octave() {
    let dir = scratch_dir("pattern");
    let pattern = dir.join("log_%d.png");
    let pattern = pattern.to_str().unwrap();
    gray16(16, 16).save(octave_path(pattern, 0).unwrap()).unwrap();
    gray16(8, 8).save(octave_path(pattern, 1).unwrap()).unwrap();

    let pyramid = load_pyramid(pattern, None, TileShape::new(8, 8)).unwrap();
    assert_eq!(pyramid.descriptor().depth(), 2);
    assert_eq!(pyramid.octave(1).unwrap().get_pixel(1, 1).0[0], 101.0);

    let capped = load_pyramid(pattern, Some(1), TileShape::new(8, 8)).unwrap();
    assert_eq!(capped.descriptor().depth(), 1);
}

#[test]
fn pattern_with_wrong_octave_size_is_rejected() {
    let dir = scratch_dir("bad_pattern");
    let pattern = dir.join("log_{}.png");
    let pattern = pattern.to_str().unwrap();
    gray16(16, 16).save(octave_path(pattern, 0).unwrap()).unwrap();
    gray16(5, 8).save(octave_path(pattern, 1).unwrap()).unwrap();

    let err = load_pyramid(pattern, None, TileShape::default()).unwrap_err();
    assert!(matches!(err, IoError::Pyramid(_)), "{err}");
}

#[test]
fn empty_pattern_and_missing_file_are_errors() {
    let dir = scratch_dir("missing");
    let pattern = dir.join("none_%d.png");
    assert!(matches!(
        load_pyramid(pattern.to_str().unwrap(), None, TileShape::default()),
        Err(IoError::EmptyPattern(_))
    ));
    let file = dir.join("none.png");
    assert!(matches!(
        load_pyramid(file.to_str().unwrap(), None, TileShape::default()),
        Err(IoError::Read { .. })
    ));
}

#[test]
fn color_images_are_rejected() {
    let dir = scratch_dir("color");
    let path = dir.join("rgb.png");
    ImageBuffer::from_pixel(4, 4, Rgb([1_u8, 2, 3])).save(&path).unwrap();
    assert!(matches!(
        decode_raster(&path),
        Err(IoError::UnsupportedChannels { channels: 3, .. })
    ));
}

#[test]
fn display_png_round_trips() {
    let dir = scratch_dir("display");
    let path = dir.join("display.png");
    let display = RgbImage::from_fn(6, 3, |x, _| Rgb([u8::try_from(x * 40).unwrap(), 0, 255]));
    write_display_png(&path, &display).unwrap();
    let back = image::open(&path).unwrap().to_rgb8();
    assert_eq!(back, display);
}

#[test]
fn dumps_are_written_and_read_back() {
    let dir = scratch_dir("dumps");
    let mut sink = FileDumpSink::new(dir.join("nested")).unwrap();
    let raster = FloatImage::from_raw(2, 2, vec![1.5, f32::NAN, -3.25, 0.1]).unwrap();
    sink.dump(DumpStage::Inpainted, &raster);

    assert_eq!(sink.written().to_vec(), vec![sink.path_for(DumpStage::Inpainted)]);
    let back = read_dump(&sink.path_for(DumpStage::Inpainted)).unwrap();
    assert_eq!((back.width, back.height, back.channels), (2, 2, 1));
    assert_eq!(back.samples[0], 1.5);
    assert!(back.samples[1].is_nan());
    assert_eq!(back.samples[3].to_bits(), 0.1_f32.to_bits());
}

#[test]
fn malformed_dump_is_rejected() {
    let dir = scratch_dir("bad_dump");
    let path = dir.join("bad.json");
    std::fs::write(
        &path,
        r#"{"width":2,"height":2,"channels":1,"samples":[1.0]}"#,
    )
    .unwrap();
    assert!(matches!(read_dump(&path), Err(IoError::Dump(_))));
    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(read_dump(&path), Err(IoError::Json { .. })));
}
