//! Loading a pyramid from octave raster files.
//!
//! A source is either a single octave-0 file, from which coarser octaves
//! are computed, or a pattern with one file per octave: `%d` or `{}` is
//! replaced by the octave number (`log_%d.tif` → `log_0.tif`,
//! `log_1.tif`, …).

use std::path::{Path, PathBuf};

use dippick_pipeline::pyramid::octave_count_for;
use dippick_pipeline::{Dimensions, MemoryPyramid, TileShape, TileSource, WindowSize};

use crate::IoError;
use crate::raster::decode_raster;

const PLACEHOLDERS: [&str; 2] = ["%d", "{}"];

/// File name of `octave` under `pattern`, or `None` if `pattern` has no
/// placeholder.
#[must_use]
pub fn octave_path(pattern: &str, octave: u32) -> Option<PathBuf> {
    PLACEHOLDERS
        .iter()
        .find(|p| pattern.contains(*p))
        .map(|p| PathBuf::from(pattern.replacen(p, &octave.to_string(), 1)))
}

/// Load a pyramid from `source`.
///
/// For a single file, `depth` octaves are built by 2×2 averaging; when
/// `depth` is `None`, octaves are added until the image fits a default
/// window height. For a pattern, octave files are read from 0 upwards
/// until one is missing or `depth` files have been read.
///
/// # Errors
///
/// Returns the decode errors of [`decode_raster`],
/// [`IoError::EmptyPattern`] if a pattern matches no octave-0 file, and
/// [`IoError::Pyramid`] if the octaves do not form a valid pyramid.
pub fn load_pyramid(
    source: &str,
    depth: Option<u32>,
    tile: TileShape,
) -> Result<MemoryPyramid, IoError> {
    let pyramid = if octave_path(source, 0).is_some() {
        load_pattern(source, depth, tile)?
    } else {
        let (base, format) = decode_raster(Path::new(source))?;
        let depth = depth.unwrap_or_else(|| {
            octave_count_for(
                Dimensions::new(base.width(), base.height()),
                WindowSize::DEFAULT_HEIGHT,
            )
        });
        MemoryPyramid::from_base(base, depth, format, tile)?
    };

    let descriptor = pyramid.descriptor();
    log::info!(
        "loaded {source}: {}x{} with {} octaves",
        descriptor.base().width,
        descriptor.base().height,
        descriptor.depth(),
    );
    Ok(pyramid)
}

fn load_pattern(
    pattern: &str,
    depth: Option<u32>,
    tile: TileShape,
) -> Result<MemoryPyramid, IoError> {
    let mut octaves = Vec::new();
    let mut format = None;
    for octave in 0..depth.unwrap_or(u32::MAX) {
        let Some(path) = octave_path(pattern, octave) else {
            break;
        };
        if !path.exists() {
            break;
        }
        let (image, octave_format) = decode_raster(&path)?;
        format.get_or_insert(octave_format);
        octaves.push(image);
    }
    let Some(format) = format else {
        return Err(IoError::EmptyPattern(pattern.to_string()));
    };
    Ok(MemoryPyramid::from_octaves(octaves, format, tile)?)
}
