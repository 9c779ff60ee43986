//! Multi-octave image pyramid: descriptor, tile decoding, and an
//! in-memory implementation.
//!
//! Octave 0 is the full-resolution borehole image. Each further octave
//! halves both axes, rounding up, so octave `k` has dimensions
//! `ceil(d0 / 2^k)`. Pixel data is only ever reached through
//! [`TileSource::decode_tile`], one fixed-size tile at a time; the
//! [`TiledPyramidCache`](crate::cache::TiledPyramidCache) decides which
//! tiles stay resident.
//!
//! File codecs live outside this crate. They implement [`TileSource`]
//! or hand decoded octave rasters to [`MemoryPyramid`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, FloatImage};

/// Errors raised while building or reading a pyramid.
///
/// Everything except [`OctaveOutOfRange`](Self::OctaveOutOfRange) and
/// [`TileDecode`](Self::TileDecode) is a startup-time configuration
/// error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PyramidError {
    /// The pyramid has no octaves.
    #[error("pyramid has no octaves")]
    Empty,

    /// Octave 0 has a zero-sized axis.
    #[error("pyramid base has zero size ({width}x{height})")]
    ZeroSized {
        /// Octave-0 width.
        width: u32,
        /// Octave-0 height.
        height: u32,
    },

    /// Only single-channel samples are supported.
    #[error("unsupported channel count {channels} (expected 1)")]
    UnsupportedChannels {
        /// Channel count found in the source.
        channels: u8,
    },

    /// The azimuth width differs from the one the caller was built for.
    #[error("expected an image of width {expected} (got {actual})")]
    UnexpectedWidth {
        /// Width the caller requires.
        expected: u32,
        /// Width of octave 0.
        actual: u32,
    },

    /// An octave does not have `ceil(d0 / 2^k)` dimensions.
    #[error(
        "octave {octave} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    OctaveDimensions {
        /// Offending octave.
        octave: u32,
        /// Expected width.
        expected_width: u32,
        /// Expected height.
        expected_height: u32,
        /// Actual width.
        actual_width: u32,
        /// Actual height.
        actual_height: u32,
    },

    /// The tile shape has a zero-sized axis.
    #[error("tile shape must be non-empty, got {width}x{height}")]
    EmptyTile {
        /// Tile width.
        width: u32,
        /// Tile height.
        height: u32,
    },

    /// The cache budget cannot hold even a single tile.
    #[error("cache budget of {budget_bytes} bytes cannot hold one {tile_bytes}-byte tile")]
    BudgetTooSmall {
        /// Configured budget.
        budget_bytes: usize,
        /// Size of the largest tile.
        tile_bytes: usize,
    },

    /// A sample or tile was requested from an octave the pyramid lacks.
    #[error("octave {octave} requested from a pyramid of depth {depth}")]
    OctaveOutOfRange {
        /// Requested octave.
        octave: u32,
        /// Number of octaves in the pyramid.
        depth: u32,
    },

    /// The tile key lies outside its octave.
    #[error("tile {0} lies outside its octave")]
    TileOutOfRange(TileKey),

    /// The backing storage failed to produce a tile.
    #[error("failed to decode tile {key}: {message}")]
    TileDecode {
        /// Tile that failed.
        key: TileKey,
        /// Codec error message.
        message: String,
    },
}

/// Storage format of the source samples.
///
/// Samples are always decoded to `f32`; the format is kept so callers
/// can reason about saturation and display ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFormat {
    /// Bits per sample (8, 16, 32).
    pub bits_per_sample: u16,
    /// Samples per pixel. Only 1 is supported.
    pub channels: u8,
}

impl SampleFormat {
    /// Single-channel 8-bit samples.
    pub const GRAY8: Self = Self {
        bits_per_sample: 8,
        channels: 1,
    };

    /// Single-channel 16-bit samples, the usual borehole imager output.
    pub const GRAY16: Self = Self {
        bits_per_sample: 16,
        channels: 1,
    };

    /// Single-channel 32-bit float samples.
    pub const GRAY32F: Self = Self {
        bits_per_sample: 32,
        channels: 1,
    };
}

/// Shape of the fixed-size tiles an octave is cut into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileShape {
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
}

impl TileShape {
    /// Create a tile shape.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Decoded size in bytes of a full tile.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.width as usize * self.height as usize * size_of::<f32>()
    }
}

impl Default for TileShape {
    fn default() -> Self {
        Self::new(256, 256)
    }
}

/// Identifies one tile: octave plus tile row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    /// Octave index (0 = full resolution).
    pub octave: u32,
    /// Tile row (depth direction).
    pub row: u32,
    /// Tile column (azimuth direction).
    pub col: u32,
}

impl TileKey {
    /// Create a tile key.
    #[must_use]
    pub const fn new(octave: u32, row: u32, col: u32) -> Self {
        Self { octave, row, col }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(octave {}, row {}, col {})", self.octave, self.row, self.col)
    }
}

/// Geometry and format of a pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyramidDescriptor {
    octaves: Vec<Dimensions>,
    format: SampleFormat,
    tile: TileShape,
}

impl PyramidDescriptor {
    /// Describe a pyramid with `depth` octaves derived from `base`.
    ///
    /// # Errors
    ///
    /// See [`from_octaves`](Self::from_octaves).
    pub fn new(
        base: Dimensions,
        depth: u32,
        format: SampleFormat,
        tile: TileShape,
    ) -> Result<Self, PyramidError> {
        let octaves = (0..depth).map(|k| base.at_octave(k)).collect();
        Self::from_octaves(octaves, format, tile)
    }

    /// Describe a pyramid from explicit per-octave dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::Empty`], [`PyramidError::ZeroSized`],
    /// [`PyramidError::UnsupportedChannels`], [`PyramidError::EmptyTile`]
    /// or [`PyramidError::OctaveDimensions`] when the description is
    /// malformed.
    pub fn from_octaves(
        octaves: Vec<Dimensions>,
        format: SampleFormat,
        tile: TileShape,
    ) -> Result<Self, PyramidError> {
        let Some(&base) = octaves.first() else {
            return Err(PyramidError::Empty);
        };
        if base.width == 0 || base.height == 0 {
            return Err(PyramidError::ZeroSized {
                width: base.width,
                height: base.height,
            });
        }
        if format.channels != 1 {
            return Err(PyramidError::UnsupportedChannels {
                channels: format.channels,
            });
        }
        if tile.width == 0 || tile.height == 0 {
            return Err(PyramidError::EmptyTile {
                width: tile.width,
                height: tile.height,
            });
        }
        for (octave, &actual) in (0_u32..).zip(&octaves) {
            let expected = base.at_octave(octave);
            if actual != expected {
                return Err(PyramidError::OctaveDimensions {
                    octave,
                    expected_width: expected.width,
                    expected_height: expected.height,
                    actual_width: actual.width,
                    actual_height: actual.height,
                });
            }
        }
        Ok(Self {
            octaves,
            format,
            tile,
        })
    }

    /// Number of octaves.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn depth(&self) -> u32 {
        self.octaves.len() as u32
    }

    /// Octave-0 dimensions.
    #[must_use]
    pub fn base(&self) -> Dimensions {
        self.octaves[0]
    }

    /// Dimensions of `octave`, if it exists.
    #[must_use]
    pub fn octave(&self, octave: u32) -> Option<Dimensions> {
        self.octaves.get(octave as usize).copied()
    }

    /// Sample format of the source.
    #[must_use]
    pub const fn format(&self) -> SampleFormat {
        self.format
    }

    /// Tile shape.
    #[must_use]
    pub const fn tile(&self) -> TileShape {
        self.tile
    }

    /// Fail unless octave 0 has the azimuth width the caller needs.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::UnexpectedWidth`] on mismatch.
    pub fn expect_width(&self, expected: u32) -> Result<(), PyramidError> {
        let actual = self.base().width;
        if actual == expected {
            Ok(())
        } else {
            Err(PyramidError::UnexpectedWidth { expected, actual })
        }
    }

    /// Pixel rectangle `(x0, y0, width, height)` covered by `key`.
    ///
    /// Edge tiles are clipped to the octave.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::OctaveOutOfRange`] or
    /// [`PyramidError::TileOutOfRange`] for keys outside the pyramid.
    pub fn tile_bounds(&self, key: TileKey) -> Result<(u32, u32, u32, u32), PyramidError> {
        let dims = self
            .octave(key.octave)
            .ok_or(PyramidError::OctaveOutOfRange {
                octave: key.octave,
                depth: self.depth(),
            })?;
        let x0 = u64::from(key.col) * u64::from(self.tile.width);
        let y0 = u64::from(key.row) * u64::from(self.tile.height);
        if x0 >= u64::from(dims.width) || y0 >= u64::from(dims.height) {
            return Err(PyramidError::TileOutOfRange(key));
        }
        #[allow(clippy::cast_possible_truncation)]
        let (x0, y0) = (x0 as u32, y0 as u32);
        let w = self.tile.width.min(dims.width - x0);
        let h = self.tile.height.min(dims.height - y0);
        Ok((x0, y0, w, h))
    }
}

/// Number of octaves needed until the depth axis fits in `min_height`
/// pixels (at least one octave).
#[must_use]
pub fn octave_count_for(base: Dimensions, min_height: u32) -> u32 {
    let mut depth = 1;
    let mut dims = base;
    while dims.height > min_height.max(1) {
        dims = dims.halved();
        depth += 1;
    }
    depth
}

/// Backing storage of a pyramid: decodes one tile at a time.
///
/// Implementations must be idempotent: decoding the same key twice
/// yields bit-identical samples.
pub trait TileSource {
    /// Geometry and format of the pyramid.
    fn descriptor(&self) -> &PyramidDescriptor;

    /// Decode the tile `key` into row-major `f32` samples.
    ///
    /// The returned vector has `w * h` samples where `(w, h)` comes from
    /// [`PyramidDescriptor::tile_bounds`].
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::OctaveOutOfRange`] or
    /// [`PyramidError::TileOutOfRange`] for invalid keys and
    /// [`PyramidError::TileDecode`] when the storage fails.
    fn decode_tile(&self, key: TileKey) -> Result<Vec<f32>, PyramidError>;
}

/// A pyramid whose octaves are fully decoded in memory.
///
/// Tiles are cut from the octave rasters on demand.
#[derive(Debug, Clone)]
pub struct MemoryPyramid {
    descriptor: PyramidDescriptor,
    octaves: Vec<FloatImage>,
}

impl MemoryPyramid {
    /// Build `depth` octaves from the octave-0 raster by 2×2 averaging.
    ///
    /// # Errors
    ///
    /// Returns the descriptor validation errors of
    /// [`PyramidDescriptor::from_octaves`].
    pub fn from_base(
        base: FloatImage,
        depth: u32,
        format: SampleFormat,
        tile: TileShape,
    ) -> Result<Self, PyramidError> {
        let mut octaves = Vec::with_capacity(depth.max(1) as usize);
        octaves.push(base);
        for _ in 1..depth {
            let next = octaves.last().map(downsample_2x);
            octaves.extend(next);
        }
        Self::from_octaves(octaves, format, tile)
    }

    /// Wrap pre-built octave rasters, validating their dimensions.
    ///
    /// # Errors
    ///
    /// Returns the descriptor validation errors of
    /// [`PyramidDescriptor::from_octaves`].
    pub fn from_octaves(
        octaves: Vec<FloatImage>,
        format: SampleFormat,
        tile: TileShape,
    ) -> Result<Self, PyramidError> {
        let dims = octaves
            .iter()
            .map(|o| Dimensions::new(o.width(), o.height()))
            .collect();
        let descriptor = PyramidDescriptor::from_octaves(dims, format, tile)?;
        Ok(Self {
            descriptor,
            octaves,
        })
    }

    /// The decoded raster of `octave`, if it exists.
    #[must_use]
    pub fn octave(&self, octave: u32) -> Option<&FloatImage> {
        self.octaves.get(octave as usize)
    }
}

impl TileSource for MemoryPyramid {
    fn descriptor(&self) -> &PyramidDescriptor {
        &self.descriptor
    }

    fn decode_tile(&self, key: TileKey) -> Result<Vec<f32>, PyramidError> {
        let (x0, y0, w, h) = self.descriptor.tile_bounds(key)?;
        let image = &self.octaves[key.octave as usize];
        let stride = image.width() as usize;
        let raw: &[f32] = image;
        let mut samples = Vec::with_capacity(w as usize * h as usize);
        for y in y0..y0 + h {
            let start = y as usize * stride + x0 as usize;
            samples.extend_from_slice(&raw[start..start + w as usize]);
        }
        Ok(samples)
    }
}

/// Halve both axes (rounding up) by averaging each 2×2 block's
/// in-bounds pixels.
#[must_use]
pub fn downsample_2x(image: &FloatImage) -> FloatImage {
    let (w, h) = (image.width(), image.height());
    let next = Dimensions::new(w, h).halved();
    FloatImage::from_fn(next.width, next.height, |x, y| {
        let mut sum = 0.0_f32;
        let mut count = 0.0_f32;
        for sy in (2 * y)..(2 * y + 2).min(h) {
            for sx in (2 * x)..(2 * x + 2).min(w) {
                sum += image.get_pixel(sx, sy).0[0];
                count += 1.0;
            }
        }
        image::Luma([sum / count])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn ramp(w: u32, h: u32) -> FloatImage {
        FloatImage::from_fn(w, h, |x, y| image::Luma([(y * w + x) as f32]))
    }

    #[test]
    fn descriptor_derives_octaves() {
        let d = PyramidDescriptor::new(
            Dimensions::new(361, 1000),
            4,
            SampleFormat::GRAY16,
            TileShape::default(),
        )
        .unwrap();
        assert_eq!(d.depth(), 4);
        assert_eq!(d.octave(1), Some(Dimensions::new(181, 500)));
        assert_eq!(d.octave(3), Some(Dimensions::new(46, 125)));
        assert_eq!(d.octave(4), None);
    }

    #[test]
    fn multichannel_format_is_fatal() {
        let result = PyramidDescriptor::new(
            Dimensions::new(361, 100),
            1,
            SampleFormat {
                bits_per_sample: 8,
                channels: 3,
            },
            TileShape::default(),
        );
        assert_eq!(
            result,
            Err(PyramidError::UnsupportedChannels { channels: 3 })
        );
    }

    #[test]
    fn wrong_octave_dimensions_are_fatal() {
        let result = PyramidDescriptor::from_octaves(
            vec![Dimensions::new(361, 100), Dimensions::new(180, 50)],
            SampleFormat::GRAY16,
            TileShape::default(),
        );
        assert!(matches!(
            result,
            Err(PyramidError::OctaveDimensions { octave: 1, .. })
        ));
    }

    #[test]
    fn empty_pyramid_is_fatal() {
        let result =
            PyramidDescriptor::from_octaves(vec![], SampleFormat::GRAY16, TileShape::default());
        assert_eq!(result, Err(PyramidError::Empty));
    }

    #[test]
    fn expect_width_reports_mismatch() {
        let d = PyramidDescriptor::new(
            Dimensions::new(360, 10),
            1,
            SampleFormat::GRAY16,
            TileShape::default(),
        )
        .unwrap();
        assert_eq!(
            d.expect_width(361),
            Err(PyramidError::UnexpectedWidth {
                expected: 361,
                actual: 360
            })
        );
    }

    #[test]
    fn edge_tiles_are_clipped() {
        let d = PyramidDescriptor::new(
            Dimensions::new(10, 7),
            1,
            SampleFormat::GRAY16,
            TileShape::new(4, 4),
        )
        .unwrap();
        assert_eq!(d.tile_bounds(TileKey::new(0, 1, 2)).unwrap(), (8, 4, 2, 3));
        assert_eq!(
            d.tile_bounds(TileKey::new(0, 2, 0)),
            Err(PyramidError::TileOutOfRange(TileKey::new(0, 2, 0)))
        );
    }

    #[test]
    fn downsample_averages_blocks() {
        let img = ramp(3, 3);
        let half = downsample_2x(&img);
        assert_eq!((half.width(), half.height()), (2, 2));
        // (0 + 1 + 3 + 4) / 4
        assert!((half.get_pixel(0, 0).0[0] - 2.0).abs() < 1e-6);
        // Right column has a single in-bounds column: (2 + 5) / 2
        assert!((half.get_pixel(1, 0).0[0] - 3.5).abs() < 1e-6);
        // Corner block is a single pixel.
        assert!((half.get_pixel(1, 1).0[0] - 8.0).abs() < 1e-6);
    }

    #[test]
    fn memory_pyramid_tile_matches_raster() {
        let pyramid =
            MemoryPyramid::from_base(ramp(10, 7), 2, SampleFormat::GRAY32F, TileShape::new(4, 4))
                .unwrap();
        let tile = pyramid.decode_tile(TileKey::new(0, 1, 1)).unwrap();
        assert_eq!(tile.len(), 12);
        // First sample is pixel (4, 4).
        assert!((tile[0] - 44.0).abs() < 1e-6);
        // Last sample is pixel (7, 6).
        assert!((tile[11] - 67.0).abs() < 1e-6);
    }

    #[test]
    fn octave_count_reaches_min_height() {
        assert_eq!(octave_count_for(Dimensions::new(361, 512), 512), 1);
        assert_eq!(octave_count_for(Dimensions::new(361, 513), 512), 2);
        assert_eq!(octave_count_for(Dimensions::new(361, 4096), 512), 4);
    }
}
