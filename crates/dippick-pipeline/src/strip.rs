//! Sampling a window of the pyramid into a strip.

use serde::{Deserialize, Serialize};

use crate::cache::TiledPyramidCache;
use crate::pyramid::{PyramidError, TileSource};
use crate::types::{FloatImage, INVALID_SAMPLE, SATURATION_THRESHOLD, WindowSize};
use crate::viewport::ViewportState;

/// A window of samples plus which of them were invalid when sampled.
///
/// `invalid` is row-major with the same layout as `samples`. Invalid
/// cells hold [`INVALID_SAMPLE`] right after sampling; later stages may
/// overwrite them (inpainting) but the mask keeps the original verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Strip {
    /// Sample values, one per display cell.
    pub samples: FloatImage,
    /// `true` where the sample was out of range or saturated.
    pub invalid: Vec<bool>,
}

impl Strip {
    /// An all-invalid strip of the given size.
    #[must_use]
    pub fn new(window: WindowSize) -> Self {
        let cells = window.strip_width as usize * window.height as usize;
        Self {
            samples: FloatImage::from_pixel(
                window.strip_width,
                window.height,
                image::Luma([INVALID_SAMPLE]),
            ),
            invalid: vec![true; cells],
        }
    }

    /// Window size of the strip.
    #[must_use]
    pub fn window(&self) -> WindowSize {
        WindowSize::new(self.samples.width(), self.samples.height())
    }

    /// Reallocate if the window size changed. Contents are unspecified
    /// afterwards.
    pub fn resize(&mut self, window: WindowSize) {
        if self.window() != window {
            *self = Self::new(window);
        }
    }

    /// Number of invalid cells.
    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.invalid.iter().filter(|i| **i).count()
    }
}

/// Why samples of one strip were rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripStats {
    /// Cells whose depth fell outside the pyramid.
    pub out_of_range: usize,
    /// Cells whose raw value exceeded [`SATURATION_THRESHOLD`].
    pub saturated: usize,
}

impl StripStats {
    /// Total invalid cells.
    #[must_use]
    pub const fn invalid(self) -> usize {
        self.out_of_range + self.saturated
    }
}

/// Whether a raw sample is usable.
#[must_use]
pub fn is_valid_sample(value: f32) -> bool {
    value.is_finite() && value <= SATURATION_THRESHOLD
}

/// Fill `strip` with the samples under `viewport`, keeping its size.
///
/// Display cell `(i, j)` samples the image at `viewport.to_image(i, j)`
/// from octave `viewport.octave()`.
///
/// # Errors
///
/// Returns [`PyramidError::OctaveOutOfRange`] if the viewport's octave
/// is not in the pyramid, or a tile decode error.
pub fn sample_strip_into<S: TileSource>(
    cache: &mut TiledPyramidCache<S>,
    viewport: &ViewportState,
    strip: &mut Strip,
) -> Result<StripStats, PyramidError> {
    let octave = viewport.octave();
    let width = strip.samples.width() as usize;
    let mut stats = StripStats::default();

    for (index, (value, invalid)) in strip
        .samples
        .iter_mut()
        .zip(strip.invalid.iter_mut())
        .enumerate()
    {
        #[allow(clippy::cast_precision_loss)]
        let (dx, dy) = ((index % width) as f64, (index / width) as f64);
        let (ix, iy) = viewport.to_image(dx, dy);
        let raw = cache.sample(octave, ix, iy)?;
        if raw.is_nan() {
            stats.out_of_range += 1;
        } else if !is_valid_sample(raw) {
            stats.saturated += 1;
        }
        *invalid = !is_valid_sample(raw);
        *value = if *invalid { INVALID_SAMPLE } else { raw };
    }

    Ok(stats)
}

/// Sample a fresh strip of size `window`.
///
/// # Errors
///
/// See [`sample_strip_into`].
pub fn sample_strip<S: TileSource>(
    cache: &mut TiledPyramidCache<S>,
    viewport: &ViewportState,
    window: WindowSize,
) -> Result<Strip, PyramidError> {
    let mut strip = Strip::new(window);
    sample_strip_into(cache, viewport, &mut strip)?;
    Ok(strip)
}
