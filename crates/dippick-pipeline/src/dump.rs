//! Debug dumps of intermediate rasters.
//!
//! The pipeline hands each intermediate buffer to an optional
//! [`DebugSink`]. [`DebugRaster`] is the serializable form: invalid
//! samples become `null` and read back as NaN, finite samples round-trip
//! bit-exactly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::FloatImage;

/// Pipeline point at which a raster was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpStage {
    /// Strip straight from the cache, invalid cells as NaN.
    Strip,
    /// Strip after gap filling.
    Inpainted,
    /// Strip after pre-smoothing.
    Smoothed,
    /// Accumulator after voting, before post-smoothing.
    Accumulator,
}

impl DumpStage {
    /// Every stage in pipeline order.
    pub const ALL: [Self; 4] = [Self::Strip, Self::Inpainted, Self::Smoothed, Self::Accumulator];

    /// Short lowercase name, usable as a file stem.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Strip => "strip",
            Self::Inpainted => "inpainted",
            Self::Smoothed => "smoothed",
            Self::Accumulator => "accumulator",
        }
    }
}

impl fmt::Display for DumpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receiver of intermediate rasters.
///
/// Implementations must not fail the transform; report problems through
/// logging instead.
pub trait DebugSink {
    /// Called once per stage with the buffer as it stands at that point.
    fn dump(&mut self, stage: DumpStage, raster: &FloatImage);
}

/// Keeps every dump in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    /// Dumps in the order they were received.
    pub dumps: Vec<(DumpStage, DebugRaster)>,
}

impl CollectingSink {
    /// The last dump of `stage`, if any.
    #[must_use]
    pub fn get(&self, stage: DumpStage) -> Option<&DebugRaster> {
        self.dumps
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, raster)| raster)
    }
}

impl DebugSink for CollectingSink {
    fn dump(&mut self, stage: DumpStage, raster: &FloatImage) {
        self.dumps.push((stage, DebugRaster::from_image(raster)));
    }
}

/// A dumped raster does not describe a valid single-channel image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DumpError {
    /// Only single-channel rasters are produced by the pipeline.
    #[error("unsupported channel count {0}, expected 1")]
    UnsupportedChannels(u8),

    /// `samples.len()` disagrees with the stated shape.
    #[error("raster is {width}x{height}x{channels} but holds {actual} samples")]
    ShapeMismatch {
        /// Stated width.
        width: u32,
        /// Stated height.
        height: u32,
        /// Stated channel count.
        channels: u8,
        /// Samples present.
        actual: usize,
    },
}

/// Floating-point multi-channel raster in a serializable layout.
///
/// Samples are row-major with channels interleaved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugRaster {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Channels per pixel.
    pub channels: u8,
    /// `width * height * channels` samples.
    #[serde(with = "nan_as_null")]
    pub samples: Vec<f32>,
}

impl DebugRaster {
    /// Copy a single-channel raster.
    #[must_use]
    pub fn from_image(image: &FloatImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: 1,
            samples: image.as_raw().clone(),
        }
    }

    /// Check that the sample count matches the stated shape.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError::ShapeMismatch`] if it does not.
    pub fn validate(&self) -> Result<(), DumpError> {
        let expected =
            self.width as usize * self.height as usize * usize::from(self.channels);
        if self.samples.len() != expected {
            return Err(DumpError::ShapeMismatch {
                width: self.width,
                height: self.height,
                channels: self.channels,
                actual: self.samples.len(),
            });
        }
        Ok(())
    }

    /// Rebuild the single-channel raster.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError::UnsupportedChannels`] for multi-channel
    /// rasters and [`DumpError::ShapeMismatch`] for inconsistent shapes.
    pub fn to_image(&self) -> Result<FloatImage, DumpError> {
        if self.channels != 1 {
            return Err(DumpError::UnsupportedChannels(self.channels));
        }
        self.validate()?;
        FloatImage::from_raw(self.width, self.height, self.samples.clone()).ok_or(
            DumpError::ShapeMismatch {
                width: self.width,
                height: self.height,
                channels: self.channels,
                actual: self.samples.len(),
            },
        )
    }
}

/// Non-finite samples as JSON `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(samples: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(samples.iter().map(|v| v.is_finite().then_some(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let samples = Vec::<Option<f32>>::deserialize(deserializer)?;
        Ok(samples
            .into_iter()
            .map(|v| v.unwrap_or(f32::NAN))
            .collect())
    }
}
