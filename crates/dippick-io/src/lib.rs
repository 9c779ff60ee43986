//! dippick-io: filesystem boundary for the dippick pipeline.
//!
//! Decodes pyramid octave rasters (PNG, TIFF) into in-memory pyramids,
//! writes display buffers as PNG, and stores debug dumps as JSON. The
//! pipeline crate itself never touches the filesystem.

use std::path::PathBuf;

use dippick_pipeline::PyramidError;
use dippick_pipeline::dump::DumpError;

pub mod dump;
pub mod pyramid;
pub mod raster;

pub use dump::{FileDumpSink, read_dump};
pub use pyramid::{load_pyramid, octave_path};
pub use raster::{decode_raster, encode_display_png, write_display_png};

/// Errors that can occur at the filesystem boundary.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file or directory could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Image bytes could not be decoded.
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        /// File being decoded.
        path: PathBuf,
        /// Codec error.
        source: image::ImageError,
    },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(#[from] image::ImageError),

    /// The raster has more than one channel.
    #[error("{} has {channels} channels, expected 1", path.display())]
    UnsupportedChannels {
        /// Offending file.
        path: PathBuf,
        /// Channel count found.
        channels: u8,
    },

    /// The raster is single-channel but of a sample type we do not read.
    #[error("{} has unsupported sample type {color}", path.display())]
    UnsupportedSampleType {
        /// Offending file.
        path: PathBuf,
        /// Color type reported by the decoder.
        color: String,
    },

    /// An octave file pattern matched no file.
    #[error("no octave file found for pattern {0:?}")]
    EmptyPattern(String),

    /// A dump file is not valid JSON for a raster.
    #[error("invalid dump {}: {source}", path.display())]
    Json {
        /// Offending file.
        path: PathBuf,
        /// Parser error.
        source: serde_json::Error,
    },

    /// A dump file parsed but describes an inconsistent raster.
    #[error(transparent)]
    Dump(#[from] DumpError),

    /// The decoded octaves do not form a valid pyramid.
    #[error(transparent)]
    Pyramid(#[from] PyramidError),
}
