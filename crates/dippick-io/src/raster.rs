//! Raster decoding and PNG encoding.

use std::path::Path;

use dippick_pipeline::{FloatImage, RgbImage, SampleFormat};
use image::{DynamicImage, ImageEncoder};

use crate::IoError;

/// Decode a single-channel raster file into `f32` samples.
///
/// 8- and 16-bit gray images are accepted; sample values are kept as
/// stored (no normalization), so the saturation threshold applies to raw
/// sensor counts.
///
/// # Errors
///
/// Returns [`IoError::Read`] if the file cannot be read,
/// [`IoError::Decode`] if it is not a supported image,
/// [`IoError::UnsupportedChannels`] for multi-channel images and
/// [`IoError::UnsupportedSampleType`] for other gray sample types.
pub fn decode_raster(path: &Path) -> Result<(FloatImage, SampleFormat), IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| IoError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = (decoded.width(), decoded.height());

    let (samples, format): (Vec<f32>, _) = match decoded {
        DynamicImage::ImageLuma8(buf) => (
            buf.into_raw().into_iter().map(f32::from).collect(),
            SampleFormat::GRAY8,
        ),
        DynamicImage::ImageLuma16(buf) => (
            buf.into_raw().into_iter().map(f32::from).collect(),
            SampleFormat::GRAY16,
        ),
        other => {
            let color = other.color();
            return Err(if color.channel_count() == 1 {
                IoError::UnsupportedSampleType {
                    path: path.to_path_buf(),
                    color: format!("{color:?}"),
                }
            } else {
                IoError::UnsupportedChannels {
                    path: path.to_path_buf(),
                    channels: color.channel_count(),
                }
            });
        }
    };

    log::debug!("decoded {} ({width}x{height}, {format:?})", path.display());
    // The sample count matches the decoder's dimensions by construction.
    FloatImage::from_raw(width, height, samples)
        .map(|image| (image, format))
        .ok_or_else(|| IoError::UnsupportedSampleType {
            path: path.to_path_buf(),
            color: "inconsistent buffer".to_string(),
        })
}

/// Encode a display buffer as PNG bytes.
///
/// # Errors
///
/// Returns [`IoError::PngEncode`] if encoding fails.
pub fn encode_display_png(image: &RgbImage) -> Result<Vec<u8>, IoError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(png_bytes)
}

/// Write a display buffer to `path` as PNG.
///
/// # Errors
///
/// Returns [`IoError::PngEncode`] or [`IoError::Write`].
pub fn write_display_png(path: &Path, image: &RgbImage) -> Result<(), IoError> {
    let bytes = encode_display_png(image)?;
    std::fs::write(path, bytes).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {}", path.display());
    Ok(())
}
