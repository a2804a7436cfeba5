use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;

/// Thumbnails fit inside a fixed bounding box and are always stored as JPEG.
pub const MAX_DIMENSION: u32 = 200;
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces a downscaled copy of `source` at `dest`. Aspect ratio is
/// preserved and images already inside the bounding box are not upscaled.
pub fn create_thumbnail(source: &Path, dest: &Path) -> Result<(), ThumbnailError> {
    let img = image::open(source)?;

    let (width, height) = img.dimensions();
    let thumbnail = if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
        img
    } else {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    };

    let file = File::create(dest)?;
    let mut writer = BufWriter::new(file);
    let mut encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    encoder.encode_image(&thumbnail.to_rgb8())?;

    Ok(())
}
