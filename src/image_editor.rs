//! Orientation normalization for uploaded images.
//!
//! The stored copy must display upright in any viewer: the pixels are
//! physically rotated according to the EXIF orientation tag and the tag is
//! reset to 1 before the metadata block is re-embedded, so downstream
//! consumers never double-rotate.

use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use exif::{Field, In, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};

const FULL_JPEG_QUALITY: u8 = 95;

#[derive(Debug, thiserror::Error)]
pub enum ImageEditError {
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("EXIF error: {0}")]
    Exif(String),
}

/// Rewrites the image at `path` so it displays upright.
///
/// Orientation tags 3, 6 and 8 trigger a 180, 90 and 270 degree clockwise
/// rotation respectively; every other value (and a missing tag) leaves the
/// pixels untouched. When an EXIF block exists it is carried over with the
/// orientation tag forced to 1.
///
/// On any error the file on disk keeps its original bytes; callers treat the
/// failure as non-fatal and proceed with the unrotated image.
pub fn normalize_orientation(path: &Path) -> Result<(), ImageEditError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let exif_fields = read_exif_fields(path);
    let orientation = exif_fields.as_deref().and_then(orientation_from_fields);

    let img = image::open(path)?;
    let rotated = apply_orientation(img, orientation);

    // Write to a sibling temp file first so a mid-write failure cannot
    // corrupt the stored upload.
    let temp_path = path.with_extension(format!("tmp.{}", extension));
    if let Err(e) = save_full_size(&rotated, &temp_path, &extension) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Some(fields) = exif_fields {
        if let Err(e) = embed_exif_with_reset(&temp_path, &extension, &fields) {
            let _ = fs::remove_file(&temp_path);
            return Err(ImageEditError::Exif(e));
        }
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        ImageEditError::Io(e)
    })?;

    Ok(())
}

fn apply_orientation(img: DynamicImage, orientation: Option<u16>) -> DynamicImage {
    match orientation {
        Some(3) => img.rotate180(),
        Some(6) => img.rotate90(),
        Some(8) => img.rotate270(),
        _ => img,
    }
}

fn orientation_from_fields(fields: &[Field]) -> Option<u16> {
    fields
        .iter()
        .find(|f| f.tag == Tag::Orientation && f.ifd_num == In::PRIMARY)
        .and_then(|f| match f.value {
            Value::Short(ref v) => v.first().copied(),
            _ => None,
        })
}

/// Reads the full EXIF field list, or None when the file carries no parseable
/// metadata block.
fn read_exif_fields(path: &Path) -> Option<Vec<Field>> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(&file);
    let exif = exif::Reader::new().read_from_container(&mut bufreader).ok()?;

    let fields = exif
        .fields()
        .map(|field| Field {
            tag: field.tag,
            ifd_num: field.ifd_num,
            value: field.value.clone(),
        })
        .collect();
    Some(fields)
}

fn save_full_size(
    img: &DynamicImage,
    path: &Path,
    extension: &str,
) -> Result<(), ImageEditError> {
    match extension {
        "jpg" | "jpeg" => {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, FULL_JPEG_QUALITY);
            encoder.encode_image(&img.to_rgb8())?;
        }
        _ => img.save(path)?,
    }
    Ok(())
}

/// Re-embeds the EXIF block with the orientation tag forced to 1. Formats
/// other than JPEG and PNG have no writable segment here and are skipped.
fn embed_exif_with_reset(path: &Path, extension: &str, fields: &[Field]) -> Result<(), String> {
    if !["jpg", "jpeg", "png"].contains(&extension) {
        return Ok(());
    }

    let mut new_fields: Vec<Field> = fields
        .iter()
        .filter(|f| f.tag != Tag::Orientation)
        .map(|f| Field {
            tag: f.tag,
            ifd_num: f.ifd_num,
            value: f.value.clone(),
        })
        .collect();
    new_fields.push(Field {
        tag: Tag::Orientation,
        ifd_num: In::PRIMARY,
        value: Value::Short(vec![1]),
    });

    let mut exif_buffer = std::io::Cursor::new(Vec::new());
    let mut writer = exif::experimental::Writer::new();
    for field in &new_fields {
        writer.push_field(field);
    }
    writer
        .write(&mut exif_buffer, false)
        .map_err(|e| format!("Failed to generate EXIF data: {}", e))?;

    let exif_bytes = Bytes::from(exif_buffer.into_inner());

    match extension {
        "jpg" | "jpeg" => {
            let image_bytes =
                fs::read(path).map_err(|e| format!("Failed to read JPEG: {}", e))?;
            let mut jpeg = Jpeg::from_bytes(image_bytes.into())
                .map_err(|e| format!("Failed to parse JPEG: {}", e))?;
            jpeg.set_exif(Some(exif_bytes));
            fs::write(path, jpeg.encoder().bytes())
                .map_err(|e| format!("Failed to write JPEG: {}", e))?;
        }
        "png" => {
            let image_bytes =
                fs::read(path).map_err(|e| format!("Failed to read PNG: {}", e))?;
            let mut png = Png::from_bytes(image_bytes.into())
                .map_err(|e| format!("Failed to parse PNG: {}", e))?;
            png.set_exif(Some(exif_bytes));
            fs::write(path, png.encoder().bytes())
                .map_err(|e| format!("Failed to write PNG: {}", e))?;
        }
        _ => unreachable!(),
    }

    Ok(())
}
