use crate::config::Config;
use crate::db::{DbPool, NewPhoto, Photo};
use crate::geocoder::{ReverseGeocoder, UNKNOWN_ADDRESS};
use crate::image_editor;
use crate::metadata_extractor::MetadataExtractor;
use crate::mimetype_detector;
use crate::thumbnail_generator;
use crate::warp_helpers::{DatabaseError, NotFoundError, StorageError, ValidationError};

use bytes::BufMut;
use futures_util::StreamExt;
use log::{info, warn};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warp::multipart::FormData;
use warp::{reject, Rejection, Reply};

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub photo_id: i64,
    pub password: String,
}

/// Decoded multipart upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file_data: Vec<u8>,
    original_filename: String,
    description: String,
    password: String,
    manual_lat: Option<f64>,
    manual_long: Option<f64>,
}

pub async fn health_check() -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn ready_check(db_pool: DbPool) -> Result<impl Reply, Rejection> {
    match db_pool.get() {
        Ok(_) => Ok(warp::reply::json(&json!({
            "status": "ready",
            "database": "connected",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))),
        Err(e) => {
            log::error!("Database connection failed: {}", e);
            Err(reject::custom(DatabaseError {
                message: "Database connection failed".to_string(),
            }))
        }
    }
}

/// All stored photos with their display addresses, consumed by the map page.
pub async fn list_photos(
    db_pool: DbPool,
    geocoder: Arc<dyn ReverseGeocoder>,
) -> Result<impl Reply, Rejection> {
    let photos = Photo::list_all(&db_pool).map_err(|e| {
        log::error!("Database error: {}", e);
        reject::custom(DatabaseError {
            message: format!("Database error: {}", e),
        })
    })?;

    // The geocoder does blocking network IO; keep it off the async workers.
    let entries = tokio::task::spawn_blocking(move || {
        photos
            .iter()
            .map(|photo| {
                let address = geocoder
                    .resolve(photo.latitude, photo.longitude)
                    .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());
                json!({
                    "id": photo.id,
                    "filename": photo.filename,
                    "thumbnail_filename": photo.thumbnail_filename,
                    "description": photo.description,
                    "latitude": photo.latitude,
                    "longitude": photo.longitude,
                    "date_taken": photo.date_taken,
                    "ip_address": photo.ip_address,
                    "device_make": photo.device_make,
                    "device_model": photo.device_model,
                    "upload_time": photo.upload_time,
                    "address": address,
                })
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| {
        reject::custom(StorageError {
            message: format!("Listing task failed: {}", e),
        })
    })?;

    Ok(warp::reply::json(&json!({ "photos": entries })))
}

pub async fn upload_photo(
    remote: Option<SocketAddr>,
    form: FormData,
    db_pool: DbPool,
    config: Arc<Config>,
) -> Result<impl Reply, Rejection> {
    let form = collect_upload_form(form).await?;

    // Reject before anything touches the disk
    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(reject::custom(ValidationError {
            message: format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ),
        }));
    }
    if form.file_data.is_empty() {
        return Err(reject::custom(ValidationError {
            message: "No file uploaded".to_string(),
        }));
    }

    let unique_filename = generate_filename(&form.original_filename);
    let thumbnail_filename = format!("thumb_{}", unique_filename);

    let upload_dir = PathBuf::from(&config.upload_path);
    let file_path = upload_dir.join(&unique_filename);
    let thumbnail_path = upload_dir.join("thumbnails").join(&thumbnail_filename);

    std::fs::write(&file_path, &form.file_data).map_err(|e| {
        reject::custom(StorageError {
            message: format!("Failed to store upload: {}", e),
        })
    })?;

    // Corrupt or absent EXIF is non-fatal: keep the bytes as uploaded
    if let Err(e) = image_editor::normalize_orientation(&file_path) {
        warn!(
            "Orientation normalization failed for {}: {}",
            file_path.display(),
            e
        );
    }

    thumbnail_generator::create_thumbnail(&file_path, &thumbnail_path).map_err(|e| {
        reject::custom(StorageError {
            message: format!("Failed to generate thumbnail: {}", e),
        })
    })?;

    let metadata = MetadataExtractor::extract(&file_path);
    let (latitude, longitude) = resolve_coordinates(
        metadata.latitude,
        metadata.longitude,
        form.manual_lat,
        form.manual_long,
        (config.default_latitude, config.default_longitude),
    );

    let photo = NewPhoto {
        filename: unique_filename,
        thumbnail_filename,
        description: form.description,
        latitude,
        longitude,
        date_taken: metadata.date_taken,
        ip_address: remote.map(|addr| addr.ip().to_string()),
        device_make: metadata.device_make.unwrap_or_else(|| "Unknown".to_string()),
        device_model: metadata
            .device_model
            .unwrap_or_else(|| "Unknown".to_string()),
        password: form.password,
    }
    .insert(&db_pool)
    .map_err(|e| {
        log::error!("Database error: {}", e);
        reject::custom(DatabaseError {
            message: format!("Database error: {}", e),
        })
    })?;

    info!(
        "Stored photo {} at ({}, {})",
        photo.id, photo.latitude, photo.longitude
    );

    Ok(warp::redirect::see_other(warp::http::Uri::from_static("/")))
}

pub async fn delete_photo(
    request: DeleteRequest,
    db_pool: DbPool,
    config: Arc<Config>,
) -> Result<impl Reply, Rejection> {
    let photo = match Photo::find_by_id(&db_pool, request.photo_id) {
        Ok(Some(photo)) => photo,
        Ok(None) => {
            return Ok(warp::reply::json(&json!({
                "success": false,
                "error": "写真が見つかりません。"
            })));
        }
        Err(e) => {
            log::error!("Database error: {}", e);
            return Err(reject::custom(DatabaseError {
                message: format!("Database error: {}", e),
            }));
        }
    };

    if photo.password != request.password {
        return Ok(warp::reply::json(&json!({
            "success": false,
            "error": "パスワードが間違っています。"
        })));
    }

    Photo::delete(&db_pool, photo.id).map_err(|e| {
        log::error!("Database error: {}", e);
        reject::custom(DatabaseError {
            message: format!("Database error: {}", e),
        })
    })?;

    // File removal errors are logged, never surfaced: the row is already gone
    let upload_dir = PathBuf::from(&config.upload_path);
    for path in [
        upload_dir.join(&photo.filename),
        upload_dir.join("thumbnails").join(&photo.thumbnail_filename),
    ] {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }

    info!("Deleted photo {}", photo.id);
    Ok(warp::reply::json(&json!({ "success": true })))
}

pub async fn serve_upload_file(
    filename: String,
    config: Arc<Config>,
) -> Result<Box<dyn Reply>, Rejection> {
    let content_type = mimetype_detector::content_type_for(&filename);
    serve_from(&PathBuf::from(&config.upload_path), &filename, content_type)
}

pub async fn serve_thumbnail_file(
    filename: String,
    config: Arc<Config>,
) -> Result<Box<dyn Reply>, Rejection> {
    // Thumbnails keep the upload's extension in their name but are always
    // encoded as JPEG, so the label is fixed rather than extension-derived.
    serve_from(&config.thumbnail_path(), &filename, "image/jpeg")
}

fn serve_from(
    dir: &Path,
    filename: &str,
    content_type: &'static str,
) -> Result<Box<dyn Reply>, Rejection> {
    // Stored names are server-generated tokens; anything that could escape
    // the directory is treated as absent.
    if !is_safe_filename(filename) {
        return Err(reject::custom(NotFoundError));
    }

    match std::fs::read(dir.join(filename)) {
        Ok(file_data) => {
            let reply = warp::reply::with_header(file_data, "content-type", content_type);
            let reply =
                warp::reply::with_header(reply, "cache-control", "public, max-age=31536000");
            Ok(Box::new(reply))
        }
        Err(_) => Err(reject::custom(NotFoundError)),
    }
}

fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
}

/// Random token plus the upload's sanitized extension, so stored names are
/// collision-free and never user-controlled.
fn generate_filename(original: &str) -> String {
    let token: u128 = rand::thread_rng().gen();

    let extension = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{:032x}.{}", token, ext),
        None => format!("{:032x}", token),
    }
}

/// Strict fallback order: full EXIF pair, then full manual pair, then the
/// configured default point. Partial pairs never contribute.
fn resolve_coordinates(
    exif_lat: Option<f64>,
    exif_long: Option<f64>,
    manual_lat: Option<f64>,
    manual_long: Option<f64>,
    default: (f64, f64),
) -> (f64, f64) {
    if let (Some(lat), Some(long)) = (exif_lat, exif_long) {
        return (lat, long);
    }
    if let (Some(lat), Some(long)) = (manual_lat, manual_long) {
        return (lat, long);
    }
    default
}

async fn collect_upload_form(mut form: FormData) -> Result<UploadForm, Rejection> {
    let mut result = UploadForm::default();

    while let Some(part) = form.next().await {
        let mut part = part.map_err(|e| {
            reject::custom(ValidationError {
                message: format!("Malformed multipart body: {}", e),
            })
        })?;

        let name = part.name().to_string();
        if name == "file" {
            if let Some(filename) = part.filename() {
                result.original_filename = filename.to_string();
            }
        }

        let mut data: Vec<u8> = Vec::new();
        while let Some(chunk) = part.data().await {
            let chunk = chunk.map_err(|e| {
                reject::custom(ValidationError {
                    message: format!("Malformed multipart body: {}", e),
                })
            })?;
            data.put(chunk);
        }

        match name.as_str() {
            "file" => result.file_data = data,
            "description" => result.description = text_field(&data),
            "password" => result.password = text_field(&data),
            "manual_lat" => result.manual_lat = text_field(&data).trim().parse().ok(),
            "manual_long" => result.manual_long = text_field(&data).trim().parse().ok(),
            _ => {}
        }
    }

    Ok(result)
}

fn text_field(data: &[u8]) -> String {
    String::from_utf8_lossy(data).to_string()
}
