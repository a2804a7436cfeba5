use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use tempfile::TempDir;

use photomap::config::Config;
use photomap::db::{create_in_memory_pool, DbPool, Photo};
use photomap::geocoder::FixedGeocoder;
use photomap::routes::build_routes;

const BOUNDARY: &str = "photomap-test-boundary";

fn test_config(upload_dir: &Path) -> Config {
    Config {
        port: 0,
        host: "127.0.0.1".to_string(),
        upload_path: upload_dir.to_string_lossy().to_string(),
        db_path: ":memory:".to_string(),
        default_latitude: 37.5665,
        default_longitude: 126.978,
        geocoder_url: "http://127.0.0.1:1/reverse".to_string(),
        geocoder_user_agent: "photomap-test".to_string(),
    }
}

fn test_app(
    upload_dir: &Path,
    address: Option<&str>,
) -> (
    DbPool,
    impl warp::Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone,
) {
    std::fs::create_dir_all(upload_dir.join("thumbnails")).unwrap();
    let pool = create_in_memory_pool().unwrap();
    let config = Arc::new(test_config(upload_dir));
    let geocoder = Arc::new(FixedGeocoder(address.map(str::to_string)));
    let routes = build_routes(pool.clone(), config, geocoder);
    (pool, routes)
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 90]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();
    bytes
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 90]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn dms(deg: u32, min: u32, sec_times_10: u32) -> Value {
    Value::Rational(vec![
        Rational { num: deg, denom: 1 },
        Rational { num: min, denom: 1 },
        Rational {
            num: sec_times_10,
            denom: 10,
        },
    ])
}

fn ascii(s: &str) -> Value {
    Value::Ascii(vec![s.as_bytes().to_vec()])
}

/// JPEG carrying a full EXIF GPS pair (Shibuya crossing, roughly).
fn jpeg_with_gps() -> Vec<u8> {
    let fields = vec![
        Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: dms(35, 39, 342),
        },
        Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii("N"),
        },
        Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: dms(139, 42, 18),
        },
        Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii("E"),
        },
    ];

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut exif_buf = Cursor::new(Vec::new());
    writer.write(&mut exif_buf, false).unwrap();

    let mut jpeg = Jpeg::from_bytes(jpeg_bytes(64, 48).into()).unwrap();
    jpeg.set_exif(Some(Bytes::from(exif_buf.into_inner())));
    jpeg.encoder().bytes().to_vec()
}

fn multipart_body(fields: &[(&str, Option<&str>, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(fname) => {
                body.extend_from_slice(
                    format!(
                        "content-disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, fname
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"content-type: image/jpeg\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("content-disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(fields: &[(&str, Option<&str>, Vec<u8>)]) -> warp::test::RequestBuilder {
    warp::test::request()
        .method("POST")
        .path("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart_body(fields))
}

fn standard_fields(file: Vec<u8>, password: &str) -> Vec<(&'static str, Option<&'static str>, Vec<u8>)> {
    vec![
        ("file", Some("photo.jpg"), file),
        ("description", None, b"test photo".to_vec()),
        ("password", None, password.as_bytes().to_vec()),
    ]
}

#[tokio::test]
async fn test_upload_short_password_rejected_before_write() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    let resp = upload_request(&standard_fields(jpeg_bytes(64, 48), "short"))
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 400);
    assert_eq!(Photo::count(&pool).unwrap(), 0);
    // Nothing but the thumbnails directory may exist
    let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("thumbnails")]);
}

#[tokio::test]
async fn test_upload_without_gps_stores_default_coordinate() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    let resp = upload_request(&standard_fields(jpeg_bytes(64, 48), "longenough"))
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 303);
    assert_eq!(resp.headers().get("location").unwrap(), "/");

    let photos = Photo::list_all(&pool).unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].latitude, 37.5665);
    assert_eq!(photos[0].longitude, 126.978);
    assert_eq!(photos[0].device_make, "Unknown");
    assert_eq!(photos[0].device_model, "Unknown");
    assert!(photos[0].date_taken.is_none());
}

#[tokio::test]
async fn test_upload_with_manual_coordinates() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    let mut fields = standard_fields(jpeg_bytes(64, 48), "longenough");
    fields.push(("manual_lat", None, b"48.8584".to_vec()));
    fields.push(("manual_long", None, b"2.2945".to_vec()));

    let resp = upload_request(&fields).reply(&routes).await;

    assert_eq!(resp.status(), 303);
    let photos = Photo::list_all(&pool).unwrap();
    assert_eq!(photos[0].latitude, 48.8584);
    assert_eq!(photos[0].longitude, 2.2945);
}

#[tokio::test]
async fn test_upload_exif_gps_beats_manual_coordinates() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    let mut fields = standard_fields(jpeg_with_gps(), "longenough");
    fields.push(("manual_lat", None, b"1.0".to_vec()));
    fields.push(("manual_long", None, b"2.0".to_vec()));

    let resp = upload_request(&fields).reply(&routes).await;

    assert_eq!(resp.status(), 303);
    let photos = Photo::list_all(&pool).unwrap();
    assert!((photos[0].latitude - (35.0 + 39.0 / 60.0 + 34.2 / 3600.0)).abs() < 1e-6);
    assert!((photos[0].longitude - (139.0 + 42.0 / 60.0 + 1.8 / 3600.0)).abs() < 1e-6);
}

#[tokio::test]
async fn test_upload_writes_both_files() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    upload_request(&standard_fields(jpeg_bytes(400, 300), "longenough"))
        .reply(&routes)
        .await;

    let photo = &Photo::list_all(&pool).unwrap()[0];
    assert!(temp_dir.path().join(&photo.filename).exists());
    assert!(temp_dir
        .path()
        .join("thumbnails")
        .join(&photo.thumbnail_filename)
        .exists());
    assert!(photo.thumbnail_filename.starts_with("thumb_"));
    assert_ne!(photo.filename, "photo.jpg");
}

#[tokio::test]
async fn test_delete_with_wrong_password_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    upload_request(&standard_fields(jpeg_bytes(64, 48), "longenough"))
        .reply(&routes)
        .await;
    let photo = Photo::list_all(&pool).unwrap().remove(0);

    let resp = warp::test::request()
        .method("POST")
        .path("/delete")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!("photo_id={}&password=wrongwrong", photo.id))
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "パスワードが間違っています。");

    assert!(Photo::find_by_id(&pool, photo.id).unwrap().is_some());
    assert!(temp_dir.path().join(&photo.filename).exists());
    assert!(temp_dir
        .path()
        .join("thumbnails")
        .join(&photo.thumbnail_filename)
        .exists());
}

#[tokio::test]
async fn test_delete_with_correct_password_removes_row_and_files() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    upload_request(&standard_fields(jpeg_bytes(64, 48), "longenough"))
        .reply(&routes)
        .await;
    let photo = Photo::list_all(&pool).unwrap().remove(0);

    let resp = warp::test::request()
        .method("POST")
        .path("/delete")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!("photo_id={}&password=longenough", photo.id))
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(json["success"], true);

    assert!(Photo::find_by_id(&pool, photo.id).unwrap().is_none());
    assert!(!temp_dir.path().join(&photo.filename).exists());
    assert!(!temp_dir
        .path()
        .join("thumbnails")
        .join(&photo.thumbnail_filename)
        .exists());
}

#[tokio::test]
async fn test_delete_unknown_id_reports_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let (_pool, routes) = test_app(temp_dir.path(), None);

    let resp = warp::test::request()
        .method("POST")
        .path("/delete")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("photo_id=4242&password=whatever00")
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "写真が見つかりません。");
}

#[tokio::test]
async fn test_list_photos_resolves_addresses() {
    let temp_dir = TempDir::new().unwrap();
    let (_pool, routes) = test_app(temp_dir.path(), Some("서울특별시 중구"));

    upload_request(&standard_fields(jpeg_bytes(64, 48), "longenough"))
        .reply(&routes)
        .await;

    let resp = warp::test::request()
        .method("GET")
        .path("/api/photos")
        .reply(&routes)
        .await;

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    let photos = json["photos"].as_array().unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0]["address"], "서울특별시 중구");
    // The deletion credential never leaks through the API
    assert!(photos[0].get("password").is_none());
}

#[tokio::test]
async fn test_list_photos_unresolved_address_placeholder() {
    let temp_dir = TempDir::new().unwrap();
    let (_pool, routes) = test_app(temp_dir.path(), None);

    upload_request(&standard_fields(jpeg_bytes(64, 48), "longenough"))
        .reply(&routes)
        .await;

    let resp = warp::test::request()
        .method("GET")
        .path("/api/photos")
        .reply(&routes)
        .await;

    let json: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(json["photos"][0]["address"], "주소 미확인");
}

#[tokio::test]
async fn test_map_and_upload_pages_served() {
    let temp_dir = TempDir::new().unwrap();
    let (_pool, routes) = test_app(temp_dir.path(), None);

    let resp = warp::test::request().path("/").reply(&routes).await;
    assert_eq!(resp.status(), 200);
    assert!(std::str::from_utf8(resp.body()).unwrap().contains("leaflet"));

    let resp = warp::test::request().path("/upload").reply(&routes).await;
    assert_eq!(resp.status(), 200);
    assert!(std::str::from_utf8(resp.body())
        .unwrap()
        .contains("multipart/form-data"));
}

#[tokio::test]
async fn test_stored_file_served_and_traversal_blocked() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    upload_request(&standard_fields(jpeg_bytes(64, 48), "longenough"))
        .reply(&routes)
        .await;
    let photo = Photo::list_all(&pool).unwrap().remove(0);

    let resp = warp::test::request()
        .path(&format!("/uploads/{}", photo.filename))
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");

    let resp = warp::test::request()
        .path("/uploads/..%2Fsomething")
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_png_thumbnail_served_as_jpeg() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, routes) = test_app(temp_dir.path(), None);

    let mut fields = standard_fields(png_bytes(400, 300), "longenough");
    fields[0].1 = Some("photo.png");
    upload_request(&fields).reply(&routes).await;

    let photo = Photo::list_all(&pool).unwrap().remove(0);
    assert!(photo.thumbnail_filename.ends_with(".png"));

    // The full-size copy keeps its own format and label
    let resp = warp::test::request()
        .path(&format!("/uploads/{}", photo.filename))
        .reply(&routes)
        .await;
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");

    // The thumbnail name keeps the extension but the bytes are JPEG
    let resp = warp::test::request()
        .path(&format!("/uploads/thumbnails/{}", photo.thumbnail_filename))
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");
    assert_eq!(&resp.body()[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_health_endpoints() {
    let temp_dir = TempDir::new().unwrap();
    let (_pool, routes) = test_app(temp_dir.path(), None);

    let resp = warp::test::request().path("/health").reply(&routes).await;
    assert_eq!(resp.status(), 200);

    let resp = warp::test::request().path("/ready").reply(&routes).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(json["database"], "connected");
}
