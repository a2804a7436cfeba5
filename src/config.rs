use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub upload_path: String,
    pub db_path: String,
    /// Coordinate stored when neither EXIF nor the form supplies a full pair.
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Config {
            port: env::var("PHOTOMAP_PORT")
                .unwrap_or_else(|_| "18474".to_string())
                .parse()?,
            host: env::var("PHOTOMAP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            upload_path: env::var("PHOTOMAP_UPLOAD_PATH")
                .unwrap_or_else(|_| "./uploads".to_string()),
            db_path: env::var("PHOTOMAP_DB_PATH")
                .unwrap_or_else(|_| "./data/photomap.db".to_string()),
            // Seoul city hall
            default_latitude: env::var("PHOTOMAP_DEFAULT_LAT")
                .unwrap_or_else(|_| "37.5665".to_string())
                .parse()?,
            default_longitude: env::var("PHOTOMAP_DEFAULT_LNG")
                .unwrap_or_else(|_| "126.9780".to_string())
                .parse()?,
            geocoder_url: env::var("PHOTOMAP_GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org/reverse".to_string()),
            geocoder_user_agent: env::var("PHOTOMAP_GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| "photomap/0.1".to_string()),
        })
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        PathBuf::from(&self.upload_path).join("thumbnails")
    }
}
