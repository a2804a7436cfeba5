use chrono::Utc;
use rusqlite::{params, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

pub use crate::db_pool::{create_db_pool, create_in_memory_pool, DbPool};

/// One uploaded photo. `password` is the plaintext deletion credential and is
/// never serialized into API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub filename: String,
    pub thumbnail_filename: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date_taken: Option<String>,
    pub ip_address: Option<String>,
    pub device_make: String,
    pub device_model: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub upload_time: String,
}

/// Field set for inserting a new photo; the id is assigned by storage.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub filename: String,
    pub thumbnail_filename: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date_taken: Option<String>,
    pub ip_address: Option<String>,
    pub device_make: String,
    pub device_model: String,
    pub password: String,
}

impl Photo {
    pub fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Photo {
            id: row.get(0)?,
            filename: row.get(1)?,
            thumbnail_filename: row.get(2)?,
            description: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            date_taken: row.get(6)?,
            ip_address: row.get(7)?,
            device_make: row.get(8)?,
            device_model: row.get(9)?,
            password: row.get(10)?,
            upload_time: row.get(11)?,
        })
    }

    pub fn list_all(pool: &DbPool) -> Result<Vec<Photo>, Box<dyn std::error::Error>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, thumbnail_filename, description,
                    latitude, longitude, date_taken, ip_address,
                    device_make, device_model, password, upload_time
             FROM photos ORDER BY upload_time DESC",
        )?;
        let photo_iter = stmt.query_map([], Photo::from_row)?;

        let mut photos = Vec::new();
        for photo in photo_iter {
            photos.push(photo?);
        }
        Ok(photos)
    }

    pub fn find_by_id(
        pool: &DbPool,
        id: i64,
    ) -> Result<Option<Photo>, Box<dyn std::error::Error>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, thumbnail_filename, description,
                    latitude, longitude, date_taken, ip_address,
                    device_make, device_model, password, upload_time
             FROM photos WHERE id = ?",
        )?;

        match stmt.query_row([id], Photo::from_row) {
            Ok(photo) => Ok(Some(photo)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<(), Box<dyn std::error::Error>> {
        let conn = pool.get()?;
        conn.execute("DELETE FROM photos WHERE id = ?", [id])?;
        Ok(())
    }

    pub fn count(pool: &DbPool) -> Result<i64, Box<dyn std::error::Error>> {
        let conn = pool.get()?;
        let count = conn.query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl NewPhoto {
    /// Inserts the record with a server-assigned upload_time and returns the
    /// stored row.
    pub fn insert(&self, pool: &DbPool) -> Result<Photo, Box<dyn std::error::Error>> {
        let conn = pool.get()?;
        let upload_time = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO photos (
                filename, thumbnail_filename, description,
                latitude, longitude, date_taken, ip_address,
                device_make, device_model, password, upload_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                self.filename,
                self.thumbnail_filename,
                self.description,
                self.latitude,
                self.longitude,
                self.date_taken,
                self.ip_address,
                self.device_make,
                self.device_model,
                self.password,
                upload_time,
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Photo {
            id,
            filename: self.filename.clone(),
            thumbnail_filename: self.thumbnail_filename.clone(),
            description: self.description.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            date_taken: self.date_taken.clone(),
            ip_address: self.ip_address.clone(),
            device_make: self.device_make.clone(),
            device_model: self.device_model.clone(),
            password: self.password.clone(),
            upload_time,
        })
    }
}
