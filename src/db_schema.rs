use rusqlite::{Connection, Result as SqlResult};

// Schema definition
pub const PHOTOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,

    -- Server-generated file identifiers (random token + extension)
    filename TEXT NOT NULL,
    thumbnail_filename TEXT NOT NULL,

    description TEXT NOT NULL,

    -- Always populated: EXIF GPS, manual form values, or the fixed default
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,

    -- Raw EXIF DateTimeOriginal string, absent when the image carries none
    date_taken TEXT,

    ip_address TEXT,
    device_make TEXT NOT NULL DEFAULT 'Unknown',
    device_model TEXT NOT NULL DEFAULT 'Unknown',

    -- Deletion credential, stored as given and compared verbatim
    password TEXT NOT NULL,

    upload_time TEXT NOT NULL
)
"#;

pub fn initialize_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(PHOTOS_TABLE)?;
    Ok(())
}
