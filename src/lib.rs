pub mod config;
pub mod db;
pub mod db_pool;
pub mod db_schema;
pub mod geocoder;
pub mod image_editor;
pub mod metadata_extractor;
pub mod mimetype_detector;
pub mod routes;
pub mod thumbnail_generator;
pub mod warp_handlers;
pub mod warp_helpers;
