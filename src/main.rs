use log::{error, info};
use std::net::TcpListener;
use std::sync::Arc;
use warp::Filter;

use photomap::config::Config;
use photomap::db;
use photomap::geocoder::{NominatimGeocoder, ReverseGeocoder};
use photomap::routes::build_routes;
use photomap::warp_helpers::cors;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::from_env()?;
    let port = config.port;
    let host: std::net::IpAddr = config.host.parse()?;

    info!("Starting photomap server on port {}", port);
    info!("Upload path: {}", config.upload_path);
    info!("Database: {}", config.db_path);

    // Check if port is available BEFORE initializing services
    if !is_port_available(host, port) {
        error!(
            "Port {} is already in use. Please stop any existing photomap instances or use a different port.",
            port
        );
        return Err(format!("Port {} is already in use", port).into());
    }

    std::fs::create_dir_all(config.thumbnail_path())?;
    info!("Upload directories ready");

    let db_pool = db::create_db_pool(&config.db_path)?;
    info!("Database initialized successfully");

    let geocoder: Arc<dyn ReverseGeocoder> = Arc::new(NominatimGeocoder::new(
        config.geocoder_url.clone(),
        config.geocoder_user_agent.clone(),
    ));

    let routes = build_routes(db_pool, Arc::new(config), geocoder)
        .with(cors())
        .with(warp::log("photomap"));

    info!(
        "Server started successfully, listening on http://localhost:{}",
        port
    );

    warp::serve(routes).run((host, port)).await;

    Ok(())
}

fn is_port_available(host: std::net::IpAddr, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}
