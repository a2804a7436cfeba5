use std::convert::Infallible;
use std::sync::Arc;

use warp::Filter;

use crate::config::Config;
use crate::db::DbPool;
use crate::geocoder::ReverseGeocoder;
use crate::warp_handlers;
use crate::warp_helpers::{handle_rejection, with_config, with_db, with_geocoder};

const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Complete route tree: map page, upload form, upload/delete operations,
/// photo listing, stored file serving and health probes.
pub fn build_routes(
    db_pool: DbPool,
    config: Arc<Config>,
    geocoder: Arc<dyn ReverseGeocoder>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let index_page = warp::path::end().and(warp::get()).and_then(|| async {
        Ok::<_, Infallible>(warp::reply::html(include_str!("../static/index.html")))
    });

    let upload_page = warp::path("upload")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(|| async {
            Ok::<_, Infallible>(warp::reply::html(include_str!("../static/upload.html")))
        });

    let api_photos = warp::path("api")
        .and(warp::path("photos"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(db_pool.clone()))
        .and(with_geocoder(geocoder))
        .and_then(warp_handlers::list_photos);

    let upload_photo = warp::path("upload")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::addr::remote())
        .and(warp::multipart::form().max_length(MAX_UPLOAD_BYTES))
        .and(with_db(db_pool.clone()))
        .and(with_config(config.clone()))
        .and_then(warp_handlers::upload_photo);

    let delete_photo = warp::path("delete")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::form::<warp_handlers::DeleteRequest>())
        .and(with_db(db_pool.clone()))
        .and(with_config(config.clone()))
        .and_then(warp_handlers::delete_photo);

    let serve_thumbnail = warp::path("uploads")
        .and(warp::path("thumbnails"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_config(config.clone()))
        .and_then(warp_handlers::serve_thumbnail_file);

    let serve_upload = warp::path("uploads")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_config(config))
        .and_then(warp_handlers::serve_upload_file);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(warp_handlers::health_check);

    let ready = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(db_pool))
        .and_then(warp_handlers::ready_check);

    index_page
        .or(upload_page)
        .or(api_photos)
        .or(upload_photo)
        .or(delete_photo)
        .or(serve_thumbnail)
        .or(serve_upload)
        .or(health)
        .or(ready)
        .recover(handle_rejection)
}
