use std::convert::Infallible;

use serde::de::DeserializeOwned;
use warp::http::Method;
use warp::{Filter, Rejection, Reply};

use crate::error::handle_rejection;
use crate::handlers::{self, ImageQuery};
use crate::images::UPLOADS_PATH;
use crate::state::AppState;

/// Largest accepted JSON body.
pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// The whole HTTP surface: API routes, uploads, CORS, tracing and JSON
/// error bodies. Only a request from a disallowed CORS origin still ends in
/// a rejection.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = cors(state.config.frontend_origin.as_deref());
    let uploads = warp::path(UPLOADS_PATH)
        .and(warp::get())
        .and(warp::fs::dir(state.images.storage().dir().to_path_buf()));

    health(state.clone())
        .or(suggest(state.clone()))
        .or(plant_image(state.clone()))
        .or(plants_api(state))
        .or(uploads)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn cors(origin: Option<&str>) -> warp::cors::Builder {
    let builder = warp::cors()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(["content-type"]);

    match origin {
        Some(origin) => builder.allow_origin(origin),
        None => builder.allow_any_origin(),
    }
}

/// GET /health
fn health(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("health")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::health)
}

/// POST /api/suggest
fn suggest(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "suggest")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers::suggest)
}

/// GET /api/plant?name=
fn plant_image(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "plant")
        .and(warp::get())
        .and(warp::query::<ImageQuery>())
        .and(with_state(state))
        .and_then(handlers::resolve_image)
}

/// CRUD over /api/plants and /api/plant/:id
fn plants_api(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "plants")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::list_plants);

    let create = warp::path!("api" / "plants")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_plant);

    let get = warp::path!("api" / "plant" / i32)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_plant);

    let update = warp::path!("api" / "plant" / i32)
        .and(warp::put())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::update_plant);

    let delete = warp::path!("api" / "plant" / i32)
        .and(warp::delete())
        .and(with_state(state))
        .and_then(handlers::delete_plant);

    list.or(create).or(get).or(update).or(delete)
}
