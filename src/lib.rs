//! Plant catalog backend: CRUD over plant records, AI care suggestions and a
//! generated-image cache, served over HTTP with warp.

pub mod actions;
pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod images;
pub mod logging;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod suggest;

pub use config::Config;
pub use routes::routes;
pub use state::AppState;
