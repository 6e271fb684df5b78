use serde::{Deserialize, Serialize};
use tracing::info;
use warp::{Rejection, Reply};

use crate::error::AppError;
use crate::models::{Plant, PlantInput};
use crate::state::AppState;
use crate::suggest::PlantAttributes;

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    #[serde(rename = "plantName")]
    pub plant_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub suggestions: PlantAttributes,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlantListResponse {
    pub plants: Vec<Plant>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
}

impl SuccessResponse {
    fn ok() -> Self {
        Self {
            success: true,
            id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Health<'a> {
    ok: bool,
    port: String,
    base: &'a str,
    db: DbHealth<'a>,
    ai: AiHealth,
}

#[derive(Debug, Serialize)]
struct DbHealth<'a> {
    url: &'a str,
    pool_size: u32,
    connections: u32,
    idle: u32,
}

#[derive(Debug, Serialize)]
struct AiHealth {
    key: &'static str,
    image_size: &'static str,
}

/// Report configuration presence. Never calls the AI provider.
pub async fn health(state: AppState) -> Result<impl Reply, Rejection> {
    let config = &state.config;
    let pool = state.store.pool().state();

    Ok(warp::reply::json(&Health {
        ok: true,
        port: config.port.to_string(),
        base: &config.base_url,
        db: DbHealth {
            url: &config.database_url,
            pool_size: config.pool_size,
            connections: pool.connections,
            idle: pool.idle_connections,
        },
        ai: AiHealth {
            key: if config.has_api_key() { "present" } else { "missing" },
            image_size: config.image_size.as_str(),
        },
    }))
}

pub async fn suggest(request: SuggestRequest, state: AppState) -> Result<impl Reply, Rejection> {
    let name = request.plant_name.unwrap_or_default();
    let suggestions = state.suggestions.suggest(&name).await?;
    Ok(warp::reply::json(&SuggestResponse { suggestions }))
}

pub async fn resolve_image(query: ImageQuery, state: AppState) -> Result<impl Reply, Rejection> {
    let name = query.name.unwrap_or_default();
    let resolved = state.images.resolve(&name).await?;
    Ok(warp::reply::json(&resolved))
}

pub async fn list_plants(state: AppState) -> Result<impl Reply, Rejection> {
    let plants = state.store.list().await.map_err(AppError::from)?;
    Ok(warp::reply::json(&PlantListResponse { plants }))
}

pub async fn get_plant(id: i32, state: AppState) -> Result<impl Reply, Rejection> {
    let plant = state
        .store
        .get(id)
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;
    Ok(warp::reply::json(&plant))
}

pub async fn create_plant(input: PlantInput, state: AppState) -> Result<impl Reply, Rejection> {
    let id = state.store.create(input).await.map_err(AppError::from)?;
    info!(id, "plant created");
    Ok(warp::reply::json(&SuccessResponse {
        success: true,
        id: Some(id),
    }))
}

pub async fn update_plant(
    id: i32,
    input: PlantInput,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let updated = state.store.update(id, input).await.map_err(AppError::from)?;
    info!(id, updated, "plant updated");
    Ok(warp::reply::json(&SuccessResponse::ok()))
}

pub async fn delete_plant(id: i32, state: AppState) -> Result<impl Reply, Rejection> {
    let deleted = state.store.delete(id).await.map_err(AppError::from)?;
    info!(id, deleted, "plant deleted");
    Ok(warp::reply::json(&SuccessResponse::ok()))
}
