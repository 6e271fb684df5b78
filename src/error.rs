use std::convert::Infallible;

use serde::Serialize;
use thiserror::Error;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::ai::AiError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{operation} failed: {source}")]
    Upstream {
        operation: &'static str,
        #[source]
        source: AiError,
    },

    #[error("not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl warp::reject::Reject for AppError {}

impl AppError {
    pub fn upstream(operation: &'static str) -> impl Fn(AiError) -> AppError {
        move |source| AppError::Upstream { operation, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Configuration(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Upstream { .. } | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to clients.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::Configuration(msg) => msg.clone(),
            AppError::Upstream { operation, .. } => format!("{operation} failed"),
            AppError::NotFound => "not found".to_string(),
            AppError::Storage(_) => "server error".to_string(),
        }
    }
}

/// Shared error response used by all endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_reply(status: StatusCode, error: impl Into<String>) -> warp::reply::Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse {
            error: error.into(),
        }),
        status,
    )
    .into_response()
}

/// Turn every rejection into a JSON error body.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(app_err) = err.find::<AppError>() {
        let status = app_err.status();
        if status.is_server_error() {
            tracing::error!(error = %app_err, "request failed");
        } else {
            tracing::debug!(error = %app_err, "request rejected");
        }
        return Ok(error_reply(status, app_err.public_message()));
    }

    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "not found"));
    }

    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        tracing::debug!(error = %e, "malformed request body");
        return Ok(error_reply(StatusCode::BAD_REQUEST, "malformed JSON body"));
    }

    if err.find::<warp::reject::InvalidQuery>().is_some() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "invalid query string"));
    }

    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "payload too large"));
    }

    if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        return Ok(error_reply(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json",
        ));
    }

    if err.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(error_reply(StatusCode::LENGTH_REQUIRED, "content-length required"));
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }

    tracing::error!(rejection = ?err, "unhandled rejection");
    Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "server error"))
}
