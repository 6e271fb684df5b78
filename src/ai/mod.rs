//! Clients for the external image and text generation API.
//!
//! Handlers never talk to the network directly: they hold an
//! [`AiProvider`], which is [`OpenAiProvider`] in production and
//! [`FakeProvider`] in tests.

mod fake;
pub mod openai;
pub mod retry;

pub use fake::{FakeProvider, FAKE_IMAGE_BYTES};
pub use openai::OpenAiProvider;
pub use retry::RetryPolicy;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("request failed: {message}")]
    Transport { message: String, transient: bool },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("API returned error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("response contained no image data")]
    EmptyImage,
}

impl AiError {
    /// Network failures worth another attempt. Timeouts are excluded: the
    /// caller has already waited the full budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::Transport { transient: true, .. })
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AiError::Timeout(err.to_string())
        } else if err.is_decode() {
            AiError::Parse(err.to_string())
        } else {
            AiError::Transport {
                transient: err.is_connect() || err.is_request() || err.is_body(),
                message: err.to_string(),
            }
        }
    }
}

/// Output sizes the image endpoint accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1024x1536")]
    Portrait,
    #[serde(rename = "1536x1024")]
    Landscape,
    #[serde(rename = "auto")]
    Auto,
}

impl ImageSize {
    /// Parse a configured size, falling back to the square default for
    /// anything outside the allow-set.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1024x1024" => ImageSize::Square,
            "1024x1536" => ImageSize::Portrait,
            "1536x1024" => ImageSize::Landscape,
            "auto" => ImageSize::Auto,
            _ => ImageSize::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1536",
            ImageSize::Landscape => "1536x1024",
            ImageSize::Auto => "auto",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for generation backends.
///
/// Implementations must be thread-safe; one instance is shared by every
/// request.
#[async_trait]
pub trait AiProvider: Send + Sync + fmt::Debug {
    /// Generate one image and return its base64-encoded payload.
    async fn generate_image(&self, prompt: &str, size: ImageSize) -> Result<String, AiError>;

    /// Run a chat completion and return the assistant's raw text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;

    /// Get the provider name (e.g., "openai", "fake").
    fn provider_name(&self) -> &'static str;
}
