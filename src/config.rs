use std::{
    env,
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, info};

use crate::ai::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL};
use crate::ai::retry::{DEFAULT_BACKOFF, DEFAULT_MAX_RETRIES};
use crate::ai::{ImageSize, RetryPolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenv::Error),
}

/// Load `.env` from the working directory or one of its parents into the
/// process environment. Variables that are already set are left alone. A
/// missing file is not an error; the loaded path is returned otherwise.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    env_file_result(dotenv::dotenv().map(Some))
}

/// Same as [`load_dotenv`] for an explicit file.
pub fn load_dotenv_from(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    env_file_result(dotenv::from_path(path).map(|()| Some(path.to_path_buf())))
}

fn env_file_result(
    result: Result<Option<PathBuf>, dotenv::Error>,
) -> Result<Option<PathBuf>, ConfigError> {
    match result {
        Err(e) if e.not_found() => Ok(None),
        other => Ok(other?),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Public origin used when building image URLs.
    pub base_url: String,
    /// Allowed CORS origin; `None` allows any.
    pub frontend_origin: Option<String>,
    pub database_url: String,
    pub pool_size: u32,
    pub uploads_dir: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub image_model: Option<String>,
    pub image_size: ImageSize,
    pub ai_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key/value source; used by `load` and tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port: u16 = parse_or(&var, "PORT", 5000)?;
        let base_url = var("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();
        let frontend_origin = parse_origin(
            var("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
        )?;

        let pool_size: u32 = parse_or(&var, "DB_POOL_SIZE", 10)?;
        if pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_SIZE",
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }

        let image_size = ImageSize::normalize(&var("OPENAI_IMAGE_SIZE").unwrap_or_default());
        let timeout_secs: u64 = parse_or(&var, "AI_TIMEOUT_SECS", 20)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "AI_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }
        let max_retries: u32 = parse_or(&var, "AI_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let backoff_ms: u64 = parse_or(&var, "AI_RETRY_BACKOFF_MS", DEFAULT_BACKOFF.as_millis() as u64)?;

        Ok(Self {
            port,
            base_url,
            frontend_origin,
            database_url: var("DATABASE_URL").unwrap_or_else(|| "plants.db".to_string()),
            pool_size,
            uploads_dir: var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: var("OPENAI_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            image_model: var("OPENAI_IMAGE_MODEL"),
            image_size,
            ai_timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy::new(max_retries, Duration::from_millis(backoff_ms)),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.openai_api_key.is_some()
    }

    pub fn log_summary(&self) {
        info!(
            port = self.port,
            base_url = %self.base_url,
            database_url = %self.database_url,
            pool_size = self.pool_size,
            uploads_dir = %self.uploads_dir.display(),
            ai_key = if self.has_api_key() { "present" } else { "missing" },
            image_size = %self.image_size,
            "configuration loaded"
        );
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => {
            debug!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

/// `*` means any origin. Otherwise the value must be a bare
/// `scheme://host[:port]`.
fn parse_origin(raw: String) -> Result<Option<String>, ConfigError> {
    if raw == "*" {
        return Ok(None);
    }

    let origin = raw.trim_end_matches('/').to_string();
    let invalid = |reason: &str| ConfigError::Invalid {
        key: "FRONTEND_URL",
        value: raw.clone(),
        reason: reason.to_string(),
    };

    let (scheme, authority) = origin
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    if scheme != "http" && scheme != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if authority.is_empty() || authority.contains('/') {
        return Err(invalid("expected an origin without a path"));
    }

    Ok(Some(origin))
}
