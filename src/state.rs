use std::sync::Arc;

use crate::ai::{AiError, AiProvider, OpenAiProvider};
use crate::config::Config;
use crate::db::DbPool;
use crate::images::{ImageCache, ImageStorage};
use crate::store::PlantStore;
use crate::suggest::SuggestionService;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: PlantStore,
    pub images: Arc<ImageCache>,
    pub suggestions: Arc<SuggestionService>,
}

impl AppState {
    pub fn new(config: Config, pool: DbPool, provider: Option<Arc<dyn AiProvider>>) -> Self {
        let store = PlantStore::new(pool);
        let storage = ImageStorage::new(&config.uploads_dir, &config.base_url);
        let images = ImageCache::new(store.clone(), storage, provider.clone(), config.image_size);

        Self {
            config: Arc::new(config),
            store,
            images: Arc::new(images),
            suggestions: Arc::new(SuggestionService::new(provider)),
        }
    }
}

/// The configured provider, or `None` when no API key is set.
pub fn provider_from_config(config: &Config) -> Result<Option<Arc<dyn AiProvider>>, AiError> {
    let Some(api_key) = config.openai_api_key.as_deref() else {
        return Ok(None);
    };

    let provider = OpenAiProvider::new(api_key, config.ai_timeout)?
        .with_base_url(config.openai_base_url.as_str())
        .with_chat_model(config.chat_model.as_str())
        .with_image_model(config.image_model.clone())
        .with_retry(config.retry);

    Ok(Some(Arc::new(provider)))
}
