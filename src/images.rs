//! Plant image cache: look up a stored image URL by plant name, or generate
//! one, write it under the uploads directory and record it on the plant row.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::actions::ImageUpsert;
use crate::ai::{AiError, AiProvider, ImageSize};
use crate::error::AppError;
use crate::models::name_key;
use crate::store::{PlantStore, StoreError};

/// URL path segment generated images are served under.
pub const UPLOADS_PATH: &str = "uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Cache,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedImage {
    pub name: String,
    pub image_url: String,
    pub source: ImageSource,
}

/// Trimmed, lowercased cache key. Empty input is a validation error.
pub fn normalize_name(raw: &str) -> Result<String, AppError> {
    let name = name_key(raw);
    if name.is_empty() {
        return Err(AppError::Validation("name query is required".to_string()));
    }
    Ok(name)
}

pub fn image_prompt(name: &str) -> String {
    format!(
        "High-quality, realistic botanical photograph of the plant \"{name}\".\n\
         Full plant visible (leaves and stem), white background, centered, natural light, \
         DSLR look. No text, no watermark."
    )
}

/// Content-addressed image files under one directory.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    dir: PathBuf,
    public_base: String,
}

impl ImageStorage {
    pub fn new(dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base: format!("{}/{}", base_url.trim_end_matches('/'), UPLOADS_PATH),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    pub fn file_name(bytes: &[u8]) -> String {
        format!("{:x}.png", Sha256::digest(bytes))
    }

    /// Write `bytes` unless an identical file already exists and return its
    /// public URL. Writes go through a temp file so readers never see a
    /// partial image.
    pub async fn save_png(&self, bytes: &[u8]) -> std::io::Result<String> {
        let file_name = Self::file_name(bytes);
        let path = self.dir.join(&file_name);

        if !fs::try_exists(&path).await? {
            self.ensure_dir().await?;
            let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
            fs::write(&tmp, bytes).await?;
            if let Err(e) = fs::rename(&tmp, &path).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
            debug!(file = %path.display(), size = bytes.len(), "stored generated image");
        }

        Ok(format!("{}/{}", self.public_base, file_name))
    }
}

/// One async mutex per plant name. Entries are dropped once unused.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

pub struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl NameLocks {
    pub async fn lock(&self, name: &str) -> NameGuard<'_> {
        // Built before waiting so a cancelled waiter still cleans up its entry.
        let mut held = NameGuard {
            locks: self,
            name: name.to_owned(),
            guard: None,
        };
        let mutex = self.locks.entry(name.to_owned()).or_default().clone();
        held.guard = Some(mutex.lock_owned().await);
        held
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map holds one reference; anything more is a waiter.
        self.locks
            .locks
            .remove_if(&self.name, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

pub struct ImageCache {
    store: PlantStore,
    storage: ImageStorage,
    provider: Option<Arc<dyn AiProvider>>,
    size: ImageSize,
    locks: NameLocks,
}

impl ImageCache {
    pub fn new(
        store: PlantStore,
        storage: ImageStorage,
        provider: Option<Arc<dyn AiProvider>>,
        size: ImageSize,
    ) -> Self {
        Self {
            store,
            storage,
            provider,
            size,
            locks: NameLocks::default(),
        }
    }

    pub fn storage(&self) -> &ImageStorage {
        &self.storage
    }

    /// Return the stored image for `raw_name`, generating and recording one
    /// on a miss.
    pub async fn resolve(&self, raw_name: &str) -> Result<ResolvedImage, AppError> {
        let name = normalize_name(raw_name)?;

        if let Some(image_url) = self.store.cached_image(&name).await? {
            return Ok(hit(name, image_url));
        }

        let _guard = self.locks.lock(&name).await;

        // Another request may have generated it while we waited.
        if let Some(image_url) = self.store.cached_image(&name).await? {
            return Ok(hit(name, image_url));
        }

        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| AppError::Configuration("OPENAI_API_KEY missing".to_string()))?;

        let bytes = self.generate(provider.as_ref(), &name).await?;
        let image_url = self
            .storage
            .save_png(&bytes)
            .await
            .map_err(StoreError::from)?;

        match self.store.save_image(&name, &image_url).await? {
            ImageUpsert::Updated(id) => info!(%name, id, "attached generated image to existing plant"),
            ImageUpsert::Inserted(id) => info!(%name, id, "created plant for generated image"),
        }

        Ok(ResolvedImage {
            name,
            image_url,
            source: ImageSource::Generated,
        })
    }

    async fn generate(&self, provider: &dyn AiProvider, name: &str) -> Result<Vec<u8>, AppError> {
        let upstream = AppError::upstream("image generation");

        let payload = provider
            .generate_image(&image_prompt(name), self.size)
            .await
            .map_err(&upstream)?;

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| AiError::Parse(format!("image payload is not base64: {e}")))
            .and_then(|bytes| {
                if bytes.is_empty() {
                    Err(AiError::EmptyImage)
                } else {
                    Ok(bytes)
                }
            })
            .map_err(upstream)?;

        Ok(bytes)
    }
}

fn hit(name: String, image_url: String) -> ResolvedImage {
    debug!(%name, "image cache hit");
    ResolvedImage {
        name,
        image_url,
        source: ImageSource::Cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Tulsi ").unwrap(), "tulsi");
        assert!(matches!(normalize_name("   "), Err(AppError::Validation(_))));
        assert!(matches!(normalize_name(""), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_prompt_names_the_plant() {
        let prompt = image_prompt("monstera");
        assert!(prompt.contains("\"monstera\""));
        assert!(prompt.contains("No text, no watermark."));
    }

    #[test]
    fn test_resolved_image_wire_shape() {
        let resolved = ResolvedImage {
            name: "tulsi".into(),
            image_url: "http://localhost:5000/uploads/a.png".into(),
            source: ImageSource::Generated,
        };
        assert_eq!(
            serde_json::to_value(&resolved).unwrap(),
            serde_json::json!({
                "name": "tulsi",
                "imageUrl": "http://localhost:5000/uploads/a.png",
                "source": "generated"
            })
        );
    }

    #[tokio::test]
    async fn test_storage_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ImageStorage::new(dir.path().join("uploads"), "http://localhost:5000/");

        let first = storage.save_png(b"leaf").await.unwrap();
        let second = storage.save_png(b"leaf").await.unwrap();
        let other = storage.save_png(b"stem").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.starts_with("http://localhost:5000/uploads/"));
        assert!(first.ends_with(".png"));

        let files: Vec<_> = std::fs::read_dir(storage.dir()).unwrap().collect();
        assert_eq!(files.len(), 2);
        let stored = std::fs::read(storage.dir().join(ImageStorage::file_name(b"leaf"))).unwrap();
        assert_eq!(stored, b"leaf");
    }

    #[tokio::test]
    async fn test_name_locks_are_released() {
        let locks = NameLocks::default();
        {
            let _a = locks.lock("fern").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let locks = Arc::new(NameLocks::default());
        let holder = locks.lock("fern").await;

        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _guard = locks.lock("fern").await;
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        drop(holder);
        waiter.abort();
        let _ = waiter.await;
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_cancelled_before_holder_releases() {
        let locks = Arc::new(NameLocks::default());
        let holder = locks.lock("fern").await;

        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _guard = locks.lock("fern").await;
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(locks.len(), 1);

        drop(holder);
        assert!(locks.is_empty());
    }
}
