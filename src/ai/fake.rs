//! Fake provider for testing.
//!
//! Returns canned payloads and counts calls, so tests can assert whether
//! the network would have been touched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::{AiError, AiProvider, ImageSize};

/// Bytes served as the generated image unless a test overrides them.
pub const FAKE_IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-plant-image";

#[derive(Debug)]
pub struct FakeProvider {
    image: Result<String, String>,
    chat: Result<String, String>,
    delay: Duration,
    image_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            image: Ok(BASE64.encode(FAKE_IMAGE_BYTES)),
            chat: Ok("{}".to_string()),
            delay: Duration::ZERO,
            image_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` (base64 encoded) from `generate_image`.
    pub fn with_image_bytes(mut self, bytes: &[u8]) -> Self {
        self.image = Ok(BASE64.encode(bytes));
        self
    }

    /// Serve a raw payload string, valid base64 or not.
    pub fn with_image_payload(mut self, payload: &str) -> Self {
        self.image = Ok(payload.to_string());
        self
    }

    /// Make `generate_image` fail with an API error carrying `message`.
    pub fn with_image_failure(mut self, message: &str) -> Self {
        self.image = Err(message.to_string());
        self
    }

    /// Return `response` verbatim from `complete`.
    pub fn with_chat_response(mut self, response: &str) -> Self {
        self.chat = Ok(response.to_string());
        self
    }

    pub fn with_chat_failure(mut self, message: &str) -> Self {
        self.chat = Err(message.to_string());
        self
    }

    /// Sleep before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// Every prompt seen so far, image and chat alike.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn record(&self, prompt: &str) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
    }
}

fn canned(result: &Result<String, String>) -> Result<String, AiError> {
    result.clone().map_err(|message| AiError::Api {
        status: 500,
        message,
    })
}

#[async_trait]
impl AiProvider for FakeProvider {
    async fn generate_image(&self, prompt: &str, _size: ImageSize) -> Result<String, AiError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.record(prompt);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        canned(&self.image)
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String, AiError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.record(user);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        canned(&self.chat)
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
