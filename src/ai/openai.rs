//! OpenAI-compatible provider over plain HTTP.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use super::{AiError, AiProvider, ImageSize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    chat_model: String,
    image_model: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("image_model", &self.image_model)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, AiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AiError::NotConfigured("OPENAI_API_KEY missing".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::NotConfigured(e.to_string()))?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            image_model: None,
            retry: RetryPolicy::default(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        self.image_model = model;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        self.retry.run(|| self.send_once(&url, body)).await
    }

    async fn send_once<B, T>(&self, url: &str, body: &B) -> Result<T, AiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| AiError::Parse(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    n: u32,
    size: ImageSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn generate_image(&self, prompt: &str, size: ImageSize) -> Result<String, AiError> {
        let model = self.image_model.as_deref();
        // gpt-image models always answer with base64 and reject the parameter
        let response_format = match model {
            Some(m) if m.starts_with("gpt-image") => None,
            _ => Some("b64_json"),
        };

        let request = ImageRequest {
            model,
            prompt,
            n: 1,
            size,
            response_format,
        };

        let response: ImageResponse = self.post_json("images/generations", &request).await?;

        response
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .filter(|b64| !b64.trim().is_empty())
            .ok_or(AiError::EmptyImage)
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.chat_model,
            temperature: 0.3,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response: ChatResponse = self.post_json("chat/completions", &request).await?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "{}".to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use serde_json::{json, Value};
    use warp::http::StatusCode;
    use warp::Filter;

    /// Local stand-in for the API: answers every POST with `status` and
    /// `body` after `delay`, counting requests.
    fn mock_api(status: u16, body: Value, delay: Duration) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let route = warp::post().and_then(move || {
            let counter = counter.clone();
            let body = body.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                let status = StatusCode::from_u16(status).unwrap();
                Ok::<_, warp::Rejection>(warp::reply::with_status(warp::reply::json(&body), status))
            }
        });

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (format!("http://{addr}/v1"), hits)
    }

    fn client(base_url: &str, timeout: Duration) -> OpenAiProvider {
        OpenAiProvider::new("sk-test", timeout)
            .unwrap()
            .with_base_url(base_url)
            .with_retry(RetryPolicy::new(2, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_image_payload_returned() {
        let (base, hits) = mock_api(200, json!({ "data": [{ "b64_json": "aGVsbG8=" }] }), Duration::ZERO);
        let payload = client(&base, DEFAULT_TIMEOUT)
            .generate_image("a fern", ImageSize::Square)
            .await
            .unwrap();
        assert_eq!(payload, "aGVsbG8=");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_data_is_empty_image() {
        let (base, hits) = mock_api(200, json!({ "data": [] }), Duration::ZERO);
        let err = client(&base, DEFAULT_TIMEOUT)
            .generate_image("a fern", ImageSize::Square)
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::EmptyImage));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_b64_json_is_empty_image() {
        let (base, _) = mock_api(
            200,
            json!({ "data": [{ "url": "https://images.test/fern.png" }] }),
            Duration::ZERO,
        );
        let err = client(&base, DEFAULT_TIMEOUT)
            .generate_image("a fern", ImageSize::Square)
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::EmptyImage));
    }

    #[tokio::test]
    async fn test_error_status_is_api_error_without_retry() {
        let (base, hits) = mock_api(
            400,
            json!({ "error": { "message": "Invalid size", "type": "invalid_request_error" } }),
            Duration::ZERO,
        );
        let err = client(&base, DEFAULT_TIMEOUT)
            .generate_image("a fern", ImageSize::Square)
            .await
            .unwrap_err();
        match err {
            AiError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid size");
            }
            other => panic!("expected api error, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let (base, hits) = mock_api(200, json!({ "choices": [] }), Duration::from_secs(2));
        let err = client(&base, Duration::from_millis(100))
            .complete("system", "user")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Timeout(_)));
        assert!(!err.is_transient());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried() {
        // Reserve a port, then free it so nothing listens there.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let provider = OpenAiProvider::new("sk-test", DEFAULT_TIMEOUT)
            .unwrap()
            .with_base_url(format!("http://127.0.0.1:{port}/v1"))
            .with_retry(RetryPolicy::new(2, Duration::from_millis(50)));

        let started = Instant::now();
        let err = provider.complete("system", "user").await.unwrap_err();

        assert!(err.is_transient(), "{err:?}");
        // Two retries wait 50ms and 100ms.
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_chat_content_returned() {
        let (base, _) = mock_api(
            200,
            json!({ "choices": [{ "message": { "content": "{\"soil\": \"Loamy\"}" } }] }),
            Duration::ZERO,
        );
        let content = client(&base, DEFAULT_TIMEOUT)
            .complete("system", "user")
            .await
            .unwrap();
        assert_eq!(content, r#"{"soil": "Loamy"}"#);
    }

    #[tokio::test]
    async fn test_missing_chat_content_defaults_to_empty_object() {
        let (base, _) = mock_api(200, json!({ "choices": [] }), Duration::ZERO);
        let content = client(&base, DEFAULT_TIMEOUT)
            .complete("system", "user")
            .await
            .unwrap();
        assert_eq!(content, "{}");
    }

    #[test]
    fn test_rejects_blank_key() {
        let err = OpenAiProvider::new("  ", DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, AiError::NotConfigured(_)));
    }

    #[test]
    fn test_image_request_shape() {
        let request = ImageRequest {
            model: None,
            prompt: "a fern",
            n: 1,
            size: ImageSize::Portrait,
            response_format: Some("b64_json"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prompt": "a fern",
                "n": 1,
                "size": "1024x1536",
                "response_format": "b64_json"
            })
        );
    }

    #[test]
    fn test_error_body_message_extracted() {
        let body = r#"{"error":{"message":"Invalid size","type":"invalid_request_error"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "Invalid size");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = OpenAiProvider::new("sk-test", DEFAULT_TIMEOUT)
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }
}
