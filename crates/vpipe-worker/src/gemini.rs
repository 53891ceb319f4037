//! Gemini vision client.
//!
//! Sends the key frames as inline JPEG parts in a single `generateContent`
//! call, walking a model fallback list until one answers.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vpipe_media::Frame;
use vpipe_models::TokenUsage;

use crate::error::{WorkerError, WorkerResult};
use crate::provider::{VisionProvider, VisionResponse};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODELS: [&str; 3] = ["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// USD per million tokens.
const INPUT_PRICE_PER_M: f64 = 0.30;
const OUTPUT_PRICE_PER_M: f64 = 2.50;

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Tried in order until one succeeds
    pub models: Vec<String>,
    /// Per-request timeout
    pub timeout: Duration,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(120),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| WorkerError::config_error("GEMINI_API_KEY not set"))?;
        let mut config = Self::new(api_key);

        if let Ok(models) = std::env::var("GEMINI_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !models.is_empty() {
                config.models = models;
            }
        }
        if let Some(secs) = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> WorkerResult<Self> {
        if config.models.is_empty() {
            return Err(WorkerError::config_error("no Gemini models configured"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> WorkerResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn build_request(frames: &[Frame], prompt: &str) -> GenerateRequest {
        let mut parts: Vec<Part> = frames
            .iter()
            .map(|frame| Part::Inline {
                inline_data: InlineData {
                    mime_type: "image/jpeg",
                    data: BASE64.encode(&frame.image),
                },
            })
            .collect();
        parts.push(Part::Text {
            text: prompt.to_string(),
        });

        GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.4,
            },
        }
    }

    async fn call_model(&self, model: &str, request: &GenerateRequest) -> WorkerResult<VisionResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WorkerError::Timeout(self.config.timeout.as_secs())
                } else {
                    WorkerError::provider(None, format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::provider(Some(status.as_u16()), body));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::provider(None, format!("invalid response body: {}", e)))?;

        let text: String = body
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(WorkerError::provider(Some(status.as_u16()), "no content in response"));
        }

        let usage = body
            .usage_metadata
            .map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(VisionResponse {
            text,
            usage,
            model: body.model_version.unwrap_or_else(|| model.to_string()),
        })
    }
}

#[async_trait]
impl VisionProvider for GeminiClient {
    async fn analyze(&self, frames: &[Frame], prompt: &str) -> WorkerResult<VisionResponse> {
        let request = Self::build_request(frames, prompt);
        let mut last_error = None;

        for model in &self.config.models {
            debug!(model = %model, frames = frames.len(), "Calling Gemini");
            match self.call_model(model, &request).await {
                Ok(response) => {
                    info!(
                        model = %response.model,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "Gemini analysis received"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(model = %model, "Gemini model failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WorkerError::ai_failed("all Gemini models failed")))
    }

    fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        usage.input_tokens as f64 / 1_000_000.0 * INPUT_PRICE_PER_M
            + usage.output_tokens as f64 / 1_000_000.0 * OUTPUT_PRICE_PER_M
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn frames() -> Vec<Frame> {
        vec![Frame::new(vec![0xFF, 0xD8, 0xFF], 5.0), Frame::new(vec![0xFF, 0xD8], 15.0)]
    }

    fn client(server: &MockServer, models: &[&str]) -> GeminiClient {
        let config = GeminiConfig::new("test-key")
            .with_base_url(server.uri())
            .with_models(models.iter().map(|m| m.to_string()).collect());
        GeminiClient::new(config).unwrap()
    }

    fn ok_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }],
            "usageMetadata": { "promptTokenCount": 1200, "candidatesTokenCount": 300 },
            "modelVersion": "gemini-2.5-flash"
        })
    }

    #[tokio::test]
    async fn test_analyze_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{\"viral_score\": 7}")))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server, &["gemini-2.5-flash"])
            .analyze(&frames(), "prompt")
            .await
            .unwrap();

        assert_eq!(response.text, "{\"viral_score\": 7}");
        assert_eq!(response.usage.input_tokens, 1200);
        assert_eq!(response.usage.output_tokens, 300);
        assert_eq!(response.model, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_request_carries_inline_frames_and_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{}")))
            .mount(&server)
            .await;

        client(&server, &["m"]).analyze(&frames(), "describe").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], BASE64.encode([0xFF, 0xD8, 0xFF]));
        assert_eq!(parts[2]["text"], "describe");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/primary:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/backup:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
            })))
            .mount(&server)
            .await;

        let response = client(&server, &["primary", "backup"])
            .analyze(&frames(), "prompt")
            .await
            .unwrap();

        assert_eq!(response.text, "ok");
        assert_eq!(response.model, "backup");
        assert_eq!(response.usage, TokenUsage::default());
    }

    #[tokio::test]
    async fn test_last_error_is_returned_when_all_models_fail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = client(&server, &["a", "b"])
            .analyze(&frames(), "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Provider { status: Some(429), .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = client(&server, &["m"]).analyze(&frames(), "p").await.unwrap_err();
        assert!(matches!(err, WorkerError::Provider { .. }));
    }

    #[test]
    fn test_estimate_cost() {
        let client = GeminiClient::new(GeminiConfig::new("k")).unwrap();
        let cost = client.estimate_cost(&TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
        });
        assert!((cost - 2.80).abs() < 1e-9);
    }

    #[test]
    fn test_empty_model_list_is_rejected() {
        let config = GeminiConfig::new("k").with_models(Vec::new());
        assert!(matches!(GeminiClient::new(config), Err(WorkerError::ConfigError(_))));
    }
}
