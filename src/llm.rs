//! Language model client for answer synthesis.
//!
//! Defines the [`LanguageModel`] capability trait and the Gemini-backed
//! implementation. This is the one place where document text crosses the
//! process boundary: retrieved context and the conversation travel to the
//! provider as part of the generation request.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::conversation::{ConversationTurn, Role};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Language model failure.
#[derive(Debug)]
pub enum LlmError {
    /// Transient provider outage. Safe to retry.
    Unavailable(String),
    /// Non-retryable API error (bad request, auth, malformed response).
    Api(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Unavailable(e) => write!(f, "language model unavailable: {}", e),
            LlmError::Api(e) => write!(f, "language model API error: {}", e),
        }
    }
}

impl std::error::Error for LlmError {}

/// One answer-generation request: system instructions, assembled context,
/// prior turns, and the new user query.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub context: String,
    pub history: Vec<ConversationTurn>,
    pub query: String,
}

/// Remote answer synthesis.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

// ============ Gemini ============

/// Google Gemini client using the `generateContent` REST endpoint.
/// `GEMINI_API_KEY` must be in the environment.
pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LlmError::Api("GEMINI_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_retries: config.max_retries,
            client,
        })
    }
}

fn build_request_body(request: &GenerationRequest) -> serde_json::Value {
    // Retrieved context rides with the system instructions; the history
    // and the new query form the contents list.
    let system_text = if request.context.is_empty() {
        request.system.clone()
    } else {
        format!("{}\n\n{}", request.system, request.context)
    };

    let mut contents: Vec<serde_json::Value> = request
        .history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            serde_json::json!({ "role": role, "parts": [{ "text": turn.text }] })
        })
        .collect();

    contents.push(serde_json::json!({
        "role": "user",
        "parts": [{ "text": request.query }],
    }));

    serde_json::json!({
        "systemInstruction": { "parts": [{ "text": system_text }] },
        "contents": contents,
    })
}

fn parse_response(json: &serde_json::Value) -> Result<String, LlmError> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| LlmError::Api("invalid response: no candidates".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(LlmError::Api("invalid response: empty answer".into()));
    }

    Ok(text)
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = build_request_body(request);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| LlmError::Api(e.to_string()))?;
                        return parse_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(LlmError::Unavailable(format!(
                            "{}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(LlmError::Api(format!("{}: {}", status, body_text)));
                }
                Err(e) => {
                    last_err = Some(LlmError::Unavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LlmError::Unavailable("retries exhausted".into())))
    }
}
