use crate::core::state::CoachConfig;
use crate::error::CoachError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the backend for `application/json` output when it supports it.
    pub json_response: bool,
}

impl GenerationParams {
    pub fn from_config(config: &CoachConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            json_response: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub system_instruction: Option<&'a str>,
    pub params: GenerationParams,
}

/// Text generation capability. Implementations return raw model text and map
/// every network, quota or timeout problem to [`CoachError::Transport`].
#[async_trait]
pub trait GenerationAdapter: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, CoachError>;
}

pub fn api_key_from_env() -> Result<String, CoachError> {
    env::var("GEMINI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            CoachError::Configuration("GEMINI_API_KEY is not set in .env or environment".into())
        })
}

/// Gemini `generateContent` over REST.
pub struct GeminiAdapter {
    api_key: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String, config: &CoachConfig) -> Self {
        Self {
            api_key,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn from_env(config: &CoachConfig) -> Result<Self, CoachError> {
        Ok(Self::new(api_key_from_env()?, config))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(request: &GenerationRequest<'_>) -> Value {
        let mut generation_config = json!({
            "temperature": request.params.temperature,
            "maxOutputTokens": request.params.max_output_tokens,
        });
        if request.params.json_response {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let mut payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation_config
        });
        if let Some(instruction) = request.system_instruction {
            payload["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
        }
        payload
    }

    async fn send(&self, request: &GenerationRequest<'_>) -> Result<String, CoachError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::payload(request))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await.unwrap_or_default();
            return Err(CoachError::Transport(format!(
                "Gemini status {}: {}",
                status, err_text
            )));
        }

        let body: Value = res.json().await?;
        extract_text(&body).ok_or_else(|| {
            CoachError::Transport(format!("Gemini response had no candidates: {}", body))
        })
    }
}

#[async_trait]
impl GenerationAdapter for GeminiAdapter {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, CoachError> {
        debug!(model = %self.model, prompt_chars = request.prompt.len(), "calling Gemini");
        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(model = %self.model, timeout = ?self.timeout, "Gemini call timed out");
                Err(CoachError::Transport(format!(
                    "Gemini did not answer within {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

/// Concatenated text parts of the first candidate. A candidate without parts
/// (e.g. blocked or empty output) yields an empty string; no candidate at all
/// yields `None`.
fn extract_text(body: &Value) -> Option<String> {
    let candidate = body.get("candidates")?.get(0)?;
    let parts = match candidate.get("content").and_then(|c| c.get("parts")) {
        Some(Value::Array(parts)) => parts,
        _ => return Some(String::new()),
    };
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
    )
}
