//! Generative Backend - The Single External Call
//!
//! The orchestrator only sees the `GenerativeBackend` trait, so primary,
//! fallback and scripted test backends are interchangeable.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::EngineConfig;

#[derive(Debug, Clone)]
pub struct BackendRequest<'a> {
    pub model: &'a str,
    pub system_instruction: &'a str,
    pub instruction: &'a str,
    pub temperature: f32,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("collaborator credential not configured")]
    MissingCredential,

    #[error("collaborator request failed: {0}")]
    Transport(String),

    #[error("collaborator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("collaborator response could not be decoded: {0}")]
    Decode(String),
}

pub trait GenerativeBackend: Send + Sync {
    fn generate(&self, request: &BackendRequest<'_>) -> Result<String, BackendError>;
}

/// Gemini `generateContent` over blocking HTTP.
pub struct GeminiBackend {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn from_config(config: &EngineConfig) -> Result<Self, BackendError> {
        let api_key = config.api_key.clone().ok_or(BackendError::MissingCredential)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base_url.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

impl GenerativeBackend for GeminiBackend {
    fn generate(&self, request: &BackendRequest<'_>) -> Result<String, BackendError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.instruction }] }],
            "generationConfig": { "temperature": request.temperature },
        });

        tracing::debug!(model = request.model, temperature = request.temperature, "calling collaborator");
        let response = self
            .client
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(parsed.text().trim().to_string())
    }
}
