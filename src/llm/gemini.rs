//! Gemini `generateContent` REST client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::GenerativeModel;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Request timeout — oracle calls are best-effort and must not pin an
/// account task for long.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

pub struct GeminiModel {
    client: reqwest::Client,
    api_key: SecretString,
    api_base: String,
    model: String,
}

impl GeminiModel {
    pub fn new(api_key: SecretString, model: &str) -> Self {
        Self::with_base(api_key, model, API_BASE)
    }

    /// Point the client at a non-default endpoint (tests).
    pub fn with_base(api_key: SecretString, model: &str, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_json(
        &self,
        prompt: &str,
        schema: Option<serde_json::Value>,
    ) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base, self.model
        );

        let payload = ApiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".into(),
                response_schema: schema,
            },
        };

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                model: self.model.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus {
                model: self.model.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body: ApiResponse = resp.json().await.map_err(|e| LlmError::RequestFailed {
            model: self.model.clone(),
            reason: e.to_string(),
        })?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyCompletion {
                model: self.model.clone(),
            })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
