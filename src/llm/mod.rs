//! Generative oracle integration.
//!
//! Both oracles the pipeline consumes — the classification oracle and
//! the suggestion oracle — share one transport contract: prompt in,
//! JSON text out. `gemini.rs` implements it over the Gemini
//! `generateContent` REST API; tests implement it with canned stubs.

pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::LlmError;

pub use gemini::GeminiModel;

/// A generative model that answers prompts with JSON text.
///
/// `schema` constrains the response shape where the backend supports
/// it (classification); `None` requests free-form JSON (suggestions,
/// which must be defensively parsed regardless).
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier for logging.
    fn model_name(&self) -> &str;

    /// Submit a prompt; returns the raw JSON completion text.
    async fn generate_json(
        &self,
        prompt: &str,
        schema: Option<serde_json::Value>,
    ) -> Result<String, LlmError>;
}

/// Configuration for creating a generative model client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
}

/// Create the oracle client from configuration.
pub fn create_model(config: &LlmConfig) -> Arc<dyn GenerativeModel> {
    tracing::info!(model = %config.model, "Using Gemini oracle");
    Arc::new(GeminiModel::new(config.api_key.clone(), &config.model))
}
