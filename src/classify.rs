//! Classification oracle client.
//!
//! `classify` is infallible by contract: classification is best-effort
//! and never blocks ingestion, so every failure mode — transport error,
//! malformed response, off-taxonomy label — resolves to the default
//! category instead of propagating.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ClassifyError;
use crate::llm::GenerativeModel;
use crate::model::Category;

/// Bodies are truncated to this many characters before submission to
/// bound oracle cost and latency. Signal past the cut is lost — a known
/// trade-off.
const MAX_BODY_CHARS: usize = 4000;

/// Classification oracle client.
pub struct Classifier {
    oracle: Arc<dyn GenerativeModel>,
}

#[derive(Debug, Deserialize)]
struct OracleVerdict {
    category: String,
}

impl Classifier {
    pub fn new(oracle: Arc<dyn GenerativeModel>) -> Self {
        Self { oracle }
    }

    /// Classify a message. Always returns a taxonomy value.
    ///
    /// An empty body short-circuits locally — the oracle is not called.
    pub async fn classify(&self, subject: &str, body: &str) -> Category {
        if body.trim().is_empty() {
            return Category::default();
        }

        match self.try_classify(subject, body).await {
            Ok(category) => {
                debug!(subject, category = category.label(), "Classified email");
                category
            }
            Err(e) => {
                warn!(subject, error = %e, "Classification failed, using default");
                Category::default()
            }
        }
    }

    async fn try_classify(&self, subject: &str, body: &str) -> Result<Category, ClassifyError> {
        let prompt = build_prompt(subject, body);
        let text = self
            .oracle
            .generate_json(&prompt, Some(verdict_schema()))
            .await?;

        let verdict: OracleVerdict = serde_json::from_str(&text)
            .map_err(|_| ClassifyError::MalformedResponse(text.clone()))?;

        Category::parse(&verdict.category)
            .ok_or(ClassifyError::UnknownLabel(verdict.category))
    }
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn build_prompt(subject: &str, body: &str) -> String {
    let labels = Category::ALL.map(|c| c.label()).join(", ");
    format!(
        "You are an expert email classifier.\n\
         Analyze the email's subject and body to classify it into ONE of \
         the following categories: {labels}.\n\
         The JSON output should follow this schema: {{\"category\": \"CATEGORY_NAME\"}}.\n\n\
         Email to classify:\n\
         Subject: {subject}\n\
         Body: {body}",
        labels = labels,
        subject = subject,
        body = truncate_chars(body, MAX_BODY_CHARS),
    )
}

fn verdict_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "description": format!("One of: {}", Category::ALL.map(|c| c.label()).join(", ")),
            }
        },
        "required": ["category"]
    })
}
