//! Reply-suggestion pipeline.
//!
//! Stateless per request: vector top-k lookup → prompt composition →
//! generative oracle → defensively parsed reply list. Never raises to
//! the caller — any step's failure yields an empty list.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SuggestError;
use crate::llm::GenerativeModel;
use crate::vector::KnowledgeSearch;

/// Knowledge-base passages retrieved per request.
const TOP_K: usize = 3;

/// Maximum replies returned.
const MAX_REPLIES: usize = 3;

/// Email bodies are truncated in the prompt, same bound as the
/// classifier.
const MAX_BODY_CHARS: usize = 4000;

pub struct Suggester {
    knowledge: Arc<dyn KnowledgeSearch>,
    oracle: Arc<dyn GenerativeModel>,
}

#[derive(Debug, Deserialize)]
struct OracleReplies {
    #[serde(default)]
    replies: Vec<String>,
}

impl Suggester {
    pub fn new(knowledge: Arc<dyn KnowledgeSearch>, oracle: Arc<dyn GenerativeModel>) -> Self {
        Self { knowledge, oracle }
    }

    /// Suggest up to three replies for an email.
    ///
    /// Empty body short-circuits to an empty list without touching the
    /// vector store or the oracle.
    pub async fn suggest_replies(&self, subject: &str, body: &str) -> Vec<String> {
        if body.trim().is_empty() {
            return Vec::new();
        }

        match self.try_suggest(subject, body).await {
            Ok(replies) => {
                debug!(subject, count = replies.len(), "Suggested replies");
                replies
            }
            Err(e) => {
                warn!(subject, error = %e, "Reply suggestion failed");
                Vec::new()
            }
        }
    }

    async fn try_suggest(&self, subject: &str, body: &str) -> Result<Vec<String>, SuggestError> {
        let hits = self.knowledge.top_k(body, TOP_K).await?;
        let snippets = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = build_prompt(subject, body, &snippets);
        let text = self.oracle.generate_json(&prompt, None).await?;

        // Best-effort schema: the oracle is asked for {"replies": [...]}
        // but the shape is not enforced server-side.
        let parsed: OracleReplies = serde_json::from_str(&text)
            .map_err(|_| SuggestError::MalformedReplies(text.clone()))?;

        Ok(parsed
            .replies
            .into_iter()
            .filter(|r| !r.trim().is_empty())
            .take(MAX_REPLIES)
            .collect())
    }
}

fn build_prompt(subject: &str, body: &str, snippets: &str) -> String {
    let body = match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    };
    format!(
        "You are an expert email assistant for a sales team.\n\
         Based on the email content and the provided knowledge base \
         snippets, suggest up to 3 concise and relevant reply options.\n\
         If none of the snippets are relevant, suggest a polite decline \
         response.\n\
         Email to respond to:\n\
         Subject: {subject}\n\
         Body: {body}\n\
         Knowledge Base Snippets:\n\
         {snippets}\n\
         Provide the responses in a JSON object like: \
         {{\"replies\": [\"Option 1\", \"Option 2\", \"Option 3\"]}}"
    )
}
