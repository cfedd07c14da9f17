//! Placeholder knowledge source for deployments without a vector store.

use async_trait::async_trait;

use crate::error::SuggestError;
use crate::vector::{KnowledgeBaseEntry, KnowledgeSearch};

/// Every lookup fails, so the suggestion pipeline degrades to empty
/// reply lists. Logged once at startup by the caller.
pub struct Unconfigured;

#[async_trait]
impl KnowledgeSearch for Unconfigured {
    async fn top_k(
        &self,
        _text: &str,
        _k: usize,
    ) -> Result<Vec<KnowledgeBaseEntry>, SuggestError> {
        Err(SuggestError::VectorQuery("vector store not configured".into()))
    }

    async fn upsert(&self, _entries: &[KnowledgeBaseEntry]) -> Result<(), SuggestError> {
        Err(SuggestError::VectorUpsert("vector store not configured".into()))
    }
}
