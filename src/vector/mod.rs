//! Vector similarity store boundary.
//!
//! The knowledge base is read-only at runtime; entries are seeded by an
//! offline step (`kb::seed`, the `--seed-kb` CLI mode).

pub mod pinecone;
pub mod unconfigured;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SuggestError;

pub use pinecone::PineconeIndex;
pub use unconfigured::Unconfigured;

/// A knowledge-base passage, stored by semantic embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseEntry {
    pub id: String,
    pub text: String,
}

/// Semantic top-k lookup over the knowledge base.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    /// Return the `k` entries most similar to `text`, best first.
    async fn top_k(&self, text: &str, k: usize) -> Result<Vec<KnowledgeBaseEntry>, SuggestError>;

    /// Batch-upsert entries (offline seeding only).
    async fn upsert(&self, entries: &[KnowledgeBaseEntry]) -> Result<(), SuggestError>;
}
