//! Indexing sink — searchable email store behind the `EmailStore` seam.
//!
//! Two implementations: `ElasticStore` (the real index) and
//! `MemoryStore` (tests and ES-less local runs). Writes are idempotent
//! upserts keyed by [`EmailRecord::doc_id`]; repeated writes of the
//! same identity converge to the latest (last-write-wins, no
//! versioning).

pub mod elastic;
pub mod memory;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::model::{Category, EmailRecord};

pub use elastic::ElasticStore;
pub use memory::MemoryStore;

/// Fixed page size for all list/search queries.
pub const PAGE_SIZE: usize = 100;

/// Exact-term filters for listing. All present fields must match.
#[derive(Debug, Clone, Default)]
pub struct EmailFilter {
    pub category: Option<Category>,
    pub account_id: Option<String>,
    pub folder: Option<String>,
}

/// One page of results, newest first.
#[derive(Debug, Clone)]
pub struct EmailPage {
    pub records: Vec<EmailRecord>,
    /// Total matching documents across all pages.
    pub total: usize,
}

/// The searchable email store.
#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Idempotently create the backing index. Called once at startup;
    /// an existing index is left untouched.
    async fn ensure_index(&self) -> Result<(), IndexError>;

    /// Write or overwrite by the record's composite identity.
    async fn upsert(&self, record: &EmailRecord) -> Result<(), IndexError>;

    /// Free-text search over subject, body, and sender.
    async fn search(&self, query: &str, page: usize) -> Result<EmailPage, IndexError>;

    /// Filtered listing; an empty filter lists everything.
    async fn list(&self, filter: &EmailFilter, page: usize) -> Result<EmailPage, IndexError>;
}
