//! In-memory `EmailStore` — tests and local runs without Elasticsearch.
//!
//! A `BTreeMap` keyed by doc id behind a sync `Mutex`; guards are never
//! held across awaits. Write-light workload, so serialized access is
//! fine.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::model::EmailRecord;
use crate::store::{EmailFilter, EmailPage, EmailStore, PAGE_SIZE};

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, EmailRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch one record by doc id.
    pub fn get(&self, doc_id: &str) -> Option<EmailRecord> {
        self.docs
            .lock()
            .expect("store mutex poisoned")
            .get(doc_id)
            .cloned()
    }

    fn page_of(mut matches: Vec<EmailRecord>, page: usize) -> EmailPage {
        // Newest first, matching the real index's sort order.
        matches.sort_by(|a, b| b.date.cmp(&a.date));
        let total = matches.len();
        let records = matches
            .into_iter()
            .skip(page * PAGE_SIZE)
            .take(PAGE_SIZE)
            .collect();
        EmailPage { records, total }
    }
}

#[async_trait]
impl EmailStore for MemoryStore {
    async fn ensure_index(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, record: &EmailRecord) -> Result<(), IndexError> {
        self.docs
            .lock()
            .expect("store mutex poisoned")
            .insert(record.doc_id(), record.clone());
        Ok(())
    }

    async fn search(&self, query: &str, page: usize) -> Result<EmailPage, IndexError> {
        let needle = query.to_lowercase();
        let matches: Vec<EmailRecord> = self
            .docs
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|r| {
                r.subject.to_lowercase().contains(&needle)
                    || r.body_text.to_lowercase().contains(&needle)
                    || r.from.address.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        Ok(Self::page_of(matches, page))
    }

    async fn list(&self, filter: &EmailFilter, page: usize) -> Result<EmailPage, IndexError> {
        let matches: Vec<EmailRecord> = self
            .docs
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|r| {
                filter.category.is_none_or(|c| r.category == Some(c))
                    && filter.account_id.as_ref().is_none_or(|a| &r.account_id == a)
                    && filter.folder.as_ref().is_none_or(|f| &r.folder == f)
            })
            .cloned()
            .collect();
        Ok(Self::page_of(matches, page))
    }
}
