//! Elasticsearch-backed `EmailStore` over the document REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::IndexError;
use crate::model::EmailRecord;
use crate::store::{EmailFilter, EmailPage, EmailStore, PAGE_SIZE};

pub struct ElasticStore {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl ElasticStore {
    pub fn new(base_url: &str, index: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        }
    }

    /// Ping the cluster. Startup logs and continues on failure — the
    /// process must come up even when the index is unreachable.
    pub async fn ping(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "Elasticsearch ping rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Elasticsearch unreachable");
                false
            }
        }
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index)
    }

    async fn run_search(&self, body: serde_json::Value) -> Result<EmailPage, IndexError> {
        let resp = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IndexError::BadStatus {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        Ok(EmailPage {
            records: body.hits.hits.into_iter().map(|h| h.source).collect(),
            total: body.hits.total.value,
        })
    }
}

#[async_trait]
impl EmailStore for ElasticStore {
    async fn ensure_index(&self) -> Result<(), IndexError> {
        let head = self
            .client
            .head(self.index_url())
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        if head.status().is_success() {
            info!(index = %self.index, "Index exists");
            return Ok(());
        }

        let create = self
            .client
            .put(self.index_url())
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = create.status();
        if !status.is_success() {
            return Err(IndexError::BadStatus {
                status: status.as_u16(),
                body: create.text().await.unwrap_or_default(),
            });
        }
        info!(index = %self.index, "Created index");
        Ok(())
    }

    async fn upsert(&self, record: &EmailRecord) -> Result<(), IndexError> {
        let id = record.doc_id();
        let resp = self
            .client
            .put(format!("{}/_doc/{id}", self.index_url()))
            .json(record)
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IndexError::BadStatus {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn search(&self, query: &str, page: usize) -> Result<EmailPage, IndexError> {
        self.run_search(json!({
            "from": page * PAGE_SIZE,
            "size": PAGE_SIZE,
            "sort": [{ "date": { "order": "desc" } }],
            "query": {
                "multi_match": {
                    "query": query,
                    "fields": ["subject", "body_text", "from.address", "from.name"]
                }
            }
        }))
        .await
    }

    async fn list(&self, filter: &EmailFilter, page: usize) -> Result<EmailPage, IndexError> {
        let mut must = Vec::new();
        if let Some(category) = filter.category {
            must.push(json!({ "term": { "category.keyword": category.label() } }));
        }
        if let Some(account) = &filter.account_id {
            must.push(json!({ "term": { "account_id.keyword": account } }));
        }
        if let Some(folder) = &filter.folder {
            must.push(json!({ "term": { "folder.keyword": folder } }));
        }

        let query = if must.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "bool": { "must": must } })
        };

        self.run_search(json!({
            "from": page * PAGE_SIZE,
            "size": PAGE_SIZE,
            "sort": [{ "date": { "order": "desc" } }],
            "query": query
        }))
        .await
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    total: Total,
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Total {
    value: usize,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: EmailRecord,
}
