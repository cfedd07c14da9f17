//! Pinecone text-records client (integrated-embedding index).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::error::SuggestError;
use crate::vector::{KnowledgeBaseEntry, KnowledgeSearch};

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: SecretString,
    host: String,
    namespace: String,
}

impl PineconeIndex {
    pub fn new(api_key: SecretString, host: &str, namespace: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            host: host.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn records_url(&self, op: &str) -> String {
        format!(
            "{}/records/namespaces/{}/{op}",
            self.host, self.namespace
        )
    }
}

#[async_trait]
impl KnowledgeSearch for PineconeIndex {
    async fn top_k(&self, text: &str, k: usize) -> Result<Vec<KnowledgeBaseEntry>, SuggestError> {
        let resp = self
            .client
            .post(self.records_url("search"))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&json!({
                "query": {
                    "top_k": k,
                    "inputs": { "text": text }
                }
            }))
            .send()
            .await
            .map_err(|e| SuggestError::VectorQuery(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SuggestError::VectorQuery(format!("status {status}: {body}")));
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SuggestError::VectorQuery(e.to_string()))?;

        Ok(body
            .result
            .hits
            .into_iter()
            .map(|hit| KnowledgeBaseEntry {
                id: hit.id,
                text: hit.fields.text.unwrap_or_default(),
            })
            .collect())
    }

    async fn upsert(&self, entries: &[KnowledgeBaseEntry]) -> Result<(), SuggestError> {
        // Upsert takes newline-delimited JSON records.
        let mut body = String::new();
        for entry in entries {
            let line = serde_json::to_string(&json!({ "_id": entry.id, "text": entry.text }))
                .map_err(|e| SuggestError::VectorUpsert(e.to_string()))?;
            body.push_str(&line);
            body.push('\n');
        }

        let resp = self
            .client
            .post(self.records_url("upsert"))
            .header("Api-Key", self.api_key.expose_secret())
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| SuggestError::VectorUpsert(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SuggestError::VectorUpsert(format!(
                "status {status}: {body}"
            )));
        }
        Ok(())
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    fields: HitFields,
}

#[derive(Debug, Default, Deserialize)]
struct HitFields {
    text: Option<String>,
}
