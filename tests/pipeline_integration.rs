//! Integration tests for the ingestion pipeline + HTTP surface.
//!
//! Each test wires a scripted mail session and a stub oracle into the
//! real account task, stands up the Axum router on a random port, and
//! exercises the REST contract with a real HTTP client.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;

use onebox::classify::Classifier;
use onebox::config::{AccountConfig, SyncConfig};
use onebox::error::{LlmError, MailError, SuggestError};
use onebox::http::routes;
use onebox::llm::GenerativeModel;
use onebox::mail::{MailConnector, MailEvent, MailSession, RawMail};
use onebox::notify::Notifier;
use onebox::store::{EmailStore, MemoryStore};
use onebox::suggest::Suggester;
use onebox::sync::account::AccountTask;
use onebox::vector::{KnowledgeBaseEntry, KnowledgeSearch};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Stubs ───────────────────────────────────────────────────────────

/// Stub oracle serving both pipelines: schema-constrained calls are
/// classification verdicts, free-form calls are reply suggestions.
struct StubOracle {
    category: &'static str,
}

#[async_trait]
impl GenerativeModel for StubOracle {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn generate_json(
        &self,
        _prompt: &str,
        schema: Option<Value>,
    ) -> Result<String, LlmError> {
        if schema.is_some() {
            Ok(format!(r#"{{"category":"{}"}}"#, self.category))
        } else {
            Ok(r#"{"replies":["Happy to set up a call.","Here is our pricing page."]}"#.to_string())
        }
    }
}

struct StubKnowledge;

#[async_trait]
impl KnowledgeSearch for StubKnowledge {
    async fn top_k(
        &self,
        _text: &str,
        k: usize,
    ) -> Result<Vec<KnowledgeBaseEntry>, SuggestError> {
        Ok((0..k)
            .map(|i| KnowledgeBaseEntry {
                id: format!("kb-{i}"),
                text: format!("passage {i}"),
            })
            .collect())
    }

    async fn upsert(&self, _entries: &[KnowledgeBaseEntry]) -> Result<(), SuggestError> {
        Ok(())
    }
}

/// Scripted session: a fixed set of dated messages plus an event queue
/// for the listening path.
struct ScriptedSession {
    mails: Vec<(RawMail, DateTime<Utc>)>,
    events: tokio::sync::mpsc::UnboundedReceiver<MailEvent>,
}

#[async_trait]
impl MailSession for ScriptedSession {
    async fn fetch_since(&mut self, since: DateTime<Utc>) -> Result<Vec<RawMail>, MailError> {
        Ok(self
            .mails
            .iter()
            .filter(|(_, date)| *date >= since)
            .map(|(raw, _)| raw.clone())
            .collect())
    }

    async fn fetch_newest(&mut self) -> Result<Option<RawMail>, MailError> {
        Ok(self.mails.last().map(|(raw, _)| raw.clone()))
    }

    async fn wait_for_new(&mut self) -> Result<MailEvent, MailError> {
        self.events.recv().await.ok_or(MailError::Closed)
    }
}

/// Hands out its single scripted session on the first connect.
struct ScriptedConnector {
    session: StdMutex<Option<ScriptedSession>>,
}

#[async_trait]
impl MailConnector for ScriptedConnector {
    async fn connect(
        &self,
        _account: &AccountConfig,
        _mailbox: &str,
    ) -> Result<Box<dyn MailSession>, MailError> {
        match self.session.lock().expect("connector mutex poisoned").take() {
            Some(session) => Ok(Box::new(session)),
            None => Err(MailError::Closed),
        }
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

fn raw_mail(uid: u32, date: DateTime<Utc>, subject: &str, body: &str) -> (RawMail, DateTime<Utc>) {
    let bytes = format!(
        "From: lead@example.com\r\nSubject: {subject}\r\nDate: {}\r\n\r\n{body}\r\n",
        date.to_rfc2822()
    )
    .into_bytes();
    (RawMail { uid, bytes }, date)
}

fn account() -> AccountConfig {
    AccountConfig {
        id: "acct".into(),
        host: "imap.example.com".into(),
        port: 993,
        secure: true,
        user: "u@example.com".into(),
        password: SecretString::from("pw"),
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        backfill_delay: Duration::ZERO,
        event_delay: Duration::ZERO,
        reconnect_delay: Duration::from_millis(10),
        ..SyncConfig::default()
    }
}

fn scripted(
    mails: Vec<(RawMail, DateTime<Utc>)>,
) -> (ScriptedSession, tokio::sync::mpsc::UnboundedSender<MailEvent>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (ScriptedSession { mails, events: rx }, tx)
}

fn classifier(category: &'static str) -> Arc<Classifier> {
    Arc::new(Classifier::new(Arc::new(StubOracle { category })))
}

/// Start the router over `store` on a random port, return the base URL.
async fn start_server(store: Arc<MemoryStore>) -> String {
    let suggester = Arc::new(Suggester::new(
        Arc::new(StubKnowledge),
        Arc::new(StubOracle {
            category: "Interested",
        }),
    ));
    let app = routes(store as Arc<dyn EmailStore>, suggester);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn backfill(store: Arc<MemoryStore>, category: &'static str, mut session: ScriptedSession) {
    let (_tx, rx) = watch::channel(false);
    let task = AccountTask::new(
        account(),
        fast_config(),
        Arc::new(ScriptedConnector {
            session: StdMutex::new(None),
        }),
        classifier(category),
        store,
        Arc::new(Notifier::new(None, None)),
        rx,
    );
    task.backfill(&mut session).await.unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn ingested_mail_is_queryable_over_http() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let (session, _events) = scripted(vec![
        raw_mail(1, now - ChronoDuration::days(2), "Pricing question", "How much is the pro tier?"),
        raw_mail(2, now - ChronoDuration::days(1), "Demo request", "Can we see a demo?"),
    ]);
    backfill(store.clone(), "Interested", session).await;

    let base = start_server(store).await;
    let body: Value = reqwest::get(format!("{base}/api/emails"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["total"], 2);
    // Newest first.
    assert_eq!(body["emails"][0]["subject"], "Demo request");
    assert_eq!(body["emails"][0]["category"], "Interested");

    let filtered: Value = reqwest::get(format!("{base}/api/emails?category=Spam"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(filtered["total"], 0);
}

#[tokio::test]
async fn full_text_search_over_http() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let (session, _events) = scripted(vec![
        raw_mail(1, now - ChronoDuration::days(2), "Pricing question", "budget talk"),
        raw_mail(2, now - ChronoDuration::days(1), "Out of office", "back next week"),
    ]);
    backfill(store.clone(), "Interested", session).await;

    let base = start_server(store).await;
    let body: Value = reqwest::get(format!("{base}/api/emails/search?q=pricing"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["total"], 1);
    assert_eq!(body["emails"][0]["subject"], "Pricing question");
}

#[tokio::test]
async fn search_without_query_is_rejected() {
    let base = start_server(Arc::new(MemoryStore::new())).await;

    let resp = reqwest::get(format!("{base}/api/emails/search")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = reqwest::get(format!("{base}/api/emails/search?q=%20")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_with_unknown_category_is_rejected() {
    let base = start_server(Arc::new(MemoryStore::new())).await;

    let resp = reqwest::get(format!("{base}/api/emails?category=Urgent")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn suggest_returns_oracle_replies() {
    let base = start_server(Arc::new(MemoryStore::new())).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/suggest"))
        .json(&serde_json::json!({
            "subject": "Demo request",
            "body": "Can we see a demo next week?"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["replies"][0], "Happy to set up a call.");
    assert_eq!(body["replies"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn suggest_with_empty_body_returns_no_replies() {
    let base = start_server(Arc::new(MemoryStore::new())).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/suggest"))
        .json(&serde_json::json!({ "subject": "hi", "body": "   " }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["replies"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn suggest_without_body_is_rejected() {
    let base = start_server(Arc::new(MemoryStore::new())).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/suggest"))
        .json(&serde_json::json!({ "subject": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reingestion_converges_through_http() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let mails = vec![
        raw_mail(1, now - ChronoDuration::days(2), "one", "body"),
        raw_mail(2, now - ChronoDuration::days(1), "two", "body"),
    ];

    // Same window fetched twice, as after a reconnect.
    let (session, _e1) = scripted(mails.clone());
    backfill(store.clone(), "Interested", session).await;
    let (session, _e2) = scripted(mails);
    backfill(store.clone(), "Interested", session).await;

    let base = start_server(store).await;
    let body: Value = reqwest::get(format!("{base}/api/emails"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn live_event_reaches_the_http_surface() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let (session, events) = scripted(vec![raw_mail(
        7,
        now,
        "Fresh lead",
        "Just saw your product, very interested.",
    )]);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = AccountTask::new(
        account(),
        fast_config(),
        Arc::new(ScriptedConnector {
            session: StdMutex::new(Some(session)),
        }),
        classifier("Interested"),
        store.clone(),
        Arc::new(Notifier::new(None, None)),
        shutdown_rx,
    );
    let handle = tokio::spawn(task.run());

    timeout(TEST_TIMEOUT, async {
        // Backfill lands the seeded message first.
        while store.get("acct_7").is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("backfilled record never appeared");

    events.send(MailEvent::NewMessage).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let base = start_server(store).await;
    let body: Value = reqwest::get(format!("{base}/api/emails?account=acct"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["emails"][0]["uid"], 7);

    shutdown_tx.send(true).unwrap();
    timeout(TEST_TIMEOUT, handle)
        .await
        .expect("task did not shut down")
        .unwrap();
}
