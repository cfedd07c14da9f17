//! Per-account sync task — the connection lifecycle state machine.
//!
//! States: Disconnected → Connecting → Backfilling → Listening →
//! Reconnecting → Closed. Only connection-level failures change state;
//! per-message failures (classify, index, notify) are absorbed and the
//! loop moves to the next message. One task never touches another
//! task's mailbox — there is no shared mutable state across accounts.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::classify::Classifier;
use crate::config::{AccountConfig, SyncConfig};
use crate::error::MailError;
use crate::mail::{MailConnector, MailSession, RawMail, normalize::normalize};
use crate::model::Category;
use crate::notify::Notifier;
use crate::store::EmailStore;
use crate::sync::throttle::Throttle;

/// Lifecycle state, tracked for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Backfilling,
    Listening,
    Reconnecting,
    Closed,
}

/// The long-lived task driving one account.
pub struct AccountTask {
    account: AccountConfig,
    config: SyncConfig,
    connector: Arc<dyn MailConnector>,
    classifier: Arc<Classifier>,
    store: Arc<dyn EmailStore>,
    notifier: Arc<Notifier>,
    /// Serializes backfill against live-event handling for this
    /// mailbox. Two rapid new-mail events can never race on the same
    /// fetch cursor.
    mailbox_lock: Arc<Mutex<()>>,
    /// Minimum spacing between successive live-event handlings.
    event_throttle: Mutex<Throttle>,
    shutdown: watch::Receiver<bool>,
    state: SyncState,
}

impl AccountTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: AccountConfig,
        config: SyncConfig,
        connector: Arc<dyn MailConnector>,
        classifier: Arc<Classifier>,
        store: Arc<dyn EmailStore>,
        notifier: Arc<Notifier>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let event_throttle = Mutex::new(Throttle::new(config.event_delay));
        Self {
            account,
            config,
            connector,
            classifier,
            store,
            notifier,
            mailbox_lock: Arc::new(Mutex::new(())),
            event_throttle,
            shutdown,
            state: SyncState::Disconnected,
        }
    }

    /// The mailbox lock, exposed so tests can assert mutual exclusion.
    pub fn mailbox_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.mailbox_lock)
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    fn set_state(&mut self, state: SyncState) {
        debug!(account = %self.account.id, from = ?self.state, to = ?state, "Sync state change");
        self.state = state;
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Drive the account until shutdown. Never returns an error — every
    /// failure either reconnects this account or closes this task, and
    /// is invisible to sibling accounts.
    pub async fn run(mut self) {
        info!(account = %self.account.id, mailbox = %self.config.mailbox, "Account sync starting");

        loop {
            if self.shutdown_requested() {
                break;
            }

            self.set_state(SyncState::Connecting);
            let mut session = match self.connector.connect(&self.account, &self.config.mailbox).await
            {
                Ok(session) => session,
                Err(e) => {
                    error!(account = %self.account.id, error = %e, "Connect failed");
                    self.reconnect_pause().await;
                    continue;
                }
            };
            info!(account = %self.account.id, "Connected");

            self.set_state(SyncState::Backfilling);
            if let Err(e) = self.backfill(session.as_mut()).await {
                error!(account = %self.account.id, error = %e, "Backfill connection lost");
                self.reconnect_pause().await;
                continue;
            }

            self.set_state(SyncState::Listening);
            match self.listen(session.as_mut()).await {
                Ok(()) => break,
                Err(e) => {
                    error!(account = %self.account.id, error = %e, "Connection lost while listening");
                    self.reconnect_pause().await;
                }
            }
        }

        self.set_state(SyncState::Closed);
        info!(account = %self.account.id, "Account sync closed");
    }

    /// Fetch and ingest the lookback window under the mailbox lock.
    ///
    /// The lock guard is dropped on every exit path, including the `?`
    /// on a lost connection.
    pub async fn backfill(&self, session: &mut dyn MailSession) -> Result<(), MailError> {
        let _guard = self.mailbox_lock.lock().await;

        let since = Utc::now() - ChronoDuration::days(self.config.lookback_days);
        info!(account = %self.account.id, %since, "Backfill starting");

        let mails = session.fetch_since(since).await?;
        let total = mails.len();
        let mut throttle = Throttle::new(self.config.backfill_delay);

        for raw in &mails {
            if self.shutdown_requested() {
                warn!(account = %self.account.id, "Backfill interrupted by shutdown");
                return Ok(());
            }
            // First pause is free, so the interval sits between
            // messages rather than trailing the last one.
            throttle.pause().await;
            self.ingest(raw).await;
        }

        info!(account = %self.account.id, total, "Backfill complete");
        Ok(())
    }

    /// Consume new-mail events until shutdown (`Ok`) or a connection
    /// error (`Err` → Reconnecting).
    async fn listen(&mut self, session: &mut dyn MailSession) -> Result<(), MailError> {
        info!(account = %self.account.id, "Listening for new mail");
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender also means the process is going down.
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                event = session.wait_for_new() => {
                    event?;
                    debug!(account = %self.account.id, "New mail event");
                    self.handle_new_mail(session).await?;
                }
            }
        }
    }

    /// Handle one new-mail event: re-acquire the lock, wait out the
    /// event throttle, fetch only the newest message, ingest it.
    pub async fn handle_new_mail(&self, session: &mut dyn MailSession) -> Result<(), MailError> {
        let _guard = self.mailbox_lock.lock().await;
        self.event_throttle.lock().await.pause().await;

        let Some(raw) = session.fetch_newest().await? else {
            debug!(account = %self.account.id, "Event with no fetchable message");
            return Ok(());
        };

        self.ingest(&raw).await;
        Ok(())
    }

    /// Normalize → classify → index → notify for one message.
    ///
    /// Completes or is abandoned as a unit; per-step failures are
    /// logged and absorbed so one bad message cannot halt the stream.
    async fn ingest(&self, raw: &RawMail) {
        let mut record = normalize(
            &raw.bytes,
            &self.account.id,
            &self.config.mailbox,
            raw.uid,
        );
        let category = self
            .classifier
            .classify(&record.subject, &record.body_text)
            .await;
        record.category = Some(category);

        if let Err(e) = self.store.upsert(&record).await {
            error!(
                account = %self.account.id,
                doc_id = %record.doc_id(),
                error = %e,
                "Index write failed, message skipped"
            );
            return;
        }
        debug!(doc_id = %record.doc_id(), category = category.label(), "Indexed email");

        if category == Category::Interested {
            self.notifier.notify(&record).await;
        }
    }

    async fn reconnect_pause(&mut self) {
        self.set_state(SyncState::Reconnecting);
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(self.config.reconnect_delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use secrecy::SecretString;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::GenerativeModel;
    use crate::mail::MailEvent;
    use crate::store::MemoryStore;

    fn raw_mail(uid: u32, date: DateTime<Utc>, subject: &str, body: &str) -> (RawMail, DateTime<Utc>) {
        let bytes = format!(
            "From: lead@example.com\r\nSubject: {subject}\r\nDate: {}\r\n\r\n{body}\r\n",
            date.to_rfc2822()
        )
        .into_bytes();
        (RawMail { uid, bytes }, date)
    }

    /// Scripted session: a fixed set of dated messages, plus a queue of
    /// events for the listening path.
    struct ScriptedSession {
        mails: Vec<(RawMail, DateTime<Utc>)>,
        events: tokio::sync::mpsc::UnboundedReceiver<MailEvent>,
    }

    #[async_trait]
    impl MailSession for ScriptedSession {
        async fn fetch_since(
            &mut self,
            since: DateTime<Utc>,
        ) -> Result<Vec<RawMail>, MailError> {
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

    struct StubOracle {
        label: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeModel for StubOracle {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn generate_json(
            &self,
            _prompt: &str,
            _schema: Option<serde_json::Value>,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!(r#"{{"category":"{}"}}"#, self.label))
        }
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
            reconnect_delay: Duration::ZERO,
            ..SyncConfig::default()
        }
    }

    fn task(
        store: Arc<MemoryStore>,
        oracle_label: &'static str,
    ) -> (AccountTask, Arc<StubOracle>, watch::Sender<bool>) {
        task_with_config(store, oracle_label, fast_config())
    }

    fn task_with_config(
        store: Arc<MemoryStore>,
        oracle_label: &'static str,
        config: SyncConfig,
    ) -> (AccountTask, Arc<StubOracle>, watch::Sender<bool>) {
        let oracle = Arc::new(StubOracle {
            label: oracle_label,
            calls: AtomicUsize::new(0),
        });
        let (tx, rx) = watch::channel(false);
        let task = AccountTask::new(
            account(),
            config,
            Arc::new(NeverConnector),
            Arc::new(Classifier::new(oracle.clone())),
            store,
            Arc::new(Notifier::new(None, None)),
            rx,
        );
        (task, oracle, tx)
    }

    /// Connector for tests that drive sessions directly.
    struct NeverConnector;

    #[async_trait]
    impl MailConnector for NeverConnector {
        async fn connect(
            &self,
            _account: &AccountConfig,
            _mailbox: &str,
        ) -> Result<Box<dyn MailSession>, MailError> {
            Err(MailError::Closed)
        }
    }

    fn scripted(
        mails: Vec<(RawMail, DateTime<Utc>)>,
    ) -> (ScriptedSession, tokio::sync::mpsc::UnboundedSender<MailEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (ScriptedSession { mails, events: rx }, tx)
    }

    #[tokio::test]
    async fn backfill_ingests_only_the_lookback_window() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, _tx) = task(store.clone(), "Interested");

        let now = Utc::now();
        let (mut session, _events) = scripted(vec![
            raw_mail(1, now - ChronoDuration::days(2), "recent a", "body"),
            raw_mail(2, now - ChronoDuration::days(10), "recent b", "body"),
            raw_mail(3, now - ChronoDuration::days(29), "recent c", "body"),
            raw_mail(4, now - ChronoDuration::days(45), "stale", "body"),
        ]);

        task.backfill(&mut session).await.unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.get("acct_4").is_none());
    }

    #[tokio::test]
    async fn backfill_replay_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, _tx) = task(store.clone(), "Interested");

        let now = Utc::now();
        let (mut session, _events) = scripted(vec![
            raw_mail(1, now - ChronoDuration::days(1), "one", "body"),
            raw_mail(2, now - ChronoDuration::days(2), "two", "body"),
        ]);

        // Duplicate fetch (reconnection replay) must converge, not
        // duplicate.
        task.backfill(&mut session).await.unwrap();
        task.backfill(&mut session).await.unwrap();

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn ingested_records_carry_oracle_category() {
        let store = Arc::new(MemoryStore::new());
        let (task, oracle, _tx) = task(store.clone(), "Meeting Booked");

        let now = Utc::now();
        let (mut session, _events) = scripted(vec![raw_mail(7, now, "call", "see you at 3")]);
        task.backfill(&mut session).await.unwrap();

        let stored = store.get("acct_7").unwrap();
        assert_eq!(stored.category, Some(Category::MeetingBooked));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn off_taxonomy_oracle_label_is_indexed_as_default() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, _tx) = task(store.clone(), "Urgent");

        let now = Utc::now();
        let (mut session, _events) = scripted(vec![raw_mail(9, now, "s", "b")]);
        task.backfill(&mut session).await.unwrap();

        let stored = store.get("acct_9").unwrap();
        assert_eq!(stored.category, Some(Category::NotInterested));
    }

    #[tokio::test]
    async fn live_event_blocks_until_backfill_releases_the_lock() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, _tx) = task(store.clone(), "Interested");
        let task = Arc::new(task);
        let lock = task.mailbox_lock();

        let ops: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));

        // Simulate an in-flight backfill by holding the mailbox lock.
        let guard = lock.lock().await;
        ops.lock().unwrap().push("backfill_locked");

        let handler = {
            let task = Arc::clone(&task);
            let ops = Arc::clone(&ops);
            tokio::spawn(async move {
                let now = Utc::now();
                let (mut session, _events) = scripted(vec![raw_mail(1, now, "live", "body")]);
                task.handle_new_mail(&mut session).await.unwrap();
                ops.lock().unwrap().push("event_handled");
            })
        };

        // The handler must not make progress while the lock is held.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), 0, "event handled while backfill held the lock");
        ops.lock().unwrap().push("backfill_released");
        drop(guard);

        handler.await.unwrap();
        assert_eq!(
            *ops.lock().unwrap(),
            vec!["backfill_locked", "backfill_released", "event_handled"]
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn index_failure_is_absorbed_and_loop_continues() {
        struct FailingStore;

        #[async_trait]
        impl EmailStore for FailingStore {
            async fn ensure_index(&self) -> Result<(), crate::error::IndexError> {
                Ok(())
            }
            async fn upsert(
                &self,
                _record: &crate::model::EmailRecord,
            ) -> Result<(), crate::error::IndexError> {
                Err(crate::error::IndexError::Request("es down".into()))
            }
            async fn search(
                &self,
                _q: &str,
                _p: usize,
            ) -> Result<crate::store::EmailPage, crate::error::IndexError> {
                unimplemented!()
            }
            async fn list(
                &self,
                _f: &crate::store::EmailFilter,
                _p: usize,
            ) -> Result<crate::store::EmailPage, crate::error::IndexError> {
                unimplemented!()
            }
        }

        let oracle = Arc::new(StubOracle {
            label: "Interested",
            calls: AtomicUsize::new(0),
        });
        let (_tx, rx) = watch::channel(false);
        let task = AccountTask::new(
            account(),
            fast_config(),
            Arc::new(NeverConnector),
            Arc::new(Classifier::new(oracle)),
            Arc::new(FailingStore),
            Arc::new(Notifier::new(None, None)),
            rx,
        );

        let now = Utc::now();
        let (mut session, _events) = scripted(vec![
            raw_mail(1, now, "a", "b"),
            raw_mail(2, now, "c", "d"),
        ]);

        // A sink failure is per-message, never a backfill error.
        task.backfill(&mut session).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_throttled_backfill() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, tx) = task_with_config(
            store.clone(),
            "Interested",
            SyncConfig {
                backfill_delay: Duration::from_millis(200),
                ..fast_config()
            },
        );

        let now = Utc::now();
        let mails = (1..=10).map(|uid| raw_mail(uid, now, "m", "body")).collect();
        let (mut session, _events) = scripted(mails);

        let handle = tokio::spawn(async move { task.backfill(&mut session).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();

        // Shutdown mid-window is an orderly stop, not an error.
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("backfill ignored shutdown")
            .unwrap()
            .unwrap();
        assert!(store.len() >= 1);
        assert!(store.len() < 10, "ingested {} of 10", store.len());
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_interval_sits_between_messages_not_after_the_last() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, _tx) = task_with_config(
            store.clone(),
            "Interested",
            SyncConfig {
                backfill_delay: Duration::from_secs(5),
                ..fast_config()
            },
        );

        let now = Utc::now();
        let (mut session, _events) = scripted(vec![
            raw_mail(1, now, "a", "body"),
            raw_mail(2, now, "b", "body"),
        ]);

        let before = tokio::time::Instant::now();
        task.backfill(&mut session).await.unwrap();

        // One interval for two messages: the first is immediate and
        // nothing trails the last, so the lock is not held longer than
        // the work requires.
        assert_eq!(before.elapsed(), Duration::from_secs(5));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_live_events_are_throttled() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, _tx) = task_with_config(
            store.clone(),
            "Interested",
            SyncConfig {
                event_delay: Duration::from_secs(2),
                ..fast_config()
            },
        );

        let now = Utc::now();
        let (mut session, _events) = scripted(vec![raw_mail(1, now, "live", "body")]);

        let before = tokio::time::Instant::now();
        task.handle_new_mail(&mut session).await.unwrap();
        let first = before.elapsed();
        task.handle_new_mail(&mut session).await.unwrap();

        assert_eq!(first, Duration::ZERO);
        assert_eq!(before.elapsed(), Duration::from_secs(2));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn run_closes_on_shutdown_even_when_connect_keeps_failing() {
        let store = Arc::new(MemoryStore::new());
        let (task, _, tx) = task(store, "Interested");

        let handle = tokio::spawn(task.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("task did not close on shutdown")
            .unwrap();
    }
}
