//! Account sync supervision — one independent task per configured
//! mailbox account.
//!
//! Failure isolation is the hard invariant here: a panicking or
//! perpetually-reconnecting account task never blocks or crashes a
//! sibling. Shutdown is broadcast over a `watch` channel every task
//! observes at its suspension points.

pub mod account;
pub mod throttle;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::classify::Classifier;
use crate::config::{AccountConfig, SyncConfig};
use crate::mail::MailConnector;
use crate::notify::Notifier;
use crate::store::EmailStore;

pub use account::{AccountTask, SyncState};
pub use throttle::Throttle;

/// Spawns and owns the per-account sync tasks.
pub struct SyncSupervisor {
    accounts: Vec<AccountConfig>,
    config: SyncConfig,
    connector: Arc<dyn MailConnector>,
    classifier: Arc<Classifier>,
    store: Arc<dyn EmailStore>,
    notifier: Arc<Notifier>,
}

impl SyncSupervisor {
    pub fn new(
        accounts: Vec<AccountConfig>,
        config: SyncConfig,
        connector: Arc<dyn MailConnector>,
        classifier: Arc<Classifier>,
        store: Arc<dyn EmailStore>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            accounts,
            config,
            connector,
            classifier,
            store,
            notifier,
        }
    }

    /// Spawn one task per account and return the shutdown handle.
    pub fn spawn_all(self) -> SyncHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(accounts = self.accounts.len(), "Starting account sync");

        let handles = self
            .accounts
            .into_iter()
            .map(|account| {
                let task = AccountTask::new(
                    account,
                    self.config.clone(),
                    Arc::clone(&self.connector),
                    Arc::clone(&self.classifier),
                    Arc::clone(&self.store),
                    Arc::clone(&self.notifier),
                    shutdown_rx.clone(),
                );
                tokio::spawn(task.run())
            })
            .collect();

        SyncHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }
}

/// Handle over the running account tasks.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Signal every account task to close and wait for them to finish.
    pub async fn shutdown(self) {
        info!("Shutting down account sync");
        // Receivers may all be gone already if every task has exited.
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                // An account task panicking must not take the shutdown
                // path down with it.
                error!(error = %e, "Account task ended abnormally");
            }
        }
    }
}
