//! Mail retrieval boundary — traits the sync supervisor drives.
//!
//! The transport contract is deliberately small: connect, fetch by date
//! range, fetch the newest message, and an awaitable "new mail arrived"
//! subscription step. `imap.rs` implements it over raw IMAP; tests
//! inject scripted sessions.

pub mod imap;
pub mod normalize;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::AccountConfig;
use crate::error::MailError;

/// A fetched message: server-assigned UID plus the raw RFC 822 payload.
#[derive(Debug, Clone)]
pub struct RawMail {
    pub uid: u32,
    pub bytes: Vec<u8>,
}

/// Push notification from the mail endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailEvent {
    /// The selected mailbox reported a new message.
    NewMessage,
}

/// A live session against one account's selected mailbox.
///
/// Methods take `&mut self`: one session serves one account task, and
/// all operations on it are strictly sequential by construction.
#[async_trait]
pub trait MailSession: Send {
    /// Fetch all messages dated on/after `since`, oldest first.
    async fn fetch_since(&mut self, since: DateTime<Utc>) -> Result<Vec<RawMail>, MailError>;

    /// Fetch only the newest message in the mailbox (the one a
    /// [`MailEvent::NewMessage`] announced), if any.
    async fn fetch_newest(&mut self) -> Result<Option<RawMail>, MailError>;

    /// Suspend until the server announces new mail.
    ///
    /// Cancellable: the supervisor races this against shutdown in a
    /// `select!`. An `Err` means the connection is gone and the account
    /// task must reconnect.
    async fn wait_for_new(&mut self) -> Result<MailEvent, MailError>;
}

/// Factory for sessions — the seam between the supervisor and the wire.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Establish a session and select `mailbox`.
    async fn connect(
        &self,
        account: &AccountConfig,
        mailbox: &str,
    ) -> Result<Box<dyn MailSession>, MailError>;
}
