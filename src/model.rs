//! Domain types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Category ────────────────────────────────────────────────────────

/// Closed classification taxonomy.
///
/// The classifier always emits one of these — absent or invalid oracle
/// output resolves to [`Category::default`]. A record whose `category`
/// is `None` means "not yet classified", which is a distinct state from
/// "classified NotInterested"; merging the two is a consumer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Interested,
    #[serde(rename = "Not Interested")]
    NotInterested,
    #[serde(rename = "Meeting Booked")]
    MeetingBooked,
    Spam,
    #[serde(rename = "Out of Office")]
    OutOfOffice,
}

impl Category {
    /// All valid labels, in the order the oracle prompt lists them.
    pub const ALL: [Category; 5] = [
        Category::Interested,
        Category::NotInterested,
        Category::MeetingBooked,
        Category::Spam,
        Category::OutOfOffice,
    ];

    /// Parse an oracle label. Returns `None` for anything outside the
    /// taxonomy — the caller decides what the fallback is.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "Interested" => Some(Self::Interested),
            "Not Interested" => Some(Self::NotInterested),
            "Meeting Booked" => Some(Self::MeetingBooked),
            "Spam" => Some(Self::Spam),
            "Out of Office" => Some(Self::OutOfOffice),
            _ => None,
        }
    }

    /// Display label, as stored in the index.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Interested => "Interested",
            Self::NotInterested => "Not Interested",
            Self::MeetingBooked => "Meeting Booked",
            Self::Spam => "Spam",
            Self::OutOfOffice => "Out of Office",
        }
    }
}

impl Default for Category {
    /// Safe fallback when the oracle is unavailable or off-taxonomy.
    fn default() -> Self {
        Self::NotInterested
    }
}

// ── Addresses ───────────────────────────────────────────────────────

/// A mail address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Address {
    /// Placeholder sender used when a message carries no parsable From.
    pub fn unknown() -> Self {
        Self {
            address: "unknown".into(),
            name: None,
        }
    }
}

// ── Email record ────────────────────────────────────────────────────

/// A normalized, indexable email.
///
/// Identity is `account_id + "_" + uid` where `uid` is the
/// server-assigned per-mailbox sequence number, so re-ingesting the
/// same underlying message always overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Owning account (from `AccountConfig::id`).
    pub account_id: String,
    /// Server-assigned UID within the mailbox.
    pub uid: u32,
    /// Mailbox name, e.g. "INBOX".
    pub folder: String,
    pub subject: String,
    pub from: Address,
    pub to: Vec<Address>,
    pub date: DateTime<Utc>,
    pub body_text: String,
    /// `None` until classification ran for this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl EmailRecord {
    /// Stable composite document id for idempotent indexing.
    pub fn doc_id(&self) -> String {
        format!("{}_{}", self.account_id, self.uid)
    }
}
