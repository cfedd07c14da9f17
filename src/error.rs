//! Error types for onebox.
//!
//! One enum per subsystem, consumed at that subsystem's boundary. Only
//! `MailError` (connection-level failures) ever changes pipeline state —
//! everything per-message is absorbed at its boundary and surfaced as a
//! defined value instead of an error.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse account list: {0}")]
    AccountParse(String),
}

/// Mail transport errors — the connection-level failures that transition
/// an account task to Reconnecting. Per-message parse problems never
/// surface here (the normalizer is total).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Connection to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup for {host} failed: {reason}")]
    Tls { host: String, reason: String },

    #[error("Authentication failed for account {account}")]
    Auth { account: String },

    #[error("Mailbox {mailbox} could not be selected: {reason}")]
    Select { mailbox: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed by server")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification oracle errors. Absorbed by the classifier, which
/// resolves them to the default category.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Oracle request failed: {0}")]
    Oracle(#[from] LlmError),

    #[error("Oracle response was not valid JSON: {0}")]
    MalformedResponse(String),

    #[error("Label outside taxonomy: {0}")]
    UnknownLabel(String),
}

/// Generative model transport errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model {model} request failed: {reason}")]
    RequestFailed { model: String, reason: String },

    #[error("Model {model} returned status {status}: {body}")]
    BadStatus {
        model: String,
        status: u16,
        body: String,
    },

    #[error("Empty completion from model {model}")]
    EmptyCompletion { model: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Indexing sink errors. Logged and dropped by the ingestion loop —
/// a skipped write is acceptable, a crashed process is not.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index request failed: {0}")]
    Request(String),

    #[error("Index returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Document {id} could not be serialized: {reason}")]
    Serialize { id: String, reason: String },
}

/// Suggestion pipeline errors. Absorbed — the caller always receives a
/// (possibly empty) list of replies.
#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("Vector store query failed: {0}")]
    VectorQuery(String),

    #[error("Vector store upsert failed: {0}")]
    VectorUpsert(String),

    #[error("Oracle request failed: {0}")]
    Oracle(#[from] LlmError),

    #[error("Oracle reply was not a JSON replies array: {0}")]
    MalformedReplies(String),
}

/// Notification dispatch errors. At-most-once delivery — logged, never
/// retried, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook post failed: {0}")]
    Post(String),

    #[error("Webhook returned status {0}")]
    BadStatus(u16),
}
