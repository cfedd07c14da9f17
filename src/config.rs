//! Configuration — environment-driven, loaded once at startup.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// One mailbox account to sync. Immutable after startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Identity used as the document-id prefix, e.g. "gmail".
    pub id: String,
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_secure")]
    pub secure: bool,
    pub user: String,
    pub password: SecretString,
}

fn default_imap_port() -> u16 {
    993
}

fn default_secure() -> bool {
    true
}

/// Sync tuning knobs shared by all account tasks.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Mailbox to sync. Only INBOX for now.
    pub mailbox: String,
    /// Backfill window: messages older than this many days are skipped.
    pub lookback_days: i64,
    /// Deliberate inter-message throttle during backfill.
    pub backfill_delay: Duration,
    /// Throttle after handling a live new-mail event.
    pub event_delay: Duration,
    /// Pause before re-entering Connecting after a connection failure.
    pub reconnect_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mailbox: "INBOX".into(),
            lookback_days: 30,
            backfill_delay: Duration::from_secs(5),
            event_delay: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Build from environment, falling back to defaults per knob.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mailbox: std::env::var("SYNC_MAILBOX").unwrap_or(defaults.mailbox),
            lookback_days: env_parse("SYNC_LOOKBACK_DAYS", defaults.lookback_days),
            backfill_delay: Duration::from_millis(env_parse(
                "SYNC_BACKFILL_DELAY_MS",
                defaults.backfill_delay.as_millis() as u64,
            )),
            event_delay: Duration::from_millis(env_parse(
                "SYNC_EVENT_DELAY_MS",
                defaults.event_delay.as_millis() as u64,
            )),
            reconnect_delay: Duration::from_secs(env_parse(
                "SYNC_RECONNECT_DELAY_SECS",
                defaults.reconnect_delay.as_secs(),
            )),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub accounts: Vec<AccountConfig>,
    pub sync: SyncConfig,
    /// Elasticsearch base URL; `None` selects the in-memory store.
    pub es_url: Option<String>,
    pub es_index: String,
    pub gemini_api_key: Option<SecretString>,
    pub gemini_model: String,
    pub pinecone_api_key: Option<SecretString>,
    pub pinecone_host: Option<String>,
    pub pinecone_namespace: String,
    pub slack_webhook_url: Option<String>,
    pub automation_webhook_url: Option<String>,
    pub http_port: u16,
}

impl AppConfig {
    /// Load everything from the environment.
    ///
    /// Only the account list is required here. Optional endpoints stay
    /// `None` when unset; the caller decides which of those it can run
    /// without.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            accounts: load_accounts()?,
            sync: SyncConfig::from_env(),
            es_url: std::env::var("ELASTICSEARCH_URL").ok(),
            es_index: std::env::var("ES_INDEX").unwrap_or_else(|_| "onebox_emails".into()),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok().map(SecretString::from),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash-lite".into()),
            pinecone_api_key: std::env::var("PINECONE_API_KEY")
                .ok()
                .map(SecretString::from),
            pinecone_host: std::env::var("PINECONE_HOST").ok(),
            pinecone_namespace: std::env::var("PINECONE_NAMESPACE")
                .unwrap_or_else(|_| "general".into()),
            slack_webhook_url: std::env::var("SLACK_WEBHOOK_URL").ok(),
            automation_webhook_url: std::env::var("AUTOMATION_WEBHOOK_URL").ok(),
            http_port: env_parse("PORT", 3000),
        })
    }
}

/// Load the account list.
///
/// `IMAP_ACCOUNTS_JSON` (a JSON array of `AccountConfig`) wins; the
/// `USER_EMAIL_1` / `USER_PASSWORD_1` pair is the single-Gmail-account
/// fallback. An empty list is a startup error — there is nothing to do.
fn load_accounts() -> Result<Vec<AccountConfig>, ConfigError> {
    if let Ok(json) = std::env::var("IMAP_ACCOUNTS_JSON") {
        let accounts: Vec<AccountConfig> =
            serde_json::from_str(&json).map_err(|e| ConfigError::AccountParse(e.to_string()))?;
        if accounts.is_empty() {
            return Err(ConfigError::AccountParse(
                "IMAP_ACCOUNTS_JSON is an empty array".into(),
            ));
        }
        return Ok(accounts);
    }

    let user = std::env::var("USER_EMAIL_1")
        .map_err(|_| ConfigError::MissingEnvVar("IMAP_ACCOUNTS_JSON or USER_EMAIL_1".into()))?;
    let pass = std::env::var("USER_PASSWORD_1")
        .map_err(|_| ConfigError::MissingEnvVar("USER_PASSWORD_1".into()))?;

    Ok(vec![AccountConfig {
        id: "gmail".into(),
        host: "imap.gmail.com".into(),
        port: 993,
        secure: true,
        user,
        password: SecretString::from(pass),
    }])
}

/// Parse an env var, falling back to `default` when unset or malformed.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
