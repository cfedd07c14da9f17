//! Notification dispatcher — fire-and-forget webhooks for actionable
//! categorizations.
//!
//! At-most-once: no retry, no delivery guarantee. Unconfigured
//! endpoints are logged once at construction and skipped thereafter.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::model::EmailRecord;

pub struct Notifier {
    client: reqwest::Client,
    slack_webhook_url: Option<String>,
    automation_webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(slack_webhook_url: Option<String>, automation_webhook_url: Option<String>) -> Self {
        if slack_webhook_url.is_none() {
            info!("Slack webhook not configured, lead notifications disabled");
        }
        if automation_webhook_url.is_none() {
            info!("Automation webhook not configured, webhook triggers disabled");
        }
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            slack_webhook_url,
            automation_webhook_url,
        }
    }

    /// Dispatch both channels for an actionable record. Failures are
    /// logged and dropped — ingestion never waits on redelivery.
    pub async fn notify(&self, record: &EmailRecord) {
        if let Some(url) = &self.slack_webhook_url {
            match self.post_slack(url, record).await {
                Ok(()) => debug!(subject = %record.subject, "Slack notification sent"),
                Err(e) => warn!(subject = %record.subject, error = %e, "Slack notification failed"),
            }
        }
        if let Some(url) = &self.automation_webhook_url {
            match self.post_automation(url, record).await {
                Ok(()) => debug!(subject = %record.subject, "Automation webhook triggered"),
                Err(e) => warn!(subject = %record.subject, error = %e, "Automation webhook failed"),
            }
        }
    }

    async fn post_slack(&self, url: &str, record: &EmailRecord) -> Result<(), NotifyError> {
        let message = json!({
            "text": format!(
                "New Interested Lead!\n*From*: {}\n*Subject*: {}",
                record.from.address, record.subject
            ),
        });
        self.post(url, &message).await
    }

    async fn post_automation(&self, url: &str, record: &EmailRecord) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_value(record).map_err(|e| NotifyError::Post(e.to_string()))?;
        self.post(url, &payload).await
    }

    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Post(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::BadStatus(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{Address, Category};

    fn record() -> EmailRecord {
        EmailRecord {
            account_id: "gmail".into(),
            uid: 1,
            folder: "INBOX".into(),
            subject: "Interested in a demo".into(),
            from: Address {
                address: "lead@example.com".into(),
                name: None,
            },
            to: vec![],
            date: Utc::now(),
            body_text: "tell me more".into(),
            category: Some(Category::Interested),
        }
    }

    #[tokio::test]
    async fn unconfigured_notifier_is_a_no_op() {
        // No endpoints — notify must return without error or panic.
        let notifier = Notifier::new(None, None);
        notifier.notify(&record()).await;
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_absorbed() {
        // Port 1 refuses connections; the failure must be swallowed.
        let notifier = Notifier::new(
            Some("http://127.0.0.1:1/hook".into()),
            Some("http://127.0.0.1:1/auto".into()),
        );
        notifier.notify(&record()).await;
    }
}
