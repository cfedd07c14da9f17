//! Message normalizer — raw RFC 822 payload → [`EmailRecord`].
//!
//! Total by design: unparseable input degrades to the most complete
//! record we can build instead of failing the pipeline. Defaults are
//! empty subject/body, an "unknown" sender, and the current time when
//! the Date header is missing or malformed.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use crate::model::{Address, EmailRecord};

/// Normalize one fetched message.
pub fn normalize(bytes: &[u8], account_id: &str, folder: &str, uid: u32) -> EmailRecord {
    let parsed = MessageParser::default().parse(bytes);

    let (subject, from, to, date, body_text) = match &parsed {
        Some(msg) => (
            msg.subject().unwrap_or_default().to_string(),
            extract_from(msg),
            extract_to(msg),
            extract_date(msg),
            extract_text(msg),
        ),
        None => (
            String::new(),
            Address::unknown(),
            Vec::new(),
            Utc::now(),
            String::new(),
        ),
    };

    EmailRecord {
        account_id: account_id.to_string(),
        uid,
        folder: folder.to_string(),
        subject,
        from,
        to,
        date,
        body_text,
        category: None,
    }
}

fn extract_from(msg: &mail_parser::Message) -> Address {
    msg.from()
        .and_then(|addrs| addrs.first())
        .map(|a| Address {
            address: a
                .address()
                .map(str::to_string)
                .unwrap_or_else(|| "unknown".into()),
            name: a.name().map(str::to_string),
        })
        .unwrap_or_else(Address::unknown)
}

fn extract_to(msg: &mail_parser::Message) -> Vec<Address> {
    msg.to()
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(|a| {
                    a.address().map(|addr| Address {
                        address: addr.to_string(),
                        name: a.name().map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn extract_date(msg: &mail_parser::Message) -> DateTime<Utc> {
    msg.date()
        .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Prefer the plain-text body; fall back to stripped HTML; else empty.
fn extract_text(msg: &mail_parser::Message) -> String {
    if let Some(text) = msg.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = msg.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
