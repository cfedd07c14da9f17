//! Raw IMAP-over-TLS transport (blocking, driven via `spawn_blocking`).
//!
//! Minimal hand-rolled client: LOGIN, SELECT, `UID SEARCH SINCE`,
//! `UID FETCH … RFC822`, and IDLE for new-mail push. The blocking
//! session moves into `spawn_blocking` for each operation and moves
//! back out when it completes; if an operation is cancelled mid-flight
//! the session is considered lost and the account task reconnects.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::config::AccountConfig;
use crate::error::MailError;
use crate::mail::{MailConnector, MailEvent, MailSession, RawMail};

/// Read timeout for command/response exchanges.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// How long one IDLE round blocks before it is restarted. Servers are
/// allowed to drop connections idling past 29 minutes; we cycle far
/// more often so shutdown is never stuck behind a dead socket.
const IDLE_CYCLE: Duration = Duration::from_secs(60);

// ── Connector ───────────────────────────────────────────────────────

/// Connects [`ImapMailSession`]s. Stateless and shared by all accounts.
pub struct ImapConnector;

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(
        &self,
        account: &AccountConfig,
        mailbox: &str,
    ) -> Result<Box<dyn MailSession>, MailError> {
        let account = account.clone();
        let mailbox = mailbox.to_string();
        let inner = tokio::task::spawn_blocking(move || BlockingSession::open(&account, &mailbox))
            .await
            .map_err(|e| MailError::Protocol(format!("connect task panicked: {e}")))??;

        Ok(Box::new(ImapMailSession { inner: Some(inner) }))
    }
}

// ── Async session wrapper ───────────────────────────────────────────

/// Async facade over a [`BlockingSession`].
pub struct ImapMailSession {
    /// `None` after a cancelled or panicked blocking operation — the
    /// connection state is unknown, so every later call reports Closed.
    inner: Option<BlockingSession>,
}

impl ImapMailSession {
    /// Run `op` on the blocking session inside `spawn_blocking`,
    /// returning the session to `self` afterwards.
    async fn run<T, F>(&mut self, op: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&mut BlockingSession) -> Result<T, MailError> + Send + 'static,
    {
        let mut session = self.inner.take().ok_or(MailError::Closed)?;
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await
        .map_err(|e| MailError::Protocol(format!("mail task panicked: {e}")))?;
        self.inner = Some(session);
        result
    }
}

#[async_trait]
impl MailSession for ImapMailSession {
    async fn fetch_since(&mut self, since: DateTime<Utc>) -> Result<Vec<RawMail>, MailError> {
        self.run(move |s| s.fetch_since(since)).await
    }

    async fn fetch_newest(&mut self) -> Result<Option<RawMail>, MailError> {
        self.run(|s| s.fetch_newest()).await
    }

    async fn wait_for_new(&mut self) -> Result<MailEvent, MailError> {
        self.run(|s| s.idle_until_exists()).await
    }
}

// ── Blocking session ────────────────────────────────────────────────

enum Wire {
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
    Plain(TcpStream),
}

impl Wire {
    fn tcp(&self) -> &TcpStream {
        match self {
            Wire::Tls(s) => s.get_ref(),
            Wire::Plain(s) => s,
        }
    }
}

impl Read for Wire {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Wire::Tls(s) => s.read(buf),
            Wire::Plain(s) => s.read(buf),
        }
    }
}

impl Write for Wire {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Wire::Tls(s) => s.write(buf),
            Wire::Plain(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Wire::Tls(s) => s.flush(),
            Wire::Plain(s) => s.flush(),
        }
    }
}

/// One authenticated IMAP connection with a selected mailbox.
struct BlockingSession {
    wire: Wire,
    tag_counter: u32,
    /// Message count from the last SELECT / EXISTS update. The newest
    /// message's sequence number.
    exists: u32,
}

impl BlockingSession {
    fn open(account: &AccountConfig, mailbox: &str) -> Result<Self, MailError> {
        let tcp =
            TcpStream::connect((&*account.host, account.port)).map_err(|e| MailError::Connect {
                host: account.host.clone(),
                port: account.port,
                reason: e.to_string(),
            })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let wire = if account.secure {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let tls_config = Arc::new(
                rustls::ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth(),
            );
            let server_name = rustls::pki_types::ServerName::try_from(account.host.clone())
                .map_err(|e| MailError::Tls {
                    host: account.host.clone(),
                    reason: e.to_string(),
                })?;
            let conn =
                rustls::ClientConnection::new(tls_config, server_name).map_err(|e| {
                    MailError::Tls {
                        host: account.host.clone(),
                        reason: e.to_string(),
                    }
                })?;
            Wire::Tls(Box::new(rustls::StreamOwned::new(conn, tcp)))
        } else {
            Wire::Plain(tcp)
        };

        let mut session = Self {
            wire,
            tag_counter: 0,
            exists: 0,
        };

        let _greeting = session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            account.user,
            account.password.expose_secret()
        ))?;
        if !ok(&login) {
            return Err(MailError::Auth {
                account: account.id.clone(),
            });
        }

        let select = session.command(&format!("SELECT \"{mailbox}\""))?;
        if !ok(&select) {
            return Err(MailError::Select {
                mailbox: mailbox.to_string(),
                reason: select.last().cloned().unwrap_or_default(),
            });
        }
        session.track_exists(&select);

        debug!(mailbox, exists = session.exists, "IMAP mailbox selected");
        Ok(session)
    }

    // ── Wire helpers ────────────────────────────────────────────────

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.wire.read(&mut byte) {
                Ok(0) => return Err(MailError::Closed),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read exactly `len` bytes (an IMAP literal body).
    fn read_literal(&mut self, len: usize) -> Result<Vec<u8>, MailError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.wire.read(&mut buf[filled..]) {
                Ok(0) => return Err(MailError::Closed),
                Ok(n) => filled += n,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    /// Send a command, collect untagged lines until the tagged reply.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MailError> {
        let tag = self.next_tag();
        self.wire.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.wire.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn track_exists(&mut self, lines: &[String]) {
        for line in lines {
            if let Some(n) = parse_exists(line) {
                self.exists = n;
            }
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    fn fetch_since(&mut self, since: DateTime<Utc>) -> Result<Vec<RawMail>, MailError> {
        // IMAP SINCE is date-granular; the server filters by day.
        let date = since.format("%d-%b-%Y").to_string();
        let search = self.command(&format!("UID SEARCH SINCE {date}"))?;

        let mut uids: Vec<u32> = Vec::new();
        for line in &search {
            uids.extend(parse_search_uids(line));
        }
        uids.sort_unstable();

        let mut results = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.fetch_one(&format!("UID FETCH {uid} (UID RFC822)"))? {
                Some(mail) => results.push(mail),
                None => warn!(uid, "UID vanished between SEARCH and FETCH"),
            }
        }
        Ok(results)
    }

    fn fetch_newest(&mut self) -> Result<Option<RawMail>, MailError> {
        if self.exists == 0 {
            return Ok(None);
        }
        let seq = self.exists;
        self.fetch_one(&format!("FETCH {seq} (UID RFC822)"))
    }

    /// Issue a FETCH and assemble the (uid, body) pair from the
    /// `* n FETCH (UID x RFC822 {len}` + literal response shape.
    fn fetch_one(&mut self, cmd: &str) -> Result<Option<RawMail>, MailError> {
        let tag = self.next_tag();
        self.wire.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.wire.flush()?;

        let mut result: Option<RawMail> = None;
        loop {
            let line = self.read_line()?;
            if line.starts_with(&tag) {
                return Ok(result);
            }
            if !line.starts_with("* ") || !line.contains("FETCH") {
                continue;
            }

            let uid = parse_uid(&line);
            if let Some(len) = parse_literal_len(&line) {
                let bytes = self.read_literal(len)?;
                // Trailing `)` line of the FETCH response.
                let _ = self.read_line()?;
                match uid {
                    Some(uid) => result = Some(RawMail { uid, bytes }),
                    None => warn!("FETCH response carried a literal but no UID"),
                }
            }
        }
    }

    /// Block inside IDLE until the server announces new mail.
    ///
    /// Each IDLE round is bounded by the socket read timeout; rounds
    /// are re-entered until an EXISTS arrives so a quiet mailbox never
    /// pins a connection past [`IDLE_CYCLE`].
    fn idle_until_exists(&mut self) -> Result<MailEvent, MailError> {
        loop {
            let tag = self.next_tag();
            self.wire.write_all(format!("{tag} IDLE\r\n").as_bytes())?;
            self.wire.flush()?;

            let started = std::time::Instant::now();
            let mut saw_exists = false;

            while started.elapsed() < IDLE_CYCLE {
                match self.read_line() {
                    Ok(line) => {
                        if let Some(n) = parse_exists(&line) {
                            // Only a growing mailbox means new mail;
                            // EXPUNGE shrinks it without new arrivals.
                            if n > self.exists {
                                saw_exists = true;
                            }
                            self.exists = n;
                        }
                        if saw_exists {
                            break;
                        }
                    }
                    Err(MailError::Io(e))
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) =>
                    {
                        // Quiet socket — keep idling this round out.
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            // Leave IDLE; drain through the tagged completion.
            self.wire.write_all(b"DONE\r\n")?;
            self.wire.flush()?;
            loop {
                match self.read_line() {
                    Ok(line) => {
                        if let Some(n) = parse_exists(&line) {
                            if n > self.exists {
                                saw_exists = true;
                            }
                            self.exists = n;
                        }
                        if line.starts_with(&tag) {
                            break;
                        }
                    }
                    Err(MailError::Io(e))
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            if saw_exists {
                return Ok(MailEvent::NewMessage);
            }
        }
    }
}

impl Drop for BlockingSession {
    fn drop(&mut self) {
        // Best-effort LOGOUT; the peer may already be gone.
        let _ = self.wire.write_all(b"Z1 LOGOUT\r\n");
        let _ = self.wire.flush();
        let _ = self.wire.tcp().shutdown(std::net::Shutdown::Both);
    }
}

// ── Response parsing ────────────────────────────────────────────────

fn ok(lines: &[String]) -> bool {
    lines
        .last()
        .is_some_and(|l| l.split_whitespace().nth(1) == Some("OK"))
}

/// Parse `* 17 EXISTS` → 17.
fn parse_exists(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("*") {
        return None;
    }
    let n: u32 = parts.next()?.parse().ok()?;
    (parts.next() == Some("EXISTS")).then_some(n)
}

/// Pull the UIDs off a `* SEARCH 4 7 9` response line.
fn parse_search_uids(line: &str) -> Vec<u32> {
    line.strip_prefix("* SEARCH")
        .map(|rest| {
            rest.split_whitespace()
                .filter_map(|t| t.parse::<u32>().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Pull the number following `UID ` out of a FETCH response line.
fn parse_uid(line: &str) -> Option<u32> {
    let idx = line.find("UID ")?;
    let digits: String = line[idx + 4..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Pull the `{123}` literal length off the end of a FETCH line.
fn parse_literal_len(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let close = line.rfind('}')?;
    line.get(open + 1..close)?.parse().ok()
}
