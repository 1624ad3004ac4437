//! IMAP-backed mail provider
//!
//! Implements the [`provider`](crate::provider) traits over
//! `async-imap` with STARTTLS, sharing one session per account behind
//! an async mutex. The permissive certificate verifier exists for
//! bridge-style local relays with self-signed certificates.
//!
//! Count-change notifications: IMAP only reports new messages during
//! protocol activity, so [`RemoteFolder::message_count`] doubles as
//! the notification source: when a count query observes growth, the
//! new range is fetched and emitted to subscribers. The engine's
//! poller provides the periodic activity that keeps this flowing.

use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::provider::{
    FolderEvent, MailProvider, MailStore, MessageMeta, RemoteFolder, RemoteMessage,
};
use async_imap::Session;
use async_imap::types::{Fetch, Flag as ImapFlag, NameAttribute};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rustls::pki_types::ServerName;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// One IMAP session plus the folder currently SELECTed on it.
struct SessionState {
    session: ImapSession,
    selected: Option<String>,
}

type SharedSession = Arc<Mutex<SessionState>>;

/// SELECT `path` unconditionally, returning the fresh EXISTS count.
async fn select_fresh(state: &mut SessionState, path: &str) -> Result<u32> {
    let mailbox = state
        .session
        .select(path)
        .await
        .map_err(|e| Error::Protocol(format!("SELECT {path} failed: {e}")))?;
    state.selected = Some(path.to_string());
    Ok(mailbox.exists)
}

/// SELECT `path` only if it is not already the selected folder.
async fn ensure_selected(state: &mut SessionState, path: &str) -> Result<()> {
    if state.selected.as_deref() != Some(path) {
        select_fresh(state, path).await?;
    }
    Ok(())
}

/// Provider implementation over IMAP with STARTTLS.
#[derive(Debug, Default)]
pub struct ImapProvider;

impl ImapProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailProvider for ImapProvider {
    async fn authenticate(&self, config: &AccountConfig) -> Result<Arc<dyn MailStore>> {
        let session = connect(config).await?;
        Ok(Arc::new(ImapStore {
            session: Arc::new(Mutex::new(SessionState {
                session,
                selected: None,
            })),
        }))
    }
}

/// Open a fresh TLS-wrapped IMAP session.
///
/// Connects via TCP, issues STARTTLS, performs the TLS handshake, and
/// logs in with the account's address and password.
async fn connect(config: &AccountConfig) -> Result<ImapSession> {
    let addr = format!("{}:{}", config.host, config.port);
    debug!("Connecting to mail server at {}", addr);

    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Connectivity(format!("connect {addr}: {e}")))?;
    let mut client = async_imap::Client::new(tcp_stream.compat());

    client
        .run_command_and_check_ok("STARTTLS", None)
        .await
        .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;

    let connector = tls_connector();
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

    let inner = client.into_inner().into_inner();
    let tls_stream = connector
        .connect(server_name, inner)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    let tls_client = async_imap::Client::new(tls_stream.compat());

    let session = tls_client
        .login(&config.address, &config.password)
        .await
        .map_err(|(e, _)| Error::Authentication(format!("login rejected: {e}")))?;

    info!("Connected to mail server");
    Ok(session)
}

struct ImapStore {
    session: SharedSession,
}

#[async_trait]
impl MailStore for ImapStore {
    async fn list_root(&self) -> Result<Vec<Arc<dyn RemoteFolder>>> {
        list_level(&self.session, None).await
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.session.lock().await;
        state
            .session
            .logout()
            .await
            .map_err(|e| Error::Protocol(format!("LOGOUT failed: {e}")))?;
        Ok(())
    }
}

/// LIST one hierarchy level: the root's children, or the children of
/// `parent` = `(path, delimiter)`.
async fn list_level(
    session: &SharedSession,
    parent: Option<(&str, &str)>,
) -> Result<Vec<Arc<dyn RemoteFolder>>> {
    let pattern = match parent {
        None => "%".to_string(),
        Some((path, delimiter)) => format!("{path}{delimiter}%"),
    };

    let mut raw: Vec<(String, Option<String>, bool, bool)> = Vec::new();
    {
        let mut state = session.lock().await;
        let mut stream = state
            .session
            .list(Some(""), Some(pattern.as_str()))
            .await
            .map_err(|e| Error::Protocol(format!("LIST {pattern} failed: {e}")))?;

        while let Some(item) = stream.next().await {
            let name = item.map_err(|e| Error::Protocol(format!("LIST response: {e}")))?;
            let holds_folders = !name
                .attributes()
                .iter()
                .any(|a| matches!(a, NameAttribute::NoInferiors));
            let holds_messages = !name
                .attributes()
                .iter()
                .any(|a| matches!(a, NameAttribute::NoSelect));
            raw.push((
                name.name().to_string(),
                name.delimiter().map(ToString::to_string),
                holds_folders,
                holds_messages,
            ));
        }
    }

    let folders = raw
        .into_iter()
        .map(|(path, delimiter, holds_folders, holds_messages)| {
            let delimiter = delimiter.unwrap_or_else(|| "/".to_string());
            let name = if delimiter.is_empty() {
                path.clone()
            } else {
                path.rsplit(&delimiter)
                    .next()
                    .unwrap_or(path.as_str())
                    .to_string()
            };
            Arc::new(ImapFolder {
                session: session.clone(),
                path,
                name,
                delimiter,
                holds_folders,
                holds_messages,
                open: AtomicBool::new(false),
                baseline: CountBaseline::new(),
                subscribers: std::sync::Mutex::new(Vec::new()),
            }) as Arc<dyn RemoteFolder>
        })
        .collect();

    Ok(folders)
}

/// What one EXISTS observation means relative to the committed
/// baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountChange {
    Unchanged,
    Added { from: u32, to: u32 },
    Removed(u32),
}

/// EXISTS baseline for one folder. `observe` classifies a fresh count
/// without moving the baseline; `commit` advances it. Keeping the two
/// apart means a failed fetch of a new range leaves the baseline
/// behind, so the next query sees the same range again and retries it.
struct CountBaseline {
    last: AtomicU32,
}

impl CountBaseline {
    const fn new() -> Self {
        Self {
            last: AtomicU32::new(0),
        }
    }

    fn observe(&self, exists: u32) -> CountChange {
        let previous = self.last.load(Ordering::Acquire);
        if exists > previous {
            CountChange::Added {
                from: previous + 1,
                to: exists,
            }
        } else if exists < previous {
            CountChange::Removed(previous - exists)
        } else {
            CountChange::Unchanged
        }
    }

    fn commit(&self, exists: u32) {
        self.last.store(exists, Ordering::Release);
    }
}

struct ImapFolder {
    session: SharedSession,
    /// Full mailbox path, e.g. `Inbox/Work`.
    path: String,
    /// Leaf name, e.g. `Work`.
    name: String,
    delimiter: String,
    holds_folders: bool,
    holds_messages: bool,
    open: AtomicBool,
    baseline: CountBaseline,
    subscribers: std::sync::Mutex<Vec<UnboundedSender<FolderEvent>>>,
}

impl ImapFolder {
    fn notify(&self, event: FolderEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Fetch indices `from..=to`, highest first.
    async fn fetch_range(&self, from: u32, to: u32) -> Result<Vec<Arc<dyn RemoteMessage>>> {
        let mut messages = Vec::new();
        for index in (from..=to).rev() {
            messages.push(self.fetch_message(index).await?);
        }
        Ok(messages)
    }
}

#[async_trait]
impl RemoteFolder for ImapFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn holds_folders(&self) -> bool {
        self.holds_folders
    }

    fn holds_messages(&self) -> bool {
        self.holds_messages
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn list_children(&self) -> Result<Vec<Arc<dyn RemoteFolder>>> {
        if !self.holds_folders {
            return Ok(Vec::new());
        }
        list_level(&self.session, Some((&self.path, &self.delimiter))).await
    }

    async fn open_read_write(&self) -> Result<()> {
        let mut state = self.session.lock().await;
        let exists = select_fresh(&mut state, &self.path).await?;
        // Baseline the count so the initial population is not treated
        // as an arrival.
        self.baseline.commit(exists);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn message_count(&self) -> Result<u32> {
        let exists = {
            let mut state = self.session.lock().await;
            select_fresh(&mut state, &self.path).await?
        };

        if !self.is_open() {
            self.baseline.commit(exists);
            return Ok(exists);
        }

        match self.baseline.observe(exists) {
            CountChange::Added { from, to } => {
                debug!(folder = %self.path, from, to, "new messages observed");
                // The baseline moves only after the range has reached
                // the subscribers; a failed fetch leaves it behind so
                // the next query retries the same range.
                let added = self.fetch_range(from, to).await?;
                self.notify(FolderEvent::Added(added));
                self.baseline.commit(exists);
            }
            CountChange::Removed(count) => {
                self.baseline.commit(exists);
                self.notify(FolderEvent::Removed(count));
            }
            CountChange::Unchanged => {}
        }

        Ok(exists)
    }

    async fn fetch_message(&self, index: u32) -> Result<Arc<dyn RemoteMessage>> {
        let fetch = {
            let mut state = self.session.lock().await;
            ensure_selected(&mut state, &self.path).await?;

            let mut stream = state
                .session
                .fetch(
                    format!("{index}"),
                    "(UID ENVELOPE RFC822.SIZE FLAGS INTERNALDATE)",
                )
                .await
                .map_err(|e| Error::Protocol(format!("FETCH {index} failed: {e}")))?;

            match stream.next().await {
                Some(item) => item.map_err(|e| Error::Protocol(format!("FETCH response: {e}")))?,
                None => {
                    return Err(Error::Protocol(format!("no message at index {index}")));
                }
            }
        };

        let meta = meta_from_fetch(&fetch)?;
        Ok(Arc::new(ImapMessage {
            session: self.session.clone(),
            path: self.path.clone(),
            uid: meta.uid,
            meta,
        }))
    }

    fn subscribe(&self, events: UnboundedSender<FolderEvent>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(events);
    }
}

fn meta_from_fetch(fetch: &Fetch) -> Result<MessageMeta> {
    let uid = fetch
        .uid
        .ok_or_else(|| Error::Protocol("FETCH response missing UID".into()))?;
    let envelope = fetch
        .envelope()
        .ok_or_else(|| Error::Protocol("FETCH response missing envelope".into()))?;

    let subject = envelope
        .subject
        .as_ref()
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default();
    let sender = envelope
        .from
        .as_ref()
        .and_then(|addrs| addrs.first())
        .map(|a| format_address(a.name.as_deref(), a.mailbox.as_deref(), a.host.as_deref()))
        .unwrap_or_default();
    let recipient = envelope
        .to
        .as_ref()
        .and_then(|addrs| addrs.first())
        .map(|a| format_address(a.name.as_deref(), a.mailbox.as_deref(), a.host.as_deref()))
        .unwrap_or_default();

    let date = envelope
        .date
        .as_ref()
        .and_then(|d| std::str::from_utf8(d).ok())
        .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| fetch.internal_date().map(|d| d.with_timezone(&Utc)))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let seen = fetch.flags().any(|f| f == ImapFlag::Seen);

    Ok(MessageMeta {
        uid,
        subject,
        sender,
        recipient,
        size: fetch.size.unwrap_or(0),
        date,
        seen,
        attachments: Vec::new(),
    })
}

fn format_address(name: Option<&[u8]>, mailbox: Option<&[u8]>, host: Option<&[u8]>) -> String {
    let address = match (mailbox, host) {
        (Some(mailbox), Some(host)) => format!(
            "{}@{}",
            String::from_utf8_lossy(mailbox),
            String::from_utf8_lossy(host)
        ),
        (Some(mailbox), None) => String::from_utf8_lossy(mailbox).into_owned(),
        _ => String::new(),
    };
    match name {
        Some(name) if !name.is_empty() => {
            format!("{} <{address}>", String::from_utf8_lossy(name))
        }
        _ => address,
    }
}

struct ImapMessage {
    session: SharedSession,
    path: String,
    uid: u32,
    meta: MessageMeta,
}

#[async_trait]
impl RemoteMessage for ImapMessage {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    async fn set_flag(&self, flag: Flag, value: bool) -> Result<()> {
        let mut state = self.session.lock().await;
        ensure_selected(&mut state, &self.path).await?;

        let op = if value { '+' } else { '-' };
        let query = format!("{op}FLAGS.SILENT ({})", flag.as_imap_str());
        let mut stream = state
            .session
            .uid_store(format!("{}", self.uid), &query)
            .await
            .map_err(|e| Error::Protocol(format!("STORE failed: {e}")))?;
        while let Some(item) = stream.next().await {
            item.map_err(|e| Error::Protocol(format!("STORE response: {e}")))?;
        }
        Ok(())
    }
}

/// Build a TLS connector that accepts all certificates, for
/// bridge-style relays with self-signed certificates.
fn tls_connector() -> TlsConnector {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PermissiveVerifier))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Certificate verifier that accepts all certificates.
#[derive(Debug)]
struct PermissiveVerifier;

impl rustls::client::danger::ServerCertVerifier for PermissiveVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncommitted_growth_is_observed_again() {
        let baseline = CountBaseline::new();
        baseline.commit(3);

        assert_eq!(baseline.observe(5), CountChange::Added { from: 4, to: 5 });
        // Not committed (the fetch failed), so the same range comes up
        // on the next query instead of being lost.
        assert_eq!(baseline.observe(5), CountChange::Added { from: 4, to: 5 });

        baseline.commit(5);
        assert_eq!(baseline.observe(5), CountChange::Unchanged);
    }

    #[test]
    fn shrink_reports_the_removed_count() {
        let baseline = CountBaseline::new();
        baseline.commit(5);
        assert_eq!(baseline.observe(2), CountChange::Removed(3));
    }
}
