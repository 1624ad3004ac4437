//! Remote mailbox provider traits
//!
//! The synchronization engine is written against this seam. The
//! production implementation is [`ImapProvider`](crate::ImapProvider);
//! tests drive the engine with an in-memory provider.
//!
//! Handles are reference-counted and shared freely across tasks: a
//! [`RemoteFolder`] is held by the folder tree, the poll registry, and
//! the per-folder listener at the same time.

use crate::config::AccountConfig;
use crate::error::Result;
use crate::flag::Flag;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Metadata snapshot of one remote message, taken at fetch time.
#[derive(Debug, Clone)]
pub struct MessageMeta {
    /// Provider-assigned identifier, stable for the folder's lifetime.
    pub uid: u32,
    pub subject: String,
    pub sender: String,
    /// Primary (first) recipient.
    pub recipient: String,
    /// Message size in bytes.
    pub size: u32,
    pub date: DateTime<Utc>,
    /// Whether the remote `\Seen` flag was present at fetch time.
    pub seen: bool,
    /// Attachment names, if the provider reports them.
    pub attachments: Vec<String>,
}

/// Entry point: authenticates credentials and yields a store handle.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Open a connection and negotiate the remote protocol.
    ///
    /// No retry is performed here; the caller decides whether to retry.
    ///
    /// # Errors
    ///
    /// [`Error::Authentication`](crate::Error::Authentication) for bad
    /// credentials, [`Error::Connectivity`](crate::Error::Connectivity)
    /// for network failures, and
    /// [`Error::Protocol`](crate::Error::Protocol) for anything the
    /// server did that made no sense.
    async fn authenticate(&self, config: &AccountConfig) -> Result<Arc<dyn MailStore>>;
}

/// An authenticated session with one account's mailbox store.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// List the immediate children of the store's root folder.
    async fn list_root(&self) -> Result<Vec<Arc<dyn RemoteFolder>>>;

    /// Close the session and release the connection.
    async fn close(&self) -> Result<()>;
}

/// One folder on the remote store.
#[async_trait]
pub trait RemoteFolder: Send + Sync {
    /// Leaf name of the folder (not the full path).
    fn name(&self) -> &str;

    /// Whether the folder may contain sub-folders.
    fn holds_folders(&self) -> bool;

    /// Whether the folder may contain messages.
    fn holds_messages(&self) -> bool;

    /// Whether the folder has been opened and not yet torn down.
    fn is_open(&self) -> bool;

    /// List the folder's immediate sub-folders.
    async fn list_children(&self) -> Result<Vec<Arc<dyn RemoteFolder>>>;

    /// Open the folder for reading and flag mutation.
    async fn open_read_write(&self) -> Result<()>;

    /// Lightweight count query. Also the activity nudge the poller
    /// issues to keep the provider's notification channel alive.
    async fn message_count(&self) -> Result<u32>;

    /// Fetch the message at the given 1-based remote index.
    async fn fetch_message(&self, index: u32) -> Result<Arc<dyn RemoteMessage>>;

    /// Register a count-change subscriber. Events for this folder are
    /// delivered in arrival order on the given channel; the provider
    /// drops senders whose receiver has gone away.
    fn subscribe(&self, events: mpsc::UnboundedSender<FolderEvent>);
}

/// Handle to one remote message; the sole authority for remote-side
/// flag state.
#[async_trait]
pub trait RemoteMessage: Send + Sync {
    /// The metadata snapshot taken when the message was fetched.
    fn meta(&self) -> &MessageMeta;

    /// Set or clear a flag on the remote message. Setting an
    /// already-set flag is a no-op on the wire.
    async fn set_flag(&self, flag: Flag, value: bool) -> Result<()>;
}

/// A count-change notification for one folder.
#[derive(Clone)]
pub enum FolderEvent {
    /// New messages appeared, in remote-index descending order.
    Added(Vec<Arc<dyn RemoteMessage>>),
    /// Messages disappeared from the remote folder.
    Removed(u32),
}
