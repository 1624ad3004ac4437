//! Message entries
//!
//! A [`MessageEntry`] is the in-app snapshot of one remote message's
//! metadata plus the handle used to mutate remote flags. The remote
//! handle is authoritative for flag state; the local `read` field is a
//! cache of it and may transiently lag.

use crate::provider::RemoteMessage;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Local metadata snapshot of one remote message.
#[derive(Clone)]
pub struct MessageEntry {
    uid: u32,
    subject: String,
    sender: String,
    recipient: String,
    size: u32,
    date: DateTime<Utc>,
    read: bool,
    attachments: Vec<String>,
    remote: Arc<dyn RemoteMessage>,
}

impl MessageEntry {
    /// Build an entry from a freshly fetched remote message.
    pub fn from_remote(remote: Arc<dyn RemoteMessage>) -> Self {
        let meta = remote.meta().clone();
        Self {
            uid: meta.uid,
            subject: meta.subject,
            sender: meta.sender,
            recipient: meta.recipient,
            size: meta.size,
            date: meta.date,
            read: meta.seen,
            attachments: meta.attachments,
            remote,
        }
    }

    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Message size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    #[must_use]
    pub fn read(&self) -> bool {
        self.read
    }

    #[must_use]
    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    /// The remote handle used for flag mutation and deletion.
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteMessage> {
        &self.remote
    }

    pub(crate) fn set_read(&mut self, read: bool) {
        self.read = read;
    }
}

impl fmt::Debug for MessageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEntry")
            .field("uid", &self.uid)
            .field("subject", &self.subject)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("size", &self.size)
            .field("date", &self.date)
            .field("read", &self.read)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}
