//! Synthetic in-memory mail provider for integration testing
//!
//! Implements the `mailtree::provider` traits over plain collections
//! so tests can drive the engine end-to-end: build a folder hierarchy
//! with known messages, deliver arrivals at will, and inject failures
//! per folder or per message.
//!
//! Built with `MockMailboxBuilder`, inspected through the `Arc`
//! handles it hands back.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mailtree::{
    AccountConfig, Error, Flag, FolderEvent, MailProvider, MailStore, MessageMeta, RemoteFolder,
    RemoteMessage, Result,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

// ── Messages ───────────────────────────────────────────────────────

pub struct MockMessage {
    meta: MessageMeta,
    seen: AtomicBool,
    deleted: AtomicBool,
    reject_flags: AtomicBool,
}

impl MockMessage {
    pub fn new(uid: u32, seen: bool, subject: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: MessageMeta {
                uid,
                subject: subject.to_string(),
                sender: "alice@example.com".to_string(),
                recipient: "bob@example.com".to_string(),
                size: 2048,
                date: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
                seen,
                attachments: Vec::new(),
            },
            seen: AtomicBool::new(seen),
            deleted: AtomicBool::new(false),
            reject_flags: AtomicBool::new(false),
        })
    }

    /// Current remote-side `\Seen` state.
    pub fn is_seen(&self) -> bool {
        self.seen.load(Ordering::Acquire)
    }

    /// Current remote-side `\Deleted` state.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Make every subsequent flag update fail.
    pub fn reject_flag_updates(&self) {
        self.reject_flags.store(true, Ordering::Release);
    }
}

#[async_trait]
impl RemoteMessage for MockMessage {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    async fn set_flag(&self, flag: Flag, value: bool) -> Result<()> {
        if self.reject_flags.load(Ordering::Acquire) {
            return Err(Error::Protocol("flag update rejected by server".into()));
        }
        match flag {
            Flag::Seen => self.seen.store(value, Ordering::Release),
            Flag::Deleted => self.deleted.store(value, Ordering::Release),
            _ => {}
        }
        Ok(())
    }
}

// ── Folders ────────────────────────────────────────────────────────

pub struct MockFolder {
    name: String,
    children: Mutex<Vec<Arc<MockFolder>>>,
    messages: Mutex<Vec<Arc<MockMessage>>>,
    open: AtomicBool,
    fail_counts: AtomicBool,
    fail_children: AtomicBool,
    count_queries: AtomicU32,
    subscribers: Mutex<Vec<UnboundedSender<FolderEvent>>>,
}

impl MockFolder {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            children: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
            fail_counts: AtomicBool::new(false),
            fail_children: AtomicBool::new(false),
            count_queries: AtomicU32::new(0),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn notify(&self, event: FolderEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Deliver a new message and emit the arrival notification,
    /// as the provider's own I/O thread would.
    pub fn deliver(&self, uid: u32, seen: bool, subject: &str) -> Arc<MockMessage> {
        let message = MockMessage::new(uid, seen, subject);
        self.messages.lock().unwrap().push(message.clone());
        self.notify(FolderEvent::Added(vec![message.clone()]));
        message
    }

    /// Drop the `n` newest messages remotely and emit the removal
    /// notification.
    pub fn remove_newest(&self, n: usize) {
        {
            let mut messages = self.messages.lock().unwrap();
            let keep = messages.len().saturating_sub(n);
            messages.truncate(keep);
        }
        self.notify(FolderEvent::Removed(n as u32));
    }

    /// Look up a remote message by uid.
    pub fn remote_message(&self, uid: u32) -> Arc<MockMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.meta().uid == uid)
            .unwrap_or_else(|| panic!("no message {uid} in {}", self.name))
            .clone()
    }

    /// Number of messages currently on the remote side.
    pub fn remote_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// How many count queries this folder has served.
    pub fn queries(&self) -> u32 {
        self.count_queries.load(Ordering::Acquire)
    }

    /// Make every subsequent count query fail.
    pub fn set_fail_counts(&self, fail: bool) {
        self.fail_counts.store(fail, Ordering::Release);
    }

    /// Make child listing fail, slowly, the way a wedged server does:
    /// the error comes back after the folder's own load has finished.
    pub fn set_fail_children(&self, fail: bool) {
        self.fail_children.store(fail, Ordering::Release);
    }
}

#[async_trait]
impl RemoteFolder for MockFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn holds_folders(&self) -> bool {
        !self.children.lock().unwrap().is_empty()
    }

    fn holds_messages(&self) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn list_children(&self) -> Result<Vec<Arc<dyn RemoteFolder>>> {
        if self.fail_children.load(Ordering::Acquire) {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            return Err(Error::Protocol(format!("LIST {} failed", self.name)));
        }
        let children = self.children.lock().unwrap();
        Ok(children
            .iter()
            .map(|c| c.clone() as Arc<dyn RemoteFolder>)
            .collect())
    }

    async fn open_read_write(&self) -> Result<()> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn message_count(&self) -> Result<u32> {
        self.count_queries.fetch_add(1, Ordering::AcqRel);
        if self.fail_counts.load(Ordering::Acquire) {
            return Err(Error::Connectivity(format!(
                "folder {} unreachable",
                self.name
            )));
        }
        Ok(self.messages.lock().unwrap().len() as u32)
    }

    async fn fetch_message(&self, index: u32) -> Result<Arc<dyn RemoteMessage>> {
        let messages = self.messages.lock().unwrap();
        messages
            .get(index as usize - 1)
            .map(|m| m.clone() as Arc<dyn RemoteMessage>)
            .ok_or_else(|| Error::Protocol(format!("no message at index {index}")))
    }

    fn subscribe(&self, events: UnboundedSender<FolderEvent>) {
        self.subscribers.lock().unwrap().push(events);
    }
}

// ── Store and provider ─────────────────────────────────────────────

pub struct MockStore {
    root_folders: Vec<Arc<MockFolder>>,
    closed: AtomicBool,
}

#[async_trait]
impl MailStore for MockStore {
    async fn list_root(&self) -> Result<Vec<Arc<dyn RemoteFolder>>> {
        Ok(self
            .root_folders
            .iter()
            .map(|f| f.clone() as Arc<dyn RemoteFolder>)
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

pub struct MockProvider {
    root_folders: Vec<Arc<MockFolder>>,
    password: Option<String>,
}

impl MockProvider {
    /// Look up a folder by slash-separated path, e.g. `Inbox/Work`.
    pub fn folder(&self, path: &str) -> Arc<MockFolder> {
        let mut segments = path.split('/');
        let first = segments.next().expect("empty folder path");
        let mut current = self
            .root_folders
            .iter()
            .find(|f| f.name == first)
            .unwrap_or_else(|| panic!("no root folder {first}"))
            .clone();
        for segment in segments {
            let next = {
                let children = current.children.lock().unwrap();
                children
                    .iter()
                    .find(|c| c.name == segment)
                    .unwrap_or_else(|| panic!("no folder {segment} under {}", current.name))
                    .clone()
            };
            current = next;
        }
        current
    }
}

#[async_trait]
impl MailProvider for MockProvider {
    async fn authenticate(&self, config: &AccountConfig) -> Result<Arc<dyn MailStore>> {
        if let Some(expected) = &self.password {
            if &config.password != expected {
                return Err(Error::Authentication(format!(
                    "bad credentials for {}",
                    config.address
                )));
            }
        }
        Ok(Arc::new(MockStore {
            root_folders: self.root_folders.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

// ── Builder ────────────────────────────────────────────────────────

/// Builds a provider with a known folder hierarchy and messages.
pub struct MockMailboxBuilder {
    root_folders: Vec<Arc<MockFolder>>,
    password: Option<String>,
}

impl MockMailboxBuilder {
    pub fn new() -> Self {
        Self {
            root_folders: Vec::new(),
            password: None,
        }
    }

    /// Require this password at login.
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Create a folder at a slash-separated path, creating parents as
    /// needed.
    pub fn folder(mut self, path: &str) -> Self {
        let mut segments = path.split('/');
        let first = segments.next().expect("empty folder path");

        let mut current = match self.root_folders.iter().find(|f| f.name == first) {
            Some(existing) => existing.clone(),
            None => {
                let created = MockFolder::new(first);
                self.root_folders.push(created.clone());
                created
            }
        };

        for segment in segments {
            let next = {
                let mut children = current.children.lock().unwrap();
                match children.iter().find(|c| c.name == segment) {
                    Some(existing) => existing.clone(),
                    None => {
                        let created = MockFolder::new(segment);
                        children.push(created.clone());
                        created
                    }
                }
            };
            current = next;
        }

        self
    }

    /// Seed a message into an already-declared folder.
    pub fn message(self, path: &str, uid: u32, seen: bool, subject: &str) -> Self {
        {
            let provider = MockProvider {
                root_folders: self.root_folders.clone(),
                password: None,
            };
            let folder = provider.folder(path);
            folder
                .messages
                .lock()
                .unwrap()
                .push(MockMessage::new(uid, seen, subject));
        }
        self
    }

    pub fn build(self) -> Arc<MockProvider> {
        Arc::new(MockProvider {
            root_folders: self.root_folders,
            password: self.password,
        })
    }
}
