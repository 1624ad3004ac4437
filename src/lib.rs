//! mailtree: mailbox synchronization engine
//!
//! The concurrent core of a desktop mail client: authenticate against
//! a remote mailbox provider, discover the folder hierarchy, load
//! message metadata, apply live arrival notifications, and poll open
//! folders to keep push notifications flowing. A presentation layer
//! binds read-only to the resulting [`FolderNode`] tree and observes
//! mutations through [`TreeEvent`]s.
//!
//! The engine is written against the [`provider`] traits; the bundled
//! production implementation is [`ImapProvider`], an `async-imap`
//! client over STARTTLS.

mod config;
mod discovery;
mod engine;
mod error;
mod events;
mod flag;
mod imap;
mod listener;
mod loader;
mod message;
mod node;
mod poller;
pub mod provider;

pub use config::{AccountConfig, load_saved_accounts};
pub use engine::{EngineConfig, MailEngine};
pub use error::{Error, Result};
pub use events::{NodeId, TreeEvent};
pub use flag::Flag;
pub use imap::ImapProvider;
pub use message::MessageEntry;
pub use node::{FolderNode, NodeState};
pub use provider::{
    FolderEvent, MailProvider, MailStore, MessageMeta, RemoteFolder, RemoteMessage,
};
