//! Observable-mutation events
//!
//! The presentation layer binds read-only to the folder tree and
//! observes mutations through a broadcast channel. The engine owns the
//! data; this module owns only the event contract.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Stable identifier of one [`FolderNode`](crate::FolderNode).
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A change to the folder tree observable by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// A node was appended to its parent's children (tree build, or an
    /// account appearing under the root).
    NodeAdded(NodeId),
    /// A node was removed (account logout).
    NodeRemoved(NodeId),
    /// A node's display label changed (unread counter moved).
    NodeLabelChanged(NodeId),
    /// A node's message sequence changed (load, arrival, delete).
    MessageListChanged(NodeId),
}

/// Cloneable emitter handed to every node of one engine's tree.
///
/// Sending never blocks; if no subscriber is listening the event is
/// dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: broadcast::Sender<TreeEvent>,
}

impl EventSender {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn emit(&self, event: TreeEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.tx.subscribe()
    }
}
