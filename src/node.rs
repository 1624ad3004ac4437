//! Folder nodes
//!
//! A [`FolderNode`] mirrors one remote folder: ordered children in
//! discovery order, an ordered message sequence, and an unread counter
//! that feeds the display label. The tree shape is fixed once built;
//! only the message sequence and counter mutate afterwards.
//!
//! All mutation goes through methods that take the node's internal
//! lock, so the loader, the per-folder listener, and user-triggered
//! read/delete operations serialize against each other. The
//! presentation layer reads cloned snapshots and never holds the lock
//! across a render.

use crate::events::{EventSender, NodeId, TreeEvent, next_node_id};
use crate::message::MessageEntry;
use crate::provider::RemoteFolder;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle of one folder node. Transitions are one-directional;
/// there is no rebuild path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Just created, before any child or message population.
    Unbuilt,
    /// Child discovery and initial message load in progress.
    Building,
    /// Initial load finished and the listener is registered.
    Live,
    /// The initial load failed; the node holds whatever made it in.
    Degraded,
    /// Session torn down; no further mutation is permitted.
    Disposed,
}

struct NodeInner {
    children: Vec<Arc<FolderNode>>,
    messages: Vec<MessageEntry>,
    unread: u32,
    expanded: bool,
    state: NodeState,
}

/// One node of the observable folder tree.
pub struct FolderNode {
    id: NodeId,
    name: String,
    remote: Option<Arc<dyn RemoteFolder>>,
    events: EventSender,
    inner: Mutex<NodeInner>,
}

impl FolderNode {
    pub(crate) fn new(
        name: String,
        remote: Option<Arc<dyn RemoteFolder>>,
        events: EventSender,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: next_node_id(),
            name,
            remote,
            events,
            inner: Mutex::new(NodeInner {
                children: Vec::new(),
                messages: Vec::new(),
                unread: 0,
                expanded: false,
                state: NodeState::Unbuilt,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The remote folder behind this node. `None` for the invisible
    /// tree root and for account nodes.
    #[must_use]
    pub fn remote(&self) -> Option<&Arc<dyn RemoteFolder>> {
        self.remote.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.lock().state
    }

    #[must_use]
    pub fn unread_count(&self) -> u32 {
        self.lock().unread
    }

    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.lock().expanded
    }

    /// The display label: the folder name, suffixed with the unread
    /// count when it is positive, e.g. `Inbox(3)`.
    #[must_use]
    pub fn label(&self) -> String {
        let unread = self.lock().unread;
        if unread > 0 {
            format!("{}({unread})", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Snapshot of the children, in discovery order.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<FolderNode>> {
        self.lock().children.clone()
    }

    /// Snapshot of the message sequence.
    #[must_use]
    pub fn messages(&self) -> Vec<MessageEntry> {
        self.lock().messages.clone()
    }

    /// Look up a message by uid.
    #[must_use]
    pub fn find_message(&self, uid: u32) -> Option<MessageEntry> {
        self.lock().messages.iter().find(|m| m.uid() == uid).cloned()
    }

    pub(crate) fn push_child(&self, child: Arc<FolderNode>) {
        let child_id = child.id;
        self.lock().children.push(child);
        self.events.emit(TreeEvent::NodeAdded(child_id));
    }

    pub(crate) fn remove_child(&self, id: NodeId) -> Option<Arc<FolderNode>> {
        let removed = {
            let mut inner = self.lock();
            let pos = inner.children.iter().position(|c| c.id == id)?;
            Some(inner.children.remove(pos))
        };
        self.events.emit(TreeEvent::NodeRemoved(id));
        removed
    }

    pub(crate) fn set_expanded(&self, expanded: bool) {
        self.lock().expanded = expanded;
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        self.lock().state = state;
    }

    /// Complete the `Building` phase, moving to `Live` or `Degraded`.
    /// Transitions are one-directional: a node that already settled or
    /// was disposed is left alone.
    pub(crate) fn settle(&self, state: NodeState) {
        let mut inner = self.lock();
        if inner.state == NodeState::Building {
            inner.state = state;
        }
    }

    /// Walk this node and all descendants into `Disposed`.
    pub(crate) fn dispose(&self) {
        let children = {
            let mut inner = self.lock();
            inner.state = NodeState::Disposed;
            inner.children.clone()
        };
        for child in children {
            child.dispose();
        }
    }

    /// Append an entry at the end of the sequence (initial load path).
    ///
    /// Initial load fetches by descending remote index, so the highest
    /// index occupies the first slot. Entries already present under
    /// the same uid are skipped.
    pub(crate) fn append_message(&self, entry: MessageEntry) {
        self.insert_message(entry, false);
    }

    /// Insert an entry at the head of the sequence (live-arrival path),
    /// so the newest arrival is always first. Entries already present
    /// under the same uid are skipped.
    pub(crate) fn insert_message_front(&self, entry: MessageEntry) {
        self.insert_message(entry, true);
    }

    fn insert_message(&self, entry: MessageEntry, front: bool) {
        let label_changed = {
            let mut inner = self.lock();
            if inner.state == NodeState::Disposed {
                return;
            }
            if inner.messages.iter().any(|m| m.uid() == entry.uid()) {
                return;
            }
            let unread = !entry.read();
            if front {
                inner.messages.insert(0, entry);
            } else {
                inner.messages.push(entry);
            }
            if unread {
                inner.unread += 1;
            }
            unread
        };

        self.events.emit(TreeEvent::MessageListChanged(self.id));
        if label_changed {
            self.events.emit(TreeEvent::NodeLabelChanged(self.id));
        }
    }

    /// Update the cached read flag of one entry and adjust the unread
    /// counter. Call only after the remote flag update succeeded.
    ///
    /// Returns `false` if the entry is missing or already in the
    /// requested state.
    pub(crate) fn set_message_read(&self, uid: u32, read: bool) -> bool {
        let changed = {
            let mut inner = self.lock();
            if inner.state == NodeState::Disposed {
                return false;
            }
            let Some(entry) = inner.messages.iter_mut().find(|m| m.uid() == uid) else {
                return false;
            };
            if entry.read() == read {
                false
            } else {
                entry.set_read(read);
                if read {
                    inner.unread = inner.unread.saturating_sub(1);
                } else {
                    inner.unread += 1;
                }
                true
            }
        };

        if changed {
            self.events.emit(TreeEvent::NodeLabelChanged(self.id));
        }
        changed
    }

    /// Remove exactly one entry by uid.
    pub(crate) fn remove_message(&self, uid: u32) -> Option<MessageEntry> {
        let (removed, label_changed) = {
            let mut inner = self.lock();
            if inner.state == NodeState::Disposed {
                return None;
            }
            let pos = inner.messages.iter().position(|m| m.uid() == uid)?;
            let entry = inner.messages.remove(pos);
            let was_unread = !entry.read();
            if was_unread {
                inner.unread = inner.unread.saturating_sub(1);
            }
            (entry, was_unread)
        };

        self.events.emit(TreeEvent::MessageListChanged(self.id));
        if label_changed {
            self.events.emit(TreeEvent::NodeLabelChanged(self.id));
        }
        Some(removed)
    }
}
