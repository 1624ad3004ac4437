//! Live update listener
//!
//! Per-folder application of provider count-change notifications.
//! Provider callbacks arrive on whatever task the provider runs its
//! I/O on; they are funneled through an unbounded channel into one
//! task per folder, so notifications for the same folder are applied
//! in arrival order. No ordering exists across folders.

use crate::message::MessageEntry;
use crate::node::FolderNode;
use crate::provider::FolderEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Register a listener on the node's remote folder and spawn its
/// serialized application task.
pub(crate) fn register(node: Arc<FolderNode>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
    let remote = node.remote()?.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    remote.subscribe(tx);
    Some(tokio::spawn(run(node, rx, cancel)))
}

async fn run(
    node: Arc<FolderNode>,
    mut events: mpsc::UnboundedReceiver<FolderEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            FolderEvent::Added(messages) => {
                // Delivered in remote-index descending order; each is
                // inserted at the head so the newest arrival is first.
                for message in messages {
                    node.insert_message_front(MessageEntry::from_remote(message));
                }
            }
            FolderEvent::Removed(count) => {
                // Removals are not mirrored into the local sequence.
                // Inherited gap: the local view keeps entries the
                // server no longer has.
                debug!(
                    folder = node.name(),
                    count, "ignoring removed-messages notification"
                );
            }
        }
    }
}
