//! Message loader
//!
//! One-shot initial population of a folder node: open the remote
//! folder read-write, read the message count, and fetch every message
//! by descending remote index. The highest index therefore lands in
//! the first slot of the node's sequence. Live arrivals use a
//! different, head-insert path (see [`crate::listener`]); the
//! asymmetry is inherited behavior and is preserved.

use crate::engine::with_timeout;
use crate::error::{Error, Result};
use crate::message::MessageEntry;
use crate::node::FolderNode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Populate `node` from its remote folder.
///
/// # Errors
///
/// Propagates the first open/count/fetch failure; the node is left
/// with whatever was appended before the failure.
pub(crate) async fn load(node: &Arc<FolderNode>, call_timeout: Duration) -> Result<()> {
    let remote = node
        .remote()
        .ok_or_else(|| Error::Protocol(format!("node {} has no remote folder", node.name())))?
        .clone();

    with_timeout(call_timeout, "open folder", remote.open_read_write()).await?;
    let count = with_timeout(call_timeout, "message count", remote.message_count()).await?;
    debug!(folder = node.name(), count, "loading folder");

    for index in (1..=count).rev() {
        let message =
            with_timeout(call_timeout, "fetch message", remote.fetch_message(index)).await?;
        node.append_message(MessageEntry::from_remote(message));
    }

    Ok(())
}
