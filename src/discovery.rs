//! Folder tree builder
//!
//! Walks the remote hierarchy once per account: every descriptor
//! becomes a [`FolderNode`] appended to its parent in discovery order,
//! and every message-holding folder gets its loader task, its live
//! update listener, and a poll registry entry, all wired independently
//! so sibling branches never wait on an earlier branch's load.
//!
//! A branch that fails to list or load is isolated: the node goes
//! `Degraded` and siblings continue. Remote hierarchies are not
//! expected to cycle, but recursion depth is capped and fails closed
//! rather than loop.

use crate::engine::with_timeout;
use crate::error::{Error, Result};
use crate::events::EventSender;
use crate::listener;
use crate::loader;
use crate::node::{FolderNode, NodeState};
use crate::poller::PollRegistry;
use crate::provider::{MailStore, RemoteFolder};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Hard cap on folder nesting; past this the walk fails closed.
pub(crate) const MAX_DEPTH: usize = 64;

/// One account's tree walk. Holds everything the recursion needs so
/// branch tasks don't drag the whole engine around.
pub(crate) struct TreeBuilder {
    pub(crate) account_id: u64,
    pub(crate) registry: Arc<PollRegistry>,
    pub(crate) events: EventSender,
    pub(crate) cancel: CancellationToken,
    pub(crate) call_timeout: Duration,
}

impl TreeBuilder {
    /// Discover the store's folder hierarchy under `account_node`.
    ///
    /// Tree shape is established in this call's flow; message
    /// population and notification wiring run asynchronously per
    /// folder and finish on their own time.
    pub(crate) async fn discover(
        &self,
        store: &Arc<dyn MailStore>,
        account_node: &Arc<FolderNode>,
    ) -> Result<()> {
        account_node.set_state(NodeState::Building);
        let folders = with_timeout(self.call_timeout, "list folders", store.list_root()).await?;
        self.build_level(folders, account_node, 0).await?;
        account_node.settle(NodeState::Live);
        Ok(())
    }

    fn build_level<'a>(
        &'a self,
        folders: Vec<Arc<dyn RemoteFolder>>,
        parent: &'a Arc<FolderNode>,
        depth: usize,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if depth >= MAX_DEPTH {
                return Err(Error::Protocol(format!(
                    "folder hierarchy deeper than {MAX_DEPTH} levels"
                )));
            }

            for folder in folders {
                let node = FolderNode::new(
                    folder.name().to_string(),
                    Some(folder.clone()),
                    self.events.clone(),
                );
                parent.push_child(node.clone());
                parent.set_expanded(true);
                node.set_state(NodeState::Building);

                if folder.holds_messages() {
                    self.wire_folder(&node);
                }

                if folder.holds_folders() {
                    match with_timeout(
                        self.call_timeout,
                        "list subfolders",
                        folder.list_children(),
                    )
                    .await
                    {
                        Ok(children) => {
                            if let Err(e) = self.build_level(children, &node, depth + 1).await {
                                warn!(
                                    folder = node.name(),
                                    error = %e,
                                    "subtree discovery failed; siblings continue"
                                );
                                node.settle(NodeState::Degraded);
                            }
                        }
                        Err(e) => {
                            warn!(
                                folder = node.name(),
                                error = %e,
                                "listing subfolders failed; siblings continue"
                            );
                            node.settle(NodeState::Degraded);
                        }
                    }
                }

                // Pure containers have no load to wait for.
                if !folder.holds_messages() {
                    node.settle(NodeState::Live);
                }
            }

            Ok(())
        })
    }

    /// Wire one message-holding folder: listener, loader task, and a
    /// poll registry entry. The node goes `Live` once its own load
    /// completes, independently of its parent or siblings.
    fn wire_folder(&self, node: &Arc<FolderNode>) {
        listener::register(node.clone(), self.cancel.child_token());
        if let Some(remote) = node.remote() {
            self.registry.register(self.account_id, remote.clone());
        }

        let node = node.clone();
        let cancel = self.cancel.clone();
        let call_timeout = self.call_timeout;
        tokio::spawn(async move {
            let load = loader::load(&node, call_timeout);
            tokio::select! {
                () = cancel.cancelled() => {}
                result = load => match result {
                    Ok(()) => {
                        debug!(folder = node.name(), "initial load complete");
                        node.settle(NodeState::Live);
                    }
                    Err(e) => {
                        warn!(folder = node.name(), error = %e, "initial load failed");
                        node.settle(NodeState::Degraded);
                    }
                },
            }
        });
    }
}
