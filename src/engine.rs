//! The mail engine
//!
//! Top-level coordinator: owns the observable folder tree, the account
//! list, the current selection, the global poll registry, and the
//! shutdown token. One engine per application session; there is no
//! ambient singleton.
//!
//! Task model: `add_account` authenticates in the caller's flow and
//! spawns one discovery task per account; discovery spawns one loader
//! task and one listener task per message-holding folder; exactly one
//! poller task runs for the engine's lifetime. Logout cancels an
//! account's tasks through its child cancellation token.

use crate::config::AccountConfig;
use crate::discovery::TreeBuilder;
use crate::error::{Error, Result};
use crate::events::{EventSender, TreeEvent};
use crate::flag::Flag;
use crate::node::{FolderNode, NodeState};
use crate::poller::{self, PollRegistry};
use crate::provider::{MailProvider, MailStore};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bound a provider call with the engine's per-call timeout.
///
/// The reference behavior had no timeouts at all; an unbounded hang on
/// one folder must not wedge a loader or the poller.
pub(crate) async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Connectivity(format!(
            "{what} timed out after {limit:?}"
        ))),
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sleep between poller ticks.
    pub poll_interval: Duration,
    /// Timeout applied to every provider call.
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            call_timeout: Duration::from_secs(30),
        }
    }
}

struct Account {
    id: u64,
    address: String,
    node: Arc<FolderNode>,
    store: Arc<dyn MailStore>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Selection {
    folder: Option<Arc<FolderNode>>,
    message_uid: Option<u32>,
}

/// The mailbox synchronization engine.
pub struct MailEngine {
    provider: Arc<dyn MailProvider>,
    config: EngineConfig,
    root: Arc<FolderNode>,
    events: EventSender,
    registry: Arc<PollRegistry>,
    accounts: Mutex<Vec<Account>>,
    selection: Mutex<Selection>,
    cancel: CancellationToken,
    next_account_id: AtomicU64,
}

impl MailEngine {
    /// Create an engine with default tuning and start its poller.
    #[must_use]
    pub fn new(provider: Arc<dyn MailProvider>) -> Arc<Self> {
        Self::with_config(provider, EngineConfig::default())
    }

    /// Create an engine and start its poller.
    #[must_use]
    pub fn with_config(provider: Arc<dyn MailProvider>, config: EngineConfig) -> Arc<Self> {
        let events = EventSender::new(1024);
        let registry = Arc::new(PollRegistry::new());
        let cancel = CancellationToken::new();

        tokio::spawn(poller::run(
            registry.clone(),
            config.poll_interval,
            config.call_timeout,
            cancel.child_token(),
        ));

        Arc::new(Self {
            provider,
            config,
            root: FolderNode::new(String::new(), None, events.clone()),
            events,
            registry,
            accounts: Mutex::new(Vec::new()),
            selection: Mutex::new(Selection::default()),
            cancel,
            next_account_id: AtomicU64::new(1),
        })
    }

    fn lock_accounts(&self) -> MutexGuard<'_, Vec<Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_selection(&self) -> MutexGuard<'_, Selection> {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The invisible root of the observable tree. Its children are
    /// account nodes; theirs are folder nodes.
    #[must_use]
    pub fn root(&self) -> Arc<FolderNode> {
        self.root.clone()
    }

    /// Subscribe to tree mutation events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Addresses of the currently logged-in accounts.
    #[must_use]
    pub fn accounts(&self) -> Vec<String> {
        self.lock_accounts()
            .iter()
            .map(|a| a.address.clone())
            .collect()
    }

    /// Authenticate and kick off folder discovery for one account.
    ///
    /// Authentication happens in this call's flow so login failures
    /// surface as typed results; discovery and message loading continue
    /// in background tasks after this returns.
    ///
    /// # Errors
    ///
    /// [`Error::Authentication`], [`Error::Connectivity`], or
    /// [`Error::Protocol`] from the provider; never retried here.
    pub async fn add_account(&self, config: AccountConfig) -> Result<()> {
        info!(address = %config.address, "logging in");
        let store = with_timeout(
            self.config.call_timeout,
            "authenticate",
            self.provider.authenticate(&config),
        )
        .await?;

        let account_node = FolderNode::new(config.address.clone(), None, self.events.clone());
        self.root.push_child(account_node.clone());
        self.root.set_expanded(true);

        let id = self.next_account_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();
        self.lock_accounts().push(Account {
            id,
            address: config.address,
            node: account_node.clone(),
            store: store.clone(),
            cancel: cancel.clone(),
        });

        let builder = TreeBuilder {
            account_id: id,
            registry: self.registry.clone(),
            events: self.events.clone(),
            cancel,
            call_timeout: self.config.call_timeout,
        };
        tokio::spawn(async move {
            if let Err(e) = builder.discover(&store, &account_node).await {
                warn!(account = account_node.name(), error = %e, "folder discovery failed");
                account_node.settle(NodeState::Degraded);
            }
        });

        Ok(())
    }

    /// Feed previously-successful accounts back into the engine, one
    /// by one. Individual failures are logged and skipped.
    pub async fn restore_accounts(&self, configs: Vec<AccountConfig>) {
        for config in configs {
            let address = config.address.clone();
            if let Err(e) = self.add_account(config).await {
                warn!(address = %address, error = %e, "restoring saved account failed");
            }
        }
    }

    pub fn select_folder(&self, node: &Arc<FolderNode>) {
        let mut selection = self.lock_selection();
        selection.folder = Some(node.clone());
        selection.message_uid = None;
    }

    pub fn select_message(&self, uid: u32) {
        self.lock_selection().message_uid = Some(uid);
    }

    fn selected(&self) -> Result<(Arc<FolderNode>, u32)> {
        let selection = self.lock_selection();
        let folder = selection
            .folder
            .clone()
            .ok_or_else(|| Error::LocalState("no folder selected".into()))?;
        let uid = selection
            .message_uid
            .ok_or_else(|| Error::LocalState("no message selected".into()))?;
        Ok((folder, uid))
    }

    /// Mark the selected message read.
    ///
    /// # Errors
    ///
    /// [`Error::LocalState`] if nothing is selected, or the provider's
    /// error if the remote flag update failed; local state is left
    /// unchanged on failure.
    pub async fn mark_read(&self) -> Result<()> {
        let (folder, uid) = self.selected()?;
        self.set_read(&folder, uid, true).await
    }

    /// Mark the selected message unread.
    ///
    /// # Errors
    ///
    /// As [`MailEngine::mark_read`].
    pub async fn mark_unread(&self) -> Result<()> {
        let (folder, uid) = self.selected()?;
        self.set_read(&folder, uid, false).await
    }

    /// Update one message's read state: remote flag first, then the
    /// cached flag and the node's unread counter. The remote update is
    /// idempotent on the wire; a message already in the requested
    /// state is a local no-op.
    ///
    /// # Errors
    ///
    /// [`Error::LocalState`] if the message is unknown, or the
    /// provider's error if the remote update failed. The local counter
    /// never moves on failure.
    pub async fn set_read(&self, node: &Arc<FolderNode>, uid: u32, read: bool) -> Result<()> {
        let entry = node.find_message(uid).ok_or_else(|| {
            Error::LocalState(format!("no message {uid} in folder {}", node.name()))
        })?;
        if entry.read() == read {
            return Ok(());
        }

        with_timeout(
            self.config.call_timeout,
            "set seen flag",
            entry.remote().set_flag(Flag::Seen, read),
        )
        .await?;

        node.set_message_read(uid, read);
        Ok(())
    }

    /// Delete the selected message and clear the message selection.
    ///
    /// # Errors
    ///
    /// As [`MailEngine::delete_message`], plus [`Error::LocalState`]
    /// when nothing is selected.
    pub async fn delete_selected_message(&self) -> Result<()> {
        let (folder, uid) = self.selected()?;
        self.delete_message(&folder, uid).await?;
        self.lock_selection().message_uid = None;
        Ok(())
    }

    /// Flag the message deleted on the remote handle, then remove
    /// exactly one entry from the node's sequence.
    ///
    /// # Errors
    ///
    /// The provider's error if the remote flag update fails; the local
    /// entry stays in place in that case.
    pub async fn delete_message(&self, node: &Arc<FolderNode>, uid: u32) -> Result<()> {
        let entry = node.find_message(uid).ok_or_else(|| {
            Error::LocalState(format!("no message {uid} in folder {}", node.name()))
        })?;

        with_timeout(
            self.config.call_timeout,
            "set deleted flag",
            entry.remote().set_flag(Flag::Deleted, true),
        )
        .await?;

        node.remove_message(uid);
        Ok(())
    }

    /// Log one account out: cancel its loader and listener tasks, drop
    /// its folders from the poll registry, dispose its subtree, and
    /// close its store.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if no account with that address is logged in.
    pub async fn logout(&self, address: &str) -> Result<()> {
        let account = {
            let mut accounts = self.lock_accounts();
            let pos = accounts
                .iter()
                .position(|a| a.address == address)
                .ok_or_else(|| Error::Config(format!("no such account: {address}")))?;
            accounts.remove(pos)
        };

        info!(address, "logging out");
        account.cancel.cancel();
        self.registry.deregister_account(account.id);
        account.node.dispose();
        self.root.remove_child(account.node.id());

        {
            let mut selection = self.lock_selection();
            if selection
                .folder
                .as_ref()
                .is_some_and(|f| f.state() == NodeState::Disposed)
            {
                *selection = Selection::default();
            }
        }

        if let Err(e) = account.store.close().await {
            warn!(address, error = %e, "closing store failed");
        }
        Ok(())
    }

    /// Stop the poller and every account's tasks, dispose the whole
    /// tree, and close all stores.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let accounts: Vec<Account> = self.lock_accounts().drain(..).collect();
        for account in accounts {
            self.registry.deregister_account(account.id);
            account.node.dispose();
            if let Err(e) = account.store.close().await {
                warn!(address = %account.address, error = %e, "closing store failed");
            }
        }
        self.root.dispose();
    }
}
