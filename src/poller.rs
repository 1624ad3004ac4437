//! Unread/activity poller
//!
//! Many mail protocols only emit push notifications in response to
//! client activity. One long-lived loop sleeps a fixed interval, then
//! issues a lightweight count query to every registered open folder,
//! purely to keep that channel alive. Tick failures are logged and
//! swallowed; only shutdown stops the loop.

use crate::engine::with_timeout;
use crate::provider::RemoteFolder;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct PollTarget {
    account_id: u64,
    folder: Arc<dyn RemoteFolder>,
}

/// Append-only registry of folders the poller nudges.
///
/// Discovery branches append concurrently while the poller iterates;
/// the poller works on an immutable snapshot taken at the start of
/// each tick, so appends during a tick are picked up on the next one.
pub(crate) struct PollRegistry {
    targets: Mutex<Vec<PollTarget>>,
}

impl PollRegistry {
    pub(crate) fn new() -> Self {
        Self {
            targets: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PollTarget>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, account_id: u64, folder: Arc<dyn RemoteFolder>) {
        self.lock().push(PollTarget { account_id, folder });
    }

    /// Drop every folder registered under the given account.
    pub(crate) fn deregister_account(&self, account_id: u64) {
        self.lock().retain(|t| t.account_id != account_id);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn RemoteFolder>> {
        self.lock().iter().map(|t| t.folder.clone()).collect()
    }
}

/// The single global poller loop. Spawned once per engine.
pub(crate) async fn run(
    registry: Arc<PollRegistry>,
    interval: Duration,
    call_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        for folder in registry.snapshot() {
            if !folder.holds_messages() || !folder.is_open() {
                continue;
            }
            match with_timeout(call_timeout, "poll tick", folder.message_count()).await {
                Ok(count) => debug!(folder = folder.name(), count, "poll tick"),
                Err(e) => warn!(folder = folder.name(), error = %e, "poll tick failed"),
            }
        }
    }
    debug!("poller stopped");
}
