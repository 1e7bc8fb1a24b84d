//! Match Update Events
//!
//! One hook receives a snapshot after every committed mutation. The store
//! calls it only after dropping its lock, so a hook can never stall other
//! match operations while it holds the collection.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::game::state::Match;

/// Callback receiving post-mutation match snapshots.
pub type UpdateHook = Arc<dyn Fn(Match) + Send + Sync>;

/// Holds the active update hook. Last registration wins.
pub struct EventNotifier {
    hook: RwLock<UpdateHook>,
}

impl EventNotifier {
    /// Notifier with a no-op hook.
    pub fn new() -> Self {
        Self {
            hook: RwLock::new(noop_hook()),
        }
    }

    /// Replace the active hook.
    pub async fn set_hook(&self, hook: UpdateHook) {
        *self.hook.write().await = hook;
    }

    /// Go back to the no-op hook.
    pub async fn clear_hook(&self) {
        self.set_hook(noop_hook()).await;
    }

    /// Deliver a snapshot to the active hook.
    pub async fn notify(&self, snapshot: Match) {
        let hook = self.hook.read().await.clone();
        hook(snapshot);
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook that drops every update.
pub fn noop_hook() -> UpdateHook {
    Arc::new(|_: Match| {})
}

/// Hook that forwards snapshots into an unbounded queue.
///
/// Sending never blocks, so the caller returns as soon as the snapshot is
/// queued. A dropped receiver just discards updates.
pub fn channel_hook(tx: mpsc::UnboundedSender<Match>) -> UpdateHook {
    Arc::new(move |snapshot: Match| {
        let id = snapshot.id;
        if tx.send(snapshot).is_err() {
            debug!("Update receiver gone, dropping update for {}", id);
        }
    })
}

/// Create a channel hook and the receiver that drains it.
pub fn update_channel() -> (UpdateHook, mpsc::UnboundedReceiver<Match>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (channel_hook(tx), rx)
}
