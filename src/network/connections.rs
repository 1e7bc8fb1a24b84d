//! Connection Registry
//!
//! Tracks which live connections belong to which player, and fans match
//! snapshots out to them. Lives behind its own lock, separate from the
//! match store, so a slow socket never holds up a match mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::state::{Match, MatchId, PlayerId};
use crate::network::protocol::ServerMessage;

/// Unique id for one WebSocket connection.
pub type ConnectionId = Uuid;

/// player -> connection -> outbound queue.
#[derive(Default)]
pub struct ConnectionRegistry {
    players: RwLock<BTreeMap<PlayerId, BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outbound queue for `player`. A player may hold several.
    pub async fn register(&self, player: PlayerId, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let id = Uuid::new_v4();
        let mut players = self.players.write().await;
        players.entry(player).or_default().insert(id, sender);
        id
    }

    /// Drop one connection. Other connections of the same player stay.
    pub async fn unregister(&self, player: &PlayerId, conn: ConnectionId) {
        let mut players = self.players.write().await;
        if let Some(conns) = players.get_mut(player) {
            conns.remove(&conn);
            if conns.is_empty() {
                players.remove(player);
            }
        }
    }

    /// Queue `msg` on every connection of `player` without waiting.
    ///
    /// Full or closed queues are skipped. Returns how many accepted it.
    pub async fn send_to(&self, player: &PlayerId, msg: &ServerMessage) -> usize {
        let players = self.players.read().await;
        let Some(conns) = players.get(player) else {
            return 0;
        };

        let mut delivered = 0;
        for (conn, tx) in conns {
            match tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Outbound queue full for {} ({}), dropping frame", player, conn);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Connection {} for {} already closed", conn, player);
                }
            }
        }
        delivered
    }

    /// Deliver a `game_state` frame to every connection of every player in `m`.
    pub async fn broadcast_match(&self, m: &Match) -> usize {
        let frame = ServerMessage::GameState { snapshot: m.clone() };
        let mut delivered = 0;
        for player in m.player_ids() {
            delivered += self.send_to(player, &frame).await;
        }
        delivered
    }

    /// Connections held by `player`.
    pub async fn connections_of(&self, player: &PlayerId) -> usize {
        self.players.read().await.get(player).map_or(0, |c| c.len())
    }

    /// Total registered connections.
    pub async fn connection_count(&self) -> usize {
        self.players.read().await.values().map(|c| c.len()).sum()
    }
}

/// Last published revision per match.
///
/// The store notifies after releasing its lock, so two commits on one match
/// can reach the fan-out in either order. Anything not newer than what was
/// already sent is stale.
#[derive(Debug, Default)]
pub struct RevisionGate {
    last: BTreeMap<MatchId, u64>,
}

impl RevisionGate {
    /// Record `m` and report whether it is newer than the last one seen.
    pub fn admit(&mut self, m: &Match) -> bool {
        match self.last.get(&m.id) {
            Some(&seen) if m.revision <= seen => false,
            _ => {
                self.last.insert(m.id, m.revision);
                true
            }
        }
    }

    /// Stop tracking an evicted match.
    pub fn forget(&mut self, id: MatchId) {
        self.last.remove(&id);
    }

    /// Matches currently tracked.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Drain match updates into the registry until the update side closes.
///
/// Out-of-order snapshots are dropped. Ids arriving on `evictions` are
/// removed from the revision table.
pub fn spawn_fanout(
    registry: Arc<ConnectionRegistry>,
    mut updates: mpsc::UnboundedReceiver<Match>,
    mut evictions: mpsc::UnboundedReceiver<MatchId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut gate = RevisionGate::default();
        let mut evictions_open = true;

        loop {
            tokio::select! {
                update = updates.recv() => {
                    let Some(snapshot) = update else { break };
                    if !gate.admit(&snapshot) {
                        debug!("Dropping stale {} rev {}", snapshot.id, snapshot.revision);
                        continue;
                    }
                    let delivered = registry.broadcast_match(&snapshot).await;
                    debug!(
                        "Fanned out {} rev {} to {} connections",
                        snapshot.id, snapshot.revision, delivered
                    );
                }
                evicted = evictions.recv(), if evictions_open => {
                    match evicted {
                        Some(id) => gate.forget(id),
                        None => evictions_open = false,
                    }
                }
            }
        }
        debug!("Update channel closed, fan-out stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Player;
    use crate::profile::PlayerProfile;

    fn snapshot(players: &[&str]) -> Match {
        let mut seats = players.iter().map(|id| {
            Player::from_profile(&PlayerProfile {
                id: PlayerId::new(*id),
                username: id.to_string(),
                gold: 100,
                level: 1,
            })
        });
        let mut m = Match::new(MatchId(1), seats.next().unwrap(), chrono::Utc::now());
        m.players.extend(seats);
        m
    }

    #[tokio::test]
    async fn test_unregister_only_removes_own_connection() {
        let registry = ConnectionRegistry::new();
        let p1 = PlayerId::new("p1");
        let (old_tx, _old_rx) = mpsc::channel(4);
        let (new_tx, mut new_rx) = mpsc::channel(4);

        let old = registry.register(p1.clone(), old_tx).await;
        let _new = registry.register(p1.clone(), new_tx).await;
        assert_eq!(registry.connections_of(&p1).await, 2);

        // A late disconnect from the old socket must not drop the new one.
        registry.unregister(&p1, old).await;
        assert_eq!(registry.connections_of(&p1).await, 1);

        registry.broadcast_match(&snapshot(&["p1"])).await;
        assert!(matches!(new_rx.recv().await, Some(ServerMessage::GameState { .. })));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_both_players() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let (tx3, mut rx3) = mpsc::channel(4);
        registry.register(PlayerId::new("p1"), tx1).await;
        registry.register(PlayerId::new("p2"), tx2).await;
        registry.register(PlayerId::new("outsider"), tx3).await;

        let delivered = registry.broadcast_match(&snapshot(&["p1", "p2"])).await;
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_is_skipped() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register(PlayerId::new("p1"), tx).await;

        let m = snapshot(&["p1"]);
        assert_eq!(registry.broadcast_match(&m).await, 1);
        assert_eq!(registry.broadcast_match(&m).await, 0);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_is_skipped() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        registry.register(PlayerId::new("p1"), tx).await;
        drop(rx);

        assert_eq!(registry.broadcast_match(&snapshot(&["p1"])).await, 0);
    }

    #[tokio::test]
    async fn test_fanout_task_delivers_updates() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(PlayerId::new("p1"), tx).await;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (_evict_tx, evict_rx) = mpsc::unbounded_channel();
        let handle = spawn_fanout(registry.clone(), updates_rx, evict_rx);

        updates_tx.send(snapshot(&["p1"])).unwrap();
        match rx.recv().await {
            Some(ServerMessage::GameState { snapshot }) => assert_eq!(snapshot.id, MatchId(1)),
            other => panic!("unexpected frame: {:?}", other),
        }

        drop(updates_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_fanout_drops_older_revision() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(PlayerId::new("p1"), tx).await;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (_evict_tx, evict_rx) = mpsc::unbounded_channel();
        let handle = spawn_fanout(registry.clone(), updates_rx, evict_rx);

        // Revision 2 committed first but its notification lost the race.
        for revision in [3, 2] {
            let mut m = snapshot(&["p1"]);
            m.revision = revision;
            updates_tx.send(m).unwrap();
        }
        drop(updates_tx);
        handle.await.unwrap();

        let mut seen = Vec::new();
        while let Ok(ServerMessage::GameState { snapshot }) = rx.try_recv() {
            seen.push(snapshot.revision);
        }
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn test_revision_gate() {
        let mut gate = RevisionGate::default();
        let mut m = snapshot(&["p1"]);

        assert!(gate.admit(&m));
        assert!(!gate.admit(&m));
        m.revision = 1;
        assert!(gate.admit(&m));

        let mut other = snapshot(&["p2"]);
        other.id = MatchId(2);
        assert!(gate.admit(&other));
        assert_eq!(gate.len(), 2);

        gate.forget(m.id);
        assert_eq!(gate.len(), 1);
        gate.forget(other.id);
        assert!(gate.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_survives_closed_evictions() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(PlayerId::new("p1"), tx).await;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (evict_tx, evict_rx) = mpsc::unbounded_channel();
        drop(evict_tx);
        let handle = spawn_fanout(registry.clone(), updates_rx, evict_rx);

        updates_tx.send(snapshot(&["p1"])).unwrap();
        assert!(matches!(rx.recv().await, Some(ServerMessage::GameState { .. })));

        drop(updates_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_count() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let p1 = PlayerId::new("p1");
        let conn = registry.register(p1.clone(), tx.clone()).await;
        registry.register(PlayerId::new("p2"), tx).await;
        assert_eq!(registry.connection_count().await, 2);

        registry.unregister(&p1, conn).await;
        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.connections_of(&p1).await, 0);
    }
}
