//! Stale Match Eviction
//!
//! Rules deciding when an idle match is dropped, plus the background task
//! that sweeps the store on a timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::state::{Match, MatchId, MatchStatus};
use crate::game::store::MatchStore;

/// Idle thresholds for eviction.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Matches with no players.
    pub empty_idle: Duration,
    /// Matches still waiting for an opponent.
    pub waiting_idle: Duration,
    /// Finished matches.
    pub finished_idle: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            empty_idle: Duration::from_secs(5 * 60),
            waiting_idle: Duration::from_secs(10 * 60),
            finished_idle: Duration::from_secs(30 * 60),
        }
    }
}

/// Why a match was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// No players left.
    Empty,
    /// Nobody joined in time.
    AbandonedLobby,
    /// Finished long enough ago.
    Expired,
}

/// Decide whether `m` should be evicted at `now`.
///
/// Playing matches are never evicted.
pub fn eviction_reason(
    m: &Match,
    now: DateTime<Utc>,
    config: &ReaperConfig,
) -> Option<EvictionReason> {
    // A clock that went backwards reads as zero idle time.
    let idle = (now - m.updated_at).to_std().unwrap_or(Duration::ZERO);

    if m.status == MatchStatus::Playing {
        return None;
    }
    if m.players.is_empty() && idle > config.empty_idle {
        return Some(EvictionReason::Empty);
    }
    match m.status {
        MatchStatus::Waiting if idle > config.waiting_idle => Some(EvictionReason::AbandonedLobby),
        MatchStatus::Finished if idle > config.finished_idle => Some(EvictionReason::Expired),
        _ => None,
    }
}

/// Sweep `store` every `every` until the task is aborted.
///
/// Evicted ids are reported on `evicted` while anyone is listening.
pub fn spawn_reaper(
    store: Arc<MatchStore>,
    every: Duration,
    evicted: mpsc::UnboundedSender<MatchId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let ids = store.sweep().await;
            if ids.is_empty() {
                debug!("Reaper sweep: nothing to evict");
                continue;
            }

            info!("Reaper evicted {} stale matches", ids.len());
            for id in ids {
                // Nobody listening is fine.
                let _ = evicted.send(id);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Player, PlayerId};
    use crate::profile::PlayerProfile;

    fn aged_match(status: MatchStatus, idle_secs: i64, now: DateTime<Utc>) -> Match {
        let creator = Player::from_profile(&PlayerProfile {
            id: PlayerId::new("p1"),
            username: "p1".into(),
            gold: 100,
            level: 1,
        });
        let mut m = Match::new(MatchId(1), creator, now - chrono::Duration::seconds(idle_secs));
        m.status = status;
        m
    }

    #[test]
    fn test_waiting_threshold() {
        let now = Utc::now();
        let config = ReaperConfig::default();

        let fresh = aged_match(MatchStatus::Waiting, 9 * 60, now);
        assert_eq!(eviction_reason(&fresh, now, &config), None);

        let stale = aged_match(MatchStatus::Waiting, 11 * 60, now);
        assert_eq!(
            eviction_reason(&stale, now, &config),
            Some(EvictionReason::AbandonedLobby)
        );
    }

    #[test]
    fn test_finished_threshold() {
        let now = Utc::now();
        let config = ReaperConfig::default();

        let recent = aged_match(MatchStatus::Finished, 29 * 60, now);
        assert_eq!(eviction_reason(&recent, now, &config), None);

        let old = aged_match(MatchStatus::Finished, 31 * 60, now);
        assert_eq!(eviction_reason(&old, now, &config), Some(EvictionReason::Expired));
    }

    #[test]
    fn test_playing_never_evicted() {
        let now = Utc::now();
        let config = ReaperConfig::default();
        let m = aged_match(MatchStatus::Playing, 24 * 60 * 60, now);
        assert_eq!(eviction_reason(&m, now, &config), None);
    }

    #[test]
    fn test_empty_threshold() {
        let now = Utc::now();
        let config = ReaperConfig::default();

        let mut m = aged_match(MatchStatus::Waiting, 6 * 60, now);
        m.players.clear();
        assert_eq!(eviction_reason(&m, now, &config), Some(EvictionReason::Empty));

        let mut young = aged_match(MatchStatus::Waiting, 4 * 60, now);
        young.players.clear();
        assert_eq!(eviction_reason(&young, now, &config), None);
    }

    #[test]
    fn test_future_timestamp_is_not_idle() {
        let now = Utc::now();
        let config = ReaperConfig::default();
        let m = aged_match(MatchStatus::Finished, -60, now);
        assert_eq!(eviction_reason(&m, now, &config), None);
    }

    #[tokio::test]
    async fn test_background_sweep_evicts() {
        use crate::profile::MemoryProfiles;

        let store = Arc::new(MatchStore::new(Arc::new(MemoryProfiles::new())));
        let now = Utc::now();
        store.insert_raw(aged_match(MatchStatus::Finished, 31 * 60, now)).await;
        let mut live = aged_match(MatchStatus::Playing, 31 * 60, now);
        live.id = MatchId(2);
        store.insert_raw(live).await;

        let (evicted_tx, mut evicted_rx) = mpsc::unbounded_channel();
        let handle = spawn_reaper(store.clone(), Duration::from_millis(10), evicted_tx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.match_count().await, 1);
        assert!(store.get_match(MatchId(2)).await.is_ok());
        assert_eq!(evicted_rx.try_recv(), Ok(MatchId(1)));
        assert!(evicted_rx.try_recv().is_err());
    }
}
