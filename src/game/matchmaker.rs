//! Matchmaking
//!
//! Pairs a player with the oldest open match, or opens a new one when none
//! is available. The search and the join happen under one write lock, so two
//! concurrent requests can never both claim the last seat.

use std::sync::Arc;

use tracing::info;

use crate::game::error::MatchError;
use crate::game::state::{Match, PlayerId};
use crate::game::store::MatchStore;

/// Auto-match front end over a shared store.
#[derive(Clone)]
pub struct Matchmaker {
    store: Arc<MatchStore>,
}

impl Matchmaker {
    /// Matchmaker over `store`.
    pub fn new(store: Arc<MatchStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<MatchStore> {
        &self.store
    }

    /// Seat `player_id` in a waiting match, creating one if needed.
    ///
    /// A player already waiting or playing somewhere is refused rather than
    /// paired with themselves.
    pub async fn auto_match(&self, player_id: &PlayerId) -> Result<Match, MatchError> {
        let player = self.store.seed_player(player_id)?;

        let (joined, created) = self
            .store
            .commit(|table, now| {
                if table.active_match_of(&player.id).is_some() {
                    return Err(MatchError::AlreadyInMatch(player.id));
                }

                match table.first_open() {
                    Some(id) => {
                        let m = table.get_mut(id)?;
                        m.seat(player);
                        m.touch(now);
                        let snapshot = m.clone();
                        Ok(((snapshot.clone(), false), snapshot))
                    }
                    None => {
                        let snapshot = table.open(player, now).clone();
                        Ok(((snapshot.clone(), true), snapshot))
                    }
                }
            })
            .await?;

        if created {
            info!("No open match for {}, opened {}", player_id, joined.id);
        } else {
            info!("Paired {} into {}", player_id, joined.id);
        }
        Ok(joined)
    }
}
