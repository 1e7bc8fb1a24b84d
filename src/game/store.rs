//! Match Store
//!
//! Owns every live match behind one reader/writer lock. All reads return
//! clones; all writes go through `commit`, which snapshots the mutated match,
//! drops the lock, and only then hands the snapshot to the update hook.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::game::combat::{self, HitOutcome};
use crate::game::error::MatchError;
use crate::game::events::{EventNotifier, UpdateHook};
use crate::game::reaper::{eviction_reason, ReaperConfig};
use crate::game::shop::{self, Catalog};
use crate::game::state::{
    ActionKind, GameAction, Item, ItemId, Match, MatchId, MatchStatus, Player, PlayerId,
};
use crate::profile::ProfileProvider;

// =============================================================================
// MATCH TABLE
// =============================================================================

/// The raw match collection. Only reachable through the store's lock.
pub(crate) struct MatchTable {
    matches: BTreeMap<MatchId, Match>,
    next_id: u64,
}

impl MatchTable {
    fn new() -> Self {
        Self {
            matches: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Insert a new waiting match for `creator`.
    pub(crate) fn open(&mut self, creator: Player, now: DateTime<Utc>) -> &mut Match {
        let id = MatchId(self.next_id);
        self.next_id += 1;
        self.matches
            .entry(id)
            .or_insert_with(|| Match::new(id, creator, now))
    }

    pub(crate) fn get(&self, id: MatchId) -> Result<&Match, MatchError> {
        self.matches.get(&id).ok_or(MatchError::MatchNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: MatchId) -> Result<&mut Match, MatchError> {
        self.matches.get_mut(&id).ok_or(MatchError::MatchNotFound(id))
    }

    /// Oldest match still accepting a player.
    pub(crate) fn first_open(&self) -> Option<MatchId> {
        self.matches.values().find(|m| m.is_open()).map(|m| m.id)
    }

    /// Waiting or playing match the player belongs to, if any.
    pub(crate) fn active_match_of(&self, player_id: &PlayerId) -> Option<MatchId> {
        self.matches
            .values()
            .find(|m| m.status != MatchStatus::Finished && m.has_player(player_id))
            .map(|m| m.id)
    }

    fn open_matches(&self) -> Vec<Match> {
        self.matches.values().filter(|m| m.is_open()).cloned().collect()
    }

    fn evict_stale(&mut self, now: DateTime<Utc>, config: &ReaperConfig) -> Vec<MatchId> {
        let stale: Vec<MatchId> = self
            .matches
            .values()
            .filter(|m| eviction_reason(m, now, config).is_some())
            .map(|m| m.id)
            .collect();

        for id in &stale {
            self.matches.remove(id);
        }
        stale
    }

    fn len(&self) -> usize {
        self.matches.len()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, m: Match) {
        self.next_id = self.next_id.max(m.id.0 + 1);
        self.matches.insert(m.id, m);
    }
}

// =============================================================================
// MATCH STORE
// =============================================================================

/// Authoritative, concurrency-safe match store.
pub struct MatchStore {
    table: RwLock<MatchTable>,
    profiles: Arc<dyn ProfileProvider>,
    catalog: Arc<Catalog>,
    notifier: EventNotifier,
    reaper: ReaperConfig,
}

impl MatchStore {
    /// Store with the standard catalog and default reaper thresholds.
    pub fn new(profiles: Arc<dyn ProfileProvider>) -> Self {
        Self {
            table: RwLock::new(MatchTable::new()),
            profiles,
            catalog: Arc::new(Catalog::standard()),
            notifier: EventNotifier::new(),
            reaper: ReaperConfig::default(),
        }
    }

    /// Use a different catalog.
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Use different reaper thresholds.
    pub fn with_reaper_config(mut self, reaper: ReaperConfig) -> Self {
        self.reaper = reaper;
        self
    }

    /// Register the update hook, replacing any previous one.
    pub async fn set_update_hook(&self, hook: UpdateHook) {
        self.notifier.set_hook(hook).await;
    }

    /// The item catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// All catalog items in id order.
    pub fn get_catalog(&self) -> Vec<Item> {
        self.catalog.items()
    }

    /// Build a fresh in-match player from the identity provider.
    pub(crate) fn seed_player(&self, player_id: &PlayerId) -> Result<Player, MatchError> {
        let profile = self.profiles.profile(player_id)?;
        Ok(Player::from_profile(&profile))
    }

    /// Run a mutation under the write lock, then notify outside it.
    ///
    /// The closure returns the caller's value plus the snapshot to publish.
    /// Nothing is published when it fails.
    pub(crate) async fn commit<T, F>(&self, mutate: F) -> Result<T, MatchError>
    where
        F: FnOnce(&mut MatchTable, DateTime<Utc>) -> Result<(T, Match), MatchError>,
    {
        let (value, snapshot) = {
            let mut table = self.table.write().await;
            mutate(&mut table, Utc::now())?
        };

        self.notifier.notify(snapshot).await;
        Ok(value)
    }

    /// Open a new match with `player_id` as its only player.
    pub async fn create_match(&self, player_id: &PlayerId) -> Result<Match, MatchError> {
        let creator = self.seed_player(player_id)?;

        let created = self
            .commit(|table, now| {
                let snapshot = table.open(creator, now).clone();
                Ok((snapshot.clone(), snapshot))
            })
            .await?;

        info!("Created {} for {}", created.id, player_id);
        Ok(created)
    }

    /// Join an existing waiting match.
    ///
    /// The profile is fetched before the lock is taken.
    pub async fn join_match(&self, match_id: MatchId, player_id: &PlayerId) -> Result<(), MatchError> {
        let player = self.seed_player(player_id)?;

        self.commit(|table, now| {
            let m = table.get_mut(match_id)?;
            if m.has_player(&player.id) {
                return Err(MatchError::AlreadyInMatch(player.id));
            }
            if !m.is_open() {
                return Err(MatchError::NotJoinable(match_id));
            }

            debug!("{} joined {}", player.id, match_id);
            m.seat(player);
            m.touch(now);
            Ok(((), m.clone()))
        })
        .await
    }

    /// Snapshot of one match.
    pub async fn get_match(&self, match_id: MatchId) -> Result<Match, MatchError> {
        let table = self.table.read().await;
        table.get(match_id).cloned()
    }

    /// Matches waiting for an opponent, oldest first.
    pub async fn list_waiting(&self) -> Vec<Match> {
        self.table.read().await.open_matches()
    }

    /// Apply a player action.
    pub async fn process_action(&self, match_id: MatchId, action: GameAction) -> Result<(), MatchError> {
        match action.kind {
            ActionKind::Attack { .. } => {
                self.commit(|table, now| {
                    let m = table.get_mut(match_id)?;
                    let hit = resolve_attack(m, &action)?;
                    debug!(
                        "{}: {} hit for {} ({} hp left)",
                        match_id, action.player_id, hit.damage, hit.remaining_health
                    );
                    if hit.defeated {
                        info!("{} finished, {} wins", match_id, action.player_id);
                    }
                    m.actions.push(action);
                    m.touch(now);
                    Ok(((), m.clone()))
                })
                .await
            }
            ActionKind::BuyItem { ref item_id } => {
                let item_id = item_id.clone();
                self.purchase(match_id, action.player_id, item_id, action.timestamp)
                    .await
            }
            ActionKind::UseItem { .. } => {
                self.table.read().await.get(match_id)?;
                Err(MatchError::UnsupportedAction(action.kind.name()))
            }
        }
    }

    /// Buy a catalog item for a player. Works in any match status.
    pub async fn buy_item(
        &self,
        match_id: MatchId,
        player_id: &PlayerId,
        item_id: &ItemId,
    ) -> Result<(), MatchError> {
        self.purchase(match_id, player_id.clone(), item_id.clone(), Utc::now())
            .await
    }

    async fn purchase(
        &self,
        match_id: MatchId,
        player_id: PlayerId,
        item_id: ItemId,
        timestamp: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        let catalog = &self.catalog;

        self.commit(|table, now| {
            let m = table.get_mut(match_id)?;
            let player = m
                .player_mut(&player_id)
                .ok_or_else(|| MatchError::PlayerNotFound(player_id.clone()))?;
            let item = catalog
                .get(&item_id)
                .ok_or_else(|| MatchError::ItemNotFound(item_id.clone()))?;

            shop::purchase(player, item)?;

            m.actions.push(GameAction {
                player_id,
                kind: ActionKind::BuyItem { item_id },
                timestamp,
            });
            m.touch(now);
            Ok(((), m.clone()))
        })
        .await
    }

    /// Evict stale matches now.
    pub async fn sweep(&self) -> Vec<MatchId> {
        self.sweep_at(Utc::now()).await
    }

    /// Evict matches that are stale as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<MatchId> {
        let mut table = self.table.write().await;
        table.evict_stale(now, &self.reaper)
    }

    /// Number of tracked matches.
    pub async fn match_count(&self) -> usize {
        self.table.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, m: Match) {
        self.table.write().await.insert_raw(m);
    }
}

/// Validate and apply an attack. Leaves `m` untouched on error.
fn resolve_attack(m: &mut Match, action: &GameAction) -> Result<HitOutcome, MatchError> {
    let ActionKind::Attack { target_id } = &action.kind else {
        return Err(MatchError::UnsupportedAction(action.kind.name()));
    };

    if m.status != MatchStatus::Playing {
        return Err(MatchError::NotPlaying(m.id));
    }

    let attack = m
        .player(&action.player_id)
        .map(|p| p.attack)
        .ok_or_else(|| MatchError::ParticipantNotFound(action.player_id.clone()))?;
    if !m.has_player(target_id) {
        return Err(MatchError::ParticipantNotFound(target_id.clone()));
    }
    if target_id == &action.player_id {
        return Err(MatchError::InvalidTarget(target_id.clone()));
    }

    let target = m
        .player_mut(target_id)
        .ok_or_else(|| MatchError::ParticipantNotFound(target_id.clone()))?;
    let outcome = combat::strike(attack, target);
    if outcome.defeated {
        m.status = MatchStatus::Finished;
    }

    Ok(outcome)
}
