//! Match State Definitions
//!
//! Players, items, actions and the match record itself.
//! Everything here is plain data; locking lives in `store`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::PlayerProfile;

/// Players per match.
pub const MAX_PLAYERS: usize = 2;

/// Health ceiling (and starting health).
pub const MAX_HEALTH: u32 = 100;

/// Base attack for a freshly seeded player.
pub const BASE_ATTACK: u32 = 10;

/// Base defense for a freshly seeded player.
pub const BASE_DEFENSE: u32 = 5;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Player identifier as issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Match identifier.
///
/// Allocated from a counter that only ever grows, so ids are never reused
/// and their ordering is creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match-{}", self.0)
    }
}

/// Catalog item identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// ITEMS
// =============================================================================

/// Item category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// Adds attack.
    Weapon,
    /// Adds defense.
    Armor,
    /// Restores health on purchase.
    Potion,
}

/// A catalog item. Immutable once the catalog is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Catalog key.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Category.
    pub category: ItemCategory,
    /// Attack bonus.
    pub attack: u32,
    /// Defense bonus.
    pub defense: u32,
    /// Health restored (potions only).
    pub health: u32,
    /// Price in gold.
    pub cost: u32,
    /// Shop description.
    pub description: String,
}

// =============================================================================
// PLAYER
// =============================================================================

/// A player as embedded in a match. Not the profile record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub username: String,
    /// Current health, 0..=MAX_HEALTH.
    pub health: u32,
    /// Gold on hand.
    pub gold: u32,
    /// Level copied from the profile.
    pub level: u32,
    /// Attack stat including item bonuses.
    pub attack: u32,
    /// Defense stat including item bonuses.
    pub defense: u32,
    /// Purchased items in purchase order.
    pub inventory: Vec<Item>,
}

impl Player {
    /// Seed a player from profile data with base combat stats.
    pub fn from_profile(profile: &PlayerProfile) -> Self {
        Self {
            id: profile.id.clone(),
            username: profile.username.clone(),
            health: MAX_HEALTH,
            gold: profile.gold,
            level: profile.level,
            attack: BASE_ATTACK,
            defense: BASE_DEFENSE,
            inventory: Vec::new(),
        }
    }

    /// Is the player still standing?
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// What a player did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Strike another player.
    Attack {
        /// Player being hit.
        target_id: PlayerId,
    },
    /// Purchase an item from the catalog.
    BuyItem {
        /// Item bought.
        item_id: ItemId,
    },
    /// Consume an owned item.
    UseItem {
        /// Item used.
        item_id: ItemId,
    },
}

impl ActionKind {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Attack { .. } => "attack",
            ActionKind::BuyItem { .. } => "buy_item",
            ActionKind::UseItem { .. } => "use_item",
        }
    }
}

/// An entry in a match's append-only action log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAction {
    /// Acting player.
    pub player_id: PlayerId,
    /// Action payload.
    #[serde(flatten)]
    pub kind: ActionKind,
    /// When the action was submitted.
    pub timestamp: DateTime<Utc>,
}

impl GameAction {
    /// Build an action stamped with the current time.
    pub fn now(player_id: PlayerId, kind: ActionKind) -> Self {
        Self {
            player_id,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Attack shorthand.
    pub fn attack(player_id: PlayerId, target_id: PlayerId) -> Self {
        Self::now(player_id, ActionKind::Attack { target_id })
    }

    /// Purchase shorthand.
    pub fn buy_item(player_id: PlayerId, item_id: ItemId) -> Self {
        Self::now(player_id, ActionKind::BuyItem { item_id })
    }
}

// =============================================================================
// MATCH
// =============================================================================

/// Match lifecycle. Transitions are strictly `Waiting -> Playing -> Finished`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Fewer than two players.
    Waiting,
    /// Two players, fight in progress.
    Playing,
    /// Someone hit zero health. Terminal.
    Finished,
}

/// A single match. Owned by the store; callers only ever see clones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Match identifier.
    pub id: MatchId,
    /// Players in join order.
    pub players: Vec<Player>,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Append-only action history.
    pub actions: Vec<GameAction>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time. Read by the reaper.
    pub updated_at: DateTime<Utc>,
    /// Bumped on every committed mutation.
    pub revision: u64,
}

impl Match {
    /// Open a new match with its creator as the only player.
    pub fn new(id: MatchId, creator: Player, now: DateTime<Utc>) -> Self {
        Self {
            id,
            players: vec![creator],
            status: MatchStatus::Waiting,
            actions: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Number of players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Does the match accept another player?
    pub fn is_open(&self) -> bool {
        self.status == MatchStatus::Waiting && self.players.len() < MAX_PLAYERS
    }

    /// Is the player a member?
    pub fn has_player(&self, id: &PlayerId) -> bool {
        self.players.iter().any(|p| &p.id == id)
    }

    /// Look up a player.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Look up a player mutably.
    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// Index of a player in join order.
    pub fn player_index(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| &p.id == id)
    }

    /// Append a player, moving to `Playing` once the match is full.
    ///
    /// Callers check `is_open` and membership first.
    pub(crate) fn seat(&mut self, player: Player) {
        debug_assert!(self.is_open());
        debug_assert!(!self.has_player(&player.id));
        self.players.push(player);
        if self.players.len() == MAX_PLAYERS {
            self.status = MatchStatus::Playing;
        }
    }

    /// Mark a committed mutation.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision += 1;
    }

    /// Player ids in join order.
    pub fn player_ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.iter().map(|p| &p.id)
    }
}
