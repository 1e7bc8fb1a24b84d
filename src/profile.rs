//! Player Profiles
//!
//! The identity side of the server: who a player is and what they start a
//! match with. Match code only ever reads profiles through `ProfileProvider`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::state::PlayerId;

/// Starting gold for newly registered players.
pub const DEFAULT_STARTING_GOLD: u32 = 100;

/// Starting level for newly registered players.
pub const DEFAULT_STARTING_LEVEL: u32 = 1;

/// Profile data used to seed a player when they enter a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub username: String,
    /// Gold carried into a new match.
    pub gold: u32,
    /// Player level.
    pub level: u32,
}

/// Profile lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// No profile for that player.
    #[error("player {0} not found")]
    NotFound(PlayerId),
    /// Backing store could not be read.
    #[error("profile store unavailable")]
    Unavailable,
}

/// Source of player profiles.
pub trait ProfileProvider: Send + Sync {
    /// Fetch the profile for a player.
    fn profile(&self, id: &PlayerId) -> Result<PlayerProfile, ProfileError>;
}

/// In-memory profile store.
pub struct MemoryProfiles {
    profiles: RwLock<BTreeMap<PlayerId, PlayerProfile>>,
    starting_gold: u32,
    starting_level: u32,
}

impl MemoryProfiles {
    /// Empty store using the default starting gold and level.
    pub fn new() -> Self {
        Self::with_starting_stats(DEFAULT_STARTING_GOLD, DEFAULT_STARTING_LEVEL)
    }

    /// Empty store with custom starting gold and level.
    pub fn with_starting_stats(starting_gold: u32, starting_level: u32) -> Self {
        Self {
            profiles: RwLock::new(BTreeMap::new()),
            starting_gold,
            starting_level,
        }
    }

    /// Register (or replace) a profile with starting stats.
    pub fn register(
        &self,
        id: PlayerId,
        username: impl Into<String>,
    ) -> Result<PlayerProfile, ProfileError> {
        let profile = PlayerProfile {
            id: id.clone(),
            username: username.into(),
            gold: self.starting_gold,
            level: self.starting_level,
        };
        let mut profiles = self.profiles.write().map_err(|_| ProfileError::Unavailable)?;
        profiles.insert(id, profile.clone());
        Ok(profile)
    }

    /// Insert a fully specified profile.
    pub fn insert(&self, profile: PlayerProfile) -> Result<(), ProfileError> {
        let mut profiles = self.profiles.write().map_err(|_| ProfileError::Unavailable)?;
        profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Return the existing profile, registering one on first sight.
    pub fn get_or_register(
        &self,
        id: &PlayerId,
        username: &str,
    ) -> Result<PlayerProfile, ProfileError> {
        let mut profiles = self.profiles.write().map_err(|_| ProfileError::Unavailable)?;
        let profile = profiles.entry(id.clone()).or_insert_with(|| PlayerProfile {
            id: id.clone(),
            username: username.to_string(),
            gold: self.starting_gold,
            level: self.starting_level,
        });
        Ok(profile.clone())
    }

    /// Number of known profiles.
    pub fn len(&self) -> usize {
        self.profiles.read().map(|p| p.len()).unwrap_or(0)
    }

    /// No profiles registered?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryProfiles {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileProvider for MemoryProfiles {
    fn profile(&self, id: &PlayerId) -> Result<PlayerProfile, ProfileError> {
        let profiles = self.profiles.read().map_err(|_| ProfileError::Unavailable)?;
        profiles
            .get(id)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(id.clone()))
    }
}
