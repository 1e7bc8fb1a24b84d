//! Match Logic Module
//!
//! Everything that owns or mutates match state.
//!
//! ## Module Structure
//!
//! - `state`: Players, items, actions, the match record
//! - `error`: Match operation failures
//! - `combat`: Damage math
//! - `shop`: Item catalog and purchases
//! - `store`: Locked match collection and its operations
//! - `matchmaker`: Auto-pairing into open matches
//! - `events`: Post-mutation update hook
//! - `reaper`: Stale match eviction

pub mod state;
pub mod error;
pub mod combat;
pub mod shop;
pub mod store;
pub mod matchmaker;
pub mod events;
pub mod reaper;

// Re-export key types
pub use state::{
    ActionKind, GameAction, Item, ItemCategory, ItemId, Match, MatchId, MatchStatus, Player,
    PlayerId,
};
pub use error::MatchError;
pub use shop::Catalog;
pub use store::MatchStore;
pub use matchmaker::Matchmaker;
pub use events::{update_channel, UpdateHook};
pub use reaper::{spawn_reaper, ReaperConfig};
