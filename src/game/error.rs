//! Gameplay errors.

use crate::game::state::{ItemId, MatchId, PlayerId};
use crate::profile::ProfileError;

/// Errors returned by match operations.
///
/// All of these are recoverable and go back to the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// No match with that id.
    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    /// Match is not accepting joins.
    #[error("match {0} is not joinable")]
    NotJoinable(MatchId),

    /// Player already belongs to the match (or any active match, for matchmaking).
    #[error("player {0} is already in a match")]
    AlreadyInMatch(PlayerId),

    /// Actor or target of an action is not in the match.
    #[error("participant {0} not found in match")]
    ParticipantNotFound(PlayerId),

    /// A player tried to attack themselves.
    #[error("player {0} cannot target themselves")]
    InvalidTarget(PlayerId),

    /// Action needs the match to be playing.
    #[error("match {0} is not in playing state")]
    NotPlaying(MatchId),

    /// Purchasing player is not in the match.
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// No catalog item with that id.
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// Not enough gold for the item.
    #[error("not enough gold: item costs {cost}, player has {available}")]
    InsufficientGold {
        /// Item price.
        cost: u32,
        /// Gold on hand.
        available: u32,
    },

    /// Identity provider could not supply a profile.
    #[error("profile lookup failed: {0}")]
    ProfileLookupFailed(#[from] ProfileError),

    /// Action kind has no handler.
    #[error("{0} is not supported")]
    UnsupportedAction(&'static str),
}
