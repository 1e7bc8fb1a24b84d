//! # Skirmish Match Server
//!
//! Authoritative in-memory session manager for 1v1 skirmish matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SKIRMISH SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  profile.rs       - Player profiles (identity side)          │
//! │                                                              │
//! │  game/            - Match state and rules                    │
//! │  ├── state.rs     - Players, items, actions, matches         │
//! │  ├── combat.rs    - Damage math                              │
//! │  ├── shop.rs      - Item catalog and purchases               │
//! │  ├── store.rs     - Locked match collection                  │
//! │  ├── matchmaker.rs- Auto-pairing                             │
//! │  ├── events.rs    - Post-mutation update hook                │
//! │  └── reaper.rs    - Stale match eviction                     │
//! │                                                              │
//! │  network/         - WebSocket transport                      │
//! │  ├── server.rs    - Accept loop, request routing             │
//! │  ├── protocol.rs  - Message types                            │
//! │  ├── auth.rs      - JWT validation                           │
//! │  └── connections.rs - Player connection registry, fan-out    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Update Flow
//!
//! Every mutation runs under the store's write lock, snapshots the match,
//! releases the lock, and only then calls the update hook. The server wires
//! that hook to an unbounded channel drained by the fan-out task, which
//! pushes `game_state` frames to every connection of every player in the
//! match without blocking on any of them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;
pub mod profile;

// Re-export commonly used types
pub use game::{GameAction, Match, MatchError, MatchId, MatchStatus, MatchStore, Matchmaker, PlayerId};
pub use profile::{MemoryProfiles, PlayerProfile, ProfileError, ProfileProvider};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
