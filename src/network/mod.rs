//! Network Layer
//!
//! WebSocket transport in front of the match store. Nothing here owns
//! match state; it authenticates, routes requests, and delivers updates.

pub mod auth;
pub mod protocol;
pub mod connections;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token};
pub use protocol::{ClientMessage, ServerMessage, ErrorCode, AuthRequest, WelcomeInfo};
pub use connections::{ConnectionId, ConnectionRegistry, spawn_fanout};
pub use server::{GameServer, ServerConfig, GameServerError, ConfigError};
