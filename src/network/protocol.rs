//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::game::error::MatchError;
use crate::game::state::{Item, ItemId, Match, MatchId, PlayerId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Open a new match.
    CreateMatch,

    /// Join a specific waiting match.
    JoinMatch { match_id: MatchId },

    /// Join the oldest open match, or open one.
    AutoMatch,

    /// List matches waiting for an opponent.
    ListWaiting,

    /// Request a match snapshot.
    GetGameState { match_id: MatchId },

    /// Attack another player.
    Attack { match_id: MatchId, target_id: PlayerId },

    /// Buy a catalog item.
    BuyItem { match_id: MatchId, item_id: ItemId },

    /// Request the item catalog.
    GetCatalog,

    /// Ping for latency measurement.
    Ping {
        #[serde(default)]
        timestamp: u64,
    },
}

/// Authentication request.
///
/// With token validation configured, only `token` is read. Without it the
/// server trusts `player_id` as given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Signed JWT.
    #[serde(default)]
    pub token: Option<String>,
    /// Self-declared player id (development mode only).
    #[serde(default)]
    pub player_id: Option<String>,
    /// Display name used when the profile is first registered.
    #[serde(default)]
    pub username: Option<String>,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication succeeded.
    Welcome(WelcomeInfo),

    /// Match snapshot, sent on request and after every change.
    GameState {
        #[serde(rename = "match")]
        snapshot: Match,
    },

    /// Matches waiting for an opponent.
    WaitingMatches { matches: Vec<Match> },

    /// Item catalog.
    Catalog { items: Vec<Item> },

    /// Request accepted. State follows as `game_state`.
    Ack {
        request: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        match_id: Option<MatchId>,
    },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeInfo {
    /// Authenticated player id.
    pub player_id: PlayerId,
    /// Profile display name.
    pub username: String,
    /// Server version.
    pub server_version: String,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Invalid input.
    InvalidInput,
    /// Match not found.
    MatchNotFound,
    /// Match is not accepting players.
    NotJoinable,
    /// Already in match.
    AlreadyInMatch,
    /// Attacker or target not in the match.
    ParticipantNotFound,
    /// Illegal attack target.
    InvalidTarget,
    /// Match is not in progress.
    NotPlaying,
    /// Buyer not in the match.
    PlayerNotFound,
    /// Unknown catalog item.
    ItemNotFound,
    /// Not enough gold.
    InsufficientGold,
    /// Profile could not be loaded.
    ProfileLookupFailed,
    /// Action kind not handled.
    UnsupportedAction,
    /// Connection cap reached.
    ServerOverloaded,
}

impl From<&MatchError> for ErrorCode {
    fn from(err: &MatchError) -> Self {
        match err {
            MatchError::MatchNotFound(_) => ErrorCode::MatchNotFound,
            MatchError::NotJoinable(_) => ErrorCode::NotJoinable,
            MatchError::AlreadyInMatch(_) => ErrorCode::AlreadyInMatch,
            MatchError::ParticipantNotFound(_) => ErrorCode::ParticipantNotFound,
            MatchError::InvalidTarget(_) => ErrorCode::InvalidTarget,
            MatchError::NotPlaying(_) => ErrorCode::NotPlaying,
            MatchError::PlayerNotFound(_) => ErrorCode::PlayerNotFound,
            MatchError::ItemNotFound(_) => ErrorCode::ItemNotFound,
            MatchError::InsufficientGold { .. } => ErrorCode::InsufficientGold,
            MatchError::ProfileLookupFailed(_) => ErrorCode::ProfileLookupFailed,
            MatchError::UnsupportedAction(_) => ErrorCode::UnsupportedAction,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }

    /// Error frame for a failed match operation.
    pub fn match_error(err: &MatchError) -> Self {
        Self::error(ErrorCode::from(err), err.to_string())
    }

    /// Acknowledge a request.
    pub fn ack(request: &str, match_id: Option<MatchId>) -> Self {
        ServerMessage::Ack {
            request: request.to_string(),
            match_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Player;
    use crate::profile::PlayerProfile;

    #[test]
    fn test_parse_attack() {
        let json = r#"{"type":"attack","match_id":3,"target_id":"p2"}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Attack { match_id, target_id } => {
                assert_eq!(match_id, MatchId(3));
                assert_eq!(target_id, PlayerId::new("p2"));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_auth_with_missing_fields() {
        let json = r#"{"type":"auth","player_id":"p1"}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Auth(req) => {
                assert_eq!(req.player_id.as_deref(), Some("p1"));
                assert!(req.token.is_none());
                assert!(req.username.is_none());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unit_variants() {
        for (json, name) in [
            (r#"{"type":"create_match"}"#, "create_match"),
            (r#"{"type":"auto_match"}"#, "auto_match"),
            (r#"{"type":"list_waiting"}"#, "list_waiting"),
            (r#"{"type":"get_catalog"}"#, "get_catalog"),
            (r#"{"type":"ping"}"#, "ping"),
        ] {
            let msg = ClientMessage::from_json(json).unwrap();
            assert!(msg.to_json().unwrap().contains(name));
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"use_item","item_id":"potion"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_game_state_wire_shape() {
        let player = Player::from_profile(&PlayerProfile {
            id: PlayerId::new("p1"),
            username: "alice".into(),
            gold: 100,
            level: 1,
        });
        let snapshot = Match::new(MatchId(9), player, chrono::Utc::now());

        let json = ServerMessage::GameState { snapshot }.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "game_state");
        assert_eq!(value["match"]["id"], 9);
        assert_eq!(value["match"]["status"], "waiting");
        assert_eq!(value["match"]["players"][0]["health"], 100);
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::match_error(&MatchError::InsufficientGold {
            cost: 10,
            available: 3,
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "insufficient_gold");
        assert!(value["message"].as_str().unwrap().contains("10"));
    }

    #[test]
    fn test_ack_omits_missing_match_id() {
        let json = ServerMessage::ack("attack", None).to_json().unwrap();
        assert!(!json.contains("match_id"));

        let json = ServerMessage::ack("create_match", Some(MatchId(4))).to_json().unwrap();
        assert!(json.contains(r#""match_id":4"#));
    }
}
