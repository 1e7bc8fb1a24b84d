//! WebSocket Game Server
//!
//! Async WebSocket server for match clients.
//! Handles authentication, request routing, and outbound delivery.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::events::update_channel;
use crate::game::matchmaker::Matchmaker;
use crate::game::reaper::{spawn_reaper, ReaperConfig};
use crate::game::state::{GameAction, PlayerId};
use crate::game::store::MatchStore;
use crate::network::auth::{validate_token, AuthConfig, AuthError};
use crate::network::connections::{spawn_fanout, ConnectionId, ConnectionRegistry};
use crate::network::protocol::{
    AuthRequest, ClientMessage, ErrorCode, ServerMessage, WelcomeInfo,
};
use crate::profile::{MemoryProfiles, DEFAULT_STARTING_GOLD, DEFAULT_STARTING_LEVEL};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_queue: usize,
    /// How often the reaper sweeps.
    pub reaper_interval: Duration,
    /// Idle thresholds used by the reaper.
    pub reaper: ReaperConfig,
    /// Gold for newly registered profiles.
    pub starting_gold: u32,
    /// Level for newly registered profiles.
    pub starting_level: u32,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            outbound_queue: 64,
            reaper_interval: Duration::from_secs(60),
            reaper: ReaperConfig::default(),
            starting_gold: DEFAULT_STARTING_GOLD,
            starting_level: DEFAULT_STARTING_LEVEL,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let reaper_secs = parse_var(&lookup, "SKIRMISH_REAPER_INTERVAL_SECS", 60u64)?;
        if reaper_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SKIRMISH_REAPER_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            bind_addr: parse_var(&lookup, "SKIRMISH_BIND_ADDR", defaults.bind_addr)?,
            max_connections: parse_var(&lookup, "SKIRMISH_MAX_CONNECTIONS", defaults.max_connections)?,
            outbound_queue: parse_var(&lookup, "SKIRMISH_OUTBOUND_QUEUE", defaults.outbound_queue)?
                .max(1),
            reaper_interval: Duration::from_secs(reaper_secs),
            starting_gold: parse_var(&lookup, "SKIRMISH_STARTING_GOLD", defaults.starting_gold)?,
            starting_level: parse_var(&lookup, "SKIRMISH_STARTING_LEVEL", defaults.starting_level)?,
            ..defaults
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

// =============================================================================
// SHARED STATE
// =============================================================================

/// Everything a connection handler needs.
pub(crate) struct ServerState {
    config: ServerConfig,
    /// `None` runs in development mode.
    auth: Option<AuthConfig>,
    profiles: Arc<MemoryProfiles>,
    store: Arc<MatchStore>,
    matchmaker: Matchmaker,
    registry: Arc<ConnectionRegistry>,
}

/// Per-connection state, owned by the connection task.
#[derive(Default)]
pub(crate) struct ClientSession {
    player_id: Option<PlayerId>,
    conn_id: Option<ConnectionId>,
}

impl ServerState {
    fn new(config: ServerConfig, auth: Option<AuthConfig>) -> Self {
        let profiles = Arc::new(MemoryProfiles::with_starting_stats(
            config.starting_gold,
            config.starting_level,
        ));
        let store = Arc::new(
            MatchStore::new(profiles.clone()).with_reaper_config(config.reaper.clone()),
        );

        Self {
            config,
            auth,
            profiles,
            matchmaker: Matchmaker::new(store.clone()),
            store,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Route one client message and build the direct reply.
    async fn handle_client_message(
        &self,
        session: &mut ClientSession,
        msg: ClientMessage,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        let result = match (msg, session.player_id.clone()) {
            (ClientMessage::Auth(req), _) => return self.handle_auth(session, req, sender).await,
            (ClientMessage::Ping { timestamp }, _) => {
                return ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis().max(0) as u64,
                };
            }
            (_, None) => {
                return ServerMessage::error(ErrorCode::NotAuthenticated, "Must authenticate first");
            }
            (ClientMessage::CreateMatch, Some(player_id)) => self
                .store
                .create_match(&player_id)
                .await
                .map(|m| ServerMessage::ack("create_match", Some(m.id))),
            (ClientMessage::JoinMatch { match_id }, Some(player_id)) => self
                .store
                .join_match(match_id, &player_id)
                .await
                .map(|()| ServerMessage::ack("join_match", Some(match_id))),
            (ClientMessage::AutoMatch, Some(player_id)) => self
                .matchmaker
                .auto_match(&player_id)
                .await
                .map(|m| ServerMessage::ack("auto_match", Some(m.id))),
            (ClientMessage::ListWaiting, Some(_)) => Ok(ServerMessage::WaitingMatches {
                matches: self.store.list_waiting().await,
            }),
            (ClientMessage::GetGameState { match_id }, Some(_)) => self
                .store
                .get_match(match_id)
                .await
                .map(|snapshot| ServerMessage::GameState { snapshot }),
            (ClientMessage::Attack { match_id, target_id }, Some(player_id)) => self
                .store
                .process_action(match_id, GameAction::attack(player_id, target_id))
                .await
                .map(|()| ServerMessage::ack("attack", Some(match_id))),
            (ClientMessage::BuyItem { match_id, item_id }, Some(player_id)) => self
                .store
                .buy_item(match_id, &player_id, &item_id)
                .await
                .map(|()| ServerMessage::ack("buy_item", Some(match_id))),
            (ClientMessage::GetCatalog, Some(_)) => Ok(ServerMessage::Catalog {
                items: self.store.get_catalog(),
            }),
        };

        result.unwrap_or_else(|e| {
            if let Some(player_id) = &session.player_id {
                debug!("Request from {} rejected: {}", player_id, e);
            }
            ServerMessage::match_error(&e)
        })
    }

    /// Handle authentication.
    async fn handle_auth(
        &self,
        session: &mut ClientSession,
        req: AuthRequest,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        let (player_id, username) = if let Some(auth) = &self.auth {
            let Some(token) = req.token.as_deref() else {
                return ServerMessage::error(ErrorCode::AuthFailed, "Token required");
            };
            match validate_token(token, auth) {
                Ok(claims) => (claims.player_id(), claims.display_name().to_string()),
                Err(AuthError::Expired) => {
                    return ServerMessage::error(ErrorCode::TokenExpired, "Token expired");
                }
                Err(e) => {
                    debug!("Token rejected: {}", e);
                    return ServerMessage::error(ErrorCode::InvalidToken, e.to_string());
                }
            }
        } else {
            match req.player_id.filter(|id| !id.trim().is_empty()) {
                Some(id) => {
                    let username = req.username.unwrap_or_else(|| id.clone());
                    (PlayerId::new(id), username)
                }
                None => {
                    return ServerMessage::error(ErrorCode::InvalidInput, "player_id required");
                }
            }
        };

        let profile = match self.profiles.get_or_register(&player_id, &username) {
            Ok(p) => p,
            Err(e) => {
                error!("Profile store failed for {}: {}", player_id, e);
                return ServerMessage::error(ErrorCode::ProfileLookupFailed, e.to_string());
            }
        };

        // Re-auth on the same socket moves the connection to the new identity.
        if let (Some(old_player), Some(old_conn)) = (session.player_id.take(), session.conn_id.take()) {
            self.registry.unregister(&old_player, old_conn).await;
        }
        let conn_id = self.registry.register(player_id.clone(), sender.clone()).await;
        session.player_id = Some(player_id.clone());
        session.conn_id = Some(conn_id);

        debug!("Connection {} authenticated as {}", conn_id, player_id);

        ServerMessage::Welcome(WelcomeInfo {
            player_id,
            username: profile.username,
            server_version: self.config.version.clone(),
        })
    }

    /// Forget a closed connection.
    async fn disconnect(&self, session: ClientSession) {
        if let (Some(player), Some(conn)) = (session.player_id, session.conn_id) {
            self.registry.unregister(&player, conn).await;
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    /// Shared handler state.
    state: Arc<ServerState>,
    /// Open WebSocket connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server. Without `auth` clients are trusted to
    /// declare their own player id.
    pub fn new(config: ServerConfig, auth: Option<AuthConfig>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            state: Arc::new(ServerState::new(config, auth)),
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// The match store backing this server.
    pub fn store(&self) -> &Arc<MatchStore> {
        &self.state.store
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let config = &self.state.config;
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("Game server listening on {}", config.bind_addr);

        if self.state.auth.is_none() {
            warn!("No token key configured, trusting client-declared player ids");
        }

        let (hook, updates) = update_channel();
        self.state.store.set_update_hook(hook).await;
        let (evicted_tx, evicted_rx) = mpsc::unbounded_channel();
        let fanout_handle = spawn_fanout(self.state.registry.clone(), updates, evicted_rx);
        let reaper_handle = spawn_reaper(self.state.store.clone(), config.reaper_interval, evicted_tx);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(reject_overloaded(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        reaper_handle.abort();
        fanout_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let state = self.state.clone();
        let connections = self.connections.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(state.config.outbound_queue);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    let closing = matches!(msg, ServerMessage::Shutdown { .. });
                    if ws_sender.send(Message::Text(text)).await.is_err() || closing {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut session = ClientSession::default();

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        state.handle_client_message(&mut session, client_msg, &msg_tx).await
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format")
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            state.disconnect(session).await;
            drop(msg_tx);
            let writer = sender_task.abort_handle();
            if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Writer for {} did not drain in time", addr);
                writer.abort();
            }
            connections.fetch_sub(1, Ordering::SeqCst);

            info!("Client {} cleaned up", addr);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Get tracked match count.
    pub async fn match_count(&self) -> usize {
        self.state.store.match_count().await
    }
}

/// Tell a client over the connection cap why it is being dropped.
async fn reject_overloaded(stream: TcpStream, addr: SocketAddr) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with rejected client {} failed: {}", addr, e);
            return;
        }
    };

    let frame = ServerMessage::error(ErrorCode::ServerOverloaded, "Connection limit reached");
    match frame.to_json() {
        Ok(text) => {
            let _ = ws.send(Message::Text(text)).await;
        }
        Err(e) => error!("Failed to serialize message: {}", e),
    }
    let _ = ws.close(None).await;
}
