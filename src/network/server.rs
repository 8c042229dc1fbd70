//! WebSocket Game Server
//!
//! Async WebSocket server: one lightweight task per connection, an outbound
//! message channel per client, and a broadcast shutdown signal. Transport
//! concerns live here; every game decision is delegated to the dispatcher.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::ledger::{format_amount, Cents, Player, PlayerId};
use crate::game::registry::{PlayerSlot, SessionRegistry};
use crate::network::auth::{authenticate, AuthConfig};
use crate::network::dispatcher::Dispatcher;
use crate::network::protocol::{ClientMessage, ServerMessage};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle timeout before a silent connection is dropped.
    pub idle_timeout: Duration,
    /// Opening wallet balance for a fresh connection, in minor units.
    pub starting_balance: Cents,
    /// Default wallet currency.
    pub default_currency: String,
    /// Authentication settings.
    pub auth: AuthConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            starting_balance: 100_000, // 1000.00
            default_currency: "USD".to_string(),
            auth: AuthConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("CRASHLINE_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("CRASHLINE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            idle_timeout: defaults.idle_timeout,
            starting_balance: std::env::var("CRASHLINE_STARTING_BALANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.starting_balance),
            default_currency: std::env::var("CRASHLINE_CURRENCY")
                .unwrap_or(defaults.default_currency),
            auth: AuthConfig::from_env(),
            version: defaults.version,
        }
    }
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

/// Authenticated identity plus the exact slot it registered. Teardown
/// passes the slot back so a superseded connection cannot remove a fresh
/// one's registry entry.
type AuthedSession = (PlayerId, Arc<RwLock<PlayerSlot>>);

/// Connected client state.
struct ConnectedClient {
    /// Identity and registered slot (after auth).
    session: Option<AuthedSession>,
    /// Last activity.
    last_activity: Instant,
}

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            config.default_currency.clone(),
        ));

        Self {
            config,
            registry,
            dispatcher,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Crashline server listening on {}", self.config.bind_addr);

        let cleanup_clients = self.clients.clone();
        let cleanup_registry = self.registry.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_registry, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            // Reserve the map entry under one write lock so a
                            // burst of accepts cannot overshoot the cap.
                            let reserved = {
                                let mut clients = self.clients.write().await;
                                if clients.len() >= self.config.max_connections {
                                    false
                                } else {
                                    clients.insert(
                                        addr,
                                        ConnectedClient {
                                            session: None,
                                            last_activity: Instant::now(),
                                        },
                                    );
                                    true
                                }
                            };
                            if !reserved {
                                // Pre-handshake, so there is no close frame
                                // to answer with; the socket is dropped.
                                warn!("Connection limit reached, rejecting {}", addr);
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

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let dispatcher = self.dispatcher.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    // Release the entry reserved in the accept loop.
                    clients.write().await.remove(&addr);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Connection-local copy of the authenticated session. Teardown
            // relies on this, not on the shared map, which idle cleanup may
            // have already pruned.
            let mut session: Option<AuthedSession> = None;

            // Outbound pump: replies and pushes share one ordered stream.
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        // Malformed payloads degrade to a no-op.
                                        debug!("Invalid message from {}: {}", addr, e);
                                        continue;
                                    }
                                };

                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &registry,
                                    &dispatcher,
                                    &config,
                                    &msg_tx,
                                    &mut session,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                // Transport pings answered by tungstenite.
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

            sender_task.abort();

            // Disconnect abandons any in-flight game without settlement.
            {
                let mut clients = clients.write().await;
                clients.remove(&addr);
            }
            if let Some((player_id, slot)) = session {
                registry.disconnect(&player_id, &slot).await;
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    #[allow(clippy::too_many_arguments)]
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        registry: &Arc<SessionRegistry>,
        dispatcher: &Arc<Dispatcher>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
        session: &mut Option<AuthedSession>,
    ) {
        match msg {
            ClientMessage::Auth {
                token,
                display_name,
            } => {
                let fresh = Self::handle_auth(
                    addr,
                    token.as_deref(),
                    display_name.as_deref(),
                    clients,
                    registry,
                    config,
                    sender,
                )
                .await;
                if let Some(fresh) = fresh {
                    // A re-auth releases the previous identity first. When
                    // the identity is unchanged the registry has already
                    // replaced the slot and this disconnect is a no-op.
                    if let Some((prev_id, prev_slot)) = session.take() {
                        registry.disconnect(&prev_id, &prev_slot).await;
                    }
                    *session = Some(fresh);
                }
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64,
                    })
                    .await;
            }
            action => {
                let Some((player_id, _)) = session.as_ref() else {
                    let _ = sender
                        .send(ServerMessage::Error {
                            message: "Must authenticate first".to_string(),
                        })
                        .await;
                    return;
                };

                if let Some(reply) = dispatcher.dispatch(player_id, action, sender).await {
                    let _ = sender.send(reply).await;
                }
            }
        }
    }

    /// Handle authentication: attach an identity, open the wallet, and
    /// register the player slot. Returns the registered session on success.
    async fn handle_auth(
        addr: SocketAddr,
        token: Option<&str>,
        display_name: Option<&str>,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        registry: &Arc<SessionRegistry>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<AuthedSession> {
        let identity = match authenticate(&config.auth, token, display_name) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Auth failed for {}: {}", addr, e);
                let _ = sender
                    .send(ServerMessage::AuthResult {
                        success: false,
                        player_id: None,
                        display_name: None,
                        error: Some(e.to_string()),
                        server_version: config.version.clone(),
                    })
                    .await;
                return None;
            }
        };

        let player = Player::new(
            identity.player_id,
            identity.display_name.clone(),
            config.starting_balance,
            config.default_currency.clone(),
        );
        let slot = registry.connect(player).await;

        {
            let mut clients = clients.write().await;
            // Idle cleanup may have pruned the entry; re-auth recreates it
            // so activity tracking resumes.
            let client = clients.entry(addr).or_insert_with(|| ConnectedClient {
                session: None,
                last_activity: Instant::now(),
            });
            client.session = Some((identity.player_id, slot.clone()));
            client.last_activity = Instant::now();
        }

        let _ = sender
            .send(ServerMessage::AuthResult {
                success: true,
                player_id: Some(uuid::Uuid::from_bytes(*identity.player_id.as_bytes()).to_string()),
                display_name: Some(identity.display_name),
                error: None,
                server_version: config.version.clone(),
            })
            .await;
        let _ = sender
            .send(ServerMessage::Balance {
                currency: config.default_currency.clone(),
                balance: format_amount(config.starting_balance),
            })
            .await;

        debug!(
            "Client {} authenticated as {}",
            addr,
            identity.player_id.short_hex()
        );
        Some((identity.player_id, slot))
    }

    /// Drop connections that have been silent past the idle timeout.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        registry: Arc<SessionRegistry>,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let to_remove: Vec<_> = {
                let clients = clients.read().await;
                clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            for addr in to_remove {
                let removed = {
                    let mut clients = clients.write().await;
                    clients.remove(&addr)
                };
                if let Some(client) = removed {
                    if let Some((player_id, slot)) = client.session {
                        registry.disconnect(&player_id, &slot).await;
                    }
                    info!("Removed idle client {}", addr);
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get registered player count.
    pub async fn player_count(&self) -> usize {
        self.registry.player_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.starting_balance, 100_000);
        assert_eq!(config.default_currency, "USD");
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);
        server.shutdown();
        // Should not panic
    }

    #[tokio::test]
    async fn test_auth_registers_player_and_pushes_balance() {
        let config = ServerConfig::default();
        let registry = Arc::new(SessionRegistry::new());
        let clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>> =
            Arc::new(RwLock::new(BTreeMap::new()));
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        clients.write().await.insert(
            addr,
            ConnectedClient {
                session: None,
                last_activity: Instant::now(),
            },
        );

        let (tx, mut rx) = mpsc::channel(8);
        let session =
            GameServer::handle_auth(addr, None, Some("ace"), &clients, &registry, &config, &tx)
                .await;
        assert!(session.is_some());

        match rx.recv().await.unwrap() {
            ServerMessage::AuthResult {
                success,
                display_name,
                ..
            } => {
                assert!(success);
                assert_eq!(display_name.as_deref(), Some("ace"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ServerMessage::Balance { balance, .. } => assert_eq!(balance, "1000.00"),
            other => panic!("unexpected message: {other:?}"),
        }

        assert_eq!(registry.player_count().await, 1);
        assert!(clients.read().await.get(&addr).unwrap().session.is_some());
    }

    #[tokio::test]
    async fn test_reauth_after_idle_removal() {
        let config = ServerConfig::default();
        let registry = Arc::new(SessionRegistry::new());
        // No client entry: the state after idle cleanup pruned this addr.
        let clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>> =
            Arc::new(RwLock::new(BTreeMap::new()));
        let addr: SocketAddr = "127.0.0.1:9998".parse().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let session =
            GameServer::handle_auth(addr, None, Some("ace"), &clients, &registry, &config, &tx)
                .await
                .expect("auth should succeed");
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::AuthResult { success: true, .. }
        ));

        // The map entry was recreated so activity tracking resumes.
        assert!(clients.read().await.get(&addr).unwrap().session.is_some());
        assert_eq!(registry.player_count().await, 1);

        // Teardown works from the connection-local session alone; the
        // registry slot is released even if the map entry is gone again.
        clients.write().await.remove(&addr);
        let (player_id, slot) = session;
        registry.disconnect(&player_id, &slot).await;
        assert_eq!(registry.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_stale_teardown_keeps_fresh_session() {
        let config = ServerConfig::default();
        let registry = Arc::new(SessionRegistry::new());
        let clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>> =
            Arc::new(RwLock::new(BTreeMap::new()));
        let (tx, _rx) = mpsc::channel(16);

        // Same identity authenticates from two addresses (two tabs with
        // guest mode off would share a JWT sub; here the shared registry
        // key is what matters, so drive it with the same token).
        let auth = AuthConfig {
            secret: Some("test-secret-key-256-bits-long!!".into()),
            skip_expiry: true,
            allow_guests: false,
            ..Default::default()
        };
        let config = ServerConfig { auth, ..config };
        let token = {
            use jsonwebtoken::{encode, EncodingKey, Header};
            let claims = crate::network::auth::TokenClaims {
                sub: "user123".into(),
                exp: 0,
                iat: 0,
                iss: None,
                aud: None,
                name: None,
            };
            encode(
                &Header::new(jsonwebtoken::Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(b"test-secret-key-256-bits-long!!"),
            )
            .unwrap()
        };

        let addr_a: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let addr_b: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        let stale = GameServer::handle_auth(
            addr_a, Some(&token), None, &clients, &registry, &config, &tx,
        )
        .await
        .unwrap();
        let fresh = GameServer::handle_auth(
            addr_b, Some(&token), None, &clients, &registry, &config, &tx,
        )
        .await
        .unwrap();
        assert_eq!(stale.0, fresh.0);
        assert_eq!(registry.player_count().await, 1);

        // The first socket finally closes. Its teardown must not remove
        // the second connection's slot.
        clients.write().await.remove(&addr_a);
        registry.disconnect(&stale.0, &stale.1).await;

        assert_eq!(registry.player_count().await, 1);
        let current = registry.slot(&fresh.0).await.unwrap();
        assert!(Arc::ptr_eq(&current, &fresh.1));
    }
}
