//! TCP Game Server
//!
//! Accepts client connections and runs one worker task per socket. Workers
//! share only the registries in [`ServerState`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::network::auth::{AuthConfig, CredentialError, CredentialStore};
use crate::network::connection::Connection;
use crate::network::handler::{ClientSession, ServerState};
use crate::network::lobby::LobbySettings;
use crate::network::protocol::{split_requests, Response, ResponseCode, MAX_FRAME_LEN};
use crate::translate::{TranslateError, Translator, TranslatorConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Maximum live lobbies.
    pub max_lobbies: usize,
    /// Seats per lobby.
    pub lobby_capacity: usize,
    /// Members needed to start a match.
    pub min_players: usize,
    /// Exclusive limit on one contribution, in bytes.
    pub max_phrase_len: usize,
    /// Largest request read in one go.
    pub max_frame_len: usize,
    /// Budget for each translation call.
    pub translate_timeout: Duration,
    /// Budget for each socket write.
    pub write_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let lobby = LobbySettings::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            max_lobbies: 5,
            lobby_capacity: lobby.capacity,
            min_players: lobby.min_players,
            max_phrase_len: lobby.max_phrase_len,
            max_frame_len: MAX_FRAME_LEN,
            translate_timeout: lobby.translate_timeout,
            write_timeout: Duration::from_secs(10),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TELEPHONE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(addr) = env_parse("TELEPHONE_BIND") {
            config.bind_addr = addr;
        }
        if let Some(port) = env_parse::<u16>("TELEPHONE_PORT") {
            config.bind_addr.set_port(port);
        }
        if let Some(n) = env_parse("TELEPHONE_MAX_CONNECTIONS") {
            config.max_connections = n;
        }
        if let Some(n) = env_parse("TELEPHONE_MAX_LOBBIES") {
            config.max_lobbies = n;
        }
        if let Some(n) = env_parse("TELEPHONE_LOBBY_CAPACITY") {
            config.lobby_capacity = n;
        }
        if let Some(n) = env_parse("TELEPHONE_MIN_PLAYERS") {
            config.min_players = n;
        }
        if let Some(n) = env_parse("TELEPHONE_MAX_PHRASE_LEN") {
            config.max_phrase_len = n;
        }
        if let Some(ms) = env_parse("TELEPHONE_TRANSLATE_TIMEOUT_MS") {
            config.translate_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("TELEPHONE_WRITE_TIMEOUT_MS") {
            config.write_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Per-lobby limits.
    pub fn lobby_settings(&self) -> LobbySettings {
        LobbySettings {
            capacity: self.lobby_capacity,
            min_players: self.min_players,
            max_phrase_len: self.max_phrase_len,
            translate_timeout: self.translate_timeout,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Credential store could not be opened.
    #[error("Credential store error: {0}")]
    Credentials(#[from] CredentialError),

    /// Translation backend could not be built.
    #[error("Translator error: {0}")]
    Translator(#[from] TranslateError),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Registries shared by all workers.
    state: Arc<ServerState>,
    /// Open connections.
    connections: Arc<RwLock<BTreeMap<SocketAddr, Arc<Connection>>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(
        config: ServerConfig,
        credentials: Arc<dyn CredentialStore>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(ServerState::new(&config, credentials, translator));

        Self {
            config,
            state,
            connections: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Open the configured credential store and translator, then create the server.
    pub async fn bootstrap(
        config: ServerConfig,
        auth: &AuthConfig,
        translator: &TranslatorConfig,
    ) -> Result<Self, GameServerError> {
        let credentials = Arc::new(auth.open_store().await?);
        let translator = translator.build(config.translate_timeout)?;
        Ok(Self::new(config, credentials, translator))
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Telephone server v{} listening on {}",
            self.config.version,
            listener.local_addr()?
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let open = self.connections.read().await.len();
                            if open >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                let refusal = Response::new(ResponseCode::ServerError, "server is full");
                                let _ = stream.try_write(&refusal.encode());
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr).await;
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

        Ok(())
    }

    /// Spawn the worker for a new connection.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let state = self.state.clone();
        let connections = self.connections.clone();
        let max_frame_len = self.config.max_frame_len.max(1);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let (mut reader, writer) = stream.into_split();
        let connection = Arc::new(Connection::new(addr, writer, self.config.write_timeout));
        connections.write().await.insert(addr, connection.clone());

        tokio::spawn(async move {
            let mut session = ClientSession::new(connection.clone());
            let mut buffer = vec![0u8; max_frame_len];

            loop {
                tokio::select! {
                    read = reader.read(&mut buffer) => {
                        match read {
                            Ok(0) => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Ok(n) => {
                                let chunk = String::from_utf8_lossy(&buffer[..n]);
                                for frame in split_requests(&chunk) {
                                    session.handle_frame(&state, frame).await;
                                }
                            }
                            Err(e) => {
                                debug!("Read error for {}: {}", addr, e);
                                break;
                            }
                        }
                    }
                    _ = connection.closed() => {
                        debug!("Client {} write side closed", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let notice = Response::new(ResponseCode::ServerError, "server shutting down");
                        let _ = connection.send(&notice).await;
                        break;
                    }
                }
            }

            // Cleanup
            session.disconnect(&state).await;
            connection.shutdown().await;
            connections.write().await.remove(&addr);

            info!("Client {} cleaned up", addr);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get open connection count.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Get logged-in session count.
    pub async fn session_count(&self) -> usize {
        self.state.sessions.count().await
    }

    /// Get live lobby count.
    pub async fn lobby_count(&self) -> usize {
        self.state.lobbies.count().await
    }
}
