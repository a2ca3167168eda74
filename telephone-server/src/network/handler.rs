//! Request Handling
//!
//! Turns decoded requests into session, lobby and match operations for one
//! connection, and maps every failure onto a response code.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::game::relay::MatchError;
use crate::network::auth::{AuthError, CredentialError, CredentialStore};
use crate::network::connection::Connection;
use crate::network::lobby::{LobbyError, LobbyRegistry};
use crate::network::protocol::{ProtocolError, Request, Response, ResponseCode};
use crate::network::server::ServerConfig;
use crate::network::session::{Player, SessionRegistry};
use crate::translate::Translator;

/// Body of `A05` when no lobby exists.
pub const NO_LOBBIES: &str = "no lobbies available";

/// Shared registries, created once at server start.
pub struct ServerState {
    /// Logged-in players.
    pub sessions: SessionRegistry,
    /// Live lobbies.
    pub lobbies: LobbyRegistry,
    /// Account storage.
    pub credentials: Arc<dyn CredentialStore>,
}

impl ServerState {
    /// Build empty registries from `config`.
    pub fn new(
        config: &ServerConfig,
        credentials: Arc<dyn CredentialStore>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            lobbies: LobbyRegistry::new(config.max_lobbies, config.lobby_settings(), translator),
            credentials,
        }
    }
}

/// Why a request failed.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operation needs a logged-in session.
    #[error("you must log in first")]
    Unauthenticated,

    /// Login failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Signup failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Lobby or match rule violated.
    #[error(transparent)]
    Lobby(#[from] LobbyError),
}

impl From<MatchError> for RequestError {
    fn from(err: MatchError) -> Self {
        RequestError::Lobby(err.into())
    }
}

impl RequestError {
    /// Response code for this error.
    pub fn code(&self) -> ResponseCode {
        match self {
            RequestError::Protocol(e) if e.is_unrecognised() => ResponseCode::ServerError,
            RequestError::Protocol(_) => ResponseCode::BadRequest,
            RequestError::Unauthenticated => ResponseCode::Unauthorized,
            RequestError::Auth(AuthError::AlreadyLoggedIn(_)) => ResponseCode::Conflict,
            RequestError::Auth(AuthError::InvalidCredentials) => ResponseCode::Unauthorized,
            RequestError::Auth(AuthError::SessionActive(_)) => ResponseCode::BadRequest,
            RequestError::Auth(AuthError::Store(_)) => ResponseCode::ServerError,
            RequestError::Credential(CredentialError::Conflict(_)) => ResponseCode::Conflict,
            RequestError::Credential(CredentialError::Invalid(_)) => ResponseCode::BadRequest,
            RequestError::Credential(CredentialError::WrongPassword | CredentialError::NotFound(_)) => {
                ResponseCode::Unauthorized
            }
            RequestError::Credential(CredentialError::Storage(_)) => ResponseCode::ServerError,
            RequestError::Lobby(_) => ResponseCode::BadRequest,
        }
    }

    /// Error response sent back to the caller.
    pub fn response(&self) -> Response {
        let body = match self {
            RequestError::Protocol(e) if e.is_unrecognised() => "unknown request".to_string(),
            RequestError::Auth(AuthError::Store(_)) | RequestError::Credential(CredentialError::Storage(_)) => {
                "internal error, try again later".to_string()
            }
            other => other.to_string(),
        };
        Response::new(self.code(), body)
    }
}

/// Per-connection request state.
pub struct ClientSession {
    connection: Arc<Connection>,
    player: Option<Arc<Player>>,
}

impl ClientSession {
    /// Start an unauthenticated session on `connection`.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection, player: None }
    }

    /// The logged-in player, if any.
    pub fn player(&self) -> Option<&Arc<Player>> {
        self.player.as_ref()
    }

    /// Decode and run one frame. Failures are answered on this connection.
    pub async fn handle_frame(&mut self, state: &ServerState, frame: &str) {
        let result = match Request::parse(frame) {
            Ok(request) => {
                debug!("{} -> {:?}", self.connection.peer(), request.opcode());
                self.dispatch(state, request).await
            }
            Err(e) => Err(e.into()),
        };

        if let Err(err) = result {
            debug!("Request from {} failed: {}", self.connection.peer(), err);
            if let Err(e) = self.connection.send(&err.response()).await {
                debug!("Could not report error to {}: {}", self.connection.peer(), e);
            }
        }
    }

    fn require_player(&self) -> Result<Arc<Player>, RequestError> {
        self.player.clone().ok_or(RequestError::Unauthenticated)
    }

    async fn reply(&self, response: Response) {
        if let Err(e) = self.connection.send(&response).await {
            debug!("Reply to {} dropped: {}", self.connection.peer(), e);
        }
    }

    async fn dispatch(&mut self, state: &ServerState, request: Request) -> Result<(), RequestError> {
        match request {
            Request::Signup { lang, username, password } => {
                state.credentials.signup(&username, &password, &lang).await?;
                self.reply(Response::new(ResponseCode::SignupOk, format!("account {username} created")))
                    .await;
            }
            Request::Login { username, password } => {
                if let Some(player) = &self.player {
                    return Err(AuthError::SessionActive(player.name().to_string()).into());
                }
                let player = state
                    .sessions
                    .register(self.connection.clone(), &username, &password, state.credentials.as_ref())
                    .await?;
                let body = format!("welcome {}, your language is {}", player.name(), player.lang());
                self.player = Some(player);
                self.reply(Response::new(ResponseCode::LoginOk, body)).await;
            }
            Request::CreateLobby => {
                let player = self.require_player()?;
                state.lobbies.create(&player).await?;
            }
            Request::JoinLobby { lobby_id } => {
                let player = self.require_player()?;
                state.lobbies.join(&player, &lobby_id).await?;
            }
            Request::ListLobbies => {
                self.require_player()?;
                let rows = state.lobbies.list().await;
                let body = if rows.is_empty() {
                    NO_LOBBIES.to_string()
                } else {
                    rows.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
                };
                self.reply(Response::new(ResponseCode::LobbyList, body)).await;
            }
            Request::LeaveLobby => {
                let player = self.require_player()?;
                state.lobbies.depart(&player).await?;
            }
            Request::StartMatch { direction } => {
                let player = self.require_player()?;
                state.lobbies.start_match(&player, direction).await?;
            }
            Request::Speak { text } => {
                let player = self.require_player()?;
                state.lobbies.speak(&player, &text).await?;
            }
        }
        Ok(())
    }

    /// Run departure for the player, then drop the session. Safe to call twice.
    pub async fn disconnect(&mut self, state: &ServerState) {
        let Some(player) = self.player.take() else {
            return;
        };
        match state.lobbies.depart(&player).await {
            Ok(outcome) => debug!("{} departed on disconnect: {:?}", player.name(), outcome),
            Err(LobbyError::NotInLobby | LobbyError::Closed) => {}
            Err(e) => warn!("Departure for {} failed: {}", player.name(), e),
        }
        state.sessions.unregister(player.id()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::auth::MemoryCredentialStore;
    use crate::network::protocol::FrameBuffer;
    use crate::translate::IdentityTranslator;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    struct Client {
        session: ClientSession,
        stream: DuplexStream,
        buffer: FrameBuffer,
    }

    impl Client {
        fn new() -> Self {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let peer = "127.0.0.1:7".parse().unwrap();
            let connection = Arc::new(Connection::new(peer, server, Duration::from_secs(1)));
            Self {
                session: ClientSession::new(connection),
                stream: client,
                buffer: FrameBuffer::new(),
            }
        }

        async fn send(&mut self, state: &ServerState, frame: &str) -> Vec<Response> {
            self.session.handle_frame(state, frame).await;
            let mut frames = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                if let Some(frame) = self.buffer.next_frame() {
                    frames.push(Response::decode(&frame).unwrap());
                    continue;
                }
                match tokio::time::timeout(Duration::from_millis(20), self.stream.read(&mut chunk)).await {
                    Ok(Ok(n)) if n > 0 => self.buffer.extend(&chunk[..n]),
                    _ => break,
                }
            }
            frames
        }

        async fn code(&mut self, state: &ServerState, frame: &str) -> ResponseCode {
            let frames = self.send(state, frame).await;
            assert_eq!(frames.len(), 1, "{frame:?} gave {frames:?}");
            frames[0].code
        }
    }

    fn state() -> ServerState {
        ServerState::new(
            &ServerConfig::default(),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(IdentityTranslator),
        )
    }

    #[tokio::test]
    async fn test_requires_login() {
        let state = state();
        let mut client = Client::new();
        for frame in ["100", "102", "103", "110 1", "111 02 hi", "101 abc"] {
            assert_eq!(client.code(&state, frame).await, ResponseCode::Unauthorized, "{frame}");
        }
    }

    #[tokio::test]
    async fn test_unknown_and_malformed() {
        let state = state();
        let mut client = Client::new();
        assert_eq!(client.code(&state, "hello").await, ResponseCode::ServerError);
        assert_eq!(client.code(&state, "999").await, ResponseCode::ServerError);
        assert_eq!(client.code(&state, "201 en").await, ResponseCode::BadRequest);
    }

    #[tokio::test]
    async fn test_signup_login_round_trip() {
        let state = state();
        let mut client = Client::new();
        assert_eq!(client.code(&state, "201 it anna pw").await, ResponseCode::SignupOk);
        assert_eq!(client.code(&state, "201 en anna pw").await, ResponseCode::Conflict);
        assert_eq!(client.code(&state, "202 anna bad").await, ResponseCode::Unauthorized);

        let frames = client.send(&state, "202 anna pw").await;
        assert_eq!(frames[0].code, ResponseCode::LoginOk);
        assert!(frames[0].body.contains("it"));
        assert_eq!(client.code(&state, "202 anna pw").await, ResponseCode::BadRequest);

        let mut other = Client::new();
        assert_eq!(other.code(&state, "202 anna pw").await, ResponseCode::Conflict);
    }

    #[tokio::test]
    async fn test_list_empty_marker() {
        let state = state();
        let mut client = Client::new();
        client.send(&state, "201 en bob pw").await;
        client.send(&state, "202 bob pw").await;
        let frames = client.send(&state, "102").await;
        assert_eq!(frames, vec![Response::new(ResponseCode::LobbyList, NO_LOBBIES)]);
    }

    #[tokio::test]
    async fn test_business_errors_are_bad_request() {
        let state = state();
        let mut client = Client::new();
        client.send(&state, "201 en bob pw").await;
        client.send(&state, "202 bob pw").await;

        assert_eq!(client.code(&state, "103").await, ResponseCode::BadRequest);
        assert_eq!(client.code(&state, "111 02 hi").await, ResponseCode::BadRequest);
        assert_eq!(client.code(&state, "100").await, ResponseCode::LobbyCreated);
        assert_eq!(client.code(&state, "100").await, ResponseCode::BadRequest);
        assert_eq!(client.code(&state, "110 1").await, ResponseCode::BadRequest);
    }

    #[tokio::test]
    async fn test_disconnect_frees_name_and_lobby() {
        let state = state();
        let mut client = Client::new();
        client.send(&state, "201 en bob pw").await;
        client.send(&state, "202 bob pw").await;
        client.send(&state, "100").await;
        assert_eq!(state.lobbies.count().await, 1);

        client.session.disconnect(&state).await;
        client.session.disconnect(&state).await;
        assert_eq!(state.lobbies.count().await, 0);
        assert!(!state.sessions.is_name_active("bob").await);
    }

    #[test]
    fn test_error_codes() {
        let err = RequestError::from(MatchError::NotYourTurn);
        assert_eq!(err.code(), ResponseCode::BadRequest);
        assert_eq!(err.response().body, "it is not your turn");
        let err = RequestError::from(CredentialError::Storage("disk".into()));
        assert_eq!(err.response().body, "internal error, try again later");
    }
}
