//! Network Layer
//!
//! TCP transport, wire protocol, sessions and lobbies. Everything that
//! touches a socket or a lock lives here; the rules themselves are in `game/`.

pub mod auth;
pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod lobby;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::{AuthConfig, AuthError, CredentialError, CredentialStore, MemoryCredentialStore};
pub use connection::{Connection, SendError};
pub use handler::{ClientSession, RequestError, ServerState};
pub use lobby::{Lobby, LobbyError, LobbyRegistry, LobbySettings, LobbySummary};
pub use protocol::{FrameBuffer, ProtocolError, Request, Response, ResponseCode};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{Player, SessionRegistry};
