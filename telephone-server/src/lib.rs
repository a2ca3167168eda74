//! # Telephone Server
//!
//! Lobby and match server for broken telephone with machine translation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TELEPHONE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Identifiers                               │
//! │  └── ids.rs      - Session and lobby ids                     │
//! │                                                              │
//! │  game/           - Match rules (synchronous)                 │
//! │  ├── turn_order.rs - Forward / reversed seat mapping         │
//! │  ├── roster.rs   - Seats and FIFO overflow queue             │
//! │  └── relay.rs    - Match state machine                       │
//! │                                                              │
//! │  network/        - Networking (async)                        │
//! │  ├── server.rs   - TCP accept loop, one task per socket      │
//! │  ├── protocol.rs - Opcodes and response codes                │
//! │  ├── connection.rs - Per-socket write lock                   │
//! │  ├── dispatch.rs - Send and broadcast                        │
//! │  ├── auth.rs     - Credential store                          │
//! │  ├── session.rs  - Logged-in players                         │
//! │  ├── lobby.rs    - Lobbies and lobby registry                │
//! │  └── handler.rs  - Request dispatch and error mapping        │
//! │                                                              │
//! │  translate/      - Translation backends                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! Locks are taken in the order session/lobby registry, lobby, connection.
//! Notifications are written while the lobby lock is held, so every member
//! observes a lobby's events in the order they happened.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod translate;

// Re-export commonly used types
pub use core::ids::{LobbyId, SessionId};
pub use game::relay::{Match, MatchPhase};
pub use game::turn_order::Direction;
pub use network::server::{GameServer, ServerConfig};
pub use translate::{Translator, TranslatorConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
