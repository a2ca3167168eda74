//! Core primitives.

pub mod ids;

pub use ids::{LobbyId, SessionId};
