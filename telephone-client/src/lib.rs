//! # Telephone Client
//!
//! Terminal client for the broken-telephone server. Reads commands from
//! stdin, sends them as protocol requests and prints every response.
//!
//! - `command`: prompt line to request, with local sanity checks
//! - `state`: what the client knows about its session, and response rendering

pub mod command;
pub mod state;

pub use command::{parse, Command, CommandError, HELP};
pub use state::{render, ClientState, LobbyStatus};
