//! Command Parsing
//!
//! Turns a line typed at the prompt into a request, checking locally what
//! the client already knows would be refused.

use telephone::network::protocol::Request;
use telephone::Direction;

use crate::state::ClientState;

/// Help text for the `help` command.
pub const HELP: &str = "\
Commands:
  signup <lang> <username> <password>   create an account (lang: en, it, fr, ...)
  login <username> <password>           log in
  lobbies                               list lobbies
  create                                create a lobby and host it
  join <lobby-id>                       join a lobby
  leave                                 leave your lobby or queue
  start <0|1>                           host only: start a match (0 reversed, 1 forward)
  say <words>                           add to the phrase on your turn
  status                                show what the client knows
  help                                  show this text
  quit                                  exit";

/// A parsed prompt line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the help text.
    Help,
    /// Print the local state.
    Status,
    /// Exit.
    Quit,
    /// Send a request to the server.
    Send(Request),
}

/// Why a line was not sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Nothing typed.
    #[error("")]
    Empty,
    /// Unrecognised command word.
    #[error("unknown command {0:?}, type help for a list")]
    Unknown(String),
    /// Wrong arguments.
    #[error("usage: {0}")]
    Usage(&'static str),
    /// Needs a login first.
    #[error("log in first")]
    NotLoggedIn,
    /// Already logged in on this connection.
    #[error("already logged in as {0}")]
    AlreadyLoggedIn(String),
    /// Needs a lobby first.
    #[error("you are not in a lobby")]
    NotInLobby,
    /// Must leave first.
    #[error("you are already in a lobby, leave it first")]
    AlreadyInLobby,
    /// Host-only command.
    #[error("only the host can start a match")]
    NotHost,
    /// Phrase at or over the limit.
    #[error("phrase is {len} bytes, it must be shorter than {max}")]
    PhraseTooLong {
        /// Typed length.
        len: usize,
        /// Exclusive limit.
        max: usize,
    },
}

fn args<const N: usize>(words: &[&str], usage: &'static str) -> Result<[String; N], CommandError> {
    if words.len() != N {
        return Err(CommandError::Usage(usage));
    }
    Ok(std::array::from_fn(|i| words[i].to_string()))
}

/// Parse one prompt line against the current state.
pub fn parse(line: &str, state: &ClientState, max_phrase_len: usize) -> Result<Command, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let words: Vec<&str> = rest.split_whitespace().collect();

    let logged_in = || match state.username() {
        Some(_) => Ok(()),
        None => Err(CommandError::NotLoggedIn),
    };
    let in_lobby = || match state.lobby() {
        Some(_) => Ok(()),
        None => Err(CommandError::NotInLobby),
    };
    let not_in_lobby = || match state.lobby() {
        Some(_) => Err(CommandError::AlreadyInLobby),
        None => Ok(()),
    };

    let request = match word.to_ascii_lowercase().as_str() {
        "" => return Err(CommandError::Empty),
        "help" | "?" => return Ok(Command::Help),
        "status" => return Ok(Command::Status),
        "quit" | "exit" => return Ok(Command::Quit),
        "signup" => {
            let [lang, username, password] = args(&words, "signup <lang> <username> <password>")?;
            Request::Signup { lang, username, password }
        }
        "login" => {
            if let Some(name) = state.username() {
                return Err(CommandError::AlreadyLoggedIn(name.to_string()));
            }
            let [username, password] = args(&words, "login <username> <password>")?;
            Request::Login { username, password }
        }
        "lobbies" | "list" => {
            logged_in()?;
            Request::ListLobbies
        }
        "create" => {
            logged_in()?;
            not_in_lobby()?;
            Request::CreateLobby
        }
        "join" => {
            logged_in()?;
            not_in_lobby()?;
            let [lobby_id] = args(&words, "join <lobby-id>")?;
            Request::JoinLobby { lobby_id }
        }
        "leave" => {
            logged_in()?;
            in_lobby()?;
            Request::LeaveLobby
        }
        "start" => {
            logged_in()?;
            in_lobby()?;
            if !state.is_host() {
                return Err(CommandError::NotHost);
            }
            let [flag] = args(&words, "start <0|1>")?;
            let direction = Direction::from_wire(&flag).ok_or(CommandError::Usage("start <0|1>"))?;
            Request::StartMatch { direction }
        }
        "say" => {
            logged_in()?;
            in_lobby()?;
            if rest.len() >= max_phrase_len {
                return Err(CommandError::PhraseTooLong { len: rest.len(), max: max_phrase_len });
            }
            Request::Speak { text: rest.to_string() }
        }
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Command::Send(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use telephone::network::protocol::{Response, ResponseCode};

    fn logged_in() -> ClientState {
        let mut state = ClientState::new();
        state.on_sent(&Request::Login { username: "ann".into(), password: "pw".into() });
        state.apply(&Response::new(ResponseCode::LoginOk, "welcome"));
        state
    }

    fn hosting() -> ClientState {
        let mut state = logged_in();
        state.apply(&Response::new(ResponseCode::LobbyCreated, "abc"));
        state
    }

    #[test]
    fn test_local_commands() {
        let state = ClientState::new();
        assert_eq!(parse("help", &state, 30), Ok(Command::Help));
        assert_eq!(parse("  STATUS ", &state, 30), Ok(Command::Status));
        assert_eq!(parse("quit", &state, 30), Ok(Command::Quit));
        assert_eq!(parse("   ", &state, 30), Err(CommandError::Empty));
        assert!(matches!(parse("dance", &state, 30), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn test_signup_and_login() {
        let state = ClientState::new();
        assert_eq!(
            parse("signup it ann pw", &state, 30),
            Ok(Command::Send(Request::Signup {
                lang: "it".into(),
                username: "ann".into(),
                password: "pw".into(),
            }))
        );
        assert!(matches!(parse("login ann", &state, 30), Err(CommandError::Usage(_))));
        assert!(matches!(
            parse("login ann pw", &logged_in(), 30),
            Err(CommandError::AlreadyLoggedIn(_))
        ));
    }

    #[test]
    fn test_requires_login() {
        let state = ClientState::new();
        for line in ["lobbies", "create", "join x", "leave", "start 1", "say hi"] {
            assert_eq!(parse(line, &state, 30), Err(CommandError::NotLoggedIn), "{line}");
        }
    }

    #[test]
    fn test_lobby_checks() {
        let state = logged_in();
        assert_eq!(parse("leave", &state, 30), Err(CommandError::NotInLobby));
        assert_eq!(parse("create", &state, 30), Ok(Command::Send(Request::CreateLobby)));

        let host = hosting();
        assert_eq!(parse("create", &host, 30), Err(CommandError::AlreadyInLobby));
        assert_eq!(parse("join abc", &host, 30), Err(CommandError::AlreadyInLobby));
    }

    #[test]
    fn test_start_is_host_only() {
        let mut member = logged_in();
        member.apply(&Response::new(ResponseCode::JoinedLobby, "welcome"));
        assert_eq!(parse("start 1", &member, 30), Err(CommandError::NotHost));

        let host = hosting();
        assert_eq!(
            parse("start 0", &host, 30),
            Ok(Command::Send(Request::StartMatch { direction: Direction::Reversed }))
        );
        assert!(matches!(parse("start 2", &host, 30), Err(CommandError::Usage(_))));
    }

    #[test]
    fn test_say_keeps_inner_spaces_and_checks_length() {
        let host = hosting();
        assert_eq!(
            parse("say  hello   world ", &host, 30),
            Ok(Command::Send(Request::Speak { text: "hello   world".into() }))
        );
        assert_eq!(parse("say", &host, 30), Ok(Command::Send(Request::Speak { text: String::new() })));
        let long = format!("say {}", "x".repeat(30));
        assert_eq!(
            parse(&long, &host, 30),
            Err(CommandError::PhraseTooLong { len: 30, max: 30 })
        );
    }
}
