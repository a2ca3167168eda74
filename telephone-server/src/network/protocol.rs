//! Protocol Messages
//!
//! Text wire format shared by the server and the terminal client.
//!
//! Requests are `<3-digit opcode> <arguments...>`. Legacy clients send one
//! request per write with no terminator; newer clients end each request with
//! `\n`. Both are accepted.
//!
//! Responses are `<3-char code>\n<body>` followed by a NUL byte, which lets
//! the client split a byte stream back into frames.

use std::fmt;

use crate::game::turn_order::Direction;

/// Largest request accepted in one read.
pub const MAX_FRAME_LEN: usize = 1024;

/// Byte that ends every outbound frame.
pub const FRAME_TERMINATOR: u8 = 0;

// =============================================================================
// OPCODES
// =============================================================================

/// Request opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    /// Create a lobby hosted by the caller.
    CreateLobby = 100,
    /// Join a lobby by id.
    JoinLobby = 101,
    /// List lobbies.
    ListLobbies = 102,
    /// Leave the current lobby or queue.
    LeaveLobby = 103,
    /// Host starts a match.
    StartMatch = 110,
    /// Current speaker adds to the phrase.
    Speak = 111,
    /// Create an account.
    Signup = 201,
    /// Log in to an account.
    Login = 202,
}

impl Opcode {
    /// Look up a numeric opcode.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            100 => Some(Opcode::CreateLobby),
            101 => Some(Opcode::JoinLobby),
            102 => Some(Opcode::ListLobbies),
            103 => Some(Opcode::LeaveLobby),
            110 => Some(Opcode::StartMatch),
            111 => Some(Opcode::Speak),
            201 => Some(Opcode::Signup),
            202 => Some(Opcode::Login),
            _ => None,
        }
    }

    /// Numeric value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Operation name for logs and error bodies.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::CreateLobby => "create-lobby",
            Opcode::JoinLobby => "join-lobby",
            Opcode::ListLobbies => "list-lobbies",
            Opcode::LeaveLobby => "leave-lobby",
            Opcode::StartMatch => "start-match",
            Opcode::Speak => "speak",
            Opcode::Signup => "signup",
            Opcode::Login => "login",
        }
    }
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// A decoded request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// `201 <lang> <username> <password>`
    Signup {
        /// Preferred language tag.
        lang: String,
        /// Account name.
        username: String,
        /// Clear-text password.
        password: String,
    },
    /// `202 <username> <password>`
    Login {
        /// Account name.
        username: String,
        /// Clear-text password.
        password: String,
    },
    /// `100`
    CreateLobby,
    /// `101 <lobby-id>`
    JoinLobby {
        /// Lobby id as sent by the client.
        lobby_id: String,
    },
    /// `102`
    ListLobbies,
    /// `103`
    LeaveLobby,
    /// `110 <0|1>`
    StartMatch {
        /// Turn direction.
        direction: Direction,
    },
    /// `111 <2-digit length> <text>`
    Speak {
        /// Contribution for this turn.
        text: String,
    },
}

/// Request decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Blank frame.
    #[error("empty request")]
    Empty,

    /// Leading token is not a known opcode.
    #[error("unknown request {0:?}")]
    UnknownOpcode(String),

    /// Required argument absent.
    #[error("{opcode} is missing <{argument}>")]
    MissingArgument {
        /// Operation name.
        opcode: &'static str,
        /// Argument name.
        argument: &'static str,
    },

    /// Argument present but unusable.
    #[error("{opcode} has an invalid <{argument}>: {value:?}")]
    InvalidArgument {
        /// Operation name.
        opcode: &'static str,
        /// Argument name.
        argument: &'static str,
        /// Offending value.
        value: String,
    },

    /// More arguments than the operation takes.
    #[error("{0} takes fewer arguments")]
    UnexpectedArgument(&'static str),

    /// Declared phrase length disagrees with the phrase.
    #[error("declared length {declared} but phrase is {actual} bytes")]
    LengthMismatch {
        /// Length field.
        declared: usize,
        /// Actual byte length.
        actual: usize,
    },
}

impl ProtocolError {
    /// Whether the frame was not recognised as a request at all.
    pub fn is_unrecognised(&self) -> bool {
        matches!(self, ProtocolError::Empty | ProtocolError::UnknownOpcode(_))
    }
}

struct Args<'a> {
    opcode: Opcode,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, argument: &'static str) -> Result<&'a str, ProtocolError> {
        self.tokens.next().ok_or(ProtocolError::MissingArgument {
            opcode: self.opcode.name(),
            argument,
        })
    }

    fn finish(mut self) -> Result<(), ProtocolError> {
        match self.tokens.next() {
            Some(_) => Err(ProtocolError::UnexpectedArgument(self.opcode.name())),
            None => Ok(()),
        }
    }
}

impl Request {
    /// Decode one request frame.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let frame = frame.trim_start();
        let token = frame.split_whitespace().next().ok_or(ProtocolError::Empty)?;

        let opcode = (token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()))
            .then(|| token.parse::<u16>().ok())
            .flatten()
            .and_then(Opcode::from_code)
            .ok_or_else(|| ProtocolError::UnknownOpcode(token.chars().take(16).collect()))?;

        let rest = &frame[token.len()..];
        let mut args = Args { opcode, tokens: rest.split_whitespace() };
        let request = match opcode {
            Opcode::Signup => Request::Signup {
                lang: args.next("lang")?.to_string(),
                username: args.next("username")?.to_string(),
                password: args.next("password")?.to_string(),
            },
            Opcode::Login => Request::Login {
                username: args.next("username")?.to_string(),
                password: args.next("password")?.to_string(),
            },
            Opcode::CreateLobby => Request::CreateLobby,
            Opcode::JoinLobby => Request::JoinLobby {
                lobby_id: args.next("lobby-id")?.to_string(),
            },
            Opcode::ListLobbies => Request::ListLobbies,
            Opcode::LeaveLobby => Request::LeaveLobby,
            Opcode::StartMatch => {
                let flag = args.next("direction")?;
                let direction = Direction::from_wire(flag).ok_or_else(|| ProtocolError::InvalidArgument {
                    opcode: opcode.name(),
                    argument: "direction",
                    value: flag.to_string(),
                })?;
                Request::StartMatch { direction }
            }
            Opcode::Speak => return Self::parse_speak(rest),
        };
        args.finish()?;
        Ok(request)
    }

    fn parse_speak(rest: &str) -> Result<Self, ProtocolError> {
        let name = Opcode::Speak.name();
        let rest = rest.strip_prefix(' ').unwrap_or(rest);

        let digits = rest.get(..2).filter(|d| d.bytes().all(|b| b.is_ascii_digit()));
        let declared: usize = match digits {
            Some(d) => d.parse().map_err(|_| ProtocolError::InvalidArgument {
                opcode: name,
                argument: "length",
                value: d.to_string(),
            })?,
            None if rest.trim().is_empty() => {
                return Err(ProtocolError::MissingArgument { opcode: name, argument: "length" })
            }
            None => {
                return Err(ProtocolError::InvalidArgument {
                    opcode: name,
                    argument: "length",
                    value: rest.chars().take(2).collect(),
                })
            }
        };

        let after = &rest[2..];
        let text = after.strip_prefix(' ').unwrap_or(after);
        let text = if text.len() == declared { text } else { text.trim_end() };
        if text.len() != declared {
            return Err(ProtocolError::LengthMismatch { declared, actual: text.len() });
        }
        Ok(Request::Speak { text: text.to_string() })
    }

    /// Opcode of this request.
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Signup { .. } => Opcode::Signup,
            Request::Login { .. } => Opcode::Login,
            Request::CreateLobby => Opcode::CreateLobby,
            Request::JoinLobby { .. } => Opcode::JoinLobby,
            Request::ListLobbies => Opcode::ListLobbies,
            Request::LeaveLobby => Opcode::LeaveLobby,
            Request::StartMatch { .. } => Opcode::StartMatch,
            Request::Speak { .. } => Opcode::Speak,
        }
    }

    /// Encode as a newline-terminated frame.
    pub fn encode(&self) -> String {
        let code = self.opcode().code();
        match self {
            Request::Signup { lang, username, password } => {
                format!("{code} {lang} {username} {password}\n")
            }
            Request::Login { username, password } => format!("{code} {username} {password}\n"),
            Request::JoinLobby { lobby_id } => format!("{code} {lobby_id}\n"),
            Request::StartMatch { direction } => format!("{code} {}\n", direction.as_wire()),
            Request::Speak { text } => format!("{code} {:02} {text}\n", text.len()),
            Request::CreateLobby | Request::ListLobbies | Request::LeaveLobby => format!("{code}\n"),
        }
    }
}

/// Split one read into request frames.
///
/// Requests are separated by newlines or NULs; a read without any separator
/// is one request.
pub fn split_requests(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(['\n', '\0'])
        .map(|frame| frame.trim_end_matches('\r'))
        .filter(|frame| !frame.trim().is_empty())
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Response codes. The three-character strings are the wire contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// `A00` lobby created; body is the lobby id.
    LobbyCreated,
    /// `A01` joined a lobby.
    JoinedLobby,
    /// `A02` the host left and the lobby closed.
    HostLeft,
    /// `A03` a player left.
    PlayerLeft,
    /// `A04` queued because the lobby is full.
    QueuedFull,
    /// `A05` lobby list or empty marker.
    LobbyList,
    /// `A06` left the queue.
    LeftQueue,
    /// `A07` queued because a match is running.
    QueuedMatchRunning,
    /// `A08` a player joined.
    PlayerJoined,
    /// `A10` match started.
    MatchStarted,
    /// `A11` your turn.
    YourTurn,
    /// `A12` match over or terminated.
    MatchTerminated,
    /// `A13` wait for your turn.
    Wait,
    /// `B01` signup succeeded.
    SignupOk,
    /// `B02` login succeeded.
    LoginOk,
    /// `Z00` server error or unknown request.
    ServerError,
    /// `Z01` bad request.
    BadRequest,
    /// `Z02` conflict.
    Conflict,
    /// `Z03` unauthorized.
    Unauthorized,
}

impl ResponseCode {
    const ALL: [ResponseCode; 19] = [
        ResponseCode::LobbyCreated,
        ResponseCode::JoinedLobby,
        ResponseCode::HostLeft,
        ResponseCode::PlayerLeft,
        ResponseCode::QueuedFull,
        ResponseCode::LobbyList,
        ResponseCode::LeftQueue,
        ResponseCode::QueuedMatchRunning,
        ResponseCode::PlayerJoined,
        ResponseCode::MatchStarted,
        ResponseCode::YourTurn,
        ResponseCode::MatchTerminated,
        ResponseCode::Wait,
        ResponseCode::SignupOk,
        ResponseCode::LoginOk,
        ResponseCode::ServerError,
        ResponseCode::BadRequest,
        ResponseCode::Conflict,
        ResponseCode::Unauthorized,
    ];

    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseCode::LobbyCreated => "A00",
            ResponseCode::JoinedLobby => "A01",
            ResponseCode::HostLeft => "A02",
            ResponseCode::PlayerLeft => "A03",
            ResponseCode::QueuedFull => "A04",
            ResponseCode::LobbyList => "A05",
            ResponseCode::LeftQueue => "A06",
            ResponseCode::QueuedMatchRunning => "A07",
            ResponseCode::PlayerJoined => "A08",
            ResponseCode::MatchStarted => "A10",
            ResponseCode::YourTurn => "A11",
            ResponseCode::MatchTerminated => "A12",
            ResponseCode::Wait => "A13",
            ResponseCode::SignupOk => "B01",
            ResponseCode::LoginOk => "B02",
            ResponseCode::ServerError => "Z00",
            ResponseCode::BadRequest => "Z01",
            ResponseCode::Conflict => "Z02",
            ResponseCode::Unauthorized => "Z03",
        }
    }

    /// Parse a wire string.
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }

    /// Whether this code reports a failure.
    pub fn is_error(self) -> bool {
        self.as_str().starts_with('Z')
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Response code.
    pub code: ResponseCode,
    /// Human-readable body.
    pub body: String,
}

impl Response {
    /// Create a response.
    pub fn new(code: ResponseCode, body: impl Into<String>) -> Self {
        Self { code, body: body.into() }
    }

    /// Encode as `<code>\n<body>\0`.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.body.len() + 5);
        frame.extend_from_slice(self.code.as_str().as_bytes());
        frame.push(b'\n');
        frame.extend_from_slice(self.body.as_bytes());
        frame.push(FRAME_TERMINATOR);
        frame
    }

    /// Decode one frame (without its terminator).
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let (code, body) = frame.split_once('\n').unwrap_or((frame, ""));
        let code = ResponseCode::parse(code.trim())
            .ok_or_else(|| ProtocolError::UnknownOpcode(code.chars().take(16).collect()))?;
        Ok(Self::new(code, body))
    }
}

/// Reassembles NUL-terminated frames from a byte stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, lossily decoded as UTF-8.
    pub fn next_frame(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == FRAME_TERMINATOR)?;
        let frame: Vec<u8> = self.pending.drain(..=end).take(end).collect();
        Some(String::from_utf8_lossy(&frame).into_owned())
    }

    /// Bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signup_and_login() {
        assert_eq!(
            Request::parse("201 it mario secret").unwrap(),
            Request::Signup {
                lang: "it".into(),
                username: "mario".into(),
                password: "secret".into(),
            }
        );
        assert_eq!(
            Request::parse("202 mario secret\r").unwrap(),
            Request::Login { username: "mario".into(), password: "secret".into() }
        );
    }

    #[test]
    fn test_parse_bare_opcodes() {
        assert_eq!(Request::parse("100").unwrap(), Request::CreateLobby);
        assert_eq!(Request::parse("  102 ").unwrap(), Request::ListLobbies);
        assert_eq!(Request::parse("103").unwrap(), Request::LeaveLobby);
    }

    #[test]
    fn test_parse_start_direction() {
        assert_eq!(
            Request::parse("110 0").unwrap(),
            Request::StartMatch { direction: Direction::Reversed }
        );
        assert!(matches!(
            Request::parse("110 7"),
            Err(ProtocolError::InvalidArgument { argument: "direction", .. })
        ));
        assert!(matches!(
            Request::parse("110"),
            Err(ProtocolError::MissingArgument { argument: "direction", .. })
        ));
    }

    #[test]
    fn test_parse_speak_keeps_spaces() {
        assert_eq!(
            Request::parse("111 11 hello world").unwrap(),
            Request::Speak { text: "hello world".into() }
        );
        assert_eq!(Request::parse("111 00").unwrap(), Request::Speak { text: String::new() });
        assert_eq!(Request::parse("111 05 ciao \r").unwrap_err(), ProtocolError::LengthMismatch {
            declared: 5,
            actual: 4,
        });
    }

    #[test]
    fn test_parse_speak_bad_length() {
        assert!(matches!(
            Request::parse("111 xx hi"),
            Err(ProtocolError::InvalidArgument { argument: "length", .. })
        ));
        assert!(matches!(
            Request::parse("111"),
            Err(ProtocolError::MissingArgument { argument: "length", .. })
        ));
    }

    #[test]
    fn test_garbage_is_unknown_opcode() {
        for frame in ["hello", "999", "1000", "abc def", "10", "\u{fffd}\u{fffd}"] {
            let err = Request::parse(frame).unwrap_err();
            assert!(err.is_unrecognised(), "{frame:?} gave {err:?}");
        }
        assert_eq!(Request::parse("   ").unwrap_err(), ProtocolError::Empty);
    }

    #[test]
    fn test_extra_arguments_rejected() {
        assert_eq!(
            Request::parse("100 now").unwrap_err(),
            ProtocolError::UnexpectedArgument("create-lobby")
        );
    }

    #[test]
    fn test_encode_matches_parse() {
        let requests = [
            Request::Signup { lang: "en".into(), username: "a".into(), password: "b".into() },
            Request::JoinLobby { lobby_id: LOBBY.into() },
            Request::StartMatch { direction: Direction::Forward },
            Request::Speak { text: "two words".into() },
            Request::LeaveLobby,
        ];
        for request in requests {
            let frame = request.encode();
            assert!(frame.ends_with('\n'));
            assert_eq!(Request::parse(frame.trim_end_matches('\n')).unwrap(), request);
        }
        assert_eq!(Request::Speak { text: "hi".into() }.encode(), "111 02 hi\n");
    }

    const LOBBY: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    #[test]
    fn test_split_requests() {
        let frames: Vec<_> = split_requests("100\n102\r\n\n101 x\0").collect();
        assert_eq!(frames, vec!["100", "102", "101 x"]);
        let single: Vec<_> = split_requests("202 bob pw").collect();
        assert_eq!(single, vec!["202 bob pw"]);
    }

    #[test]
    fn test_response_codes_are_exact() {
        let expected = [
            "A00", "A01", "A02", "A03", "A04", "A05", "A06", "A07", "A08", "A10", "A11", "A12",
            "A13", "B01", "B02", "Z00", "Z01", "Z02", "Z03",
        ];
        let actual: Vec<_> = ResponseCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(actual, expected);
        assert_eq!(ResponseCode::parse("A09"), None);
        assert!(ResponseCode::Unauthorized.is_error());
        assert!(!ResponseCode::LoginOk.is_error());
    }

    #[test]
    fn test_response_frame_layout() {
        let response = Response::new(ResponseCode::LobbyCreated, LOBBY);
        let frame = response.encode();
        assert_eq!(frame, format!("A00\n{LOBBY}\0").into_bytes());
        let text = std::str::from_utf8(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(Response::decode(text).unwrap(), response);
    }

    #[test]
    fn test_frame_buffer_reassembles() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"A13\nwait\0A1");
        assert_eq!(buffer.next_frame().as_deref(), Some("A13\nwait"));
        assert_eq!(buffer.next_frame(), None);
        buffer.extend(b"1\nyour turn\0");
        assert_eq!(buffer.next_frame().as_deref(), Some("A11\nyour turn"));
        assert_eq!(buffer.pending_len(), 0);
    }
}
