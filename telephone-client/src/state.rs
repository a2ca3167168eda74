//! Client State
//!
//! What the client believes about its own session, updated from the requests
//! it sends and the responses it receives. Used for local checks and for the
//! `status` command; the server remains the authority.

use telephone::network::lobby::LEFT_LOBBY;
use telephone::network::protocol::{Request, Response, ResponseCode};

/// Where the player stands in a lobby.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LobbyStatus {
    /// Hosting the lobby with this id.
    Host(String),
    /// Seated in a lobby.
    Member(Option<String>),
    /// Waiting in a lobby's queue.
    Queued(Option<String>),
}

/// Locally tracked session state.
#[derive(Clone, Debug, Default)]
pub struct ClientState {
    username: Option<String>,
    lobby: Option<LobbyStatus>,
    in_match: bool,
    my_turn: bool,
    pending_login: Option<String>,
    pending_join: Option<String>,
    leaving: bool,
}

impl ClientState {
    /// Fresh, logged-out state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logged-in name.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Current lobby, if any.
    pub fn lobby(&self) -> Option<&LobbyStatus> {
        self.lobby.as_ref()
    }

    /// Whether we host our lobby.
    pub fn is_host(&self) -> bool {
        matches!(self.lobby, Some(LobbyStatus::Host(_)))
    }

    /// Whether a match is being played in our lobby.
    pub fn in_match(&self) -> bool {
        self.in_match
    }

    /// Whether we are the current speaker.
    pub fn my_turn(&self) -> bool {
        self.my_turn
    }

    /// Remember what a request will need to interpret its reply.
    pub fn on_sent(&mut self, request: &Request) {
        match request {
            Request::Login { username, .. } => self.pending_login = Some(username.clone()),
            Request::JoinLobby { lobby_id } => self.pending_join = Some(lobby_id.clone()),
            Request::LeaveLobby => self.leaving = true,
            _ => {}
        }
    }

    /// Update from a server response.
    pub fn apply(&mut self, response: &Response) {
        match response.code {
            ResponseCode::LoginOk => self.username = self.pending_login.take(),
            ResponseCode::LobbyCreated => {
                self.lobby = Some(LobbyStatus::Host(response.body.trim().to_string()));
            }
            ResponseCode::JoinedLobby => {
                if !self.is_host() {
                    self.lobby = Some(LobbyStatus::Member(self.joined_id()));
                }
            }
            ResponseCode::QueuedFull | ResponseCode::QueuedMatchRunning => {
                self.lobby = Some(LobbyStatus::Queued(self.joined_id()));
            }
            ResponseCode::HostLeft | ResponseCode::LeftQueue => self.leave_lobby(),
            ResponseCode::PlayerLeft if self.leaving && response.body == LEFT_LOBBY => self.leave_lobby(),
            ResponseCode::MatchStarted => self.in_match = true,
            ResponseCode::YourTurn => self.my_turn = true,
            ResponseCode::Wait => self.my_turn = false,
            ResponseCode::MatchTerminated => {
                self.in_match = false;
                self.my_turn = false;
            }
            ResponseCode::BadRequest if self.leaving => self.leaving = false,
            _ => {}
        }
    }

    fn joined_id(&self) -> Option<String> {
        match &self.lobby {
            Some(LobbyStatus::Member(Some(id))) | Some(LobbyStatus::Queued(Some(id))) => Some(id.clone()),
            _ => self.pending_join.clone(),
        }
    }

    fn leave_lobby(&mut self) {
        self.lobby = None;
        self.in_match = false;
        self.my_turn = false;
        self.leaving = false;
        self.pending_join = None;
    }

    /// One-line summary for the `status` command.
    pub fn describe(&self) -> String {
        let who = match &self.username {
            Some(name) => format!("logged in as {name}"),
            None => "not logged in".to_string(),
        };
        let place = match &self.lobby {
            None => "not in a lobby".to_string(),
            Some(LobbyStatus::Host(id)) => format!("hosting lobby {id}"),
            Some(LobbyStatus::Member(id)) => format!("in lobby {}", id.as_deref().unwrap_or("?")),
            Some(LobbyStatus::Queued(id)) => format!("queued for lobby {}", id.as_deref().unwrap_or("?")),
        };
        let play = match (self.in_match, self.my_turn) {
            (true, true) => ", your turn",
            (true, false) => ", match running",
            _ => "",
        };
        format!("{who}, {place}{play}")
    }
}

/// Human-readable rendering of a server response.
pub fn render(response: &Response) -> String {
    let body = response.body.trim_end();
    match response.code {
        ResponseCode::LobbyCreated => format!("Lobby created. Share this id: {body}"),
        ResponseCode::JoinedLobby => format!("Joined: {body}"),
        ResponseCode::HostLeft => format!("Lobby closed: {body}"),
        ResponseCode::PlayerLeft => format!("Left: {body}"),
        ResponseCode::QueuedFull | ResponseCode::QueuedMatchRunning => format!("Queued: {body}"),
        ResponseCode::LeftQueue => format!("Left the queue: {body}"),
        ResponseCode::LobbyList => render_lobby_list(body),
        ResponseCode::PlayerJoined => format!("Joined: {body}"),
        ResponseCode::MatchStarted => format!("Match: {body}"),
        ResponseCode::YourTurn if body.is_empty() => "Your turn! Start the phrase with: say <words>".to_string(),
        ResponseCode::YourTurn => format!("Your turn! The phrase so far: {body}\nAdd to it with: say <words>"),
        ResponseCode::Wait => format!("Wait: {body}"),
        ResponseCode::MatchTerminated => render_summary(body),
        ResponseCode::SignupOk | ResponseCode::LoginOk => format!("OK: {body}"),
        code => format!("Error {code}: {body}"),
    }
}

fn render_lobby_list(body: &str) -> String {
    let rows: Vec<Vec<&str>> = body
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|parts| parts.len() == 4)
        .collect();
    if rows.is_empty() {
        return format!("Lobbies: {body}");
    }

    let mut out = format!("{:<36}  {:<31}  {}", "ID", "HOST", "PLAYERS");
    for parts in rows {
        out.push_str(&format!("\n{:<36}  {:<31}  {}/{}", parts[0], parts[1], parts[3], parts[2]));
    }
    out
}

fn render_summary(body: &str) -> String {
    match body.split_once('\n') {
        Some((history, last)) => {
            let mut out = String::from("Match over! The phrase travelled:");
            for (turn, step) in history.split(" -> ").enumerate() {
                out.push_str(&format!("\n  {}. {}", turn + 1, step));
            }
            out.push_str(&format!("\nIn your language: {last}"));
            out
        }
        None => format!("Match over: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: ResponseCode, body: &str) -> Response {
        Response::new(code, body)
    }

    #[test]
    fn test_login_tracks_name() {
        let mut state = ClientState::new();
        state.on_sent(&Request::Login { username: "ann".into(), password: "x".into() });
        assert_eq!(state.username(), None);
        state.apply(&response(ResponseCode::LoginOk, "welcome"));
        assert_eq!(state.username(), Some("ann"));
    }

    #[test]
    fn test_host_lifecycle() {
        let mut state = ClientState::new();
        state.apply(&response(ResponseCode::LobbyCreated, "abc"));
        assert!(state.is_host());
        state.apply(&response(ResponseCode::MatchStarted, "go"));
        state.apply(&response(ResponseCode::YourTurn, ""));
        assert!(state.my_turn());
        state.apply(&response(ResponseCode::Wait, "b is speaking"));
        assert!(!state.my_turn());
        state.apply(&response(ResponseCode::MatchTerminated, "a\nb"));
        assert!(!state.in_match());
        assert!(state.is_host());
    }

    #[test]
    fn test_join_queue_and_promotion() {
        let mut state = ClientState::new();
        state.on_sent(&Request::JoinLobby { lobby_id: "xyz".into() });
        state.apply(&response(ResponseCode::QueuedFull, "number 1"));
        assert_eq!(state.lobby(), Some(&LobbyStatus::Queued(Some("xyz".into()))));
        state.apply(&response(ResponseCode::JoinedLobby, "welcome"));
        assert_eq!(state.lobby(), Some(&LobbyStatus::Member(Some("xyz".into()))));
    }

    #[test]
    fn test_other_player_leaving_keeps_lobby() {
        let mut state = ClientState::new();
        state.on_sent(&Request::JoinLobby { lobby_id: "xyz".into() });
        state.apply(&response(ResponseCode::JoinedLobby, "welcome"));
        state.apply(&response(ResponseCode::PlayerLeft, "bob left the lobby"));
        assert!(state.lobby().is_some());

        state.on_sent(&Request::LeaveLobby);
        state.apply(&response(ResponseCode::PlayerLeft, LEFT_LOBBY));
        assert!(state.lobby().is_none());
    }

    #[test]
    fn test_other_leave_during_own_leave_is_not_our_ack() {
        let mut state = ClientState::new();
        state.on_sent(&Request::JoinLobby { lobby_id: "xyz".into() });
        state.apply(&response(ResponseCode::JoinedLobby, "welcome"));

        state.on_sent(&Request::LeaveLobby);
        state.apply(&response(ResponseCode::PlayerLeft, "bob left the lobby"));
        assert_eq!(state.lobby(), Some(&LobbyStatus::Member(Some("xyz".into()))));

        state.apply(&response(ResponseCode::BadRequest, "the lobby has closed"));
        assert!(state.lobby().is_some());
        state.apply(&response(ResponseCode::PlayerLeft, LEFT_LOBBY));
        assert!(state.lobby().is_some());
    }

    #[test]
    fn test_host_left_clears() {
        let mut state = ClientState::new();
        state.apply(&response(ResponseCode::JoinedLobby, "welcome"));
        state.apply(&response(ResponseCode::MatchStarted, "go"));
        state.apply(&response(ResponseCode::HostLeft, "closed"));
        assert!(state.lobby().is_none());
        assert!(!state.in_match());
        assert_eq!(state.describe(), "not logged in, not in a lobby");
    }

    #[test]
    fn test_render_lobby_table() {
        let out = render(&response(ResponseCode::LobbyList, "id1 ann 10 3\nid2 bob 10 10"));
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("3/10"));
        let empty = render(&response(ResponseCode::LobbyList, "no lobbies available"));
        assert_eq!(empty, "Lobbies: no lobbies available");
    }

    #[test]
    fn test_render_summary() {
        let out = render(&response(ResponseCode::MatchTerminated, "ciao -> hello there\nhello there"));
        assert!(out.contains("  1. ciao"));
        assert!(out.contains("  2. hello there"));
        assert!(out.ends_with("In your language: hello there"));
    }

    #[test]
    fn test_render_error() {
        let out = render(&response(ResponseCode::Unauthorized, "you must log in first"));
        assert_eq!(out, "Error Z03: you must log in first");
    }
}
