//! Lobbies
//!
//! A [`Lobby`] wraps a [`Roster`] and a [`Match`] behind one async mutex and
//! sends every notification while that mutex is held, so each member sees
//! events in the order they were applied.
//!
//! The [`LobbyRegistry`] maps lobby ids to lobbies and enforces the global
//! lobby ceiling. Lock order is registry, then lobby, then connection.
//! A departing host's lobby is removed from the registry before it is locked.
//! Listing reads each lobby's published seat count, never its mutex.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::core::ids::LobbyId;
use crate::game::relay::{Match, MatchError, Snapshot, TurnAdvance};
use crate::game::roster::{Admission, QueueReason, Roster, Vacated};
use crate::game::turn_order::Direction;
use crate::network::dispatch::{broadcast, send_to};
use crate::network::protocol::{Response, ResponseCode};
use crate::network::session::{Membership, Player, Role};
use crate::translate::{translate_or_keep, Translator};

/// Body of the `A03` sent to the player who left.
pub const LEFT_LOBBY: &str = "you left the lobby";

/// Per-lobby limits.
#[derive(Clone, Debug)]
pub struct LobbySettings {
    /// Seats per lobby.
    pub capacity: usize,
    /// Members needed to start a match.
    pub min_players: usize,
    /// Exclusive limit on one contribution, in bytes.
    pub max_phrase_len: usize,
    /// Budget for each translation call.
    pub translate_timeout: Duration,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            min_players: 4,
            max_phrase_len: 30,
            translate_timeout: Duration::from_secs(5),
        }
    }
}

/// Lobby errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// No lobby with that id.
    #[error("lobby {0} not found")]
    NotFound(String),

    /// Caller already belongs to some lobby.
    #[error("you are already in a lobby, leave it first")]
    AlreadyInLobby,

    /// Caller already belongs to this lobby.
    #[error("you are already in this lobby")]
    AlreadyMember,

    /// Caller is not in a lobby.
    #[error("you are not in a lobby")]
    NotInLobby,

    /// Host-only operation.
    #[error("only the host can start a match")]
    NotHost,

    /// Global lobby ceiling reached.
    #[error("the server already hosts {max} lobbies, try again later")]
    LobbyLimitReached {
        /// Configured ceiling.
        max: usize,
    },

    /// Lobby was dissolved while the request was in flight.
    #[error("the lobby has closed")]
    Closed,

    /// Match rule violation.
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Result of a join.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Seated.
    Joined,
    /// Waiting in the queue.
    Queued(QueueReason),
}

/// Result of a departure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Left the queue.
    LeftQueue,
    /// Gave up a seat.
    LeftSeat,
    /// Host left and the lobby closed.
    Dissolved,
}

/// One row of the lobby list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LobbySummary {
    /// Lobby id.
    pub id: LobbyId,
    /// Host display name.
    pub host: String,
    /// Seats.
    pub capacity: usize,
    /// Seated members.
    pub members: usize,
}

impl fmt::Display for LobbySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.id, self.host, self.capacity, self.members)
    }
}

// =============================================================================
// LOBBY
// =============================================================================

/// Members, queue and match of one lobby.
pub struct Lobby {
    id: LobbyId,
    roster: Roster<Arc<Player>>,
    game: Match,
    settings: LobbySettings,
    translator: Arc<dyn Translator>,
    closed: bool,
    // Seated count readable without the lobby lock.
    seated: Arc<AtomicUsize>,
}

impl Lobby {
    /// Create a lobby with `host` in seat 0.
    pub fn new(
        id: LobbyId,
        host: Arc<Player>,
        settings: LobbySettings,
        translator: Arc<dyn Translator>,
    ) -> Self {
        host.set_membership(Some(Membership { lobby: id, role: Role::Host }));
        Self {
            id,
            roster: Roster::new(host, settings.capacity),
            game: Match::new(),
            settings,
            translator,
            closed: false,
            seated: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Lobby id.
    pub fn id(&self) -> LobbyId {
        self.id
    }

    /// Seated members in join order.
    pub fn members(&self) -> &[Arc<Player>] {
        self.roster.members()
    }

    /// Embedded match.
    pub fn game(&self) -> &Match {
        &self.game
    }

    /// Shared seated count, kept current by every seat change.
    pub fn seat_counter(&self) -> Arc<AtomicUsize> {
        self.seated.clone()
    }

    fn publish_seats(&self) {
        self.seated.store(self.roster.member_count(), Ordering::Relaxed);
    }

    /// Seat `player`, or queue them when full or mid-match.
    pub async fn join(&mut self, player: &Arc<Player>) -> Result<JoinOutcome, LobbyError> {
        if self.closed {
            return Err(LobbyError::Closed);
        }

        match self.roster.admit(player.clone(), self.game.is_running()) {
            Admission::AlreadyPresent => Err(LobbyError::AlreadyMember),
            Admission::Seated => {
                info!("{} joined lobby {}", player.name(), self.id.short());
                self.welcome(player).await;
                Ok(JoinOutcome::Joined)
            }
            Admission::Queued { reason, position } => {
                player.set_membership(Some(Membership { lobby: self.id, role: Role::Queued }));
                let response = match reason {
                    QueueReason::Full => Response::new(
                        ResponseCode::QueuedFull,
                        format!("the lobby is full, you are number {position} in the queue"),
                    ),
                    QueueReason::MatchRunning => Response::new(
                        ResponseCode::QueuedMatchRunning,
                        format!("a match is in progress, you are number {position} in the queue"),
                    ),
                };
                debug!("{} queued in lobby {} ({:?})", player.name(), self.id.short(), reason);
                send_to(player, &response).await;
                Ok(JoinOutcome::Queued(reason))
            }
        }
    }

    /// Mark a newly seated player as a member and announce them.
    async fn welcome(&self, player: &Arc<Player>) {
        player.set_membership(Some(Membership { lobby: self.id, role: Role::Member }));
        let seated = self.roster.member_count();
        self.publish_seats();
        send_to(
            player,
            &Response::new(
                ResponseCode::JoinedLobby,
                format!("welcome to lobby {}, {} of {} seats taken", self.id, seated, self.roster.capacity()),
            ),
        )
        .await;
        broadcast(
            self.roster.members(),
            &Response::new(ResponseCode::PlayerJoined, format!("{} joined the lobby", player.name())),
            Some(player.id()),
        )
        .await;
    }

    /// Remove `player`. A host departure dissolves the lobby; the caller
    /// must already have removed it from the registry.
    pub async fn leave(&mut self, player: &Arc<Player>) -> Result<LeaveOutcome, LobbyError> {
        if self.closed {
            return Err(LobbyError::Closed);
        }
        if self.roster.is_host(player.id()) {
            self.dissolve().await;
            return Ok(LeaveOutcome::Dissolved);
        }

        let (_, vacated) = self.roster.remove(player.id()).ok_or(LobbyError::NotInLobby)?;
        player.clear_membership(self.id);
        self.publish_seats();

        if vacated == Vacated::Queue {
            debug!("{} left the queue of lobby {}", player.name(), self.id.short());
            send_to(
                player,
                &Response::new(ResponseCode::LeftQueue, format!("you left the queue of lobby {}", self.id)),
            )
            .await;
            return Ok(LeaveOutcome::LeftQueue);
        }

        info!("{} left lobby {}", player.name(), self.id.short());
        let terminated = self.game.terminate();

        send_to(player, &Response::new(ResponseCode::PlayerLeft, LEFT_LOBBY)).await;
        broadcast(
            self.roster.members(),
            &Response::new(ResponseCode::PlayerLeft, format!("{} left the lobby", player.name())),
            None,
        )
        .await;

        if terminated {
            info!("Match in lobby {} terminated, {} left", self.id.short(), player.name());
            broadcast(
                self.roster.members(),
                &Response::new(
                    ResponseCode::MatchTerminated,
                    format!("the match was terminated because {} left", player.name()),
                ),
                None,
            )
            .await;
        }

        self.seat_queued().await;
        Ok(LeaveOutcome::LeftSeat)
    }

    /// Promote queued players into free seats, welcoming each.
    async fn seat_queued(&mut self) {
        for entry in self.roster.drain_queue() {
            info!(
                "{} promoted from the queue of lobby {} after {:.1?}",
                entry.occupant.name(),
                self.id.short(),
                entry.queued_at.elapsed()
            );
            self.welcome(&entry.occupant).await;
        }
    }

    /// Close the lobby: everyone is told the host left and loses membership.
    pub async fn dissolve(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let terminated = self.game.terminate();
        let (members, queued) = self.roster.dissolve();
        self.publish_seats();
        info!(
            "Lobby {} dissolved ({} members, {} queued)",
            self.id.short(),
            members.len(),
            queued.len()
        );

        let mut players = members.into_iter();
        let host = players.next();
        let host_left = Response::new(
            ResponseCode::HostLeft,
            format!("the host left, lobby {} is closed", self.id),
        );
        let terminated_notice = Response::new(
            ResponseCode::MatchTerminated,
            "the match was terminated because the host left",
        );

        for member in players {
            member.clear_membership(self.id);
            if terminated {
                send_to(&member, &terminated_notice).await;
            }
            send_to(&member, &host_left).await;
        }
        for waiting in queued {
            waiting.clear_membership(self.id);
            send_to(&waiting, &host_left).await;
        }
        if let Some(host) = host {
            host.clear_membership(self.id);
            send_to(
                &host,
                &Response::new(ResponseCode::HostLeft, format!("you left, lobby {} is closed", self.id)),
            )
            .await;
        }
    }

    /// Host starts a match in `direction`.
    #[instrument(skip(self, player), fields(lobby = %self.id.short(), host = %player.name()))]
    pub async fn start_match(&mut self, player: &Arc<Player>, direction: Direction) -> Result<(), LobbyError> {
        if self.closed {
            return Err(LobbyError::Closed);
        }
        if !self.roster.is_host(player.id()) {
            return Err(LobbyError::NotHost);
        }

        let seats = self.roster.member_count();
        self.game.start(seats, direction, self.settings.min_players)?;
        info!("Match started with {} players ({:?})", seats, direction);

        let order = match direction {
            Direction::Forward => "forward",
            Direction::Reversed => "reversed",
        };
        broadcast(
            self.roster.members(),
            &Response::new(
                ResponseCode::MatchStarted,
                format!("the match has started with {seats} players, {order} order"),
            ),
            None,
        )
        .await;
        self.announce_turn().await;
        Ok(())
    }

    /// One pass over members: the speaker gets `A11`, everyone else `A13`.
    async fn announce_turn(&self) {
        let Some(speaker) = self.game.speaker_seat() else {
            return;
        };
        let members = self.roster.members();
        let speaker_name = members[speaker].name().to_string();
        let phrase = self.game.latest().map(|s| s.text.clone()).unwrap_or_default();

        for (seat, member) in members.iter().enumerate() {
            let response = if seat == speaker {
                Response::new(ResponseCode::YourTurn, phrase.clone())
            } else {
                Response::new(ResponseCode::Wait, format!("{speaker_name} is speaking"))
            };
            send_to(member, &response).await;
        }
    }

    /// Current speaker adds `text` to the phrase.
    #[instrument(skip(self, player, text), fields(lobby = %self.id.short(), speaker = %player.name()))]
    pub async fn speak(&mut self, player: &Arc<Player>, text: &str) -> Result<(), LobbyError> {
        if self.closed {
            return Err(LobbyError::Closed);
        }
        if !self.game.is_running() {
            return Err(MatchError::NotRunning.into());
        }
        let seat = self.roster.seat_of(player.id()).ok_or(MatchError::NotYourTurn)?;
        self.game.check_turn(seat, text, self.settings.max_phrase_len)?;

        let phrase = self.game.compose(text);
        let listener = self
            .game
            .listener_seat()
            .and_then(|seat| self.roster.members().get(seat))
            .cloned()
            .ok_or(MatchError::NotRunning)?;

        let translated = translate_or_keep(
            self.translator.as_ref(),
            &phrase,
            player.lang(),
            listener.lang(),
            self.settings.translate_timeout,
        )
        .await;
        debug!("turn {}: {:?} -> {:?}", self.game.turn(), phrase, translated);

        let snapshot = Snapshot { text: translated, lang: listener.lang().to_string() };
        match self.game.record(snapshot)? {
            TurnAdvance::Next { .. } => self.announce_turn().await,
            TurnAdvance::Finished => self.finish_match().await,
        }
        Ok(())
    }

    /// Send every member the history plus the final phrase in their language,
    /// then reset and seat the queue.
    async fn finish_match(&mut self) {
        let history = self.game.history_line();
        let last = self.game.latest().cloned();
        info!("Match in lobby {} finished: {}", self.id.short(), history);

        let mut renderings: BTreeMap<String, String> = BTreeMap::new();
        for member in self.roster.members() {
            let lang = member.lang().to_ascii_lowercase();
            let rendered = match (&last, renderings.get(&lang).cloned()) {
                (_, Some(cached)) => cached,
                (None, None) => String::new(),
                (Some(last), None) => {
                    let text = translate_or_keep(
                        self.translator.as_ref(),
                        &last.text,
                        &last.lang,
                        &lang,
                        self.settings.translate_timeout,
                    )
                    .await;
                    renderings.insert(lang, text.clone());
                    text
                }
            };
            send_to(
                member,
                &Response::new(ResponseCode::MatchTerminated, format!("{history}\n{rendered}")),
            )
            .await;
        }

        self.game.reset();
        self.seat_queued().await;
    }
}

// =============================================================================
// LOBBY REGISTRY
// =============================================================================

/// Registry slot: the lobby plus what `list` reads without locking it.
struct Listing {
    lobby: Arc<Mutex<Lobby>>,
    host: String,
    capacity: usize,
    seated: Arc<AtomicUsize>,
}

impl Listing {
    fn summary(&self, id: LobbyId) -> LobbySummary {
        LobbySummary {
            id,
            host: self.host.clone(),
            capacity: self.capacity,
            members: self.seated.load(Ordering::Relaxed),
        }
    }
}

/// All live lobbies.
pub struct LobbyRegistry {
    lobbies: RwLock<BTreeMap<LobbyId, Listing>>,
    max_lobbies: usize,
    settings: LobbySettings,
    translator: Arc<dyn Translator>,
}

impl LobbyRegistry {
    /// Create an empty registry.
    pub fn new(max_lobbies: usize, settings: LobbySettings, translator: Arc<dyn Translator>) -> Self {
        Self {
            lobbies: RwLock::new(BTreeMap::new()),
            max_lobbies,
            settings,
            translator,
        }
    }

    /// Create a lobby hosted by `host` and send it `A00`.
    pub async fn create(&self, host: &Arc<Player>) -> Result<LobbyId, LobbyError> {
        if host.membership().is_some() {
            return Err(LobbyError::AlreadyInLobby);
        }

        let mut lobbies = self.lobbies.write().await;
        if lobbies.len() >= self.max_lobbies {
            return Err(LobbyError::LobbyLimitReached { max: self.max_lobbies });
        }

        let id = LobbyId::generate();
        let lobby = Lobby::new(id, host.clone(), self.settings.clone(), self.translator.clone());
        let listing = Listing {
            host: host.name().to_string(),
            capacity: self.settings.capacity,
            seated: lobby.seat_counter(),
            lobby: Arc::new(Mutex::new(lobby)),
        };

        // Joiners wait on the lobby lock until the host has its id; the
        // registry lock is released before that write.
        let guard = listing.lobby.clone().lock_owned().await;
        lobbies.insert(id, listing);
        info!("{} created lobby {} ({} live)", host.name(), id.short(), lobbies.len());
        drop(lobbies);

        send_to(host, &Response::new(ResponseCode::LobbyCreated, id.to_string())).await;
        drop(guard);
        Ok(id)
    }

    /// Look up a lobby.
    pub async fn find(&self, id: LobbyId) -> Option<Arc<Mutex<Lobby>>> {
        self.lobbies.read().await.get(&id).map(|listing| listing.lobby.clone())
    }

    /// Remove a lobby from the registry.
    pub async fn remove(&self, id: LobbyId) -> Option<Arc<Mutex<Lobby>>> {
        self.lobbies.write().await.remove(&id).map(|listing| listing.lobby)
    }

    /// Number of live lobbies.
    pub async fn count(&self) -> usize {
        self.lobbies.read().await.len()
    }

    /// One row per live lobby, in id order. Never waits on a lobby lock.
    pub async fn list(&self) -> Vec<LobbySummary> {
        self.lobbies
            .read()
            .await
            .iter()
            .map(|(id, listing)| listing.summary(*id))
            .collect()
    }

    /// Join the lobby named by `lobby_id`.
    pub async fn join(&self, player: &Arc<Player>, lobby_id: &str) -> Result<JoinOutcome, LobbyError> {
        let id: LobbyId = lobby_id
            .parse()
            .map_err(|_| LobbyError::NotFound(lobby_id.to_string()))?;
        if let Some(membership) = player.membership() {
            return Err(if membership.lobby == id {
                LobbyError::AlreadyMember
            } else {
                LobbyError::AlreadyInLobby
            });
        }

        let lobby = self.find(id).await.ok_or_else(|| LobbyError::NotFound(lobby_id.to_string()))?;
        let mut lobby = lobby.lock().await;
        lobby.join(player).await
    }

    /// Leave whatever lobby `player` is in. Also used on disconnect.
    pub async fn depart(&self, player: &Arc<Player>) -> Result<LeaveOutcome, LobbyError> {
        let membership = player.membership().ok_or(LobbyError::NotInLobby)?;

        if membership.role == Role::Host {
            let lobby = self.remove(membership.lobby).await;
            player.clear_membership(membership.lobby);
            if let Some(lobby) = lobby {
                lobby.lock().await.dissolve().await;
            }
            return Ok(LeaveOutcome::Dissolved);
        }

        let Some(lobby) = self.find(membership.lobby).await else {
            player.clear_membership(membership.lobby);
            return Err(LobbyError::Closed);
        };
        let mut lobby = lobby.lock().await;
        lobby.leave(player).await
    }

    /// Host starts a match in their lobby.
    pub async fn start_match(&self, player: &Arc<Player>, direction: Direction) -> Result<(), LobbyError> {
        let lobby = self.lobby_of(player).await?;
        let mut lobby = lobby.lock().await;
        lobby.start_match(player, direction).await
    }

    /// Current speaker contributes `text`.
    pub async fn speak(&self, player: &Arc<Player>, text: &str) -> Result<(), LobbyError> {
        let lobby = self.lobby_of(player).await?;
        let mut lobby = lobby.lock().await;
        lobby.speak(player, text).await
    }

    async fn lobby_of(&self, player: &Arc<Player>) -> Result<Arc<Mutex<Lobby>>, LobbyError> {
        let membership = player.membership().ok_or(LobbyError::NotInLobby)?;
        self.find(membership.lobby).await.ok_or(LobbyError::Closed)
    }
}
