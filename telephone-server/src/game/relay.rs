//! Relay Match State Machine
//!
//! One match of broken telephone. Each turn the current speaker extends the
//! phrase, the whole cumulative phrase is rendered into the next speaker's
//! language, and the result is stored as a snapshot. The match ends after
//! every seat has spoken once.
//!
//! This type is synchronous and does no I/O. The lobby layer performs the
//! translation calls and delivers notifications around it.

use crate::game::turn_order::{listener_for_turn, seat_for_turn, Direction};

/// Separator placed between snapshots in the final history line.
pub const HISTORY_SEPARATOR: &str = " -> ";

/// Match phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPhase {
    /// No match in progress.
    Idle,
    /// Turns are being played.
    Running,
}

/// Phrase state after one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Cumulative phrase.
    pub text: String,
    /// Language `text` is written in.
    pub lang: String,
}

/// What happens after a recorded turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnAdvance {
    /// Play continues with the speaker at this seat.
    Next {
        /// Seat index of the new speaker.
        speaker: usize,
    },
    /// Every seat has spoken.
    Finished,
}

/// Match errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// A match is already being played.
    #[error("a match is already running, wait for it to finish")]
    AlreadyRunning,

    /// No match is being played.
    #[error("no match is running")]
    NotRunning,

    /// Too few members to start.
    #[error("at least {required} players are needed to start, the lobby has {present}")]
    NotEnoughPlayers {
        /// Configured minimum.
        required: usize,
        /// Current member count.
        present: usize,
    },

    /// Caller is not the current speaker.
    #[error("it is not your turn")]
    NotYourTurn,

    /// Phrase exceeds the length limit.
    #[error("phrase is {len} bytes, it must be shorter than {max}")]
    PhraseTooLong {
        /// Submitted length.
        len: usize,
        /// Exclusive limit.
        max: usize,
    },
}

/// A relay match embedded in a lobby.
#[derive(Debug, Clone)]
pub struct Match {
    phase: MatchPhase,
    direction: Direction,
    turn: usize,
    seats: usize,
    snapshots: Vec<Snapshot>,
}

impl Default for Match {
    fn default() -> Self {
        Self::new()
    }
}

impl Match {
    /// Create an idle match.
    pub fn new() -> Self {
        Self {
            phase: MatchPhase::Idle,
            direction: Direction::Forward,
            turn: 0,
            seats: 0,
            snapshots: Vec::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Whether turns are being played.
    pub fn is_running(&self) -> bool {
        self.phase == MatchPhase::Running
    }

    /// Direction of the current (or last) match.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Turns taken so far.
    pub fn turn(&self) -> usize {
        self.turn
    }

    /// Seats taking part in the current match.
    pub fn seats(&self) -> usize {
        self.seats
    }

    /// Snapshots in turn order.
    pub fn history(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Begin a match for `seats` players.
    pub fn start(
        &mut self,
        seats: usize,
        direction: Direction,
        min_players: usize,
    ) -> Result<(), MatchError> {
        if self.is_running() {
            return Err(MatchError::AlreadyRunning);
        }
        let required = min_players.max(1);
        if seats < required {
            return Err(MatchError::NotEnoughPlayers { required, present: seats });
        }

        self.phase = MatchPhase::Running;
        self.direction = direction;
        self.turn = 0;
        self.seats = seats;
        self.snapshots.clear();
        Ok(())
    }

    /// Seat of the player who must speak now.
    pub fn speaker_seat(&self) -> Option<usize> {
        self.is_running()
            .then(|| seat_for_turn(self.direction, self.turn, self.seats))
    }

    /// Seat of the player the current phrase is being translated for.
    pub fn listener_seat(&self) -> Option<usize> {
        self.is_running()
            .then(|| listener_for_turn(self.direction, self.turn, self.seats))
    }

    /// Check that `seat` may speak `text` now.
    pub fn check_turn(&self, seat: usize, text: &str, max_len: usize) -> Result<(), MatchError> {
        let speaker = self.speaker_seat().ok_or(MatchError::NotRunning)?;
        if seat != speaker {
            return Err(MatchError::NotYourTurn);
        }
        if text.len() >= max_len {
            return Err(MatchError::PhraseTooLong { len: text.len(), max: max_len });
        }
        Ok(())
    }

    /// Phrase after appending `text` to the latest snapshot.
    ///
    /// The first turn seeds the phrase. An empty contribution passes the
    /// phrase on unchanged.
    pub fn compose(&self, text: &str) -> String {
        let text = text.trim();
        match self.latest() {
            None => text.to_string(),
            Some(last) if text.is_empty() => last.text.clone(),
            Some(last) if last.text.is_empty() => text.to_string(),
            Some(last) => format!("{} {}", last.text, text),
        }
    }

    /// Store the snapshot for the current turn and advance.
    pub fn record(&mut self, snapshot: Snapshot) -> Result<TurnAdvance, MatchError> {
        if !self.is_running() {
            return Err(MatchError::NotRunning);
        }

        self.snapshots.push(snapshot);
        self.turn += 1;

        if self.turn == self.seats {
            self.phase = MatchPhase::Idle;
            return Ok(TurnAdvance::Finished);
        }
        Ok(TurnAdvance::Next {
            speaker: seat_for_turn(self.direction, self.turn, self.seats),
        })
    }

    /// Stop a running match early. Returns whether one was running.
    pub fn terminate(&mut self) -> bool {
        let was_running = self.is_running();
        self.reset();
        was_running
    }

    /// Return to the pristine pre-match state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// History joined with [`HISTORY_SEPARATOR`].
    pub fn history_line(&self) -> String {
        self.snapshots
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(HISTORY_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snap(text: &str, lang: &str) -> Snapshot {
        Snapshot { text: text.to_string(), lang: lang.to_string() }
    }

    fn running(seats: usize, direction: Direction) -> Match {
        let mut m = Match::new();
        m.start(seats, direction, 1).unwrap();
        m
    }

    #[test]
    fn test_new_match_is_idle() {
        let m = Match::new();
        assert_eq!(m.phase(), MatchPhase::Idle);
        assert_eq!(m.speaker_seat(), None);
        assert!(m.history().is_empty());
    }

    #[test]
    fn test_start_requires_minimum() {
        let mut m = Match::new();
        assert_eq!(
            m.start(3, Direction::Forward, 4),
            Err(MatchError::NotEnoughPlayers { required: 4, present: 3 })
        );
        assert!(!m.is_running());
        assert!(m.start(4, Direction::Forward, 4).is_ok());
    }

    #[test]
    fn test_second_start_rejected() {
        let mut m = running(4, Direction::Forward);
        assert_eq!(m.start(4, Direction::Forward, 1), Err(MatchError::AlreadyRunning));
    }

    #[test]
    fn test_compose_seeds_then_appends() {
        let mut m = running(3, Direction::Forward);
        assert_eq!(m.compose("ciao"), "ciao");
        m.record(snap("hello", "en")).unwrap();
        assert_eq!(m.compose("world"), "hello world");
        assert_eq!(m.compose("  "), "hello");
    }

    #[test]
    fn test_wrong_speaker_rejected() {
        let m = running(4, Direction::Forward);
        assert_eq!(m.check_turn(1, "hi", 30), Err(MatchError::NotYourTurn));
        assert!(m.check_turn(0, "hi", 30).is_ok());
    }

    #[test]
    fn test_phrase_limit_is_exclusive() {
        let m = running(4, Direction::Forward);
        let ok = "a".repeat(29);
        let long = "a".repeat(30);
        assert!(m.check_turn(0, &ok, 30).is_ok());
        assert_eq!(
            m.check_turn(0, &long, 30),
            Err(MatchError::PhraseTooLong { len: 30, max: 30 })
        );
    }

    #[test]
    fn test_not_running_rejects_speech() {
        let m = Match::new();
        assert_eq!(m.check_turn(0, "hi", 30), Err(MatchError::NotRunning));
    }

    #[test]
    fn test_full_match_reversed() {
        let mut m = running(4, Direction::Reversed);
        let mut speakers = vec![m.speaker_seat().unwrap()];
        for word in ["a", "b", "c"] {
            match m.record(snap(word, "en")).unwrap() {
                TurnAdvance::Next { speaker } => speakers.push(speaker),
                TurnAdvance::Finished => panic!("finished early"),
            }
        }
        assert_eq!(speakers, vec![0, 3, 2, 1]);
        assert_eq!(m.record(snap("d", "en")).unwrap(), TurnAdvance::Finished);
        assert!(!m.is_running());
        assert_eq!(m.history_line(), "a -> b -> c -> d");
    }

    #[test]
    fn test_terminate_resets() {
        let mut m = running(4, Direction::Forward);
        m.record(snap("x", "en")).unwrap();
        assert!(m.terminate());
        assert!(!m.terminate());
        assert!(m.history().is_empty());
        assert_eq!(m.turn(), 0);
    }

    proptest! {
        #[test]
        fn prop_turn_stays_in_range(seats in 1usize..12, reversed in any::<bool>(), bogus in 0usize..12) {
            let direction = if reversed { Direction::Reversed } else { Direction::Forward };
            let mut m = running(seats, direction);
            for _ in 0..seats {
                prop_assert!(m.is_running());
                prop_assert!(m.turn() < seats);
                let speaker = m.speaker_seat().unwrap();
                prop_assert!(speaker < seats);

                if bogus != speaker {
                    let before = m.history().len();
                    prop_assert_eq!(m.check_turn(bogus, "x", 30), Err(MatchError::NotYourTurn));
                    prop_assert_eq!(m.history().len(), before);
                }
                m.record(snap("w", "en")).unwrap();
            }
            prop_assert!(!m.is_running());
            prop_assert_eq!(m.turn(), seats);
            prop_assert_eq!(m.history().len(), seats);
        }
    }
}
