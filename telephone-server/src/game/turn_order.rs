//! Turn Order
//!
//! Maps a turn number onto a seat in the lobby's member list. The member
//! list itself is never reordered; a reversed match is expressed purely as an
//! index transform with the host pinned to turn 0.

use serde::{Deserialize, Serialize};

/// Direction the phrase travels around the lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Host first, then the remaining members from last joined to first.
    Reversed,
    /// Join order.
    Forward,
}

impl Direction {
    /// Decode the `start-match` argument (`0` = reversed, `1` = forward).
    pub fn from_wire(flag: &str) -> Option<Self> {
        match flag {
            "0" => Some(Direction::Reversed),
            "1" => Some(Direction::Forward),
            _ => None,
        }
    }

    /// Encode as the `start-match` argument.
    pub fn as_wire(self) -> &'static str {
        match self {
            Direction::Reversed => "0",
            Direction::Forward => "1",
        }
    }
}

/// Seat index of the player who speaks on `turn`.
///
/// With `Reversed`, seat 0 (the host) still opens the match and the others
/// follow from the back: `[h, a, b, c]` plays as `h, c, b, a`.
///
/// `turn` must be below `seats`.
pub fn seat_for_turn(direction: Direction, turn: usize, seats: usize) -> usize {
    debug_assert!(turn < seats, "turn {turn} out of range for {seats} seats");
    match direction {
        Direction::Forward => turn,
        Direction::Reversed if turn == 0 => 0,
        Direction::Reversed => seats - turn,
    }
}

/// Seat index of whoever receives the phrase after `turn`.
///
/// Wraps back to the opening speaker after the last turn so the final
/// snapshot is rendered in the first speaker's language.
pub fn listener_for_turn(direction: Direction, turn: usize, seats: usize) -> usize {
    seat_for_turn(direction, (turn + 1) % seats, seats)
}

/// Full speaking order for a match of `seats` players.
pub fn speaking_order(direction: Direction, seats: usize) -> Vec<usize> {
    (0..seats).map(|turn| seat_for_turn(direction, turn, seats)).collect()
}
