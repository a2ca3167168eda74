//! Lobby Roster
//!
//! Seated members plus the FIFO overflow queue. Pure bookkeeping: the lobby
//! layer decides what to announce, this module only decides who sits where.
//!
//! Invariants:
//! - `members[0]` is the host for the roster's whole life.
//! - `members.len() <= capacity`.
//! - An occupant is never both seated and queued.

use std::collections::VecDeque;
use std::time::Instant;

use crate::core::ids::SessionId;

/// Anything that can take a seat in a roster.
pub trait Occupant: Clone {
    /// Stable identity used for membership checks.
    fn occupant_id(&self) -> SessionId;
}

impl Occupant for SessionId {
    fn occupant_id(&self) -> SessionId {
        *self
    }
}

/// Why a player is waiting instead of seated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueReason {
    /// Every seat is taken.
    Full,
    /// A match is being played.
    MatchRunning,
}

/// A player waiting for a seat.
#[derive(Debug, Clone)]
pub struct QueueEntry<T> {
    /// The waiting player.
    pub occupant: T,
    /// Why they were queued.
    pub reason: QueueReason,
    /// When they were queued.
    pub queued_at: Instant,
}

/// Result of asking for a seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Given a seat.
    Seated,
    /// Appended to the queue; `position` is 1-based.
    Queued {
        /// Why no seat was given.
        reason: QueueReason,
        /// Place in line.
        position: usize,
    },
    /// Already seated or queued here.
    AlreadyPresent,
}

/// Where a departing occupant was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vacated {
    /// Left a seat.
    Seat,
    /// Left the queue.
    Queue,
}

/// Members and queue of one lobby.
#[derive(Debug)]
pub struct Roster<T> {
    capacity: usize,
    members: Vec<T>,
    queue: VecDeque<QueueEntry<T>>,
}

impl<T: Occupant> Roster<T> {
    /// Create a roster with `host` in seat 0.
    pub fn new(host: T, capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            members: vec![host],
            queue: VecDeque::new(),
        }
    }

    /// Maximum seated members.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seat 0.
    pub fn host(&self) -> &T {
        &self.members[0]
    }

    /// Seated members in join order.
    pub fn members(&self) -> &[T] {
        &self.members
    }

    /// Number of seated members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Number of queued players.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Queued players, front first.
    pub fn queued(&self) -> impl Iterator<Item = &T> {
        self.queue.iter().map(|e| &e.occupant)
    }

    /// Is there a free seat.
    pub fn has_free_seat(&self) -> bool {
        self.members.len() < self.capacity
    }

    /// Seat index of `id`, if seated.
    pub fn seat_of(&self, id: SessionId) -> Option<usize> {
        self.members.iter().position(|m| m.occupant_id() == id)
    }

    /// Whether `id` is the host.
    pub fn is_host(&self, id: SessionId) -> bool {
        self.host().occupant_id() == id
    }

    /// Whether `id` is waiting in the queue.
    pub fn is_queued(&self, id: SessionId) -> bool {
        self.queue.iter().any(|e| e.occupant.occupant_id() == id)
    }

    /// Seat `occupant`, or queue them when the lobby is full or mid-match.
    pub fn admit(&mut self, occupant: T, match_running: bool) -> Admission {
        let id = occupant.occupant_id();
        if self.seat_of(id).is_some() || self.is_queued(id) {
            return Admission::AlreadyPresent;
        }

        let reason = if match_running {
            QueueReason::MatchRunning
        } else if self.members.len() + 1 > self.capacity {
            QueueReason::Full
        } else {
            self.members.push(occupant);
            return Admission::Seated;
        };

        self.queue.push_back(QueueEntry {
            occupant,
            reason,
            queued_at: Instant::now(),
        });
        Admission::Queued {
            reason,
            position: self.queue.len(),
        }
    }

    /// Remove a non-host member or a queued player.
    ///
    /// The host can only leave through [`Roster::dissolve`]; asking to remove
    /// the host returns `None` and changes nothing.
    pub fn remove(&mut self, id: SessionId) -> Option<(T, Vacated)> {
        if let Some(seat) = self.seat_of(id) {
            if seat == 0 {
                return None;
            }
            return Some((self.members.remove(seat), Vacated::Seat));
        }
        let index = self.queue.iter().position(|e| e.occupant.occupant_id() == id)?;
        self.queue
            .remove(index)
            .map(|entry| (entry.occupant, Vacated::Queue))
    }

    /// Move the front of the queue into a free seat, if there is one.
    pub fn promote_next(&mut self) -> Option<QueueEntry<T>> {
        if !self.has_free_seat() {
            return None;
        }
        let entry = self.queue.pop_front()?;
        self.members.push(entry.occupant.clone());
        Some(entry)
    }

    /// Promote queued players until seats or queue run out.
    pub fn drain_queue(&mut self) -> Vec<QueueEntry<T>> {
        let mut promoted = Vec::new();
        while let Some(entry) = self.promote_next() {
            promoted.push(entry);
        }
        promoted
    }

    /// Empty the roster, returning `(members, queued)`.
    pub fn dissolve(&mut self) -> (Vec<T>, Vec<T>) {
        let members = std::mem::take(&mut self.members);
        let queued = self.queue.drain(..).map(|e| e.occupant).collect();
        (members, queued)
    }

    /// True once dissolved.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
