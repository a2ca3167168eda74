//! Game Logic Module
//!
//! Rules of a broken-telephone match. Synchronous and free of I/O.
//!
//! ## Module Structure
//!
//! - `turn_order`: Forward and reversed speaking order
//! - `roster`: Seats and the overflow queue
//! - `relay`: Match state machine

pub mod relay;
pub mod roster;
pub mod turn_order;

// Re-export key types
pub use relay::{Match, MatchError, MatchPhase, Snapshot, TurnAdvance};
pub use roster::{Admission, QueueReason, Roster};
pub use turn_order::Direction;
