//! Seat layout generation and availability.
//!
//! Seats are never stored on their own; a showtime's seats are derived from its
//! capacity through the shared [`SeatLayout`].

pub mod availability;
pub mod layout;

pub use availability::{available_seats, committed_seats};
pub use layout::{LayoutError, SeatLabel, SeatLabelError, SeatLayout};
