//! Data models for the polls API.
//!
//! - `Poll`, `Choice`: polls as returned by list, detail and results endpoints
//! - `Vote`: the record created by a successful vote
//! - `NewPoll`: a validated poll ready to submit

pub mod poll;

pub use poll::{Choice, NewChoice, NewPoll, Poll, ValidationError, Vote};
