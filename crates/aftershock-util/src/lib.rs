//! Shared utilities for aftershock
//!
//! This crate provides:
//! - ID types (EntityId, EventId, ActionId, ConnectionId)
//! - Time helpers (wall-clock now, millisecond durations)
//! - Storage directory layout and workload environment variable names
//! - Error scope classification shared by all crates

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
