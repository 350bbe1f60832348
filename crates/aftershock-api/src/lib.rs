//! Occurrence model for aftershock
//!
//! This crate defines what flows between inspectors, the orchestrator and
//! exploration policies:
//! - Events (intercepted occurrences reported by an entity)
//! - Actions (scheduling decisions for those occurrences)
//! - Traces (the ordered decisions of one run)
//! - JSON transcoding for the opaque occurrence class

mod action;
mod event;
mod json;
mod trace;

pub use action::*;
pub use event::*;
pub use json::*;
pub use trace::*;

use thiserror::Error;

/// Validation and transcoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    #[error("Unknown JSON class: {0}")]
    UnknownClass(String),

    #[error("Event id not set")]
    MissingEventId,

    #[error("Action id not set")]
    MissingActionId,

    #[error("Accept action has no event tied")]
    AcceptWithoutEvent,

    #[error("Kill action must not carry an event")]
    KillWithEvent,

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

pub type SchemaResult<T> = Result<T, SchemaError>;
