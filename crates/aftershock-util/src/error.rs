//! Error scope classification shared by all aftershock crates

use std::fmt;

/// How far a failure is allowed to propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Tears down the affected entity session only
    Session,
    /// Aborts the current run, before any workload executes
    Process,
}

impl ErrorScope {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorScope::Process)
    }
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Session => write!(f, "session"),
            ErrorScope::Process => write!(f, "process"),
        }
    }
}
