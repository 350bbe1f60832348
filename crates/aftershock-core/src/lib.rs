//! Orchestrator and workload runner for aftershock
//!
//! This crate ties a run together:
//! - The orchestrator loop (occurrences to the policy, decisions back to
//!   entity sessions, the ordered trace)
//! - The run context (storage, working and materials directories)
//! - The workload runner executing the experiment's scripts

mod context;
mod orchestrator;
mod workload;

pub use context::*;
pub use orchestrator::*;
pub use workload::*;

use thiserror::Error;

/// Core errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Policy decision channel already taken")]
    DecisionChannelTaken,

    #[error("Orchestrator stopped without publishing a trace")]
    TraceUnavailable,

    #[error("Failed to execute script {script}: {source}")]
    Script {
        script: String,
        #[source]
        source: std::io::Error,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;
