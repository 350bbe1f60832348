//! Exploration policy trait

use aftershock_api::{Action, Event};
use aftershock_store::{HistoryStorage, StoreError};
use aftershock_util::EntityId;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from policy setup
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid policy configuration: {0}")]
    Configuration(String),

    #[error("Unknown explore policy: {0}")]
    UnknownPolicy(String),

    #[error("History storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// Strategy deciding when intercepted occurrences proceed.
///
/// Decisions for every entity are published on one shared channel, taken
/// once by the orchestrator. Implementations must keep
/// [`ExplorePolicy::queue_next_event`] non-blocking.
pub trait ExplorePolicy: Send + Sync {
    /// One-time setup from free-form parameters. Fails fast on bad values.
    fn init(
        &mut self,
        storage: Arc<dyn HistoryStorage>,
        params: &Map<String, Value>,
    ) -> PolicyResult<()>;

    /// Stable strategy identifier
    fn name(&self) -> &'static str;

    /// Hand an occurrence over; its decision shows up on the action channel
    fn queue_next_event(&self, entity_id: &EntityId, event: Event);

    /// The shared decision channel. Returns None once taken.
    fn take_action_receiver(&mut self) -> Option<mpsc::Receiver<Action>>;
}
