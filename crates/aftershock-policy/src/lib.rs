//! Exploration policies for aftershock
//!
//! A policy receives every intercepted occurrence and publishes, possibly
//! later and in a different order, the decision letting it proceed. The
//! orchestrator only talks to the [`ExplorePolicy`] trait; strategies are
//! selected by name with [`create_policy`].

mod dumb;
mod random;
mod traits;

pub use dumb::*;
pub use random::*;
pub use traits::*;

use aftershock_api::{Action, Event};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the shared decision channel
pub const DECISION_CHANNEL_CAPACITY: usize = 64;

/// Create a policy by name
pub fn create_policy(name: &str) -> PolicyResult<Box<dyn ExplorePolicy>> {
    match name {
        RANDOM_POLICY_NAME => Ok(Box::new(RandomPolicy::new())),
        DUMB_POLICY_NAME => Ok(Box::new(DumbPolicy::new())),
        other => Err(PolicyError::UnknownPolicy(other.to_string())),
    }
}

/// Spawn the producer that accepts `event` after `delay`
fn dispatch_accept(action_tx: mpsc::Sender<Action>, event: Event, delay: Duration) {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let action = match event.make_accept_action() {
            Ok(action) => action,
            Err(e) => {
                warn!(entity_id = %event.entity_id, error = %e, "Cannot build accept decision");
                return;
            }
        };

        debug!(
            entity_id = %action.entity_id,
            event_id = %event.event_id,
            delay_ms = delay.as_millis() as u64,
            "Decision ready"
        );
        if action_tx.send(action).await.is_err() {
            debug!(entity_id = %event.entity_id, "Decision channel closed, dropping decision");
        }
    });
}
