//! The orchestration loop

use aftershock_api::{Action, ActionKind, Trace};
use aftershock_ipc::{EntitySession, ProtocolError};
use aftershock_policy::ExplorePolicy;
use aftershock_util::{EntityId, EventId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult};

/// Feeds occurrences to the policy, routes its decisions back to the
/// originating sessions and records every decision in the trace.
pub struct Orchestrator {
    policy: Box<dyn ExplorePolicy>,
    action_rx: mpsc::Receiver<Action>,
    ready_rx: mpsc::Receiver<Arc<EntitySession>>,
    decision_timeout: Option<Duration>,
    pending: HashMap<EventId, Arc<EntitySession>>,
    trace: Trace,
}

/// Control of a spawned orchestrator
pub struct OrchestratorHandle {
    end_tx: oneshot::Sender<()>,
    trace_rx: oneshot::Receiver<Trace>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Signal end-of-run and wait for the trace
    pub async fn finish(self) -> CoreResult<Trace> {
        if self.end_tx.send(()).is_err() {
            debug!("Orchestrator already stopped");
        }
        let trace = self.trace_rx.await.map_err(|_| CoreError::TraceUnavailable)?;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Orchestrator task failed");
        }
        Ok(trace)
    }
}

impl Orchestrator {
    /// Takes the policy's decision channel; `policy` must already be initialized
    pub fn new(
        mut policy: Box<dyn ExplorePolicy>,
        ready_rx: mpsc::Receiver<Arc<EntitySession>>,
        decision_timeout: Option<Duration>,
    ) -> CoreResult<Self> {
        let action_rx = policy
            .take_action_receiver()
            .ok_or(CoreError::DecisionChannelTaken)?;

        Ok(Self {
            policy,
            action_rx,
            ready_rx,
            decision_timeout,
            pending: HashMap::new(),
            trace: Trace::new(),
        })
    }

    pub fn spawn(self) -> OrchestratorHandle {
        let (end_tx, end_rx) = oneshot::channel();
        let (trace_tx, trace_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(end_rx, trace_tx));
        OrchestratorHandle {
            end_tx,
            trace_rx,
            task,
        }
    }

    /// Run until `end_rx` fires, then drain outstanding decisions and publish
    /// the trace on `trace_tx`.
    pub async fn run(mut self, mut end_rx: oneshot::Receiver<()>, trace_tx: oneshot::Sender<Trace>) {
        info!(policy = self.policy.name(), "Orchestrator started");

        loop {
            tokio::select! {
                Some(session) = self.ready_rx.recv() => {
                    self.on_ready(session).await;
                }
                Some(action) = self.action_rx.recv() => {
                    self.on_decision(action).await;
                }
                _ = &mut end_rx => {
                    debug!("End of run signalled");
                    break;
                }
            }
        }

        self.drain().await;

        info!(decisions = self.trace.len(), "Orchestrator finished");
        let trace = std::mem::take(&mut self.trace);
        if trace_tx.send(trace).is_err() {
            warn!("Trace consumer gone, dropping trace");
        }
    }

    async fn on_ready(&mut self, session: Arc<EntitySession>) {
        let Some(event) = session.next_event().await else {
            debug!(entity_id = %session.entity_label(), "Session closed before its occurrence was read");
            return;
        };

        let entity_id = event.entity_id.clone();
        debug!(entity_id = %entity_id, event = %event, "Queueing occurrence");
        self.pending.insert(event.event_id.clone(), session);
        self.policy.queue_next_event(&entity_id, event);
    }

    async fn on_decision(&mut self, action: Action) {
        let session = action
            .event
            .as_ref()
            .and_then(|event| self.pending.remove(&event.event_id));

        if action.kind == ActionKind::Kill {
            info!(entity_id = %action.entity_id, "Fault decision recorded");
        } else if action.local {
            debug!(entity_id = %action.entity_id, "Local decision recorded");
        } else {
            match session {
                Some(session) => {
                    if let Err(e) = session.deliver(action.clone()).await {
                        warn!(
                            entity_id = %action.entity_id,
                            error = %e,
                            "Failed to deliver decision"
                        );
                    }
                }
                None => {
                    warn!(entity_id = %action.entity_id, "No pending occurrence for decision");
                }
            }
        }

        debug!(entity_id = %action.entity_id, action = %action, "Decision recorded");
        self.trace.push(action);
    }

    /// Deliver and record decisions for occurrences already queued, bounded
    /// by the decision deadline. Occurrences of closed sessions are not
    /// waited for.
    async fn drain(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|_, session| !session.is_closed());
        if self.pending.len() < before {
            debug!(
                dropped = before - self.pending.len(),
                "Not waiting for occurrences of closed sessions"
            );
        }
        if self.pending.is_empty() {
            return;
        }
        info!(outstanding = self.pending.len(), "Draining outstanding decisions");

        let deadline = self.decision_timeout.map(|t| Instant::now() + t);
        while !self.pending.is_empty() {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.action_rx.recv()).await {
                        Ok(next) => next,
                        Err(_) => break,
                    }
                }
                None => self.action_rx.recv().await,
            };

            match next {
                Some(action) => self.on_decision(action).await,
                None => break,
            }
        }

        for session in self.pending.values() {
            let e = ProtocolError::UnresolvedDecision {
                entity_id: EntityId::new(session.entity_label()),
                timeout: self.decision_timeout.unwrap_or_default(),
            };
            warn!(entity_id = %session.entity_label(), error = %e, "Occurrence left undecided");
        }
        self.pending.clear();
    }
}
