//! Per-connection entity sessions

use aftershock_api::{Action, Event};
use aftershock_util::{ConnectionId, EntityId};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, Mutex};

use crate::{ProtocolError, ProtocolResult};

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no occurrence seen yet
    Unidentified,
    /// Entity id fixed by the first occurrence
    Active(EntityId),
    /// End of stream, END sent or protocol error; no further traffic
    Closing,
}

/// Runtime state of one connected entity, shared between the protocol
/// engine and the orchestrator.
///
/// Holds at most one outstanding occurrence: the driver publishes an event,
/// the orchestrator takes it with [`EntitySession::next_event`] and later
/// answers with [`EntitySession::deliver`].
#[derive(Debug)]
pub struct EntitySession {
    conn_id: ConnectionId,
    entity_id: OnceLock<EntityId>,
    event_rx: Mutex<mpsc::Receiver<Event>>,
    action_tx: mpsc::Sender<Action>,
}

/// The driver's ends of a session's channels
#[derive(Debug)]
pub struct SessionEndpoints {
    pub event_tx: mpsc::Sender<Event>,
    pub action_rx: mpsc::Receiver<Action>,
}

impl EntitySession {
    pub fn new(conn_id: ConnectionId) -> (Arc<Self>, SessionEndpoints) {
        let (event_tx, event_rx) = mpsc::channel(1);
        let (action_tx, action_rx) = mpsc::channel(1);

        let session = Arc::new(Self {
            conn_id,
            entity_id: OnceLock::new(),
            event_rx: Mutex::new(event_rx),
            action_tx,
        });
        (session, SessionEndpoints { event_tx, action_rx })
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Entity id, once the first occurrence has arrived
    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity_id.get()
    }

    /// Entity id for logging
    pub fn entity_label(&self) -> &str {
        self.entity_id().map(EntityId::as_str).unwrap_or("unidentified")
    }

    /// Fix the entity id. The first id wins; later calls return it unchanged.
    pub fn identify(&self, entity_id: EntityId) -> &EntityId {
        self.entity_id.get_or_init(|| entity_id)
    }

    /// Take the outstanding occurrence. None once the driver is gone.
    pub async fn next_event(&self) -> Option<Event> {
        self.event_rx.lock().await.recv().await
    }

    /// Hand a decision back to the driver
    pub async fn deliver(&self, action: Action) -> ProtocolResult<()> {
        self.action_tx
            .send(action)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Whether the driver has stopped accepting decisions
    pub fn is_closed(&self) -> bool {
        self.action_tx.is_closed()
    }
}
