//! Inspector server implementation

use aftershock_util::{ConnectionId, EntityId};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::inspector_msg_req::event;
use crate::{
    event_type, request_type, EntitySession, EventTranslator, InspectorMsgReq, InspectorMsgRsp,
    ProtocolError, ProtocolResult, ServerCodec, SessionEndpoints, SessionState,
};

/// Capacity of the ready-session channel toward the orchestrator
pub const READY_CHANNEL_CAPACITY: usize = 1;

/// Accepts inspector connections and runs one session per connection
pub struct InspectorServer {
    listener: TcpListener,
    translator: EventTranslator,
}

impl InspectorServer {
    /// Bind the listener. Failing to bind is fatal for the run.
    pub async fn bind(addr: SocketAddr, translator: EventTranslator) -> ProtocolResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProtocolError::Bind { addr, source })?;

        info!(
            addr = %listener.local_addr()?,
            emulate_rest = translator.emulates_rest(),
            "Inspector server listening"
        );

        Ok(Self {
            listener,
            translator,
        })
    }

    pub fn local_addr(&self) -> ProtocolResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections in a loop.
    ///
    /// Every session with an outstanding occurrence is announced on
    /// `ready_tx`. Once its receiver is dropped, pending and future requests
    /// are answered with END.
    pub async fn run(
        self,
        ready_tx: mpsc::Sender<Arc<EntitySession>>,
        decision_timeout: Option<Duration>,
    ) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let conn_id = ConnectionId::new();
                    info!(conn_id = %conn_id, peer = %peer, "Inspector connected");

                    self.handle_connection(stream, conn_id, ready_tx.clone(), decision_timeout);
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(
        &self,
        stream: TcpStream,
        conn_id: ConnectionId,
        ready_tx: mpsc::Sender<Arc<EntitySession>>,
        decision_timeout: Option<Duration>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(conn_id = %conn_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let (session, endpoints) = EntitySession::new(conn_id);
        let (req_tx, req_rx) = mpsc::channel::<InspectorMsgReq>(1);
        let (rsp_tx, rsp_rx) = mpsc::channel::<InspectorMsgRsp>(1);

        let receiver = tokio::spawn(receive_requests(
            FramedRead::new(read_half, ServerCodec::new()),
            req_tx,
            session.clone(),
        ));

        tokio::spawn(send_responses(
            FramedWrite::new(write_half, ServerCodec::new()),
            rsp_rx,
            session.clone(),
        ));

        let driver = SessionDriver {
            session,
            endpoints,
            req_rx,
            rsp_tx,
            ready_tx,
            translator: self.translator,
            decision_timeout,
            current_msg_id: None,
        };
        tokio::spawn(driver.run(receiver));
    }
}

async fn receive_requests(
    mut reader: FramedRead<OwnedReadHalf, ServerCodec>,
    req_tx: mpsc::Sender<InspectorMsgReq>,
    session: Arc<EntitySession>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(req) => {
                if req_tx.send(req).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(
                    conn_id = %session.conn_id(),
                    entity_id = %session.entity_label(),
                    error = %e,
                    "Failed to receive request"
                );
                return;
            }
        }
    }
    debug!(
        conn_id = %session.conn_id(),
        entity_id = %session.entity_label(),
        "Inspector disconnected (EOF)"
    );
}

async fn send_responses(
    mut writer: FramedWrite<OwnedWriteHalf, ServerCodec>,
    mut rsp_rx: mpsc::Receiver<InspectorMsgRsp>,
    session: Arc<EntitySession>,
) {
    while let Some(rsp) = rsp_rx.recv().await {
        let is_final = rsp.is_end() || rsp.is_error();
        if let Err(e) = writer.send(rsp).await {
            warn!(
                conn_id = %session.conn_id(),
                entity_id = %session.entity_label(),
                error = %e,
                "Failed to send response"
            );
            return;
        }
        if is_final {
            debug!(entity_id = %session.entity_label(), "Final response sent, sender stopping");
            return;
        }
    }
}

enum Outcome {
    Decided(aftershock_api::Action),
    OrchestratorGone,
}

struct SessionDriver {
    session: Arc<EntitySession>,
    endpoints: SessionEndpoints,
    req_rx: mpsc::Receiver<InspectorMsgReq>,
    rsp_tx: mpsc::Sender<InspectorMsgRsp>,
    ready_tx: mpsc::Sender<Arc<EntitySession>>,
    translator: EventTranslator,
    decision_timeout: Option<Duration>,
    /// Request currently being handled, answered with ERROR if it fails
    current_msg_id: Option<i32>,
}

impl SessionDriver {
    async fn run(mut self, receiver: JoinHandle<()>) {
        let result = self.drive().await;
        receiver.abort();

        if let Err(e) = &result
            && !matches!(e, ProtocolError::ConnectionClosed)
            && let Some(msg_id) = self.current_msg_id
        {
            let _ = self
                .rsp_tx
                .send(InspectorMsgRsp::error(msg_id, e.to_string()))
                .await;
        }

        let conn_id = self.session.conn_id();
        let entity_id = self.session.entity_label().to_string();
        match result {
            Ok(()) => {
                info!(conn_id = %conn_id, entity_id = %entity_id, "Session closed");
            }
            Err(e @ ProtocolError::UnresolvedDecision { .. }) => {
                warn!(
                    conn_id = %conn_id,
                    entity_id = %entity_id,
                    error = %e,
                    "Entity run incomplete"
                );
            }
            Err(e) => {
                warn!(
                    conn_id = %conn_id,
                    entity_id = %entity_id,
                    scope = %e.scope(),
                    error = %e,
                    "Session closed on protocol error"
                );
            }
        }
    }

    async fn drive(&mut self) -> ProtocolResult<()> {
        let mut state = SessionState::Unidentified;

        while let Some(req) = self.req_rx.recv().await {
            self.current_msg_id = req.msg_id;
            request_type(&req)?;

            if event_type(&req)? == event::Type::Exit {
                info!(entity_id = %self.session.entity_label(), "Entity is exiting");
                continue;
            }

            let msg_id = req
                .msg_id
                .ok_or_else(|| ProtocolError::MalformedMessage("request without msg_id".into()))?;

            let entity_id = match &state {
                SessionState::Active(id) => id.clone(),
                _ => {
                    let process_id = req.process_id.clone().ok_or_else(|| {
                        ProtocolError::MalformedMessage("first event without process_id".into())
                    })?;
                    let id = self.session.identify(EntityId::new(process_id)).clone();
                    info!(conn_id = %self.session.conn_id(), entity_id = %id, "Entity identified");
                    state = SessionState::Active(id.clone());
                    id
                }
            };

            let event = self.translator.make_event(&entity_id, &req)?;
            debug!(entity_id = %entity_id, msg_id, event = %event, "Occurrence received");
            self.endpoints
                .event_tx
                .send(event)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;

            match self.await_decision(&entity_id).await? {
                Outcome::Decided(action) => {
                    let rsp = self.translator.make_response(msg_id, &action)?;
                    self.rsp_tx
                        .send(rsp)
                        .await
                        .map_err(|_| ProtocolError::ConnectionClosed)?;
                    debug!(entity_id = %entity_id, msg_id, "Occurrence released");
                    self.current_msg_id = None;
                }
                Outcome::OrchestratorGone => {
                    info!(entity_id = %entity_id, msg_id, "Orchestrator gone, sending END");
                    let _ = self.rsp_tx.send(InspectorMsgRsp::end(msg_id)).await;
                    self.current_msg_id = None;
                    state = SessionState::Closing;
                    break;
                }
            }
        }

        debug!(entity_id = %self.session.entity_label(), state = ?state, "Driver stopping");
        Ok(())
    }

    /// Announce the session and wait for its decision, within the deadline
    async fn await_decision(&mut self, entity_id: &EntityId) -> ProtocolResult<Outcome> {
        let session = self.session.clone();
        let ready_tx = &self.ready_tx;
        let action_rx = &mut self.endpoints.action_rx;

        let wait = async move {
            if ready_tx.send(session).await.is_err() {
                return Outcome::OrchestratorGone;
            }
            tokio::select! {
                action = action_rx.recv() => match action {
                    Some(action) => Outcome::Decided(action),
                    None => Outcome::OrchestratorGone,
                },
                _ = ready_tx.closed() => Outcome::OrchestratorGone,
            }
        };

        with_deadline(self.decision_timeout, wait)
            .await
            .ok_or_else(|| ProtocolError::UnresolvedDecision {
                entity_id: entity_id.clone(),
                timeout: self.decision_timeout.unwrap_or_default(),
            })
    }
}

async fn with_deadline<T>(deadline: Option<Duration>, fut: impl Future<Output = T>) -> Option<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inspector_msg_req, inspector_msg_rsp, InspectorClient};
    use aftershock_api::make_fault_injection_action;

    async fn start(
        decision_timeout: Option<Duration>,
    ) -> (SocketAddr, mpsc::Receiver<Arc<EntitySession>>) {
        let server = InspectorServer::bind("127.0.0.1:0".parse().unwrap(), EventTranslator::new(false))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (ready_tx, ready_rx) = mpsc::channel(READY_CHANNEL_CAPACITY);
        tokio::spawn(server.run(ready_tx, decision_timeout));
        (addr, ready_rx)
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let server = InspectorServer::bind("127.0.0.1:0".parse().unwrap(), EventTranslator::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let err = InspectorServer::bind(addr, EventTranslator::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProtocolError::Bind { .. }));
        assert!(err.scope().is_fatal());
    }

    #[tokio::test]
    async fn test_accept_round_trip() {
        let (addr, mut ready_rx) = start(Some(Duration::from_secs(5))).await;

        let orchestrator = tokio::spawn(async move {
            let session = ready_rx.recv().await.unwrap();
            let event = session.next_event().await.unwrap();
            assert_eq!(session.entity_id().unwrap().as_str(), "zk1");
            session.deliver(event.make_accept_action().unwrap()).await.unwrap();
            event
        });

        let mut client = InspectorClient::connect(addr, "zk1").await.unwrap();
        let rsp = client.func_call("foo").await.unwrap();
        assert_eq!(rsp.result(), Some(inspector_msg_rsp::Res::Ack));

        let event = orchestrator.await.unwrap();
        assert_eq!(event.func_name(), Some("foo"));
    }

    #[tokio::test]
    async fn test_end_when_orchestrator_gone() {
        let (addr, ready_rx) = start(Some(Duration::from_secs(5))).await;
        drop(ready_rx);

        let mut client = InspectorClient::connect(addr, "zk1").await.unwrap();
        let rsp = client.func_call("foo").await.unwrap();
        assert!(rsp.is_end());
        assert!(matches!(client.recv().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_unsupported_decision_is_answered_with_error() {
        let (addr, mut ready_rx) = start(Some(Duration::from_secs(5))).await;

        tokio::spawn(async move {
            let session = ready_rx.recv().await.unwrap();
            let event = session.next_event().await.unwrap();
            session
                .deliver(make_fault_injection_action(event.entity_id))
                .await
                .unwrap();
            // keep the ready channel open
            let _ = ready_rx.recv().await;
        });

        let mut client = InspectorClient::connect(addr, "zk1").await.unwrap();
        let rsp = client.func_call("foo").await.unwrap();
        assert_eq!(rsp.result(), Some(inspector_msg_rsp::Res::Error));
        assert!(rsp.error_message.unwrap().contains("Unsupported"));
        assert!(matches!(client.recv().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_unresolved_decision_closes_session() {
        let (addr, mut ready_rx) = start(Some(Duration::from_millis(100))).await;

        let orchestrator = tokio::spawn(async move {
            let session = ready_rx.recv().await.unwrap();
            let _event = session.next_event().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            session.is_closed()
        });

        let mut client = InspectorClient::connect(addr, "zk1").await.unwrap();
        let rsp = client.func_call("foo").await.unwrap();
        assert_eq!(rsp.result(), Some(inspector_msg_rsp::Res::Error));
        assert!(matches!(client.recv().await, Err(ProtocolError::ConnectionClosed)));
        assert!(orchestrator.await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_request_type_closes_session() {
        let (addr, _ready_rx) = start(Some(Duration::from_secs(5))).await;

        let mut client = InspectorClient::connect(addr, "zk1").await.unwrap();
        let mut req =
            InspectorMsgReq::new_event("zk1", 1, inspector_msg_req::Event::for_call("foo"));
        req.r#type = Some(7);
        client.send(req).await.unwrap();

        let rsp = client.recv().await.unwrap();
        assert!(rsp.is_error());
        assert_eq!(rsp.msg_id, Some(1));
        assert!(matches!(client.recv().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_exit_without_msg_id_keeps_session() {
        let (addr, mut ready_rx) = start(Some(Duration::from_secs(5))).await;

        tokio::spawn(async move {
            let session = ready_rx.recv().await.unwrap();
            let event = session.next_event().await.unwrap();
            session.deliver(event.make_accept_action().unwrap()).await.unwrap();
            let _ = ready_rx.recv().await;
        });

        let mut client = InspectorClient::connect(addr, "zk1").await.unwrap();
        let mut exit =
            InspectorMsgReq::new_event("zk1", 0, inspector_msg_req::Event::for_exit());
        exit.msg_id = None;
        client.send(exit).await.unwrap();

        let rsp = client.func_call("foo").await.unwrap();
        assert_eq!(rsp.result(), Some(inspector_msg_rsp::Res::Ack));
    }
}
