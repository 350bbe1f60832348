//! Inspector client implementation

use aftershock_api::PlatformMetadata;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::inspector_msg_req::Event as WireEvent;
use crate::{
    java_fields_from_platform, ClientCodec, InspectorMsgReq, InspectorMsgRsp, ProtocolError,
    ProtocolResult,
};

/// Inspector side of the protocol: reports occurrences of one entity and
/// waits for the orchestrator to release each of them.
pub struct InspectorClient {
    framed: Framed<TcpStream, ClientCodec>,
    process_id: String,
    next_msg_id: i32,
}

impl InspectorClient {
    /// Connect as the entity `process_id`
    pub async fn connect(addr: SocketAddr, process_id: impl Into<String>) -> ProtocolResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        Ok(Self {
            framed: Framed::new(stream, ClientCodec::new()),
            process_id: process_id.into(),
            next_msg_id: 1,
        })
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Report a function call and wait until it may proceed
    pub async fn func_call(&mut self, name: &str) -> ProtocolResult<InspectorMsgRsp> {
        self.request(WireEvent::for_call(name), None).await
    }

    /// Report a function return and wait until it may proceed
    pub async fn func_return(&mut self, name: &str) -> ProtocolResult<InspectorMsgRsp> {
        self.request(WireEvent::for_return(name), None).await
    }

    /// Report a function call with runtime metadata attached
    pub async fn func_call_with(
        &mut self,
        name: &str,
        platform: &PlatformMetadata,
    ) -> ProtocolResult<InspectorMsgRsp> {
        self.request(WireEvent::for_call(name), Some(platform)).await
    }

    /// Announce that the entity is exiting. No response follows.
    pub async fn exit(&mut self) -> ProtocolResult<()> {
        let msg_id = self.take_msg_id();
        let req = InspectorMsgReq::new_event(&self.process_id, msg_id, WireEvent::for_exit());
        self.send(req).await
    }

    /// Send a raw request
    pub async fn send(&mut self, req: InspectorMsgReq) -> ProtocolResult<()> {
        self.framed.send(req).await
    }

    /// Wait for the next response
    pub async fn recv(&mut self) -> ProtocolResult<InspectorMsgRsp> {
        match self.framed.next().await {
            Some(rsp) => rsp,
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    async fn request(
        &mut self,
        event: WireEvent,
        platform: Option<&PlatformMetadata>,
    ) -> ProtocolResult<InspectorMsgRsp> {
        let msg_id = self.take_msg_id();
        let mut req = InspectorMsgReq::new_event(&self.process_id, msg_id, event);
        if let Some(platform) = platform {
            req = req.with_java_fields(java_fields_from_platform(platform));
        }

        self.send(req).await?;
        let rsp = self.recv().await?;
        if rsp.msg_id != Some(msg_id) {
            return Err(ProtocolError::MalformedMessage(format!(
                "response for msg_id {:?}, expected {}",
                rsp.msg_id, msg_id
            )));
        }
        Ok(rsp)
    }

    fn take_msg_id(&mut self) -> i32 {
        let msg_id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        msg_id
    }
}
