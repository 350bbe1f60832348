//! Length-prefixed protobuf framing

use bytes::{Bytes, BytesMut};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::{InspectorMsgReq, InspectorMsgRsp, ProtocolError};

/// Maximum frame size (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length of the little-endian frame header
pub const FRAME_HEADER_LEN: usize = 4;

/// Decodes `D` and encodes `E`, each as one length-prefixed frame
pub struct MessageCodec<D, E> {
    inner: LengthDelimitedCodec,
    _marker: PhantomData<fn() -> (D, E)>,
}

impl<D, E> MessageCodec<D, E> {
    pub fn new() -> Self {
        let inner = LengthDelimitedCodec::builder()
            .little_endian()
            .length_field_length(FRAME_HEADER_LEN)
            .max_frame_length(MAX_FRAME_SIZE)
            .new_codec();
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for MessageCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: prost::Message + Default, E> Decoder for MessageCodec<D, E> {
    type Item = D;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, ProtocolError> {
        match self.inner.decode(src)? {
            Some(frame) => Ok(Some(D::decode(frame)?)),
            None => Ok(None),
        }
    }
}

impl<D, E: prost::Message> Encoder<E> for MessageCodec<D, E> {
    type Error = ProtocolError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        self.inner.encode(Bytes::from(item.encode_to_vec()), dst)?;
        Ok(())
    }
}

/// Orchestrator side: reads requests, writes responses
pub type ServerCodec = MessageCodec<InspectorMsgReq, InspectorMsgRsp>;

/// Inspector side: reads responses, writes requests
pub type ClientCodec = MessageCodec<InspectorMsgRsp, InspectorMsgReq>;
