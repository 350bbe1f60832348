//! Inspector protocol for aftershock
//!
//! Provides:
//! - TCP server accepting inspector connections
//! - Length-framed protobuf messages (4-byte little-endian length prefix)
//! - One session state machine per connection (receiver, sender, driver)
//! - Translation between wire messages and occurrences/decisions
//! - A client for Rust inspectors and tests

mod client;
mod framing;
mod messages;
mod server;
mod session;
mod translate;

pub use client::*;
pub use framing::*;
pub use messages::*;
pub use server::*;
pub use session::*;
pub use translate::*;

use aftershock_api::SchemaError;
use aftershock_util::{EntityId, ErrorScope};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind inspector listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unexpected request type: {0}")]
    UnexpectedRequestType(i32),

    #[error("Unsupported decision: {0}")]
    UnsupportedAction(String),

    #[error("No decision for entity {entity_id} within {timeout:?}")]
    UnresolvedDecision {
        entity_id: EntityId,
        timeout: Duration,
    },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl ProtocolError {
    /// Only a listener that cannot bind ends the process; everything else
    /// tears down one session.
    pub fn scope(&self) -> ErrorScope {
        match self {
            ProtocolError::Bind { .. } => ErrorScope::Process,
            _ => ErrorScope::Session,
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
