//! Seam between the engine and a QUIC-like transport.
//!
//! The engine drives a transport through [`Transport`] / [`TransportConnection`] and
//! learns about progress only through the events a transport posts to its
//! [`EventSink`]. Events for one connection are expected to arrive from the
//! transport's worker tasks, never re-entrantly from inside a call the engine made.

use std::fmt;

use bytes::Bytes;

pub use crate::engine::EventSink;

/// Index of a connection within a run (`0..connection_count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one in-flight request: its connection plus the pooled request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamToken {
    pub connection: ConnectionId,
    pub slot: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake finished; streams may be opened.
    Connected,

    /// Stream credit is available again after an open was refused with
    /// [`StreamError::Blocked`].
    StreamsAvailable,

    /// The connection failed. No further events follow for it except stale stream
    /// completions.
    TransportError(String),

    /// The connection is fully closed after `shutdown`/`abort` (or a clean peer close).
    ShutdownComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// The request payload (and FIN) left the send buffer.
    SendComplete,
    DataReceived {
        len: usize,
    },
    /// The peer finished its side of the stream.
    PeerSendShutdown,
    /// Terminal event for the stream. `aborted` streams did not deliver a full response.
    StreamComplete {
        aborted: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Flow control: no stream credit right now. The open is retried on the next
    /// completion or [`ConnectionEvent::StreamsAvailable`].
    #[error("no stream credit available")]
    Blocked,

    #[error("connection is not established")]
    NotConnected,

    #[error("stream open failed: {0}")]
    Failed(String),
}

pub trait Transport: Send + Sync + 'static {
    type Connection: TransportConnection;

    /// Allocates a connection object bound to `events`. Nothing goes on the wire
    /// until [`TransportConnection::start`].
    fn open_connection(
        &self,
        id: ConnectionId,
        events: EventSink<Self::Connection>,
    ) -> Result<Self::Connection, TransportError>;
}

pub trait TransportConnection: fmt::Debug + Send + Sync + 'static {
    /// Begins the handshake. Completion is reported as [`ConnectionEvent::Connected`]
    /// or [`ConnectionEvent::TransportError`].
    fn start(&self, target: &str, port: u16) -> Result<(), TransportError>;

    /// Opens a stream and sends `payload` followed by FIN.
    fn open_stream(&self, token: StreamToken, payload: Bytes) -> Result<(), StreamError>;

    /// Graceful close. Ends with [`ConnectionEvent::ShutdownComplete`].
    fn shutdown(&self);

    /// Forced close, used when a graceful drain overran its bound.
    fn abort(&self);
}
