use std::net::SocketAddr;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QuicTransportErrorKind {
    InvalidSettings,
    Bind,
    Tls,
    Resolve,
    Connect,
    Connection,
    Write,
    Read,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client_port_count must be in 1..={max} (got {count})")]
    InvalidPortCount { count: u32, max: u32 },

    #[error("idle timeout {0:?} is out of range")]
    IdleTimeout(Duration),

    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("tls configuration failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("tls configuration has no QUIC-capable cipher suite")]
    NoInitialCipherSuite(#[from] quinn::crypto::rustls::NoInitialCipherSuite),

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{host} has no address usable from local socket {local}")]
    NoAddress { host: String, local: SocketAddr },

    #[error("connect failed: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("connection lost: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("request write failed: {0}")]
    Write(#[from] quinn::WriteError),

    #[error("request stream already closed")]
    StreamClosed(#[from] quinn::ClosedStream),

    #[error("response read failed: {0}")]
    Read(#[from] quinn::ReadError),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> QuicTransportErrorKind {
        match self {
            Self::InvalidPortCount { .. } | Self::IdleTimeout(_) => {
                QuicTransportErrorKind::InvalidSettings
            }
            Self::Bind { .. } => QuicTransportErrorKind::Bind,
            Self::Tls(_) | Self::NoInitialCipherSuite(_) => QuicTransportErrorKind::Tls,
            Self::Resolve { .. } | Self::NoAddress { .. } => QuicTransportErrorKind::Resolve,
            Self::Connect(_) => QuicTransportErrorKind::Connect,
            Self::Connection(_) => QuicTransportErrorKind::Connection,
            Self::Write(_) | Self::StreamClosed(_) => QuicTransportErrorKind::Write,
            Self::Read(_) => QuicTransportErrorKind::Read,
        }
    }
}
