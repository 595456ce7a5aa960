#![forbid(unsafe_code)]

mod error;
mod settings;
mod tls;
mod transport;

pub use error::{Error, QuicTransportErrorKind, Result};
pub use settings::{DEFAULT_IDLE_TIMEOUT, QuicSettings};
pub use tls::ALPN_PERF;
pub use transport::{QuicConnection, QuicTransport};
