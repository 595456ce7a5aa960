use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use qlat_core::transport::{
    ConnectionEvent, ConnectionId, EventSink, StreamError, StreamEvent, StreamToken, Transport,
    TransportConnection, TransportError,
};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::settings::QuicSettings;
use crate::tls;

const CLOSE_DONE: u32 = 0;
const CLOSE_ABORT: u32 = 1;

/// [`Transport`] backed by quinn. Owns `client_port_count` client endpoints;
/// connections are assigned to them round-robin.
#[derive(Debug)]
pub struct QuicTransport {
    endpoints: Vec<quinn::Endpoint>,
    next: AtomicUsize,
    server_name: Option<String>,
}

impl QuicTransport {
    /// Binds the client sockets. Must be called inside a tokio runtime.
    pub fn bind(settings: &QuicSettings) -> Result<Self> {
        settings.validate()?;
        let client_config = tls::client_config(settings)?;

        let endpoints = (0..settings.client_port_count)
            .map(|_| {
                let addr = SocketAddr::new(settings.bind_ip, 0);
                let mut endpoint =
                    quinn::Endpoint::client(addr).map_err(|source| Error::Bind { addr, source })?;
                endpoint.set_default_client_config(client_config.clone());
                Ok(endpoint)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            sockets = endpoints.len(),
            local = ?endpoints.iter().filter_map(|e| e.local_addr().ok()).collect::<Vec<_>>(),
            "bound QUIC client endpoints"
        );

        Ok(Self {
            endpoints,
            next: AtomicUsize::new(0),
            server_name: settings.server_name.clone(),
        })
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.endpoints
            .iter()
            .filter_map(|e| e.local_addr().ok())
            .collect()
    }

    /// Waits until every endpoint has flushed its close frames.
    pub async fn wait_idle(&self) {
        for endpoint in &self.endpoints {
            endpoint.wait_idle().await;
        }
    }
}

impl Transport for QuicTransport {
    type Connection = QuicConnection;

    fn open_connection(
        &self,
        id: ConnectionId,
        events: EventSink<QuicConnection>,
    ) -> std::result::Result<QuicConnection, TransportError> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len().max(1);
        let endpoint = self
            .endpoints
            .get(idx)
            .cloned()
            .ok_or_else(|| TransportError::new("no client endpoint bound"))?;

        let (cancel, _) = watch::channel(false);
        Ok(QuicConnection {
            shared: Arc::new(Shared {
                id,
                endpoint,
                events,
                server_name: self.server_name.clone(),
                conn: OnceLock::new(),
                closing: AtomicBool::new(false),
                cancel,
            }),
        })
    }
}

#[derive(Debug, Clone)]
pub struct QuicConnection {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    id: ConnectionId,
    endpoint: quinn::Endpoint,
    events: EventSink<QuicConnection>,
    server_name: Option<String>,
    conn: OnceLock<quinn::Connection>,
    closing: AtomicBool,
    cancel: watch::Sender<bool>,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        self.events.connection_event(self.id, event);
    }

    async fn run(self: Arc<Self>, target: String, port: u16) {
        let mut cancelled = self.cancel.subscribe();
        let connected = tokio::select! {
            r = self.connect(&target, port) => r,
            _ = cancelled.wait_for(|c| *c) => {
                self.emit(ConnectionEvent::ShutdownComplete);
                return;
            }
        };

        let conn = match connected {
            Ok(conn) => conn,
            Err(err) => {
                if self.closing.load(Ordering::SeqCst) {
                    self.emit(ConnectionEvent::ShutdownComplete);
                } else {
                    tracing::debug!(connection = %self.id, kind = %err.transport_error_kind(), error = %err, "connect failed");
                    self.emit(ConnectionEvent::TransportError(err.to_string()));
                }
                return;
            }
        };

        let _ = self.conn.set(conn.clone());
        if self.closing.load(Ordering::SeqCst) {
            // Shutdown raced the handshake.
            conn.close(CLOSE_DONE.into(), b"done");
        } else {
            tracing::debug!(connection = %self.id, remote = %conn.remote_address(), "handshake complete");
            self.emit(ConnectionEvent::Connected);
        }

        let reason = conn.closed().await;
        if self.closing.load(Ordering::SeqCst) {
            self.emit(ConnectionEvent::ShutdownComplete);
        } else {
            let err = Error::from(reason);
            self.emit(ConnectionEvent::TransportError(err.to_string()));
        }
    }

    async fn connect(&self, target: &str, port: u16) -> Result<quinn::Connection> {
        let local = self
            .endpoint
            .local_addr()
            .map_err(|source| Error::Resolve {
                host: target.to_string(),
                source,
            })?;

        let addr = tokio::net::lookup_host((target, port))
            .await
            .map_err(|source| Error::Resolve {
                host: target.to_string(),
                source,
            })?
            .find(|a| a.is_ipv4() == local.is_ipv4())
            .ok_or_else(|| Error::NoAddress {
                host: target.to_string(),
                local,
            })?;

        let server_name = self.server_name.as_deref().unwrap_or(target);
        Ok(self.endpoint.connect(addr, server_name)?.await?)
    }

    async fn drive_stream(&self, conn: quinn::Connection, token: StreamToken, payload: Bytes) {
        let aborted = match self.exchange(&conn, token, &payload).await {
            Ok(()) => false,
            Err(err) => {
                tracing::debug!(
                    connection = %self.id,
                    slot = token.slot,
                    kind = %err.transport_error_kind(),
                    error = %err,
                    "request stream failed"
                );
                true
            }
        };
        self.events
            .stream_event(token, StreamEvent::StreamComplete { aborted });
    }

    async fn exchange(&self, conn: &quinn::Connection, token: StreamToken, payload: &[u8]) -> Result<()> {
        let (mut send, mut recv) = conn.open_bi().await?;
        if !payload.is_empty() {
            send.write_all(payload).await?;
        }
        send.finish()?;
        self.events.stream_event(token, StreamEvent::SendComplete);

        while let Some(chunk) = recv.read_chunk(usize::MAX, true).await? {
            self.events.stream_event(
                token,
                StreamEvent::DataReceived {
                    len: chunk.bytes.len(),
                },
            );
        }
        self.events
            .stream_event(token, StreamEvent::PeerSendShutdown);
        Ok(())
    }

    fn close(&self, code: u32, reason: &[u8]) {
        self.closing.store(true, Ordering::SeqCst);
        self.cancel.send_replace(true);
        if let Some(conn) = self.conn.get() {
            conn.close(code.into(), reason);
        }
    }
}

impl TransportConnection for QuicConnection {
    fn start(&self, target: &str, port: u16) -> std::result::Result<(), TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::new(format!("no tokio runtime: {e}")))?;
        runtime.spawn(Arc::clone(&self.shared).run(target.to_string(), port));
        Ok(())
    }

    fn open_stream(&self, token: StreamToken, payload: Bytes) -> std::result::Result<(), StreamError> {
        let shared = &self.shared;
        if shared.closing.load(Ordering::SeqCst) {
            return Err(StreamError::NotConnected);
        }
        let Some(conn) = shared.conn.get().cloned() else {
            return Err(StreamError::NotConnected);
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StreamError::Failed(format!("no tokio runtime: {e}")))?;

        // quinn queues the open until the peer grants stream credit, so this
        // transport never reports `Blocked`.
        let shared = Arc::clone(shared);
        runtime.spawn(async move { shared.drive_stream(conn, token, payload).await });
        Ok(())
    }

    fn shutdown(&self) {
        tracing::debug!(connection = %self.shared.id, "closing connection");
        self.shared.close(CLOSE_DONE, b"done");
    }

    fn abort(&self) {
        tracing::debug!(connection = %self.shared.id, "aborting connection");
        self.shared.close(CLOSE_ABORT, b"abort");
    }
}
