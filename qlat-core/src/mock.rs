//! In-process transport with scripted timing and failures.
//!
//! Every event is posted from a spawned tokio task, so the engine sees the same
//! asynchronous delivery it gets from a real QUIC stack.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::engine::{EventSink, Signal};
use crate::transport::{
    ConnectionEvent, ConnectionId, StreamError, StreamEvent, StreamToken, Transport,
    TransportConnection, TransportError,
};

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub connect_delay: Duration,
    pub response_delay: Duration,
    pub response_length: usize,

    /// `open_connection` fails for these connection ids.
    pub refuse: Vec<u32>,
    /// These connections never finish the handshake.
    pub never_connect: Vec<u32>,
    /// These connections report a transport error `fail_delay` after connecting.
    pub fail_after_connect: Vec<u32>,
    pub fail_delay: Duration,

    /// Concurrent streams allowed per connection; opens beyond it are `Blocked`.
    pub max_streams: Option<u32>,
    /// `shutdown` never completes (only `abort` does).
    pub hang_on_shutdown: bool,
    /// Streams never get a response and never complete, not even on close.
    pub stall_streams: bool,
    /// Total streams the transport accepts across all connections.
    pub request_budget: Option<u64>,
}

#[derive(Debug, Default)]
pub struct MockStats {
    connections_opened: AtomicU32,
    streams_opened: AtomicU64,
    streams_blocked: AtomicU64,
    peak_streams: AtomicU32,
    shutdowns: AtomicU32,
    aborts: AtomicU32,
}

impl MockStats {
    pub fn connections_opened(&self) -> u32 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    pub fn streams_opened(&self) -> u64 {
        self.streams_opened.load(Ordering::Relaxed)
    }

    pub fn streams_blocked(&self) -> u64 {
        self.streams_blocked.load(Ordering::Relaxed)
    }

    /// Highest number of concurrently open streams seen on any one connection.
    pub fn peak_streams_per_connection(&self) -> u32 {
        self.peak_streams.load(Ordering::Relaxed)
    }

    pub fn shutdowns(&self) -> u32 {
        self.shutdowns.load(Ordering::Relaxed)
    }

    pub fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    config: Arc<MockConfig>,
    stats: Arc<MockStats>,
    budget: Arc<AtomicU64>,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        let budget = config.request_budget.unwrap_or(u64::MAX);
        Self {
            config: Arc::new(config),
            stats: Arc::new(MockStats::default()),
            budget: Arc::new(AtomicU64::new(budget)),
        }
    }

    pub fn stats(&self) -> &MockStats {
        &self.stats
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    fn open_connection(
        &self,
        id: ConnectionId,
        events: EventSink<MockConnection>,
    ) -> Result<MockConnection, TransportError> {
        if self.config.refuse.contains(&id.0) {
            return Err(TransportError::new("connection refused"));
        }
        self.stats.connections_opened.fetch_add(1, Ordering::Relaxed);

        Ok(MockConnection {
            inner: Arc::new(Inner {
                id,
                events,
                config: Arc::clone(&self.config),
                stats: Arc::clone(&self.stats),
                budget: Arc::clone(&self.budget),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                blocked: AtomicBool::new(false),
                open_streams: AtomicU32::new(0),
                close: Signal::new(),
            }),
        })
    }
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    events: EventSink<MockConnection>,
    config: Arc<MockConfig>,
    stats: Arc<MockStats>,
    budget: Arc<AtomicU64>,
    connected: AtomicBool,
    closed: AtomicBool,
    blocked: AtomicBool,
    open_streams: AtomicU32,
    close: Signal,
}

impl Inner {
    fn emit(&self, event: ConnectionEvent) {
        self.events.connection_event(self.id, event);
    }

    fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        self.close.fire();
        first
    }

    fn finish_stream(&self, token: StreamToken, aborted: bool) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
        self.events
            .stream_event(token, StreamEvent::StreamComplete { aborted });
        if self.blocked.swap(false, Ordering::SeqCst) {
            self.emit(ConnectionEvent::StreamsAvailable);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockConnection {
    inner: Arc<Inner>,
}

impl TransportConnection for MockConnection {
    fn start(&self, _target: &str, _port: u16) -> Result<(), TransportError> {
        let inner = Arc::clone(&self.inner);
        spawn(async move {
            if inner.config.never_connect.contains(&inner.id.0) {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(inner.config.connect_delay) => {}
                _ = inner.close.wait() => return,
            }
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }

            inner.connected.store(true, Ordering::SeqCst);
            inner.emit(ConnectionEvent::Connected);

            if inner.config.fail_after_connect.contains(&inner.id.0) {
                tokio::time::sleep(inner.config.fail_delay).await;
                if inner.close() {
                    inner.emit(ConnectionEvent::TransportError(
                        "injected connection failure".to_string(),
                    ));
                }
            }
        });
        Ok(())
    }

    fn open_stream(&self, token: StreamToken, _payload: Bytes) -> Result<(), StreamError> {
        let inner = &self.inner;
        if !inner.connected.load(Ordering::SeqCst) || inner.closed.load(Ordering::SeqCst) {
            return Err(StreamError::NotConnected);
        }

        let limit = inner.config.max_streams.unwrap_or(u32::MAX);
        let Ok(prev) = inner
            .open_streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
        else {
            inner.blocked.store(true, Ordering::SeqCst);
            inner.stats.streams_blocked.fetch_add(1, Ordering::Relaxed);
            return Err(StreamError::Blocked);
        };

        if inner
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            inner.open_streams.fetch_sub(1, Ordering::SeqCst);
            return Err(StreamError::Failed("request budget exhausted".to_string()));
        }

        inner.stats.streams_opened.fetch_add(1, Ordering::Relaxed);
        inner.stats.peak_streams.fetch_max(prev + 1, Ordering::Relaxed);

        let inner = Arc::clone(inner);
        spawn(async move {
            inner.events.stream_event(token, StreamEvent::SendComplete);
            if inner.config.stall_streams {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(inner.config.response_delay) => {}
                _ = inner.close.wait() => {
                    inner.finish_stream(token, true);
                    return;
                }
            }

            let len = inner.config.response_length;
            if len > 0 {
                inner
                    .events
                    .stream_event(token, StreamEvent::DataReceived { len });
            }
            inner.events.stream_event(token, StreamEvent::PeerSendShutdown);
            inner.finish_stream(token, false);
        });
        Ok(())
    }

    fn shutdown(&self) {
        self.inner.stats.shutdowns.fetch_add(1, Ordering::Relaxed);
        self.inner.close();
        if self.inner.config.hang_on_shutdown {
            return;
        }

        let inner = Arc::clone(&self.inner);
        spawn(async move {
            inner.emit(ConnectionEvent::ShutdownComplete);
        });
    }

    fn abort(&self) {
        self.inner.stats.aborts.fetch_add(1, Ordering::Relaxed);
        self.inner.close();

        let inner = Arc::clone(&self.inner);
        spawn(async move {
            inner.emit(ConnectionEvent::ShutdownComplete);
        });
    }
}

/// Spawns on the current runtime; a no-op when called outside one (e.g. while a
/// client is dropped after its runtime shut down).
fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(fut);
    }
}
