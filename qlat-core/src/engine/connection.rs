use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use super::context::RunContext;
use super::pool::RequestPool;
use crate::transport::{ConnectionEvent, ConnectionId, TransportConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionPhase {
    Connecting = 0,
    Connected = 1,
    ShuttingDown = 2,
    Complete = 3,
}

impl ConnectionPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::ShuttingDown,
            _ => Self::Complete,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ConnectionState<C> {
    pub(crate) id: ConnectionId,
    phase: AtomicU8,
    outstanding: AtomicU32,
    pub(crate) deferred: AtomicU32,
    initial_sent: AtomicBool,
    close_requested: AtomicBool,
    counted_active: AtomicBool,
    settled: AtomicBool,
    pub(crate) pool: RequestPool,
    handle: OnceLock<C>,
}

impl<C: TransportConnection> ConnectionState<C> {
    pub(crate) fn new(id: ConnectionId, parallel_requests: u32) -> Self {
        Self {
            id,
            phase: AtomicU8::new(ConnectionPhase::Connecting as u8),
            outstanding: AtomicU32::new(0),
            deferred: AtomicU32::new(0),
            initial_sent: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            counted_active: AtomicBool::new(false),
            settled: AtomicBool::new(false),
            pool: RequestPool::new(parallel_requests),
            handle: OnceLock::new(),
        }
    }

    pub(crate) fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub(crate) fn transition(&self, from: ConnectionPhase, to: ConnectionPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Moves to `Complete`, returning the previous phase, or `None` if it was
    /// already complete.
    fn enter_complete(&self) -> Option<ConnectionPhase> {
        let prev = self
            .phase
            .swap(ConnectionPhase::Complete as u8, Ordering::SeqCst);
        let prev = ConnectionPhase::from_u8(prev);
        (prev != ConnectionPhase::Complete).then_some(prev)
    }

    pub(crate) fn outstanding(&self) -> u32 {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub(crate) fn try_reserve(&self, limit: u32) -> bool {
        self.outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    /// Returns the outstanding count after the decrement.
    pub(crate) fn release_outstanding(&self) -> u32 {
        match self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => 0,
        }
    }

    pub(crate) fn attach(&self, handle: C) {
        // A fresh state is attached exactly once by the orchestrator.
        let _ = self.handle.set(handle);
    }

    pub(crate) fn handle(&self) -> Option<&C> {
        self.handle.get()
    }

    /// Asks the transport for a graceful close. Only the first call has effect.
    pub(crate) fn request_close(&self) {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle() {
            handle.shutdown();
        }
    }

    pub(crate) fn abort(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle() {
            handle.abort();
        }
    }
}

impl<C: TransportConnection> RunContext<C> {
    pub(crate) fn on_connection_event(&self, id: ConnectionId, event: ConnectionEvent) {
        let Some(conn) = self.connection(id) else {
            tracing::debug!(connection = %id, ?event, "event for unknown connection");
            return;
        };

        match event {
            ConnectionEvent::Connected => self.on_connected(conn),
            ConnectionEvent::StreamsAvailable => {
                if conn.phase() == ConnectionPhase::Connected && self.is_running() {
                    self.flush_deferred(conn);
                }
            }
            ConnectionEvent::TransportError(msg) => {
                self.complete(conn, Some(format!("{id}: {msg}")));
            }
            ConnectionEvent::ShutdownComplete => self.complete(conn, None),
        }
    }

    fn on_connected(&self, conn: &ConnectionState<C>) {
        if !conn.transition(ConnectionPhase::Connecting, ConnectionPhase::Connected) {
            // Shutdown was broadcast while the handshake was in flight.
            if conn.phase() == ConnectionPhase::ShuttingDown {
                conn.request_close();
            }
            self.settle_startup(conn);
            return;
        }

        self.counters.connection_up();
        conn.counted_active.store(true, Ordering::SeqCst);
        self.ever_connected.fetch_add(1, Ordering::AcqRel);
        self.settle_startup(conn);
        tracing::debug!(connection = %conn.id, "connected");

        if !self.is_running() {
            self.begin_shutdown(conn);
            return;
        }

        if !conn.initial_sent.swap(true, Ordering::SeqCst) {
            for _ in 0..self.parallel_requests {
                self.send_request(conn);
            }
        }
    }

    /// Counts the connection as settled for the startup wait (once).
    pub(crate) fn settle_startup(&self, conn: &ConnectionState<C>) {
        if conn.settled.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.pending_startup.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.startup.fire();
        }
    }

    pub(crate) fn begin_shutdown(&self, conn: &ConnectionState<C>) {
        if conn.transition(ConnectionPhase::Connected, ConnectionPhase::ShuttingDown) {
            tracing::debug!(connection = %conn.id, outstanding = conn.outstanding(), "shutting down");
            if conn.outstanding() == 0 {
                conn.request_close();
            }
        } else if conn.transition(ConnectionPhase::Connecting, ConnectionPhase::ShuttingDown) {
            tracing::debug!(connection = %conn.id, "shutting down before connect finished");
            conn.request_close();
        }
    }

    pub(crate) fn fail_connection(&self, conn: &ConnectionState<C>, error: String) {
        self.complete(conn, Some(error));
    }

    /// Final transition. Runs at most once per connection; later events are ignored.
    pub(crate) fn complete(&self, conn: &ConnectionState<C>, failure: Option<String>) {
        let Some(prev) = conn.enter_complete() else {
            return;
        };

        if let Some(error) = failure {
            tracing::warn!(connection = %conn.id, phase = %prev, %error, "connection failed");
            self.counters.record_connection_failure();
            self.record_error(error);
        } else {
            tracing::debug!(connection = %conn.id, phase = %prev, "connection complete");
        }

        self.settle_startup(conn);
        if conn.counted_active.swap(false, Ordering::SeqCst) {
            self.counters.connection_down();
        }

        let abandoned = conn.pool.reset();
        self.counters.record_abandoned(u64::from(abandoned));
        conn.outstanding.store(0, Ordering::SeqCst);
        conn.deferred.store(0, Ordering::SeqCst);

        if self.open_connections.fetch_sub(1, Ordering::AcqRel) == 1 {
            tracing::debug!("all connections complete");
            self.drained.fire();
        }
    }
}
