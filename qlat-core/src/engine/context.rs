use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use super::Signal;
use super::clock::Clock;
use super::connection::ConnectionState;
use super::counters::RunCounters;
use super::samples::LatencySampleStore;
use crate::transport::{ConnectionEvent, ConnectionId, StreamEvent, StreamToken, TransportConnection};

const MAX_RECORDED_ERRORS: usize = 256;

/// State shared by every connection of one run.
#[derive(Debug)]
pub(crate) struct RunContext<C> {
    pub(crate) parallel_requests: u32,
    pub(crate) request: Bytes,
    pub(crate) clock: Clock,
    pub(crate) counters: RunCounters,
    pub(crate) samples: LatencySampleStore,
    pub(crate) connections: Box<[ConnectionState<C>]>,
    pub(crate) running: AtomicBool,
    pub(crate) pending_startup: AtomicU32,
    pub(crate) open_connections: AtomicU32,
    pub(crate) ever_connected: AtomicU32,
    pub(crate) startup: Signal,
    pub(crate) drained: Signal,
    errors: Mutex<Vec<String>>,
}

impl<C: TransportConnection> RunContext<C> {
    pub(crate) fn new(
        connection_count: u32,
        parallel_requests: u32,
        request: Bytes,
        sample_capacity: usize,
    ) -> Self {
        let connections = (0..connection_count)
            .map(|i| ConnectionState::new(ConnectionId(i), parallel_requests))
            .collect();

        Self {
            parallel_requests,
            request,
            clock: Clock::new(),
            counters: RunCounters::default(),
            samples: LatencySampleStore::with_capacity(sample_capacity),
            connections,
            running: AtomicBool::new(true),
            pending_startup: AtomicU32::new(connection_count),
            open_connections: AtomicU32::new(connection_count),
            ever_connected: AtomicU32::new(0),
            startup: Signal::new(),
            drained: Signal::new(),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn connection(&self, id: ConnectionId) -> Option<&ConnectionState<C>> {
        self.connections.get(id.0 as usize)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn open_connections(&self) -> u32 {
        self.open_connections.load(Ordering::Acquire)
    }

    pub(crate) fn record_error(&self, error: String) {
        let mut errors = self.errors.lock();
        if errors.len() < MAX_RECORDED_ERRORS {
            errors.push(error);
        }
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

/// Handle through which a transport reports events back to the engine.
///
/// Holds only a weak reference to the run, so transports may keep it in their
/// connection handles and spawned tasks without keeping a finished run alive.
/// Events arriving after the run was dropped are discarded.
#[derive(Debug)]
pub struct EventSink<C> {
    run: Weak<RunContext<C>>,
}

impl<C> Clone for EventSink<C> {
    fn clone(&self) -> Self {
        Self {
            run: Weak::clone(&self.run),
        }
    }
}

impl<C: TransportConnection> EventSink<C> {
    pub(crate) fn new(run: &Arc<RunContext<C>>) -> Self {
        Self {
            run: Arc::downgrade(run),
        }
    }

    pub fn connection_event(&self, id: ConnectionId, event: ConnectionEvent) {
        if let Some(run) = self.run.upgrade() {
            run.on_connection_event(id, event);
        }
    }

    pub fn stream_event(&self, token: StreamToken, event: StreamEvent) {
        if let Some(run) = self.run.upgrade() {
            run.on_stream_event(token, event);
        }
    }

    /// `false` once the run this sink reports to has been dropped.
    pub fn is_attached(&self) -> bool {
        self.run.strong_count() > 0
    }
}
