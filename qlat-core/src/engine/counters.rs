use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Run-wide counters shared by every connection callback.
#[derive(Debug, Default)]
pub struct RunCounters {
    active_connections: AtomicU32,
    failed_connections: AtomicU32,
    started_requests: AtomicU64,
    send_completed_requests: AtomicU64,
    completed_requests: AtomicU64,
    aborted_requests: AtomicU64,
    abandoned_requests: AtomicU64,
    deferred_requests: AtomicU64,
    late_completions: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub active_connections: u32,
    pub failed_connections: u32,
    pub started_requests: u64,
    pub send_completed_requests: u64,
    pub completed_requests: u64,
    /// Streams the transport reported as aborted.
    pub aborted_requests: u64,
    /// In flight when their connection failed or was force-closed.
    pub abandoned_requests: u64,
    /// Opens refused for lack of stream credit (each retried later).
    pub deferred_requests: u64,
    /// Completions that arrived after the store was sealed.
    pub late_completions: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl CounterSnapshot {
    /// Requests started but never accounted as completed, aborted or abandoned.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.started_requests
            .saturating_sub(self.completed_requests)
            .saturating_sub(self.aborted_requests)
            .saturating_sub(self.abandoned_requests)
            .saturating_sub(self.late_completions)
    }
}

impl RunCounters {
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn started_requests(&self) -> u64 {
        self.started_requests.load(Ordering::Relaxed)
    }

    pub fn completed_requests(&self) -> u64 {
        self.completed_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn connection_up(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the number of connections still active.
    pub(crate) fn connection_down(&self) -> u32 {
        match self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => 0,
        }
    }

    pub(crate) fn record_connection_failure(&self) {
        self.failed_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self, bytes: u64) {
        self.started_requests.fetch_add(1, Ordering::Relaxed);
        if bytes != 0 {
            self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Undo of [`Self::record_started`] for an open the transport refused.
    pub(crate) fn unrecord_started(&self, bytes: u64) {
        self.started_requests.fetch_sub(1, Ordering::Relaxed);
        if bytes != 0 {
            self.bytes_sent.fetch_sub(bytes, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_send_complete(&self) {
        self.send_completed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed_requests.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn record_aborted(&self) {
        self.aborted_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self, n: u64) {
        if n != 0 {
            self.abandoned_requests.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_late_completion(&self) {
        self.late_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes_received(&self, n: u64) {
        if n != 0 {
            self.bytes_received.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            active_connections: self.active_connections.load(Ordering::Acquire),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            started_requests: self.started_requests.load(Ordering::Relaxed),
            send_completed_requests: self.send_completed_requests.load(Ordering::Relaxed),
            completed_requests: self.completed_requests.load(Ordering::Acquire),
            aborted_requests: self.aborted_requests.load(Ordering::Relaxed),
            abandoned_requests: self.abandoned_requests.load(Ordering::Relaxed),
            deferred_requests: self.deferred_requests.load(Ordering::Relaxed),
            late_completions: self.late_completions.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}
