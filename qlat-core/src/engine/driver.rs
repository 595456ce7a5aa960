use std::sync::atomic::Ordering;

use super::connection::{ConnectionPhase, ConnectionState};
use super::context::RunContext;
use crate::transport::{StreamError, StreamToken, TransportConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Sent,
    /// The transport had no stream credit; retried on the next opportunity.
    Deferred,
    Skipped,
}

impl<C: TransportConnection> RunContext<C> {
    /// Issues one request on `conn` if the run and the connection allow it.
    pub(crate) fn send_request(&self, conn: &ConnectionState<C>) -> SendOutcome {
        if !self.is_running() || conn.phase() != ConnectionPhase::Connected {
            return SendOutcome::Skipped;
        }
        if !conn.try_reserve(self.parallel_requests) {
            return SendOutcome::Skipped;
        }
        // Shutdown may have started between the checks and the reservation.
        if conn.phase() != ConnectionPhase::Connected {
            self.release_reservation(conn);
            return SendOutcome::Skipped;
        }

        let (Some(handle), Some(slot)) = (conn.handle(), conn.pool.acquire()) else {
            self.release_reservation(conn);
            return SendOutcome::Skipped;
        };

        let bytes = self.request.len() as u64;
        conn.pool.stamp(slot, self.clock.now());
        self.counters.record_started(bytes);

        let token = StreamToken {
            connection: conn.id,
            slot,
        };
        let Err(err) = handle.open_stream(token, self.request.clone()) else {
            return SendOutcome::Sent;
        };

        self.counters.unrecord_started(bytes);
        if conn.pool.take(slot).is_some() {
            conn.pool.release(slot);
        }
        self.release_reservation(conn);

        match err {
            StreamError::Blocked => {
                conn.deferred.fetch_add(1, Ordering::SeqCst);
                self.counters.record_deferred();
                tracing::trace!(connection = %conn.id, "stream credit exhausted; request deferred");
                SendOutcome::Deferred
            }
            err => {
                tracing::debug!(connection = %conn.id, error = %err, "failed to open request stream");
                SendOutcome::Skipped
            }
        }
    }

    /// Retries requests deferred by backpressure.
    pub(crate) fn flush_deferred(&self, conn: &ConnectionState<C>) {
        let pending = conn.deferred.swap(0, Ordering::SeqCst);
        for sent in 0..pending {
            match self.send_request(conn) {
                SendOutcome::Sent => {}
                SendOutcome::Deferred => {
                    // The failed attempt re-deferred itself; keep the rest too.
                    conn.deferred
                        .fetch_add(pending - sent - 1, Ordering::SeqCst);
                    return;
                }
                SendOutcome::Skipped => return,
            }
        }
    }

    fn release_reservation(&self, conn: &ConnectionState<C>) {
        let left = conn.release_outstanding();
        if left == 0 && conn.phase() == ConnectionPhase::ShuttingDown {
            conn.request_close();
        }
    }
}
