use super::connection::{ConnectionPhase, ConnectionState};
use super::context::RunContext;
use crate::transport::{StreamEvent, StreamToken, TransportConnection};

impl<C: TransportConnection> RunContext<C> {
    pub(crate) fn on_stream_event(&self, token: StreamToken, event: StreamEvent) {
        let Some(conn) = self.connection(token.connection) else {
            return;
        };

        match event {
            StreamEvent::SendComplete => self.counters.record_send_complete(),
            StreamEvent::DataReceived { len } => {
                self.counters.record_bytes_received(len as u64);
            }
            StreamEvent::PeerSendShutdown => {}
            StreamEvent::StreamComplete { aborted } => {
                self.on_stream_complete(conn, token.slot, aborted);
            }
        }
    }

    fn on_stream_complete(&self, conn: &ConnectionState<C>, slot: u32, aborted: bool) {
        // Already consumed: duplicate event, or the connection was reset.
        let Some(start) = conn.pool.take(slot) else {
            tracing::trace!(connection = %conn.id, slot, "stale stream completion");
            return;
        };

        if aborted {
            self.counters.record_aborted();
        } else {
            let elapsed_us = self.clock.now().saturating_sub(start) / 1_000;
            // The counter is bumped inside the write window so a sealed store
            // and `completed_requests` agree.
            match self.samples.writer() {
                Some(writer) => {
                    writer.record(elapsed_us);
                    self.counters.record_completed();
                }
                None => self.counters.record_late_completion(),
            }
        }

        conn.pool.release(slot);
        let left = conn.release_outstanding();

        match conn.phase() {
            ConnectionPhase::Connected if self.is_running() => {
                self.send_request(conn);
                self.flush_deferred(conn);
            }
            ConnectionPhase::ShuttingDown if left == 0 => conn.request_close(),
            _ => {}
        }
    }
}
