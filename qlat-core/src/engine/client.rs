use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use super::connection::ConnectionPhase;
use super::context::{EventSink, RunContext};
use super::counters::CounterSnapshot;
use super::signal::StopSignal;
use super::summary::LatencySummary;
use crate::config::LatencyConfig;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunEndReason {
    RunTimeElapsed,
    StopRequested,
    AllConnectionsClosed,
}

#[derive(Debug, Clone)]
pub struct RunResults {
    /// Every recorded latency in microseconds, ascending.
    pub latencies_us: Vec<u32>,
    pub summary: Option<LatencySummary>,
    pub counters: CounterSnapshot,
    /// Time from the end of startup to the end of the measurement phase.
    pub run_duration: Duration,
    pub end_reason: RunEndReason,
    /// Set when the drain timed out and connections were force-closed.
    /// Completions still racing the close are counted as `late_completions`.
    pub degraded: bool,
    /// Completions that found the sample store full.
    pub overflowed_samples: u64,
    pub connection_errors: Vec<String>,
}

impl RunResults {
    #[must_use]
    pub fn requests_per_sec(&self) -> f64 {
        let secs = self.run_duration.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.counters.completed_requests as f64 / secs
    }
}

struct ActiveRun<C> {
    ctx: Arc<RunContext<C>>,
    stop: StopSignal,
    started_at: Instant,
}

/// Drives `connection_count` connections, each keeping `parallel_requests`
/// request streams in flight, and collects one latency sample per response.
pub struct LatencyClient<T: Transport> {
    config: LatencyConfig,
    transport: T,
    run: Option<ActiveRun<T::Connection>>,
    started: bool,
}

impl<T: Transport> LatencyClient<T> {
    pub fn init(config: LatencyConfig, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            run: None,
            started: false,
        })
    }

    pub fn config(&self) -> &LatencyConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens every connection and waits until each one is connected or failed
    /// (bounded by `startup_timeout`). Requests keep flowing after this returns.
    pub async fn start(&mut self, stop: StopSignal) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let cfg = &self.config;
        let capacity = cfg.sample_capacity()?;
        let request = cfg.request_payload();
        let ctx = Arc::new(RunContext::new(
            cfg.connection_count,
            cfg.parallel_requests,
            request,
            capacity,
        ));

        tracing::info!(
            target_host = %cfg.target,
            port = cfg.port,
            connections = cfg.connection_count,
            parallel_requests = cfg.parallel_requests,
            sample_capacity = capacity,
            "starting latency run"
        );

        for conn in ctx.connections.iter() {
            match self
                .transport
                .open_connection(conn.id, EventSink::new(&ctx))
            {
                Ok(handle) => conn.attach(handle),
                Err(err) => {
                    ctx.fail_connection(conn, format!("{}: {err}", conn.id));
                    continue;
                }
            }

            if let Some(handle) = conn.handle()
                && let Err(err) = handle.start(&cfg.target, cfg.port)
            {
                ctx.fail_connection(conn, format!("{}: {err}", conn.id));
            }
        }

        let settled = tokio::select! {
            r = tokio::time::timeout(cfg.startup_timeout, ctx.startup.wait()) => r.is_ok(),
            _ = stop.stopped() => true,
        };

        if !settled {
            let mut timed_out = 0u32;
            for conn in ctx.connections.iter() {
                if conn.phase() == ConnectionPhase::Connecting {
                    timed_out += 1;
                    ctx.counters.record_connection_failure();
                    ctx.record_error(format!(
                        "{}: not connected within {:?}",
                        conn.id, cfg.startup_timeout
                    ));
                    ctx.begin_shutdown(conn);
                }
            }
            tracing::warn!(
                timed_out,
                timeout = ?cfg.startup_timeout,
                "some connections did not finish connecting"
            );
        }

        let connected = ctx.ever_connected.load(Ordering::Acquire);
        if connected == 0 && !stop.is_stopped() {
            ctx.running.store(false, Ordering::SeqCst);
            for conn in ctx.connections.iter() {
                if conn.phase() != ConnectionPhase::Complete {
                    conn.abort();
                    ctx.complete(conn, None);
                }
            }
            return Err(Error::ConnectFailed {
                attempted: cfg.connection_count,
                errors: ctx.errors(),
            });
        }

        tracing::info!(
            connected,
            requested = cfg.connection_count,
            "connections established; measuring"
        );

        self.run = Some(ActiveRun {
            ctx,
            stop,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Runs until the run time elapses, the stop signal fires or every connection
    /// closed, then drains all connections within `timeout`
    /// (`Duration::ZERO` selects the configured drain timeout).
    pub async fn wait(&mut self, timeout: Duration) -> Result<RunResults> {
        let Some(run) = self.run.take() else {
            return Err(Error::NotStarted);
        };
        let ActiveRun {
            ctx,
            stop,
            started_at,
        } = run;

        let deadline = tokio::time::Instant::from_std(started_at + self.config.run_time);
        let end_reason = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => RunEndReason::RunTimeElapsed,
            _ = stop.stopped() => RunEndReason::StopRequested,
            _ = ctx.drained.wait() => RunEndReason::AllConnectionsClosed,
        };

        ctx.running.store(false, Ordering::SeqCst);
        let run_duration = started_at.elapsed();
        tracing::info!(%end_reason, ?run_duration, "measurement finished; draining connections");

        for conn in ctx.connections.iter() {
            ctx.begin_shutdown(conn);
        }

        let drain_timeout = if timeout.is_zero() {
            self.config.drain_timeout
        } else {
            timeout
        };

        if tokio::time::timeout(drain_timeout, ctx.drained.wait())
            .await
            .is_err()
        {
            ctx.samples.seal();
            let pending = ctx.open_connections();
            tracing::warn!(pending, timeout = ?drain_timeout, "drain timed out; aborting connections");

            for conn in ctx.connections.iter() {
                if conn.phase() != ConnectionPhase::Complete {
                    conn.abort();
                    ctx.complete(conn, None);
                }
            }

            let results = collect(&ctx, end_reason, run_duration, true);
            return Err(Error::ShutdownTimeout {
                timeout: drain_timeout,
                pending,
                results: Box::new(results),
            });
        }

        let results = collect(&ctx, end_reason, run_duration, false);
        tracing::info!(
            completed = results.counters.completed_requests,
            samples = results.latencies_us.len(),
            "run complete"
        );

        if results.counters.failed_connections >= self.config.connection_count {
            return Err(Error::AllConnectionsFailed {
                errors: results.connection_errors.clone(),
                results: Box::new(results),
            });
        }

        Ok(results)
    }
}

impl<T: Transport> Drop for LatencyClient<T> {
    fn drop(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        run.ctx.running.store(false, Ordering::SeqCst);
        for conn in run.ctx.connections.iter() {
            if conn.phase() != ConnectionPhase::Complete {
                conn.abort();
            }
        }
    }
}

fn collect<C: TransportConnection>(
    ctx: &RunContext<C>,
    end_reason: RunEndReason,
    run_duration: Duration,
    degraded: bool,
) -> RunResults {
    ctx.samples.seal();
    let latencies_us = ctx.samples.sorted_micros();
    RunResults {
        summary: LatencySummary::from_sorted(&latencies_us),
        latencies_us,
        counters: ctx.counters.snapshot(),
        run_duration,
        end_reason,
        degraded,
        overflowed_samples: ctx.samples.overflowed(),
        connection_errors: ctx.errors(),
    }
}
