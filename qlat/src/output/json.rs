use serde::Serialize;
use std::io::Write as _;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config: &qlat_core::LatencyConfig) {}

    fn print_summary(&self, results: &qlat_core::RunResults) -> anyhow::Result<()> {
        let line = build_summary_line(results);
        emit_json_line(&line)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub end_reason: String,
    pub degraded: bool,
    pub duration_secs: f64,
    pub requests_per_sec: f64,

    pub active_connections: u32,
    pub failed_connections: u32,

    pub started_requests: u64,
    pub completed_requests: u64,
    pub aborted_requests: u64,
    pub abandoned_requests: u64,
    pub late_completions: u64,
    pub deferred_requests: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub overflowed_samples: u64,

    pub latency: Option<JsonLatencySummary>,
    pub connection_errors: Vec<String>,
}

/// Latency statistics in microseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub count: u64,
    pub min: u32,
    pub mean: f64,
    pub stdev: f64,
    pub p50: u32,
    pub p90: u32,
    pub p99: u32,
    pub p99_9: u32,
    pub p99_99: u32,
    pub max: u32,
}

fn build_summary_line(results: &qlat_core::RunResults) -> JsonSummaryLine {
    let c = &results.counters;
    let latency = results.summary.as_ref().map(|s| JsonLatencySummary {
        count: s.count,
        min: s.min_us,
        mean: s.mean_us,
        stdev: s.stdev_us,
        p50: s.p50_us,
        p90: s.p90_us,
        p99: s.p99_us,
        p99_9: s.p99_9_us,
        p99_99: s.p99_99_us,
        max: s.max_us,
    });

    JsonSummaryLine {
        kind: "summary",
        end_reason: results.end_reason.to_string(),
        degraded: results.degraded,
        duration_secs: results.run_duration.as_secs_f64(),
        requests_per_sec: results.requests_per_sec(),
        active_connections: c.active_connections,
        failed_connections: c.failed_connections,
        started_requests: c.started_requests,
        completed_requests: c.completed_requests,
        aborted_requests: c.aborted_requests,
        abandoned_requests: c.abandoned_requests,
        late_completions: c.late_completions,
        deferred_requests: c.deferred_requests,
        bytes_sent: c.bytes_sent,
        bytes_received: c.bytes_received,
        overflowed_samples: results.overflowed_samples,
        latency,
        connection_errors: results.connection_errors.clone(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, line)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn summary_line_carries_counters_and_percentiles() {
        let latencies_us = vec![10, 20, 30, 40];
        let results = qlat_core::RunResults {
            summary: qlat_core::LatencySummary::from_sorted(&latencies_us),
            latencies_us,
            counters: qlat_core::CounterSnapshot {
                started_requests: 5,
                completed_requests: 4,
                abandoned_requests: 1,
                ..Default::default()
            },
            run_duration: Duration::from_secs(2),
            end_reason: qlat_core::RunEndReason::StopRequested,
            degraded: false,
            overflowed_samples: 0,
            connection_errors: Vec::new(),
        };

        let line = build_summary_line(&results);
        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(
            v.get("end_reason").and_then(Value::as_str),
            Some("stop_requested")
        );
        assert_eq!(v.get("completed_requests").and_then(Value::as_u64), Some(4));
        assert_eq!(v.get("requests_per_sec").and_then(Value::as_f64), Some(2.0));
        assert_eq!(
            v.pointer("/latency/p50").and_then(Value::as_u64),
            Some(20)
        );
        assert_eq!(v.pointer("/latency/max").and_then(Value::as_u64), Some(40));
    }

    #[test]
    fn empty_run_has_null_latency() {
        let results = qlat_core::RunResults {
            summary: None,
            latencies_us: Vec::new(),
            counters: qlat_core::CounterSnapshot::default(),
            run_duration: Duration::ZERO,
            end_reason: qlat_core::RunEndReason::AllConnectionsClosed,
            degraded: true,
            overflowed_samples: 0,
            connection_errors: vec!["0: closed".to_string()],
        };

        let v: Value = match serde_json::to_value(build_summary_line(&results)) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert!(v.get("latency").is_some_and(Value::is_null));
        assert_eq!(v.get("requests_per_sec").and_then(Value::as_f64), Some(0.0));
        assert_eq!(v.get("degraded").and_then(Value::as_bool), Some(true));
    }
}
