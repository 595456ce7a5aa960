use std::fmt::Write as _;

use super::format::*;

pub(crate) fn render(results: &qlat_core::RunResults) -> String {
    let mut out = String::new();
    let c = &results.counters;

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  duration: {:?} (ended: {})",
        results.run_duration, results.end_reason
    )
    .ok();
    writeln!(
        &mut out,
        "  connections: active {} failed {}",
        c.active_connections, c.failed_connections
    )
    .ok();
    writeln!(
        &mut out,
        "  requests: started {} completed {} aborted {} abandoned {} late {}",
        c.started_requests,
        c.completed_requests,
        c.aborted_requests,
        c.abandoned_requests,
        c.late_completions
    )
    .ok();
    if c.deferred_requests > 0 {
        writeln!(&mut out, "  deferred sends: {}", c.deferred_requests).ok();
    }
    writeln!(
        &mut out,
        "  bytes: recv {} sent {}",
        format_bytes(c.bytes_received),
        format_bytes(c.bytes_sent)
    )
    .ok();
    writeln!(
        &mut out,
        "  rates: rps={}",
        format_rate(results.requests_per_sec())
    )
    .ok();

    match &results.summary {
        Some(s) => {
            writeln!(
                &mut out,
                "  latency = min={} p50={} p90={} p99={} p99.9={} p99.99={} max={} (n={})",
                format_micros(s.min_us),
                format_micros(s.p50_us),
                format_micros(s.p90_us),
                format_micros(s.p99_us),
                format_micros(s.p99_9_us),
                format_micros(s.p99_99_us),
                format_micros(s.max_us),
                s.count
            )
            .ok();
            writeln!(
                &mut out,
                "  latency mean={} stdev={}",
                format_micros_f64(s.mean_us),
                format_micros_f64(s.stdev_us)
            )
            .ok();
        }
        None => out.push_str("  latency: n/a\n"),
    }

    if results.overflowed_samples > 0 {
        writeln!(
            &mut out,
            "  samples dropped (store full): {}",
            results.overflowed_samples
        )
        .ok();
    }
    if results.degraded {
        out.push_str("  warning: drain timed out, results are partial\n");
    }
    if !results.connection_errors.is_empty() {
        out.push_str("connection errors\n");
        for e in &results.connection_errors {
            writeln!(&mut out, "  {e}").ok();
        }
    }

    out
}
