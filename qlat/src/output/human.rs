use std::io::Write as _;

mod format;
mod summary;

use format::{format_bytes, format_micros};
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config: &qlat_core::LatencyConfig) {
        println!("target: {}:{}", config.target, config.port);
        println!(
            "connections={} parallel_requests={} run_time={:?}",
            config.connection_count, config.parallel_requests, config.run_time
        );
        println!(
            "request={} response={} client_ports={}",
            format_bytes(u64::from(config.request_length)),
            format_bytes(u64::from(config.response_length)),
            config.client_port_count
        );
        println!();
    }

    fn print_summary(&self, results: &qlat_core::RunResults) -> anyhow::Result<()> {
        let out = render(results);
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(out.as_bytes())?;
        stdout.flush()?;

        if let Some(s) = &results.summary {
            tracing::debug!(
                p50 = %format_micros(s.p50_us),
                p99 = %format_micros(s.p99_us),
                "latency summary printed"
            );
        }
        Ok(())
    }
}
