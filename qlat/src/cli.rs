use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// A single JSON summary line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "qlat",
    author,
    version,
    about = "QUIC request/response latency measurement client",
    long_about = "qlat opens a fixed number of QUIC connections to a perf server, keeps a fixed number of request streams in flight on each, and reports the round-trip latency distribution of every completed request.\n\nThe server must speak the `perf` ALPN: read each bidirectional stream to its end, then reply with the requested number of bytes.",
    after_help = "Examples:\n  qlat run --target 127.0.0.1\n  qlat run --target perf.example.com --conns 4 --requests 8 --run-time 30s\n  qlat run --target 127.0.0.1 --response 1024 --output json --latency-file latencies.txt"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a latency measurement
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Server host name or address
    #[arg(long, env = "QLAT_TARGET")]
    pub target: String,

    /// Server UDP port
    #[arg(long, default_value_t = qlat_core::DEFAULT_PORT)]
    pub port: u16,

    /// Measurement duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub run_time: Duration,

    /// Number of connections
    #[arg(long, default_value_t = qlat_core::DEFAULT_CONNECTION_COUNT)]
    pub conns: u32,

    /// Requests kept in flight per connection
    #[arg(long, default_value_t = qlat_core::DEFAULT_PARALLEL_REQUESTS)]
    pub requests: u32,

    /// Request payload size in bytes
    #[arg(long, default_value_t = qlat_core::DEFAULT_REQUEST_LENGTH)]
    pub request: u32,

    /// Response size in bytes the server is asked for
    #[arg(long, default_value_t = qlat_core::DEFAULT_RESPONSE_LENGTH)]
    pub response: u32,

    /// Local UDP sockets to spread connections over
    #[arg(long, default_value_t = qlat_core::DEFAULT_CLIENT_PORT_COUNT)]
    pub client_ports: u32,

    /// How long to wait for connections to come up
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub startup_timeout: Duration,

    /// How long to wait for connections to drain after the run
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub drain_timeout: Duration,

    /// Latency samples to keep (defaults to what the run time can produce at the
    /// maximum request rate; required for very long runs)
    #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_samples: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write every latency sample (microseconds, ascending, one per line) to this file
    #[arg(long, value_name = "PATH")]
    pub latency_file: Option<PathBuf>,
}

impl RunArgs {
    pub fn latency_config(&self) -> qlat_core::LatencyConfig {
        qlat_core::LatencyConfig {
            port: self.port,
            run_time: self.run_time,
            connection_count: self.conns,
            parallel_requests: self.requests,
            request_length: self.request,
            response_length: self.response,
            startup_timeout: self.startup_timeout,
            drain_timeout: self.drain_timeout,
            client_port_count: self.client_ports,
            max_samples: self.max_samples,
            ..qlat_core::LatencyConfig::new(self.target.clone())
        }
    }
}
