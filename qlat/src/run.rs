use anyhow::Context as _;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use qlat_core::{LatencyClient, RunResults, StopSignal};
use qlat_quic::{QuicSettings, QuicTransport};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);
    let cfg = args.latency_config();
    cfg.validate()
        .map_err(|e| RunError::InvalidInput(anyhow::Error::new(e).context("invalid run config")))?;

    let settings = QuicSettings::from_config(&cfg);
    let transport = QuicTransport::bind(&settings)
        .context("failed to set up QUIC client endpoints")
        .map_err(RunError::RuntimeError)?;

    out.print_header(&cfg);

    let mut client = LatencyClient::init(cfg, transport)?;
    let stop = StopSignal::new();
    let ctrl_c = tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; stopping run");
                stop.stop();
            }
        }
    });

    let outcome = match client.start(stop).await {
        Ok(()) => client.wait(Duration::ZERO).await,
        Err(err) => Err(err),
    };
    ctrl_c.abort();

    let (results, code) = match outcome {
        Ok(results) => {
            let code = ExitCode::from_degraded(results.degraded);
            (results, code)
        }
        Err(qlat_core::Error::ShutdownTimeout {
            timeout,
            pending,
            results,
        }) => {
            tracing::warn!(?timeout, pending, "connections were force-closed");
            (*results, ExitCode::Degraded)
        }
        Err(qlat_core::Error::AllConnectionsFailed { errors, results }) => {
            out.print_summary(&results).map_err(RunError::RuntimeError)?;
            return Err(RunError::RuntimeError(anyhow::anyhow!(
                "all connections failed ({} errors)",
                errors.len()
            )));
        }
        Err(err) => return Err(err.into()),
    };

    out.print_summary(&results).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.latency_file {
        write_latency_file(path, &results)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    client.transport().wait_idle().await;
    Ok(code)
}

async fn write_latency_file(path: &Path, results: &RunResults) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("failed to create latency file dir: {}", parent.display())
        })?;
    }

    let body = render_latencies(&results.latencies_us);
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write latency file: {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        samples = results.latencies_us.len(),
        "latency file written"
    );
    Ok(())
}

fn render_latencies(latencies_us: &[u32]) -> String {
    let mut body = String::with_capacity(latencies_us.len() * 8);
    for us in latencies_us {
        writeln!(&mut body, "{us}").ok();
    }
    body
}
