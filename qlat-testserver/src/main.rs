use std::net::SocketAddr;
use std::time::Duration;

use qlat_testserver::{ServerConfig, TestServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut bind_addr: SocketAddr = "127.0.0.1:4433".parse()?;
    let mut config = ServerConfig::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:4433")
                })?;
                bind_addr = addr.parse()?;
            }
            "--response" => {
                let len = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--response requires a byte count"))?;
                config.response_length = len.parse()?;
            }
            "--delay" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--delay requires milliseconds"))?;
                config.delay = Duration::from_millis(ms.parse()?);
            }
            "-h" | "--help" => {
                eprintln!(
                    "qlat-testserver\n\nUSAGE:\n  qlat-testserver [--bind 127.0.0.1:4433] [--response BYTES] [--delay MS]\n\nOUTPUT:\n  Prints QUIC_ADDR=<host:port> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let server = TestServer::start_with(config, bind_addr).await?;
    println!("QUIC_ADDR={}", server.addr());

    let _ = tokio::signal::ctrl_c().await;
    server.shutdown().await;
    Ok(())
}
