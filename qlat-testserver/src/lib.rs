use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use quinn::crypto::rustls::QuicServerConfig;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use tokio::sync::oneshot;

/// ALPN the perf client and this server agree on.
pub const ALPN_PERF: &[u8] = b"perf";

const MAX_CONCURRENT_STREAMS: u32 = 4_096;

/// Requests lead with the wanted response size as a big-endian `u64`.
const SIZE_PREFIX_LEN: usize = 8;
const MAX_RESPONSE_LENGTH: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bytes written back when a request is too short to carry a size prefix.
    pub response_length: usize,
    /// Artificial delay between reading a request and replying.
    pub delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            response_length: 0,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    connections_total: Arc<AtomicU64>,
    requests_total: Arc<AtomicU64>,
    request_bytes: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_connections_total(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn add_request_bytes(&self, n: usize) {
        self.request_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn connections_total(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn request_bytes(&self) -> u64 {
        self.request_bytes.load(Ordering::Relaxed)
    }
}

/// QUIC perf server: reads each bidirectional stream to its end and answers with
/// `response_length` bytes.
pub struct TestServer {
    addr: SocketAddr,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        let bind: SocketAddr = "127.0.0.1:0".parse()?;
        Self::start_with(ServerConfig::default(), bind).await
    }

    pub async fn start_with(config: ServerConfig, bind: SocketAddr) -> anyhow::Result<Self> {
        let endpoint = quinn::Endpoint::server(build_server_config()?, bind)
            .with_context(|| format!("bind QUIC server on {bind}"))?;
        let addr = endpoint.local_addr()?;

        let stats = TestServerStats::default();
        let response = Bytes::from(vec![0x5a; config.response_length]);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(
            endpoint,
            config.delay,
            response,
            stats.clone(),
            shutdown_rx,
        ));

        tracing::debug!(%addr, "test server listening");

        Ok(Self {
            addr,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

async fn serve(
    endpoint: quinn::Endpoint,
    delay: Duration,
    response: Bytes,
    stats: TestServerStats,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let incoming = tokio::select! {
            incoming = endpoint.accept() => incoming,
            _ = &mut shutdown_rx => break,
        };
        let Some(incoming) = incoming else {
            break;
        };

        let response = response.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            match incoming.await {
                Ok(conn) => {
                    stats.inc_connections_total();
                    serve_connection(conn, delay, response, stats).await;
                }
                Err(err) => tracing::debug!(error = %err, "handshake failed"),
            }
        });
    }

    endpoint.close(0u32.into(), b"server shutdown");
    endpoint.wait_idle().await;
}

async fn serve_connection(
    conn: quinn::Connection,
    delay: Duration,
    response: Bytes,
    stats: TestServerStats,
) {
    loop {
        let (send, recv) = match conn.accept_bi().await {
            Ok(streams) => streams,
            Err(err) => {
                tracing::debug!(remote = %conn.remote_address(), reason = %err, "connection closed");
                return;
            }
        };

        let response = response.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            if let Err(err) = answer(send, recv, delay, response, &stats).await {
                tracing::debug!(error = %err, "request stream failed");
            }
        });
    }
}

async fn answer(
    mut send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    delay: Duration,
    response: Bytes,
    stats: &TestServerStats,
) -> anyhow::Result<()> {
    let mut received = 0usize;
    let mut prefix = [0u8; SIZE_PREFIX_LEN];
    while let Some(chunk) = recv.read_chunk(usize::MAX, true).await? {
        if received < SIZE_PREFIX_LEN {
            let n = (SIZE_PREFIX_LEN - received).min(chunk.bytes.len());
            prefix[received..received + n].copy_from_slice(&chunk.bytes[..n]);
        }
        received += chunk.bytes.len();
    }
    stats.inc_requests_total();
    stats.add_request_bytes(received);

    let response = if received >= SIZE_PREFIX_LEN {
        let wanted = u64::from_be_bytes(prefix);
        anyhow::ensure!(
            wanted <= MAX_RESPONSE_LENGTH,
            "requested response of {wanted} bytes exceeds {MAX_RESPONSE_LENGTH}"
        );
        if wanted as usize == response.len() {
            response
        } else {
            Bytes::from(vec![0x5a; wanted as usize])
        }
    } else {
        response
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if !response.is_empty() {
        send.write_all(&response).await?;
    }
    send.finish()?;
    Ok(())
}

fn build_server_config() -> anyhow::Result<quinn::ServerConfig> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let cert_der: CertificateDer<'static> = certified.cert.der().clone();
    let key_der = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut crypto = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der.into())
        .context("build server TLS config")?;
    crypto.alpn_protocols = vec![ALPN_PERF.to_vec()];

    let mut config =
        quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(crypto)?));
    let mut transport = quinn::TransportConfig::default();
    transport.max_concurrent_bidi_streams(MAX_CONCURRENT_STREAMS.into());
    config.transport_config(Arc::new(transport));
    Ok(config)
}
