use std::time::Duration;

use qlat_core::mock::{MockConfig, MockTransport};
use qlat_core::{Error, LatencyClient, LatencyConfig, RunEndReason, RunResults, StopSignal};

fn config(connections: u32, parallel: u32, run_time: Duration) -> LatencyConfig {
    LatencyConfig {
        connection_count: connections,
        parallel_requests: parallel,
        run_time,
        startup_timeout: Duration::from_secs(2),
        drain_timeout: Duration::from_secs(2),
        max_samples: Some(200_000),
        ..LatencyConfig::new("mock")
    }
}

async fn run(
    cfg: LatencyConfig,
    transport: MockTransport,
) -> (Result<RunResults, Error>, MockTransport) {
    let mut client = LatencyClient::init(cfg, transport.clone())
        .unwrap_or_else(|e| panic!("config should be valid: {e}"));
    client
        .start(StopSignal::new())
        .await
        .unwrap_or_else(|e| panic!("start failed: {e}"));
    let results = client.wait(Duration::ZERO).await;
    (results, transport)
}

fn assert_balanced(results: &RunResults) {
    let c = &results.counters;
    assert!(c.completed_requests <= c.started_requests);
    assert_eq!(
        c.started_requests,
        c.completed_requests + c.aborted_requests + c.abandoned_requests + c.late_completions,
        "every started request must be accounted for: {c:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_connection_measures_response_delay() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(10),
        ..MockConfig::default()
    });

    let (results, _) = run(config(1, 1, Duration::from_secs(1)), transport).await;
    let results = results.unwrap_or_else(|e| panic!("run failed: {e}"));

    // Timer ticks are 1ms, so each round trip takes 10-11ms.
    assert!(
        results.latencies_us.len() >= 85,
        "too few samples: {}",
        results.latencies_us.len()
    );
    let summary = results
        .summary
        .as_ref()
        .unwrap_or_else(|| panic!("expected a summary"));
    assert!(summary.min_us >= 10_000, "min {}us", summary.min_us);
    assert!(summary.p50_us < 20_000, "p50 {}us", summary.p50_us);
    assert_eq!(results.end_reason, RunEndReason::RunTimeElapsed);
    assert!(!results.degraded);
    assert_eq!(results.counters.completed_requests, results.latencies_us.len() as u64);
    assert_balanced(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_survives_one_failed_connection() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(2),
        fail_after_connect: vec![2],
        fail_delay: Duration::from_millis(5),
        ..MockConfig::default()
    });

    let (results, _) = run(config(4, 8, Duration::from_millis(500)), transport).await;
    let results = results.unwrap_or_else(|e| panic!("run failed: {e}"));

    assert!(results.counters.completed_requests > 0);
    assert_eq!(results.counters.failed_connections, 1);
    assert_eq!(results.connection_errors.len(), 1);
    assert!(results.connection_errors[0].starts_with("#2:"));
    assert_eq!(results.counters.active_connections, 0);
    assert_balanced(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_right_after_start_drains_cleanly() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(5),
        ..MockConfig::default()
    });
    let mut client = LatencyClient::init(config(2, 4, Duration::from_secs(30)), transport.clone())
        .unwrap_or_else(|e| panic!("config should be valid: {e}"));

    let stop = StopSignal::new();
    client
        .start(stop.clone())
        .await
        .unwrap_or_else(|e| panic!("start failed: {e}"));
    stop.stop();

    let results = client
        .wait(Duration::ZERO)
        .await
        .unwrap_or_else(|e| panic!("wait failed: {e}"));

    assert_eq!(results.end_reason, RunEndReason::StopRequested);
    assert!(!results.degraded);
    // Only the initial burst can have gone out.
    assert!(results.counters.started_requests <= 8);
    assert_eq!(
        results.counters.completed_requests,
        results.counters.started_requests
    );
    assert_eq!(transport.stats().aborts(), 0);
    assert_balanced(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_runs_produce_identical_sample_counts() {
    let mut sizes = Vec::new();
    for _ in 0..2 {
        let transport = MockTransport::new(MockConfig {
            response_delay: Duration::from_millis(1),
            request_budget: Some(50),
            ..MockConfig::default()
        });
        let (results, _) = run(config(2, 4, Duration::from_millis(300)), transport).await;
        let results = results.unwrap_or_else(|e| panic!("run failed: {e}"));
        assert_balanced(&results);
        sizes.push(results.latencies_us.len());
    }

    assert_eq!(sizes, vec![50, 50]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outstanding_requests_never_exceed_parallelism() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(5),
        ..MockConfig::default()
    });

    let (results, transport) = run(config(3, 4, Duration::from_millis(300)), transport).await;
    let results = results.unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(transport.stats().peak_streams_per_connection(), 4);
    assert_eq!(
        results.counters.completed_requests,
        results.counters.started_requests
    );
    assert_balanced(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backpressure_defers_and_retries() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(2),
        max_streams: Some(2),
        ..MockConfig::default()
    });

    let (results, transport) = run(config(1, 8, Duration::from_millis(300)), transport).await;
    let results = results.unwrap_or_else(|e| panic!("run failed: {e}"));

    assert!(transport.stats().peak_streams_per_connection() <= 2);
    assert!(transport.stats().streams_blocked() > 0);
    assert!(results.counters.deferred_requests > 0);
    assert!(results.counters.completed_requests > 0);
    assert_balanced(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drain_timeout_returns_partial_results() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(1),
        hang_on_shutdown: true,
        ..MockConfig::default()
    });
    let mut client = LatencyClient::init(config(2, 2, Duration::from_millis(200)), transport.clone())
        .unwrap_or_else(|e| panic!("config should be valid: {e}"));
    client
        .start(StopSignal::new())
        .await
        .unwrap_or_else(|e| panic!("start failed: {e}"));

    match client.wait(Duration::from_millis(100)).await {
        Err(Error::ShutdownTimeout {
            timeout,
            pending,
            results,
        }) => {
            assert_eq!(timeout, Duration::from_millis(100));
            assert_eq!(pending, 2);
            assert!(results.degraded);
            assert!(results.counters.completed_requests > 0);
            assert_balanced(&results);
        }
        other => panic!("expected a shutdown timeout, got {other:?}"),
    }
    assert_eq!(transport.stats().aborts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_in_flight_at_drain_timeout_are_abandoned() {
    let transport = MockTransport::new(MockConfig {
        stall_streams: true,
        ..MockConfig::default()
    });
    let mut client = LatencyClient::init(config(2, 4, Duration::from_millis(100)), transport.clone())
        .unwrap_or_else(|e| panic!("config should be valid: {e}"));
    client
        .start(StopSignal::new())
        .await
        .unwrap_or_else(|e| panic!("start failed: {e}"));

    match client.wait(Duration::from_millis(100)).await {
        Err(Error::ShutdownTimeout {
            pending, results, ..
        }) => {
            // Outstanding streams keep both connections from closing gracefully.
            assert_eq!(pending, 2);
            assert!(results.degraded);

            let c = &results.counters;
            assert_eq!(c.started_requests, 8);
            assert_eq!(c.completed_requests, 0);
            assert_eq!(c.abandoned_requests, 8);
            assert_eq!(c.active_connections, 0);
            assert!(results.latencies_us.is_empty());
            assert_balanced(&results);
        }
        other => panic!("expected a shutdown timeout, got {other:?}"),
    }
    assert_eq!(transport.stats().shutdowns(), 0);
    assert_eq!(transport.stats().aborts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn degraded_samples_match_completed_count() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(1),
        hang_on_shutdown: true,
        ..MockConfig::default()
    });
    let mut client = LatencyClient::init(config(4, 8, Duration::from_millis(200)), transport)
        .unwrap_or_else(|e| panic!("config should be valid: {e}"));
    client
        .start(StopSignal::new())
        .await
        .unwrap_or_else(|e| panic!("start failed: {e}"));

    let results = match client.wait(Duration::from_millis(50)).await {
        Err(Error::ShutdownTimeout { results, .. }) => results,
        other => panic!("expected a shutdown timeout, got {other:?}"),
    };
    assert_eq!(
        results.latencies_us.len() as u64 + results.overflowed_samples,
        results.counters.completed_requests
    );
    assert_balanced(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_fails_when_no_connection_comes_up() {
    let transport = MockTransport::new(MockConfig {
        refuse: vec![0, 1],
        ..MockConfig::default()
    });
    let mut client = LatencyClient::init(config(2, 1, Duration::from_secs(1)), transport)
        .unwrap_or_else(|e| panic!("config should be valid: {e}"));

    match client.start(StopSignal::new()).await {
        Err(Error::ConnectFailed { attempted, errors }) => {
            assert_eq!(attempted, 2);
            assert_eq!(errors.len(), 2);
            assert!(errors[0].contains("connection refused"));
        }
        other => panic!("expected ConnectFailed, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_handshake_is_abandoned_after_startup_timeout() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(2),
        never_connect: vec![1],
        ..MockConfig::default()
    });
    let cfg = LatencyConfig {
        startup_timeout: Duration::from_millis(200),
        ..config(2, 2, Duration::from_millis(200))
    };

    let (results, _) = run(cfg, transport).await;
    let results = results.unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(results.counters.failed_connections, 1);
    assert!(results.connection_errors[0].starts_with("#1:"));
    assert!(results.counters.completed_requests > 0);
    assert_balanced(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn losing_every_connection_ends_the_run_early() {
    let transport = MockTransport::new(MockConfig {
        response_delay: Duration::from_millis(1),
        fail_after_connect: vec![0],
        fail_delay: Duration::from_millis(20),
        ..MockConfig::default()
    });

    let started = std::time::Instant::now();
    let (results, _) = run(config(1, 2, Duration::from_secs(30)), transport).await;
    assert!(started.elapsed() < Duration::from_secs(10));

    match results {
        Err(Error::AllConnectionsFailed { errors, results }) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(results.end_reason, RunEndReason::AllConnectionsClosed);
            assert_balanced(&results);
        }
        other => panic!("expected AllConnectionsFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn lifecycle_misuse_is_rejected() {
    let transport = MockTransport::new(MockConfig::default());
    let mut client = LatencyClient::init(config(1, 1, Duration::from_millis(50)), transport)
        .unwrap_or_else(|e| panic!("config should be valid: {e}"));

    assert!(matches!(
        client.wait(Duration::ZERO).await,
        Err(Error::NotStarted)
    ));

    client
        .start(StopSignal::new())
        .await
        .unwrap_or_else(|e| panic!("start failed: {e}"));
    assert!(matches!(
        client.start(StopSignal::new()).await,
        Err(Error::AlreadyStarted)
    ));

    client
        .wait(Duration::ZERO)
        .await
        .unwrap_or_else(|e| panic!("wait failed: {e}"));
}

#[test]
fn invalid_config_is_rejected_before_any_connection() {
    let transport = MockTransport::new(MockConfig::default());
    let cfg = LatencyConfig {
        parallel_requests: 0,
        ..LatencyConfig::new("mock")
    };

    match LatencyClient::init(cfg, transport.clone()) {
        Err(Error::Config(_)) => {}
        Err(other) => panic!("expected a config error, got {other}"),
        Ok(_) => panic!("expected a config error"),
    }
    assert_eq!(transport.stats().connections_opened(), 0);
}
