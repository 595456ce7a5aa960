mod config;
mod error;

pub mod engine;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod transport;

pub use config::{
    ConfigError, DEFAULT_CLIENT_PORT_COUNT, DEFAULT_CONNECTION_COUNT, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_PARALLEL_REQUESTS, DEFAULT_PORT, DEFAULT_REQUEST_LENGTH, DEFAULT_RESPONSE_LENGTH,
    DEFAULT_RUN_TIME, DEFAULT_STARTUP_TIMEOUT, LatencyConfig, MAX_CLIENT_PORT_COUNT,
    MAX_PAYLOAD_LENGTH, MAX_REQUESTS_PER_SECOND, MAX_SAMPLE_CAPACITY, RESPONSE_SIZE_PREFIX_LEN,
};
pub use engine::{
    CounterSnapshot, LatencyClient, LatencySummary, RunEndReason, RunResults, StopSignal,
};
pub use error::{Error, Result};
