use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 4433;
pub const DEFAULT_RUN_TIME: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECTION_COUNT: u32 = 1;
pub const DEFAULT_PARALLEL_REQUESTS: u32 = 1;
pub const DEFAULT_REQUEST_LENGTH: u32 = 0;
pub const DEFAULT_RESPONSE_LENGTH: u32 = 0;
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLIENT_PORT_COUNT: u32 = 4;

/// Connections are spread over at most this many local UDP ports.
pub const MAX_CLIENT_PORT_COUNT: u32 = 4;

/// Largest request/response payload accepted by validation.
pub const MAX_PAYLOAD_LENGTH: u32 = 16 * 1024 * 1024;

/// Every request starts with the requested response size as a big-endian `u64`.
pub const RESPONSE_SIZE_PREFIX_LEN: usize = 8;

/// Completion rate the sample store is sized for when no explicit capacity is set.
pub const MAX_REQUESTS_PER_SECOND: u64 = 2_000_000;

/// Hard cap on sample slots (4 bytes each).
pub const MAX_SAMPLE_CAPACITY: u64 = (u32::MAX / 4) as u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("`target` must be a non-empty host name or address")]
    EmptyTarget,

    #[error("`port` must be in 1..=65535")]
    InvalidPort,

    #[error("`run_time` must be a positive duration")]
    InvalidRunTime,

    #[error("`connection_count` must be a positive integer")]
    InvalidConnectionCount,

    #[error("`parallel_requests` must be a positive integer")]
    InvalidParallelRequests,

    #[error("`{field}` must be at most {max} bytes (got {value})", max = MAX_PAYLOAD_LENGTH)]
    PayloadTooLarge { field: &'static str, value: u32 },

    #[error("`client_port_count` must be in 1..={max} (got {0})", max = MAX_CLIENT_PORT_COUNT)]
    InvalidClientPortCount(u32),

    #[error("`startup_timeout` must be a positive duration")]
    InvalidStartupTimeout,

    #[error("`drain_timeout` must be a positive duration")]
    InvalidDrainTimeout,

    #[error(
        "sample store would need {0} slots (max {max}); lower `run_time` or set `max_samples`",
        max = MAX_SAMPLE_CAPACITY
    )]
    SampleCapacityTooLarge(u64),
}

/// Shape of a latency run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyConfig {
    pub target: String,
    pub port: u16,
    pub run_time: Duration,
    pub connection_count: u32,
    /// Streams kept in flight per connection.
    pub parallel_requests: u32,
    pub request_length: u32,
    pub response_length: u32,

    /// How long `start` waits for connections to come up.
    pub startup_timeout: Duration,
    /// Default bound on the graceful drain in `wait`.
    pub drain_timeout: Duration,
    pub client_port_count: u32,

    /// Overrides the worst-case sizing of the sample store.
    pub max_samples: Option<u64>,
}

impl LatencyConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            port: DEFAULT_PORT,
            run_time: DEFAULT_RUN_TIME,
            connection_count: DEFAULT_CONNECTION_COUNT,
            parallel_requests: DEFAULT_PARALLEL_REQUESTS,
            request_length: DEFAULT_REQUEST_LENGTH,
            response_length: DEFAULT_RESPONSE_LENGTH,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            client_port_count: DEFAULT_CLIENT_PORT_COUNT,
            max_samples: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.run_time.is_zero() {
            return Err(ConfigError::InvalidRunTime);
        }
        if self.connection_count == 0 {
            return Err(ConfigError::InvalidConnectionCount);
        }
        if self.parallel_requests == 0 {
            return Err(ConfigError::InvalidParallelRequests);
        }
        if self.request_length > MAX_PAYLOAD_LENGTH {
            return Err(ConfigError::PayloadTooLarge {
                field: "request_length",
                value: self.request_length,
            });
        }
        if self.response_length > MAX_PAYLOAD_LENGTH {
            return Err(ConfigError::PayloadTooLarge {
                field: "response_length",
                value: self.response_length,
            });
        }
        if self.client_port_count == 0 || self.client_port_count > MAX_CLIENT_PORT_COUNT {
            return Err(ConfigError::InvalidClientPortCount(self.client_port_count));
        }
        if self.startup_timeout.is_zero() {
            return Err(ConfigError::InvalidStartupTimeout);
        }
        if self.drain_timeout.is_zero() {
            return Err(ConfigError::InvalidDrainTimeout);
        }

        self.sample_capacity().map(|_| ())
    }

    /// Bytes written on every request stream: the response size prefix followed
    /// by `request_length` zero bytes.
    pub fn request_payload(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(RESPONSE_SIZE_PREFIX_LEN + self.request_length as usize);
        buf.put_u64(u64::from(self.response_length));
        buf.put_bytes(0, self.request_length as usize);
        buf.freeze()
    }

    /// Number of latency slots to allocate for the whole run.
    ///
    /// Without `max_samples` this assumes every second of the run (rounded up) can
    /// complete [`MAX_REQUESTS_PER_SECOND`] requests.
    pub fn sample_capacity(&self) -> Result<usize, ConfigError> {
        let wanted = match self.max_samples {
            Some(n) => n,
            None => {
                let secs = self.run_time.as_secs()
                    + u64::from(self.run_time.subsec_nanos() != 0);
                secs.saturating_mul(MAX_REQUESTS_PER_SECOND)
            }
        };

        if wanted > MAX_SAMPLE_CAPACITY {
            return Err(ConfigError::SampleCapacityTooLarge(wanted));
        }

        usize::try_from(wanted).map_err(|_| ConfigError::SampleCapacityTooLarge(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = LatencyConfig::new("localhost");
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.port, 4433);
        assert_eq!(cfg.run_time, Duration::from_secs(10));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let base = LatencyConfig::new("localhost");

        let cfg = LatencyConfig {
            target: "  ".to_string(),
            ..base.clone()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyTarget));

        let cfg = LatencyConfig {
            port: 0,
            ..base.clone()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidPort));

        let cfg = LatencyConfig {
            connection_count: 0,
            ..base.clone()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidConnectionCount));

        let cfg = LatencyConfig {
            parallel_requests: 0,
            ..base.clone()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidParallelRequests));

        let cfg = LatencyConfig {
            response_length: MAX_PAYLOAD_LENGTH + 1,
            ..base.clone()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::PayloadTooLarge {
                field: "response_length",
                ..
            })
        ));

        let cfg = LatencyConfig {
            client_port_count: 5,
            ..base.clone()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidClientPortCount(5)));

        let cfg = LatencyConfig {
            run_time: Duration::ZERO,
            ..base
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidRunTime));
    }

    #[test]
    fn request_payload_carries_response_size() {
        let cfg = LatencyConfig {
            request_length: 3,
            response_length: 0x0102,
            ..LatencyConfig::new("localhost")
        };
        let payload = cfg.request_payload();
        assert_eq!(payload.len(), RESPONSE_SIZE_PREFIX_LEN + 3);
        assert_eq!(&payload[..], &[0, 0, 0, 0, 0, 0, 1, 2, 0, 0, 0]);
    }

    #[test]
    fn sample_capacity_rounds_partial_seconds_up() {
        let cfg = LatencyConfig {
            run_time: Duration::from_millis(1500),
            ..LatencyConfig::new("localhost")
        };
        assert_eq!(
            cfg.sample_capacity(),
            Ok((2 * MAX_REQUESTS_PER_SECOND) as usize)
        );
    }

    #[test]
    fn sample_capacity_honors_override_and_cap() {
        let cfg = LatencyConfig {
            max_samples: Some(128),
            ..LatencyConfig::new("localhost")
        };
        assert_eq!(cfg.sample_capacity(), Ok(128));

        let cfg = LatencyConfig {
            run_time: Duration::from_secs(3600),
            ..LatencyConfig::new("localhost")
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::SampleCapacityTooLarge(_))
        ));
    }
}
