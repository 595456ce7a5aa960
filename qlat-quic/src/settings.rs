use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use qlat_core::{LatencyConfig, MAX_CLIENT_PORT_COUNT};

use crate::error::{Error, Result};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicSettings {
    /// Local UDP sockets to spread connections over (round-robin).
    pub client_port_count: u32,
    pub bind_ip: IpAddr,
    pub idle_timeout: Duration,
    /// TLS server name; defaults to the target host.
    pub server_name: Option<String>,
}

impl Default for QuicSettings {
    fn default() -> Self {
        Self {
            client_port_count: qlat_core::DEFAULT_CLIENT_PORT_COUNT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            server_name: None,
        }
    }
}

impl QuicSettings {
    #[must_use]
    pub fn from_config(config: &LatencyConfig) -> Self {
        Self {
            client_port_count: config.client_port_count,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_port_count == 0 || self.client_port_count > MAX_CLIENT_PORT_COUNT {
            return Err(Error::InvalidPortCount {
                count: self.client_port_count,
                max: MAX_CLIENT_PORT_COUNT,
            });
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::IdleTimeout(self.idle_timeout));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_latency_config() {
        let cfg = LatencyConfig {
            client_port_count: 2,
            ..LatencyConfig::new("localhost")
        };
        let settings = QuicSettings::from_config(&cfg);
        assert_eq!(settings.client_port_count, 2);
        assert_eq!(settings.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_bad_port_count() {
        let settings = QuicSettings {
            client_port_count: 0,
            ..QuicSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidPortCount { count: 0, .. })
        ));
    }
}
