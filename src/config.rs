// Gateway Configuration

use std::time::Duration;

/// Default listen interface
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;
/// Default idle cutoff (seconds)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 45;
/// Default keepalive ping cadence (seconds)
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 30;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,

    /// A connection with no inbound traffic for this long is closed, exactly
    /// as if the transport had closed.
    pub idle_timeout: Duration,

    /// Cadence of server-side WebSocket pings. A live-but-quiet client keeps
    /// refreshing its idle deadline through the pong replies.
    pub tick_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.idle_timeout, Duration::from_secs(45));
        assert_eq!(config.tick_interval, Duration::from_secs(30));
    }
}
