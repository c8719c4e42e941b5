use std::time::Duration;

use crate::handshake::MUX_VERSION;

/// Default bound of a stream's inbound queue, in messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Tunables shared by clients and servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Messages buffered per stream before new ones are dropped.
    pub queue_capacity: usize,
    /// How long `dial_stream` waits for a live connection.
    pub dial_ready_timeout: Duration,
    /// Interval at which the reconnect supervisor checks connection health.
    pub health_poll_interval: Duration,
    /// Pause after a failed reconnect attempt.
    pub reconnect_delay: Duration,
    /// Protocol version advertised in the capability header.
    pub mux_version: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dial_ready_timeout: Duration::from_secs(3),
            health_poll_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(1),
            mux_version: MUX_VERSION.to_string(),
        }
    }
}

impl TunnelConfig {
    /// Override the per-stream queue bound. Zero is raised to one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_dial_ready_timeout(mut self, timeout: Duration) -> Self {
        self.dial_ready_timeout = timeout;
        self
    }

    pub fn with_health_poll_interval(mut self, interval: Duration) -> Self {
        self.health_poll_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_mux_version(mut self, version: impl Into<String>) -> Self {
        self.mux_version = version.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.dial_ready_timeout, Duration::from_secs(3));
        assert_eq!(config.health_poll_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.mux_version, "1.0");
    }

    #[test]
    fn builders_override() {
        let config = TunnelConfig::default()
            .with_queue_capacity(0)
            .with_reconnect_delay(Duration::from_millis(50))
            .with_mux_version("1.3");
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.reconnect_delay, Duration::from_millis(50));
        assert_eq!(config.mux_version, "1.3");
    }
}
