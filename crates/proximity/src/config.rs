use crate::signal::SignalConfig;
use shared::config::ProximityConfig;
use std::time::Duration;

/// Runtime tuning for one proximity service instance
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub signal: SignalConfig,
    /// Pause before the radio is reused after a terminal outcome
    pub settle_delay: Duration,
    /// How long a surfaced request waits for approve/decline
    pub decision_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long a ready link may go without a request before it is released
    pub link_idle_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::from(&ProximityConfig::default())
    }
}

impl From<&ProximityConfig> for HandshakeConfig {
    fn from(config: &ProximityConfig) -> Self {
        Self {
            signal: SignalConfig {
                smoothing_factor: config.smoothing_factor,
                stability_tolerance: config.stability_tolerance,
                required_stable_readings: config.required_stable_readings,
                proximity_threshold: config.proximity_threshold,
                connect_threshold: config.connect_threshold,
                proximity_event_interval: Duration::from_millis(
                    config.proximity_event_interval_ms,
                ),
                ..SignalConfig::default()
            },
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            decision_timeout: Duration::from_secs(config.decision_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            link_idle_timeout: Duration::from_secs(config.link_idle_timeout_secs),
        }
    }
}
