use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub proximity: ProximityConfig,
    pub node: NodeConfig,
}

/// Tuning for the proximity handshake engine
#[derive(Debug, Clone, Deserialize)]
pub struct ProximityConfig {
    /// EMA weight given to each new RSSI sample (default: 0.15)
    pub smoothing_factor: f64,
    /// Maximum drift between consecutive smoothed values that still counts as stable (default: 3.0)
    pub stability_tolerance: f64,
    /// Stable readings required before a connection may be attempted (default: 3)
    pub required_stable_readings: u32,
    /// Smoothed RSSI at which the peer is considered in range (default: -45)
    pub proximity_threshold: f64,
    /// Smoothed RSSI at which a connection may be attempted (default: -30)
    pub connect_threshold: f64,
    /// Minimum spacing between "proximity entered" events in milliseconds (default: 500)
    pub proximity_event_interval_ms: u64,
    /// Delay before the radio is reused after a payment in milliseconds (default: 750)
    pub settle_delay_ms: u64,
    /// Time the customer has to approve or decline in seconds (default: 60)
    pub decision_timeout_secs: u64,
    /// Upper bound on a single connection attempt in seconds (default: 10)
    pub connect_timeout_secs: u64,
    /// How long a ready link may stay silent before it is released (default: 10)
    pub link_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RadioBackend {
    Loopback,
    Btleplug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DecisionPolicy {
    Approve,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub radio: RadioBackend,
    pub decision: DecisionPolicy,
    pub wallet_address: String,
    pub log_format: LogFormat,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.15,
            stability_tolerance: 3.0,
            required_stable_readings: 3,
            proximity_threshold: -45.0,
            connect_threshold: -30.0,
            proximity_event_interval_ms: 500,
            settle_delay_ms: 750,
            decision_timeout_secs: 60,
            connect_timeout_secs: 10,
            link_idle_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let proximity = ProximityConfig {
            smoothing_factor: env::var("TAP_SMOOTHING_FACTOR")
                .unwrap_or_else(|_| "0.15".to_string())
                .parse()?,
            stability_tolerance: env::var("TAP_STABILITY_TOLERANCE")
                .unwrap_or_else(|_| "3.0".to_string())
                .parse()?,
            required_stable_readings: env::var("TAP_REQUIRED_STABLE_READINGS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            proximity_threshold: env::var("TAP_PROXIMITY_THRESHOLD")
                .unwrap_or_else(|_| "-45".to_string())
                .parse()?,
            connect_threshold: env::var("TAP_CONNECT_THRESHOLD")
                .unwrap_or_else(|_| "-30".to_string())
                .parse()?,
            proximity_event_interval_ms: env::var("TAP_PROXIMITY_EVENT_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,
            settle_delay_ms: env::var("TAP_SETTLE_DELAY_MS")
                .unwrap_or_else(|_| "750".to_string())
                .parse()?,
            decision_timeout_secs: env::var("TAP_DECISION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            connect_timeout_secs: env::var("TAP_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            link_idle_timeout_secs: env::var("TAP_LINK_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        if proximity.connect_threshold < proximity.proximity_threshold {
            anyhow::bail!(
                "TAP_CONNECT_THRESHOLD ({}) must not be looser than TAP_PROXIMITY_THRESHOLD ({})",
                proximity.connect_threshold,
                proximity.proximity_threshold
            );
        }
        if !(0.0..=1.0).contains(&proximity.smoothing_factor) {
            anyhow::bail!(
                "TAP_SMOOTHING_FACTOR must be within 0..=1, got {}",
                proximity.smoothing_factor
            );
        }

        let node = NodeConfig {
            radio: parse_radio(&env::var("TAP_RADIO").unwrap_or_else(|_| "loopback".to_string()))?,
            decision: parse_decision(
                &env::var("TAP_DECISION").unwrap_or_else(|_| "approve".to_string()),
            )?,
            wallet_address: env::var("TAP_WALLET_ADDRESS")
                .unwrap_or_else(|_| "0xC0FFEE0000000000000000000000000000000001".to_string()),
            log_format: match env::var("LOG_FORMAT").unwrap_or_default().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config { proximity, node })
    }
}

fn parse_radio(value: &str) -> anyhow::Result<RadioBackend> {
    match value.to_ascii_lowercase().as_str() {
        "loopback" => Ok(RadioBackend::Loopback),
        "btleplug" | "ble" => Ok(RadioBackend::Btleplug),
        other => anyhow::bail!("Unknown TAP_RADIO backend: {}", other),
    }
}

fn parse_decision(value: &str) -> anyhow::Result<DecisionPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "approve" => Ok(DecisionPolicy::Approve),
        "decline" => Ok(DecisionPolicy::Decline),
        other => anyhow::bail!("Unknown TAP_DECISION policy: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_proximity_config_thresholds_are_ordered() {
        let config = ProximityConfig::default();
        assert!(config.connect_threshold > config.proximity_threshold);
        assert_eq!(config.required_stable_readings, 3);
        assert_eq!(config.proximity_event_interval_ms, 500);
    }

    #[test]
    fn test_parse_radio() {
        assert_eq!(parse_radio("loopback").unwrap(), RadioBackend::Loopback);
        assert_eq!(parse_radio("BTLEPLUG").unwrap(), RadioBackend::Btleplug);
        assert!(parse_radio("zigbee").is_err());
    }

    #[test]
    fn test_parse_decision() {
        assert_eq!(parse_decision("approve").unwrap(), DecisionPolicy::Approve);
        assert_eq!(parse_decision("Decline").unwrap(), DecisionPolicy::Decline);
        assert!(parse_decision("maybe").is_err());
    }
}
