// Signal Filter - smooths raw RSSI into a stable proximity signal

use crate::types::{ProximitySample, SmoothedProximity, INVALID_RSSI};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub smoothing_factor: f64,
    pub stability_tolerance: f64,
    pub required_stable_readings: u32,
    /// Looser bound used for "in range" feedback
    pub proximity_threshold: f64,
    /// Stricter bound used before spending radio time on a connection
    pub connect_threshold: f64,
    pub cold_baseline: f64,
    pub proximity_event_interval: Duration,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.15,
            stability_tolerance: 3.0,
            required_stable_readings: 3,
            proximity_threshold: -45.0,
            connect_threshold: -30.0,
            cold_baseline: -100.0,
            proximity_event_interval: Duration::from_millis(500),
        }
    }
}

/// Result of feeding one valid sample through the filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityDecision {
    pub smoothed: f64,
    pub stable_readings: u32,
    pub in_range: bool,
    pub connect_ready: bool,
    /// Rate-limited "proximity entered" cue
    pub entered: bool,
}

pub struct SignalFilter {
    config: SignalConfig,
    state: SmoothedProximity,
    seeded: bool,
    in_range: bool,
    last_entered_at: Option<Instant>,
}

impl SignalFilter {
    pub fn new(config: SignalConfig) -> Self {
        let state = SmoothedProximity {
            value: config.cold_baseline,
            consecutive_stable_readings: 0,
        };
        Self {
            config,
            state,
            seeded: false,
            in_range: false,
            last_entered_at: None,
        }
    }

    /// Feed one sample. Returns `None` when the reading is invalid; the
    /// filter state is left untouched in that case.
    pub fn observe(&mut self, sample: ProximitySample) -> Option<ProximityDecision> {
        if !Self::is_valid(sample.raw_strength) {
            trace!(rssi = sample.raw_strength, "Rejected invalid RSSI sample");
            return None;
        }

        let raw = f64::from(sample.raw_strength);
        if self.seeded {
            let previous = self.state.value;
            let alpha = self.config.smoothing_factor;
            let smoothed = previous * (1.0 - alpha) + raw * alpha;

            if (smoothed - previous).abs() <= self.config.stability_tolerance {
                let stable = self.state.consecutive_stable_readings + 1;
                self.state.consecutive_stable_readings =
                    stable.min(self.config.required_stable_readings);
            } else {
                debug!(
                    previous,
                    smoothed, "Unstable RSSI jump, resetting consistency counter"
                );
                self.state.consecutive_stable_readings = 0;
            }
            self.state.value = smoothed;
        } else {
            self.state.value = raw;
            self.state.consecutive_stable_readings = 0;
            self.seeded = true;
        }

        let in_range = self.state.value >= self.config.proximity_threshold;
        let connect_ready = self.state.value >= self.config.connect_threshold
            && self.state.consecutive_stable_readings >= self.config.required_stable_readings;

        let mut entered = false;
        if in_range && !self.in_range {
            let spaced = self.last_entered_at.map_or(true, |last| {
                sample.timestamp.saturating_duration_since(last)
                    >= self.config.proximity_event_interval
            });
            if spaced {
                entered = true;
                self.last_entered_at = Some(sample.timestamp);
            }
        }
        self.in_range = in_range;

        Some(ProximityDecision {
            smoothed: self.state.value,
            stable_readings: self.state.consecutive_stable_readings,
            in_range,
            connect_ready,
            entered,
        })
    }

    /// Return to the cold baseline
    pub fn reset(&mut self) {
        self.state = SmoothedProximity {
            value: self.config.cold_baseline,
            consecutive_stable_readings: 0,
        };
        self.seeded = false;
        self.in_range = false;
    }

    pub fn current(&self) -> SmoothedProximity {
        self.state
    }

    pub fn is_in_range(&self) -> bool {
        self.in_range
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    fn is_valid(raw: i16) -> bool {
        raw != INVALID_RSSI && raw <= 0
    }
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}
