use std::time::Duration;

use time::Time;

use super::CircuitId;
use crate::config::ConfigError;
use crate::hw_trait::gpio::{PinValue, Pull};

/// Immutable configuration of one monitored circuit.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub id: CircuitId,

    /// Human-readable name used in alert messages.
    pub description: Option<String>,

    pub input_pin: u32,

    /// Raw level that means the safety condition is not satisfied.
    pub active_level: PinValue,

    pub pull: Pull,

    /// Sampling cadence. Must be non-zero.
    pub poll_interval: Duration,

    /// How long a fault may persist before a timeout alert. Must be
    /// non-zero.
    pub timeout: Duration,

    /// Minimum time a changed level must hold before it becomes a
    /// transition. Zero acts on the first differing sample.
    pub debounce: Duration,

    /// Minimum spacing between two authorized notifications.
    pub cooldown: Duration,

    /// Authorized notifications per reset-to-reset window. Zero silences
    /// the circuit.
    pub daily_quota: u32,

    /// Local time of day at which the daily count resets.
    pub quota_reset_time: Time,
}

impl CircuitConfig {
    /// Create a configuration with the default timings.
    pub fn new(id: impl Into<CircuitId>, input_pin: u32) -> Self {
        Self {
            id: id.into(),
            description: None,
            input_pin,
            active_level: PinValue::Low,
            pull: Pull::Up,
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
            debounce: Duration::ZERO,
            cooldown: Duration::from_secs(5 * 60),
            daily_quota: 50,
            quota_reset_time: Time::MIDNIGHT,
        }
    }

    /// Name shown to people: the description if set, the id otherwise.
    pub fn display_name(&self) -> &str {
        self.description.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scope = || format!("circuit `{}`", self.id);

        if self.id.as_str().trim().is_empty() {
            return Err(ConfigError::invalid("circuit", "id", "must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid(scope(), "poll_interval", "must be > 0"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid(scope(), "timeout", "must be > 0"));
        }
        if self.debounce >= self.timeout {
            return Err(ConfigError::invalid(
                scope(),
                "debounce",
                "must be shorter than the timeout",
            ));
        }
        Ok(())
    }
}
