//! Daemon configuration.
//!
//! Settings come from a YAML file and can be overridden per key from the
//! environment using the `BARRIER` prefix and `__` as the nesting
//! separator, e.g. `BARRIER_MODEM__SERIAL_PORT=/dev/ttyAMA0`.
//!
//! The raw, file-shaped structs here are converted into validated domain
//! types (such as [`CircuitConfig`]) before anything runs, so invariant
//! violations surface at startup and never inside a polling loop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use time::Time;
use time::macros::format_description;

use crate::circuit::{CircuitConfig, CircuitId};
use crate::hw_trait::gpio::{PinValue, Pull};

/// Used when `BARRIER_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/barrier-monitor/config.yaml";

const ENV_PREFIX: &str = "BARRIER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid `{field}` for {scope}: {reason}")]
    Invalid {
        scope: String,
        field: &'static str,
        reason: String,
    },

    #[error("invalid time of day `{0}`, expected HH:MM")]
    TimeOfDay(String),
}

impl ConfigError {
    pub(crate) fn invalid(
        scope: impl Into<String>,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::Invalid {
            scope: scope.into(),
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Monitored circuits keyed by circuit id.
    #[serde(default)]
    pub circuits: BTreeMap<String, CircuitSettings>,

    #[serde(default)]
    pub gpio: GpioSettings,

    #[serde(default)]
    pub modem: ModemSettings,

    #[serde(default)]
    pub sms: SmsSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub api: ApiSettings,
}

impl Settings {
    /// Load from a YAML file, applying environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings: Settings = Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from YAML text, without environment overrides.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-cutting invariants. Circuits are validated again when
    /// converted with [`Settings::circuit_configs`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modem.queue_depth == 0 {
            return Err(ConfigError::invalid("modem", "queue_depth", "must be > 0"));
        }
        if self.modem.command_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "modem",
                "command_timeout_ms",
                "must be > 0",
            ));
        }
        if self.dispatch.queue_depth == 0 {
            return Err(ConfigError::invalid("dispatch", "queue_depth", "must be > 0"));
        }
        self.circuit_configs().map(|_| ())
    }

    /// Convert every configured circuit into a validated [`CircuitConfig`].
    pub fn circuit_configs(&self) -> Result<Vec<CircuitConfig>, ConfigError> {
        self.circuits
            .iter()
            .map(|(id, circuit)| circuit.to_config(id))
            .collect()
    }
}

/// One circuit as written in the settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitSettings {
    pub gpio_pin: u32,

    #[serde(default)]
    pub description: Option<String>,

    /// Raw level that means "fault" (beam broken / barrier open).
    #[serde(default = "default_active_level")]
    pub active_level: PinValue,

    #[serde(default = "default_pull")]
    pub pull: Pull,

    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// How long a new level must persist before it counts. Zero acts on
    /// the first differing sample.
    #[serde(default)]
    pub debounce_ms: u64,

    #[serde(default = "default_cooldown_min")]
    pub notification_cooldown_min: u64,

    #[serde(default = "default_max_daily_notifications")]
    pub max_daily_notifications: u32,

    /// Local time of day ("HH:MM") at which the daily quota resets.
    #[serde(default = "default_reset_time")]
    pub reset_time: String,
}

impl CircuitSettings {
    pub fn to_config(&self, id: &str) -> Result<CircuitConfig, ConfigError> {
        let config = CircuitConfig {
            id: CircuitId::new(id),
            description: self.description.clone(),
            input_pin: self.gpio_pin,
            active_level: self.active_level,
            pull: self.pull,
            poll_interval: Duration::from_millis(self.check_interval_ms),
            timeout: Duration::from_secs(self.timeout_sec),
            debounce: Duration::from_millis(self.debounce_ms),
            cooldown: Duration::from_secs(self.notification_cooldown_min.saturating_mul(60)),
            daily_quota: self.max_daily_notifications,
            quota_reset_time: parse_time_of_day(&self.reset_time)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_active_level() -> PinValue {
    PinValue::Low
}

fn default_pull() -> Pull {
    Pull::Up
}

fn default_timeout_sec() -> u64 {
    30
}

fn default_check_interval_ms() -> u64 {
    100
}

fn default_cooldown_min() -> u64 {
    5
}

fn default_max_daily_notifications() -> u32 {
    50
}

fn default_reset_time() -> String {
    "00:00".to_string()
}

/// Parse an "HH:MM" time of day.
pub fn parse_time_of_day(text: &str) -> Result<Time, ConfigError> {
    Time::parse(text.trim(), format_description!("[hour]:[minute]"))
        .map_err(|_| ConfigError::TimeOfDay(text.to_string()))
}

/// Where digital inputs are read from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpioSettings {
    pub sysfs_root: PathBuf,

    /// Added to every configured pin number to get the sysfs GPIO number.
    /// Newer kernels number the SoC header from a non-zero chip base.
    pub pin_offset: u32,
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/gpio"),
            pin_offset: 0,
        }
    }
}

/// Cellular modem link.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModemSettings {
    pub serial_port: String,
    pub baud_rate: u32,
    pub apn: String,
    pub command_timeout_ms: u64,
    /// Deadline for the final `OK` after an SMS body is submitted.
    pub submit_timeout_ms: u64,
    /// Issue a full functionality reset (`AT+CFUN=1,1`) when opening.
    pub reset_on_init: bool,
    pub reset_settle_secs: u64,
    /// Commands that may wait for the modem task before senders block.
    pub queue_depth: usize,
}

impl ModemSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_secs(self.reset_settle_secs)
    }
}

impl Default for ModemSettings {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            apn: "internet".to_string(),
            command_timeout_ms: 5_000,
            submit_timeout_ms: 30_000,
            reset_on_init: false,
            reset_settle_secs: 10,
            queue_depth: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsSettings {
    pub enabled: bool,
    pub recipients: Vec<String>,
    pub message_prefix: String,
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            recipients: Vec::new(),
            message_prefix: "[BARRIER ALERT]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Alert events buffered between circuit loops and the dispatcher.
    pub queue_depth: usize,
    /// Extra attempts per channel after a retryable failure.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Also notify on OPENED/CLOSED, not just timeout alerts.
    pub notify_state_changes: bool,
}

impl DispatchSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            max_retries: 2,
            retry_delay_ms: 2_000,
            notify_state_changes: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub enabled: bool,
    pub listen: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:7790".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use test_case::test_case;
    use time::macros::time;

    use super::*;

    const SAMPLE: &str = r#"
circuits:
  main_entrance:
    gpio_pin: 17
    description: Main Entrance Barrier
    timeout_sec: 45
    check_interval_ms: 50
    notification_cooldown_min: 10
    max_daily_notifications: 20
    reset_time: "06:30"
  rear_exit:
    gpio_pin: 27
    active_level: high
    pull: down
modem:
  serial_port: /dev/ttyAMA0
  apn: telstra.internet
sms:
  enabled: true
  recipients: ["+61400000000"]
"#;

    #[test]
    fn parses_full_settings() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();
        let circuits = settings.circuit_configs().unwrap();
        assert_eq!(circuits.len(), 2);

        let main = circuits.iter().find(|c| c.id.as_str() == "main_entrance").unwrap();
        assert_eq!(main.input_pin, 17);
        assert_eq!(main.description.as_deref(), Some("Main Entrance Barrier"));
        assert_eq!(main.timeout, Duration::from_secs(45));
        assert_eq!(main.poll_interval, Duration::from_millis(50));
        assert_eq!(main.cooldown, Duration::from_secs(600));
        assert_eq!(main.daily_quota, 20);
        assert_eq!(main.quota_reset_time, time!(06:30));

        assert_eq!(settings.modem.serial_port, "/dev/ttyAMA0");
        assert_eq!(settings.modem.apn, "telstra.internet");
        assert!(settings.sms.enabled);
        assert_eq!(settings.sms.recipients, vec!["+61400000000".to_string()]);
    }

    #[test]
    fn applies_circuit_defaults() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();
        let rear = settings.circuits["rear_exit"].to_config("rear_exit").unwrap();

        assert_eq!(rear.active_level, PinValue::High);
        assert_eq!(rear.pull, Pull::Down);
        assert_eq!(rear.timeout, Duration::from_secs(30));
        assert_eq!(rear.poll_interval, Duration::from_millis(100));
        assert_eq!(rear.debounce, Duration::ZERO);
        assert_eq!(rear.cooldown, Duration::from_secs(300));
        assert_eq!(rear.daily_quota, 50);
        assert_eq!(rear.quota_reset_time, time!(00:00));
    }

    #[test]
    fn empty_file_gets_section_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert!(settings.circuits.is_empty());
        assert_eq!(settings.modem.baud_rate, 115_200);
        assert_eq!(settings.modem.command_timeout(), Duration::from_secs(5));
        assert!(!settings.sms.enabled);
        assert_eq!(settings.sms.message_prefix, "[BARRIER ALERT]");
        assert_eq!(settings.dispatch.max_retries, 2);
        assert!(settings.api.enabled);
    }

    #[test]
    fn rejects_zero_check_interval() {
        let err = Settings::from_yaml(
            "circuits:\n  gate:\n    gpio_pin: 4\n    check_interval_ms: 0\n",
        )
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "poll_interval", .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let err =
            Settings::from_yaml("circuits:\n  gate:\n    gpio_pin: 4\n    timeout_sec: 0\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "timeout", .. }));
    }

    #[test]
    fn rejects_zero_modem_queue() {
        let err = Settings::from_yaml("modem:\n  queue_depth: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "queue_depth", .. }));
    }

    #[test_case("00:00", time!(00:00) ; "midnight")]
    #[test_case("06:30", time!(06:30) ; "morning")]
    #[test_case(" 23:59 ", time!(23:59) ; "surrounding whitespace")]
    fn parses_time_of_day(text: &str, expected: Time) {
        assert_eq!(parse_time_of_day(text).unwrap(), expected);
    }

    #[test_case("24:00" ; "hour out of range")]
    #[test_case("7am" ; "not hh mm")]
    #[test_case("" ; "empty")]
    fn rejects_bad_time_of_day(text: &str) {
        assert!(matches!(
            parse_time_of_day(text),
            Err(ConfigError::TimeOfDay(_))
        ));
    }

    #[test]
    fn example_config_is_valid() {
        let settings = Settings::from_yaml(include_str!("../config.example.yaml")).unwrap();
        let circuits = settings.circuit_configs().unwrap();
        assert_eq!(circuits.len(), 2);
        assert!(circuits.iter().all(|c| c.description.is_some()));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.circuits.len(), 2);
    }
}
