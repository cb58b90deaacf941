use std::time::Duration;

use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;

use super::CircuitId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Circuit entered the fault state.
    Opened,
    /// Circuit returned to normal.
    Closed,
    /// Fault has persisted past the circuit's timeout.
    TimeoutAlert,
}

/// Something a circuit wants the outside world to know about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub circuit_id: CircuitId,
    pub kind: AlertKind,
    /// Time spent in the fault state: zero for `Opened`, total fault time
    /// for `Closed` and `TimeoutAlert`.
    pub duration: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AlertEvent {
    pub fn duration_secs(&self) -> u64 {
        self.duration.as_secs()
    }
}
