use serde::{Deserialize, Serialize};
use strum::Display;

use crate::hw_trait::gpio::PinValue;

/// Logical state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Safety condition satisfied.
    Normal,
    /// Beam broken or barrier open.
    Fault,
}

impl CircuitState {
    pub fn classify(level: PinValue, active_level: PinValue) -> Self {
        if level == active_level {
            CircuitState::Fault
        } else {
            CircuitState::Normal
        }
    }

    pub fn is_fault(self) -> bool {
        self == CircuitState::Fault
    }
}
