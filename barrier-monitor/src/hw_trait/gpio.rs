//! Digital input abstraction.

use serde::{Deserialize, Serialize};

use super::Result;

/// Raw electrical level of an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinValue {
    Low,
    High,
}

impl From<bool> for PinValue {
    fn from(high: bool) -> Self {
        if high { PinValue::High } else { PinValue::Low }
    }
}

/// Bias resistor a circuit expects on its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    Up,
    Down,
}

/// A bank of digital inputs.
///
/// `read` is an instantaneous, non-blocking sample. Implementations may
/// serve a cached value when a read fails transiently rather than erroring
/// on every poll tick.
pub trait DigitalInput: Send + Sync {
    /// Prepare a pin for input with the requested bias.
    fn configure(&self, pin: u32, pull: Pull) -> Result<()>;

    /// Sample the current level of a pin.
    fn read(&self, pin: u32) -> Result<PinValue>;
}
