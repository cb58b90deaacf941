//! Per-circuit monitoring.
//!
//! A circuit is one binary safety loop (photocell, limit switch) wired to a
//! digital input. [`machine::CircuitStateMachine`] turns raw samples into
//! logical transitions and timeout alerts; [`task::CircuitTask`] drives one
//! machine at its poll interval.

pub mod config;
pub mod debounce;
pub mod event;
pub mod machine;
pub mod state;
pub mod task;

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use config::CircuitConfig;
pub use event::{AlertEvent, AlertKind};
pub use machine::CircuitStateMachine;
pub use state::CircuitState;

/// Unique name of a monitored circuit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitId(String);

impl CircuitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CircuitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CircuitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CircuitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
