//! Safety-barrier circuit monitoring.
//!
//! Each configured circuit (a photocell or limit-switch loop wired to a
//! digital input) is sampled by its own task. Sustained faults raise alerts
//! that pass through a per-circuit [`gate::NotificationGate`] before the
//! [`notify::NotificationDispatcher`] delivers them, with SMS going out
//! through the single task that owns the cellular modem.

pub mod api;
pub mod api_client;
pub mod circuit;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gate;
pub mod hw_trait;
pub mod modem;
pub mod notify;
pub mod supervisor;
pub mod sysfs;
pub mod tracing;
