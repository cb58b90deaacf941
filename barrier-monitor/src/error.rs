//! Crate-wide error type.
//!
//! Subsystems carry their own error enums; this type exists so the daemon
//! wiring can propagate any of them with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("hardware error: {0}")]
    Hardware(#[from] crate::hw_trait::HwError),

    #[error("modem error: {0}")]
    Modem(#[from] crate::modem::ModemError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] crate::supervisor::SupervisorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
