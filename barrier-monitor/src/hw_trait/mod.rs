//! Hardware abstraction traits.
//!
//! The monitor only ever needs to sample digital inputs, so this is a much
//! smaller surface than a full HAL. Drivers live elsewhere (see
//! [`crate::sysfs`]); circuit logic only sees these traits.

pub mod gpio;

use thiserror::Error;

/// Errors from hardware drivers.
#[derive(Debug, Error)]
pub enum HwError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Pin {0} has not been configured")]
    NotConfigured(u32),
}

pub type Result<T> = std::result::Result<T, HwError>;
