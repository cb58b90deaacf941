//! Digital inputs read through the Linux sysfs GPIO interface.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::GpioSettings;
use crate::hw_trait::gpio::{DigitalInput, PinValue, Pull};
use crate::hw_trait::{HwError, Result};
use crate::tracing::prelude::*;

/// Input bank backed by `/sys/class/gpio`.
///
/// Bias resistors cannot be set through sysfs; they are expected to come
/// from the board (device tree overlay or external resistors).
pub struct SysfsInput {
    root: PathBuf,
    pin_offset: u32,
    /// Last good level per pin, served when a read fails transiently.
    last_good: Mutex<HashMap<u32, PinValue>>,
}

impl SysfsInput {
    pub fn new(root: impl Into<PathBuf>, pin_offset: u32) -> Self {
        Self {
            root: root.into(),
            pin_offset,
            last_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &GpioSettings) -> Self {
        Self::new(&settings.sysfs_root, settings.pin_offset)
    }

    fn gpio_number(&self, pin: u32) -> Result<u32> {
        pin.checked_add(self.pin_offset).ok_or_else(|| {
            HwError::InvalidParameter(format!("pin {pin} + offset {} overflows", self.pin_offset))
        })
    }

    fn pin_dir(&self, gpio: u32) -> PathBuf {
        self.root.join(format!("gpio{gpio}"))
    }

    fn export(&self, gpio: u32) -> Result<()> {
        if self.pin_dir(gpio).exists() {
            return Ok(());
        }
        match fs::write(self.root.join("export"), gpio.to_string()) {
            Ok(()) => Ok(()),
            // EBUSY: already exported by someone else
            Err(e) if e.raw_os_error() == Some(16) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_value(path: &Path) -> Result<PinValue> {
    let raw = fs::read_to_string(path)?;
    match raw.trim() {
        "0" => Ok(PinValue::Low),
        "1" => Ok(PinValue::High),
        other => Err(HwError::InvalidParameter(format!(
            "unexpected value {other:?} in {}",
            path.display()
        ))),
    }
}

impl DigitalInput for SysfsInput {
    fn configure(&self, pin: u32, pull: Pull) -> Result<()> {
        let gpio = self.gpio_number(pin)?;
        self.export(gpio)?;

        let direction = self.pin_dir(gpio).join("direction");
        fs::write(&direction, "in").map_err(|e| {
            HwError::Io(io::Error::new(
                e.kind(),
                format!("setting {} to input: {e}", direction.display()),
            ))
        })?;

        debug!(pin, gpio, ?pull, "Configured input (bias set by board)");
        Ok(())
    }

    fn read(&self, pin: u32) -> Result<PinValue> {
        let gpio = self.gpio_number(pin)?;
        let path = self.pin_dir(gpio).join("value");

        match parse_value(&path) {
            Ok(value) => {
                self.last_good.lock().insert(pin, value);
                Ok(value)
            }
            Err(e) => match self.last_good.lock().get(&pin).copied() {
                Some(stale) => {
                    trace!(pin, error = %e, "Read failed, using last good value");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }
}
