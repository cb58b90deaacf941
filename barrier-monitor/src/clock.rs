//! Wall-clock source for the notification gate.
//!
//! Only the gate needs calendar time (cooldowns and the daily quota reset
//! time of day). Fault durations are measured with tokio's monotonic
//! `Instant` and never come from here.

use time::{OffsetDateTime, UtcOffset};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// System time, presented in a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    /// Use the host's current local offset, or UTC if it can't be
    /// determined (e.g. the process is already multi-threaded).
    pub fn local() -> Self {
        Self::new(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// Wall clock that advances with tokio's clock, so paused-time tests see
/// calendar time move in step with `tokio::time::advance`.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct TokioClock {
    origin: tokio::time::Instant,
    base: OffsetDateTime,
}

#[cfg(test)]
impl TokioClock {
    pub(crate) fn starting_at(base: OffsetDateTime) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            base,
        }
    }
}

#[cfg(test)]
impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        self.base + self.origin.elapsed()
    }
}
