//! Per-circuit notification rate limiting.
//!
//! A [`NotificationGate`] enforces two limits on the notifications one
//! circuit may send:
//!
//! - a cooldown: minimum wall-clock spacing between two sends;
//! - a daily quota: at most N sends between two consecutive crossings of
//!   a configured local time of day (the reset time).
//!
//! The gate is owned by its circuit's task, so the check-then-update in
//! [`NotificationGate::authorize`] needs no lock. Other contexts see the
//! counters through published status snapshots.

use std::time::Duration;

use time::{OffsetDateTime, Time};

use crate::circuit::CircuitConfig;

/// Outcome of asking whether a notification may be sent now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    CoolingDown { remaining: Duration },
    QuotaExhausted { limit: u32 },
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        self == GateDecision::Allowed
    }
}

#[derive(Debug, Clone)]
pub struct NotificationGate {
    cooldown: Duration,
    daily_quota: u32,
    reset_time: Time,
    last_sent_at: Option<OffsetDateTime>,
    sent_today: u32,
    window_start: OffsetDateTime,
}

impl NotificationGate {
    pub fn new(cooldown: Duration, daily_quota: u32, reset_time: Time, now: OffsetDateTime) -> Self {
        Self {
            cooldown,
            daily_quota,
            reset_time,
            last_sent_at: None,
            sent_today: 0,
            window_start: boundary_at_or_before(now, reset_time),
        }
    }

    pub fn from_config(config: &CircuitConfig, now: OffsetDateTime) -> Self {
        Self::new(
            config.cooldown,
            config.daily_quota,
            config.quota_reset_time,
            now,
        )
    }

    /// Start a new quota window if a reset time has been crossed since the
    /// current one began. Returns whether a reset happened.
    ///
    /// Calling this repeatedly at or after the same boundary resets the
    /// count only once.
    pub fn roll_window(&mut self, now: OffsetDateTime) -> bool {
        let boundary = boundary_at_or_before(now, self.reset_time);
        if self.window_start < boundary {
            self.window_start = boundary;
            self.sent_today = 0;
            true
        } else {
            false
        }
    }

    /// Decide whether a send would be allowed at `now` without recording
    /// one. Only the quota window may move.
    pub fn check(&mut self, now: OffsetDateTime) -> GateDecision {
        self.roll_window(now);

        if let Some(last) = self.last_sent_at {
            // Wall clock stepped backwards: restart the cooldown from here
            // rather than waiting for it to catch up.
            let last = if last > now {
                self.last_sent_at = Some(now);
                now
            } else {
                last
            };
            let since = Duration::try_from(now - last).unwrap_or_default();
            if since < self.cooldown {
                return GateDecision::CoolingDown {
                    remaining: self.cooldown - since,
                };
            }
        }

        if self.sent_today >= self.daily_quota {
            return GateDecision::QuotaExhausted {
                limit: self.daily_quota,
            };
        }

        GateDecision::Allowed
    }

    /// Check and, when allowed, record a send at `now`.
    ///
    /// A `true` result commits the caller to sending.
    pub fn authorize(&mut self, now: OffsetDateTime) -> bool {
        let allowed = self.check(now).is_allowed();
        if allowed {
            self.last_sent_at = Some(now);
            self.sent_today += 1;
        }
        allowed
    }

    pub fn sent_today(&self) -> u32 {
        self.sent_today
    }

    pub fn last_sent_at(&self) -> Option<OffsetDateTime> {
        self.last_sent_at
    }

    pub fn window_start(&self) -> OffsetDateTime {
        self.window_start
    }
}

/// Most recent instant at or before `now` whose local time of day is
/// `reset`. When `now` is earlier in the day than `reset`, that is
/// yesterday's reset.
pub fn boundary_at_or_before(now: OffsetDateTime, reset: Time) -> OffsetDateTime {
    let today = now.replace_time(reset);
    if now.time() < reset {
        today - time::Duration::DAY
    } else {
        today
    }
}
