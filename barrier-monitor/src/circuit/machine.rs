//! Debounce and timeout logic for one circuit.
//!
//! ```text
//!               first sample (no event)
//!                 │               │
//!                 ▼               ▼
//!  ┌────────┐  active level   ┌───────┐ ──┐ held > timeout and gate allows:
//!  │ NORMAL │ ──────────────► │ FAULT │   │ TIMEOUT_ALERT, timer restarts
//!  └────────┘ ◄────────────── └───────┘ ◄─┘
//!        OPENED ▲   idle level   │ CLOSED
//! ```
//!
//! The machine is pure: callers pass the monotonic and wall-clock time of
//! each sample, which keeps it deterministic under test. Transitions come
//! from [`CircuitStateMachine::observe`]; timeout alerts are requested
//! separately through [`CircuitStateMachine::check_timeout`] once the caller
//! can deliver one.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;

use super::debounce::Debouncer;
use super::{AlertEvent, AlertKind, CircuitConfig, CircuitState};
use crate::gate::{GateDecision, NotificationGate};
use crate::hw_trait::gpio::PinValue;
use crate::tracing::prelude::*;

pub struct CircuitStateMachine {
    config: CircuitConfig,
    gate: NotificationGate,
    /// `None` until the first sample classifies the circuit.
    debouncer: Option<Debouncer<CircuitState>>,
    /// Start of the current fault episode.
    opened_at: Option<Instant>,
    /// Start of the current timeout period. Restarts after every
    /// authorized timeout alert.
    fault_since: Option<Instant>,
    /// Set once a due alert has been denied, to log the denial once.
    suppressed: bool,
}

impl CircuitStateMachine {
    pub fn new(config: CircuitConfig, gate: NotificationGate) -> Self {
        Self {
            config,
            gate,
            debouncer: None,
            opened_at: None,
            fault_since: None,
            suppressed: false,
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    pub fn gate(&self) -> &NotificationGate {
        &self.gate
    }

    /// Logical state, or `None` before the first sample.
    pub fn state(&self) -> Option<CircuitState> {
        self.debouncer.as_ref().map(Debouncer::stable)
    }

    /// When the current fault episode began.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// How long the current fault has lasted, if in fault.
    pub fn fault_duration(&self, now: Instant) -> Option<Duration> {
        self.opened_at.map(|t| now.saturating_duration_since(t))
    }

    /// Keep the gate's quota window current between alerts.
    pub fn refresh_gate(&mut self, wall: OffsetDateTime) {
        if self.gate.roll_window(wall) {
            debug!(circuit = %self.config.id, "Daily notification count reset");
        }
    }

    /// Apply one raw sample and return the OPENED or CLOSED event it
    /// causes, if any. Never consults the gate.
    pub fn observe(
        &mut self,
        level: PinValue,
        now: Instant,
        wall: OffsetDateTime,
    ) -> Option<AlertEvent> {
        let observed = CircuitState::classify(level, self.config.active_level);

        let Some(debouncer) = self.debouncer.as_mut() else {
            self.debouncer = Some(Debouncer::new(observed, self.config.debounce));
            if observed.is_fault() {
                self.opened_at = Some(now);
                self.fault_since = Some(now);
            }
            info!(circuit = %self.config.id, state = %observed, "Initial state");
            return None;
        };

        match debouncer.update(observed, now) {
            Some(CircuitState::Fault) => {
                self.opened_at = Some(now);
                self.fault_since = Some(now);
                self.suppressed = false;
                Some(self.event(AlertKind::Opened, Duration::ZERO, wall))
            }
            Some(CircuitState::Normal) => {
                let duration = self
                    .opened_at
                    .take()
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or_default();
                self.fault_since = None;
                self.suppressed = false;
                Some(self.event(AlertKind::Closed, duration, wall))
            }
            None => None,
        }
    }

    /// Whether the current timeout period has run out. The gate still has
    /// to allow the alert.
    pub fn timeout_due(&self, now: Instant) -> bool {
        self.fault_since
            .is_some_and(|since| now.saturating_duration_since(since) > self.config.timeout)
    }

    /// Ask the gate for a due timeout alert. An authorized alert spends a
    /// quota slot, so the caller must deliver the returned event.
    pub fn check_timeout(&mut self, now: Instant, wall: OffsetDateTime) -> Option<AlertEvent> {
        let since = self.fault_since?;
        if !self.timeout_due(now) {
            return None;
        }

        match self.gate.check(wall) {
            GateDecision::Allowed => {
                self.gate.authorize(wall);
                self.fault_since = Some(now);
                self.suppressed = false;
                let duration = now.saturating_duration_since(since);
                Some(self.event(AlertKind::TimeoutAlert, duration, wall))
            }
            decision => {
                if !self.suppressed {
                    info!(
                        circuit = %self.config.id,
                        ?decision,
                        sent_today = self.gate.sent_today(),
                        "Timeout alert suppressed"
                    );
                    self.suppressed = true;
                }
                None
            }
        }
    }

    fn event(&self, kind: AlertKind, duration: Duration, wall: OffsetDateTime) -> AlertEvent {
        info!(
            circuit = %self.config.id,
            %kind,
            duration_secs = duration.as_secs(),
            "Circuit event"
        );
        AlertEvent {
            circuit_id: self.config.id.clone(),
            kind,
            duration,
            timestamp: wall,
        }
    }
}
