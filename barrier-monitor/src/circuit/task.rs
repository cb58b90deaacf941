//! The polling loop that drives one [`CircuitStateMachine`].

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;

use super::{AlertEvent, CircuitState, CircuitStateMachine};
use crate::clock::Clock;
use crate::hw_trait::gpio::DigitalInput;
use crate::tracing::prelude::*;

/// Longest a loop waits for room in the event queue, so a stalled consumer
/// cannot hold up sampling. Transition events are dropped after this wait;
/// timeout alerts are deferred to the next tick.
pub const EVENT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Consecutive read failures between repeated warnings.
const READ_FAILURE_LOG_EVERY: u32 = 100;

/// What a circuit loop publishes after every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircuitSnapshot {
    pub state: Option<CircuitState>,
    /// Start of the current fault episode.
    pub fault_started: Option<Instant>,
    pub notifications_sent_today: u32,
    /// Time of the last successful input read.
    pub last_sample_at: Option<Instant>,
    pub consecutive_read_failures: u32,
}

pub struct CircuitTask {
    machine: CircuitStateMachine,
    input: Arc<dyn DigitalInput>,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::Sender<AlertEvent>,
    status_tx: watch::Sender<CircuitSnapshot>,
    last_sample_at: Option<Instant>,
    read_failures: u32,
    /// Set while a due timeout alert is waiting for queue space.
    queue_stalled: bool,
}

impl CircuitTask {
    pub fn new(
        machine: CircuitStateMachine,
        input: Arc<dyn DigitalInput>,
        clock: Arc<dyn Clock>,
        events_tx: mpsc::Sender<AlertEvent>,
        status_tx: watch::Sender<CircuitSnapshot>,
    ) -> Self {
        Self {
            machine,
            input,
            clock,
            events_tx,
            status_tx,
            last_sample_at: None,
            read_failures: 0,
            queue_stalled: false,
        }
    }

    /// Sample at the configured interval until cancelled. Cancellation is
    /// observed between ticks, never in the middle of one.
    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.machine.config().poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(circuit = %self.machine.config().id, "Circuit loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        debug!(circuit = %self.machine.config().id, "Circuit loop stopped");
    }

    async fn tick(&mut self) {
        let wall = self.clock.now();
        self.machine.refresh_gate(wall);

        let pin = self.machine.config().input_pin;
        match self.input.read(pin) {
            Ok(level) => {
                if self.read_failures > 0 {
                    info!(
                        circuit = %self.machine.config().id,
                        failures = self.read_failures,
                        "Input readable again"
                    );
                    self.read_failures = 0;
                }

                let now = Instant::now();
                self.last_sample_at = Some(now);
                if let Some(event) = self.machine.observe(level, now, wall) {
                    self.emit(event).await;
                } else if self.machine.timeout_due(now) {
                    self.emit_timeout(now, wall).await;
                }
            }
            Err(e) => {
                self.read_failures += 1;
                if self.read_failures == 1 || self.read_failures % READ_FAILURE_LOG_EVERY == 0 {
                    warn!(
                        circuit = %self.machine.config().id,
                        pin,
                        failures = self.read_failures,
                        error = %e,
                        "Input read failed, skipping tick"
                    );
                }
            }
        }

        self.publish();
    }

    async fn emit(&self, event: AlertEvent) {
        match self.events_tx.send_timeout(event, EVENT_SEND_TIMEOUT).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(event)) => {
                warn!(
                    circuit = %event.circuit_id,
                    kind = %event.kind,
                    "Event queue full, dropping event"
                );
            }
            Err(SendTimeoutError::Closed(event)) => {
                debug!(
                    circuit = %event.circuit_id,
                    kind = %event.kind,
                    "No event consumer, dropping event"
                );
            }
        }
    }

    /// Queue a due timeout alert. The queue slot is reserved before the
    /// gate is asked, so an authorized alert is never dropped. Without a
    /// slot the alert stays due and is retried on the next tick.
    async fn emit_timeout(&mut self, now: Instant, wall: OffsetDateTime) {
        let permit = match timeout(EVENT_SEND_TIMEOUT, self.events_tx.reserve()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                debug!(
                    circuit = %self.machine.config().id,
                    "No event consumer, timeout alert not authorized"
                );
                return;
            }
            Err(_) => {
                if !self.queue_stalled {
                    warn!(
                        circuit = %self.machine.config().id,
                        "Event queue full, deferring timeout alert"
                    );
                    self.queue_stalled = true;
                }
                return;
            }
        };
        self.queue_stalled = false;

        if let Some(event) = self.machine.check_timeout(now, wall) {
            permit.send(event);
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(CircuitSnapshot {
            state: self.machine.state(),
            fault_started: self.machine.opened_at(),
            notifications_sent_today: self.machine.gate().sent_today(),
            last_sample_at: self.last_sample_at,
            consecutive_read_failures: self.read_failures,
        });
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use tokio::time::sleep;

    use super::*;
    use crate::circuit::{AlertKind, CircuitConfig, CircuitId};
    use crate::clock::TokioClock;
    use crate::gate::NotificationGate;
    use crate::hw_trait::gpio::PinValue;
    use crate::hw_trait::gpio::testing::FakeInput;

    struct Running {
        input: Arc<FakeInput>,
        events_rx: mpsc::Receiver<AlertEvent>,
        status_rx: watch::Receiver<CircuitSnapshot>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(config: CircuitConfig, initial: PinValue) -> Running {
        let (events_tx, events_rx) = mpsc::channel(16);
        start_with_queue(config, initial, events_tx, events_rx)
    }

    fn start_with_queue(
        config: CircuitConfig,
        initial: PinValue,
        events_tx: mpsc::Sender<AlertEvent>,
        events_rx: mpsc::Receiver<AlertEvent>,
    ) -> Running {
        let clock = Arc::new(TokioClock::starting_at(datetime!(2024-03-10 12:00 UTC)));
        let input = Arc::new(FakeInput::default());
        input.set(config.input_pin, initial);

        let gate = NotificationGate::from_config(&config, clock.now());
        let machine = CircuitStateMachine::new(config, gate);
        let (status_tx, status_rx) = watch::channel(CircuitSnapshot::default());

        let task = CircuitTask::new(machine, input.clone(), clock, events_tx, status_tx);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.run(cancel.clone()));

        Running {
            input,
            events_rx,
            status_rx,
            cancel,
            handle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_initial_state() {
        let mut run = start(CircuitConfig::new("gate", 4), PinValue::High);

        run.status_rx.changed().await.unwrap();
        let snapshot = run.status_rx.borrow().clone();
        assert_eq!(snapshot.state, Some(CircuitState::Normal));
        assert!(snapshot.last_sample_at.is_some());
        assert!(run.events_rx.try_recv().is_err());

        run.cancel.cancel();
        run.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn emits_opened_when_input_asserts() {
        let mut run = start(CircuitConfig::new("gate", 4), PinValue::High);
        sleep(Duration::from_millis(250)).await;

        run.input.set(4, PinValue::Low);
        let event = run.events_rx.recv().await.unwrap();
        assert_eq!(event.kind, AlertKind::Opened);
        assert_eq!(event.circuit_id.as_str(), "gate");

        run.cancel.cancel();
        run.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_skips_tick() {
        let mut run = start(CircuitConfig::new("gate", 4), PinValue::High);
        sleep(Duration::from_millis(150)).await;
        let sampled_at = run.status_rx.borrow().last_sample_at;

        run.input.fail(4, true);
        run.input.set(4, PinValue::Low);
        sleep(Duration::from_secs(1)).await;

        {
            let snapshot = run.status_rx.borrow();
            assert_eq!(snapshot.state, Some(CircuitState::Normal));
            assert_eq!(snapshot.last_sample_at, sampled_at);
            assert!(snapshot.consecutive_read_failures >= 9);
        }
        assert!(run.events_rx.try_recv().is_err());

        run.input.fail(4, false);
        let event = run.events_rx.recv().await.unwrap();
        assert_eq!(event.kind, AlertKind::Opened);
        assert_eq!(run.status_rx.borrow().consecutive_read_failures, 0);

        run.cancel.cancel();
        run.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancellation() {
        let run = start(CircuitConfig::new("gate", 4), PinValue::High);
        sleep(Duration::from_millis(300)).await;

        run.cancel.cancel();
        timeout(Duration::from_millis(100), run.handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_defers_timeout_alert_without_spending_quota() {
        let (events_tx, events_rx) = mpsc::channel(1);
        events_tx
            .try_send(AlertEvent {
                circuit_id: CircuitId::new("other"),
                kind: AlertKind::Opened,
                duration: Duration::ZERO,
                timestamp: datetime!(2024-03-10 12:00 UTC),
            })
            .unwrap();

        let config = CircuitConfig {
            timeout: Duration::from_secs(2),
            ..CircuitConfig::new("stuck", 4)
        };
        let mut run = start_with_queue(config, PinValue::Low, events_tx, events_rx);

        // Due after 2 s, but the queue stays full the whole time.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(run.status_rx.borrow().notifications_sent_today, 0);

        let blocker = run.events_rx.recv().await.unwrap();
        assert_eq!(blocker.circuit_id.as_str(), "other");

        let alert = run.events_rx.recv().await.unwrap();
        assert_eq!(alert.kind, AlertKind::TimeoutAlert);
        assert_eq!(alert.circuit_id.as_str(), "stuck");
        sleep(Duration::from_millis(200)).await;
        assert_eq!(run.status_rx.borrow().notifications_sent_today, 1);

        run.cancel.cancel();
        run.handle.await.unwrap();
    }
}
