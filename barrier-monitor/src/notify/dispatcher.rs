use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use super::{AlertMessage, Notifier};
use crate::circuit::{AlertEvent, AlertKind, CircuitId};
use crate::config::DispatchSettings;
use crate::supervisor::StatusBoard;
use crate::tracing::prelude::*;

/// Capacity of the re-broadcast channel. Slow subscribers lag and skip.
const BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Extra attempts per channel after a retryable failure.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Deliver OPENED/CLOSED too, not only timeout alerts.
    pub notify_state_changes: bool,
}

impl DispatchOptions {
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay(),
            notify_state_changes: settings.notify_state_changes,
        }
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from_settings(&DispatchSettings::default())
    }
}

/// Result of delivering one alert through one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    pub delivered: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub circuit_id: CircuitId,
    pub kind: AlertKind,
    /// Empty when the alert kind is not delivered at all.
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn skipped(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn all_delivered(&self) -> bool {
        self.outcomes.iter().all(|o| o.delivered)
    }
}

/// Drains the alert queue and fans each alert out to the notifiers.
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    options: DispatchOptions,
    board: StatusBoard,
    broadcast_tx: broadcast::Sender<AlertEvent>,
}

impl NotificationDispatcher {
    /// `board` supplies circuit descriptions for message text.
    pub fn new(
        notifiers: Vec<Arc<dyn Notifier>>,
        options: DispatchOptions,
        board: StatusBoard,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            notifiers,
            options,
            board,
            broadcast_tx,
        }
    }

    /// Every event taken off the queue, delivered or not.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn should_notify(&self, kind: AlertKind) -> bool {
        match kind {
            AlertKind::TimeoutAlert => true,
            AlertKind::Opened | AlertKind::Closed => self.options.notify_state_changes,
        }
    }

    /// Deliver one event through every notifier in turn.
    pub async fn dispatch(&self, event: &AlertEvent) -> DispatchReport {
        let mut report = DispatchReport {
            circuit_id: event.circuit_id.clone(),
            kind: event.kind,
            outcomes: Vec::new(),
        };

        if !self.should_notify(event.kind) {
            debug!(circuit = %event.circuit_id, kind = %event.kind, "Not a notified alert kind");
            return report;
        }

        let message = AlertMessage::new(event.clone(), self.board.display_name(&event.circuit_id));
        for notifier in &self.notifiers {
            report
                .outcomes
                .push(self.deliver(notifier.as_ref(), &message).await);
        }
        report
    }

    async fn deliver(&self, notifier: &dyn Notifier, message: &AlertMessage) -> ChannelOutcome {
        let event = &message.event;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match notifier.notify(message).await {
                Ok(()) => {
                    debug!(
                        channel = notifier.name(),
                        circuit = %event.circuit_id,
                        kind = %event.kind,
                        attempts,
                        "Alert delivered"
                    );
                    return ChannelOutcome {
                        channel: notifier.name().to_string(),
                        delivered: true,
                        attempts,
                        error: None,
                    };
                }
                Err(e) if e.is_retryable() && attempts <= self.options.max_retries => {
                    warn!(
                        channel = notifier.name(),
                        circuit = %event.circuit_id,
                        attempt = attempts,
                        error = %e,
                        "Alert delivery failed, retrying"
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        channel = notifier.name(),
                        circuit = %event.circuit_id,
                        kind = %event.kind,
                        attempts,
                        error = %e,
                        "Alert delivery failed"
                    );
                    return ChannelOutcome {
                        channel: notifier.name().to_string(),
                        delivered: false,
                        attempts,
                        error: Some(e.to_string()),
                    };
                }
            }
        }
    }

    /// Process events until every producer has gone and the queue is
    /// empty.
    pub async fn run(self, mut events_rx: mpsc::Receiver<AlertEvent>) {
        debug!(channels = self.notifiers.len(), "Dispatcher started");
        let mut handled = 0u64;

        while let Some(event) = events_rx.recv().await {
            // No subscribers is fine.
            let _ = self.broadcast_tx.send(event.clone());

            let report = self.dispatch(&event).await;
            if !report.skipped() && !report.all_delivered() {
                warn!(
                    circuit = %report.circuit_id,
                    kind = %report.kind,
                    "Alert not delivered on every channel"
                );
            }
            handled += 1;
        }

        info!(handled, "Dispatcher drained");
    }
}
