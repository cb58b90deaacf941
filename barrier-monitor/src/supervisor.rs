//! Owns the running circuits.
//!
//! The [`CircuitSupervisor`] starts one [`CircuitTask`] per configured
//! circuit, each on its own tokio task with its own cancellation token, and
//! stops them on request. Loops report their state through watch channels
//! gathered on a [`StatusBoard`], so status readers never share a lock with
//! a polling loop.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::circuit::task::{CircuitSnapshot, CircuitTask};
use crate::circuit::{AlertEvent, CircuitConfig, CircuitId, CircuitState, CircuitStateMachine};
use crate::clock::Clock;
use crate::config::ConfigError;
use crate::gate::NotificationGate;
use crate::hw_trait::HwError;
use crate::hw_trait::gpio::DigitalInput;
use crate::tracing::prelude::*;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("circuit `{0}` already exists")]
    DuplicateCircuitId(CircuitId),

    #[error("no circuit `{0}`")]
    UnknownCircuitId(CircuitId),

    #[error("invalid circuit configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("cannot configure input for circuit `{id}`: {source}")]
    Hardware {
        id: CircuitId,
        #[source]
        source: HwError,
    },
}

/// Point-in-time status of one circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStatus {
    pub id: CircuitId,
    pub description: Option<String>,
    /// `None` until the loop has taken its first sample.
    pub state: Option<CircuitState>,
    pub fault_duration: Option<Duration>,
    pub notifications_sent_today: u32,
    /// Time since the loop last read its input successfully. A growing
    /// value means the loop is stalled or the input is failing.
    pub last_sample_age: Option<Duration>,
    pub consecutive_read_failures: u32,
}

struct BoardEntry {
    description: Option<String>,
    status_rx: watch::Receiver<CircuitSnapshot>,
}

/// Read side of every circuit's published status. Cheap to clone.
#[derive(Clone, Default)]
pub struct StatusBoard {
    entries: Arc<RwLock<BTreeMap<CircuitId, BoardEntry>>>,
}

impl StatusBoard {
    pub(crate) fn insert(
        &self,
        id: CircuitId,
        description: Option<String>,
        status_rx: watch::Receiver<CircuitSnapshot>,
    ) {
        self.entries.write().insert(
            id,
            BoardEntry {
                description,
                status_rx,
            },
        );
    }

    fn remove(&self, id: &str) {
        self.entries.write().remove(id);
    }

    pub fn status_of(&self, id: &str) -> Option<CircuitStatus> {
        let entries = self.entries.read();
        let (id, entry) = entries.get_key_value(id)?;
        Some(Self::status(id, entry, Instant::now()))
    }

    /// All circuits, ordered by id.
    pub fn statuses(&self) -> Vec<CircuitStatus> {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| Self::status(id, entry, now))
            .collect()
    }

    /// Description if the circuit has one, otherwise its id.
    pub fn display_name(&self, id: &CircuitId) -> String {
        self.entries
            .read()
            .get(id)
            .and_then(|entry| entry.description.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn status(id: &CircuitId, entry: &BoardEntry, now: Instant) -> CircuitStatus {
        let snapshot = entry.status_rx.borrow();
        CircuitStatus {
            id: id.clone(),
            description: entry.description.clone(),
            state: snapshot.state,
            fault_duration: snapshot
                .fault_started
                .map(|t| now.saturating_duration_since(t)),
            notifications_sent_today: snapshot.notifications_sent_today,
            last_sample_age: snapshot
                .last_sample_at
                .map(|t| now.saturating_duration_since(t)),
            consecutive_read_failures: snapshot.consecutive_read_failures,
        }
    }
}

struct RunningCircuit {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct CircuitSupervisor {
    input: Arc<dyn DigitalInput>,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::Sender<AlertEvent>,
    board: StatusBoard,
    circuits: HashMap<CircuitId, RunningCircuit>,
    cancellation: CancellationToken,
}

impl CircuitSupervisor {
    /// Circuits added later run under child tokens of `cancellation`.
    pub fn new(
        input: Arc<dyn DigitalInput>,
        clock: Arc<dyn Clock>,
        events_tx: mpsc::Sender<AlertEvent>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            input,
            clock,
            events_tx,
            board: StatusBoard::default(),
            circuits: HashMap::new(),
            cancellation,
        }
    }

    pub fn board(&self) -> StatusBoard {
        self.board.clone()
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.circuits.contains_key(id)
    }

    /// Validate `config`, prepare its input and start its loop.
    pub fn add_circuit(&mut self, config: CircuitConfig) -> Result<(), SupervisorError> {
        config.validate()?;
        if self.circuits.contains_key(&config.id) {
            return Err(SupervisorError::DuplicateCircuitId(config.id));
        }

        self.input
            .configure(config.input_pin, config.pull)
            .map_err(|source| SupervisorError::Hardware {
                id: config.id.clone(),
                source,
            })?;

        let id = config.id.clone();
        let description = config.description.clone();
        info!(
            circuit = %id,
            pin = config.input_pin,
            active_level = ?config.active_level,
            poll_interval = ?config.poll_interval,
            timeout = ?config.timeout,
            "Starting circuit"
        );

        let gate = NotificationGate::from_config(&config, self.clock.now());
        let machine = CircuitStateMachine::new(config, gate);
        let (status_tx, status_rx) = watch::channel(CircuitSnapshot::default());
        let task = CircuitTask::new(
            machine,
            self.input.clone(),
            self.clock.clone(),
            self.events_tx.clone(),
            status_tx,
        );

        let cancel = self.cancellation.child_token();
        let handle = tokio::spawn(task.run(cancel.clone()));

        self.board.insert(id.clone(), description, status_rx);
        self.circuits.insert(
            id,
            RunningCircuit {
                cancel,
                task: handle,
            },
        );
        Ok(())
    }

    /// Stop a circuit's loop and wait for it to exit.
    pub async fn remove_circuit(&mut self, id: &str) -> Result<(), SupervisorError> {
        let (id, circuit) = self
            .circuits
            .remove_entry(id)
            .ok_or_else(|| SupervisorError::UnknownCircuitId(CircuitId::new(id)))?;

        Self::stop(&id, circuit).await;
        self.board.remove(id.as_str());
        info!(circuit = %id, "Circuit removed");
        Ok(())
    }

    pub fn status_of(&self, id: &str) -> Result<CircuitStatus, SupervisorError> {
        self.board
            .status_of(id)
            .ok_or_else(|| SupervisorError::UnknownCircuitId(CircuitId::new(id)))
    }

    pub fn statuses(&self) -> Vec<CircuitStatus> {
        self.board.statuses()
    }

    /// Stop every loop and wait for all of them to exit.
    pub async fn shutdown_all(&mut self) {
        for circuit in self.circuits.values() {
            circuit.cancel.cancel();
        }

        let circuits: Vec<_> = self.circuits.drain().collect();
        let count = circuits.len();
        for (id, circuit) in circuits {
            Self::stop(&id, circuit).await;
            self.board.remove(id.as_str());
        }

        info!(count, "All circuits stopped");
    }

    async fn stop(id: &CircuitId, circuit: RunningCircuit) {
        circuit.cancel.cancel();
        if let Err(e) = circuit.task.await {
            error!(circuit = %id, error = %e, "Circuit loop ended abnormally");
        }
    }
}

impl Drop for CircuitSupervisor {
    fn drop(&mut self) {
        for circuit in self.circuits.values() {
            circuit.cancel.cancel();
        }
    }
}
