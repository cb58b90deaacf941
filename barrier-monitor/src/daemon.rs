//! Top-level wiring of the monitor.
//!
//! Startup order: modem task (when SMS is enabled), dispatcher, circuit
//! loops, status API. Shutdown runs the other way so nothing is lost: the
//! loops stop first, the dispatcher then drains every queued alert, and the
//! modem closes only after the last SMS has gone out.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{self, SharedState};
use crate::clock::Clock;
use crate::config::Settings;
use crate::error::Result;
use crate::modem::{ModemActor, ModemHandle, ModemOptions, SerialConnector};
use crate::notify::{
    DispatchOptions, LogNotifier, NotificationDispatcher, Notifier, SmsNotifier,
};
use crate::supervisor::CircuitSupervisor;
use crate::sysfs::SysfsInput;
use crate::tracing::prelude::*;

pub struct Daemon {
    settings: Settings,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel to make [`Daemon::run`] shut down and return.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<()> {
        let settings = &self.settings;
        let circuits = settings.circuit_configs()?;
        if circuits.is_empty() {
            warn!("No circuits configured");
        }

        let modem_cancel = CancellationToken::new();
        let _modem_guard = modem_cancel.clone().drop_guard();
        let modem = settings.sms.enabled.then(|| {
            info!(
                port = %settings.modem.serial_port,
                recipients = settings.sms.recipients.len(),
                "SMS alerting enabled"
            );
            ModemActor::spawn(
                SerialConnector::from_settings(&settings.modem),
                ModemOptions::from_settings(&settings.modem),
                settings.modem.queue_depth,
                modem_cancel.clone(),
            )
        });
        let modem_handle: Option<ModemHandle> = modem.as_ref().map(|(handle, _)| handle.clone());

        let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(handle) = &modem_handle {
            notifiers.push(Arc::new(SmsNotifier::from_settings(
                handle.clone(),
                &settings.sms,
            )));
        }
        notifiers.push(Arc::new(LogNotifier));

        let (events_tx, events_rx) = mpsc::channel(settings.dispatch.queue_depth);
        let input = Arc::new(SysfsInput::from_settings(&settings.gpio));
        let mut supervisor = CircuitSupervisor::new(
            input,
            self.clock.clone(),
            events_tx,
            CancellationToken::new(),
        );

        let dispatcher = NotificationDispatcher::new(
            notifiers,
            DispatchOptions::from_settings(&settings.dispatch),
            supervisor.board(),
        );
        let dispatcher_task = tokio::spawn(dispatcher.run(events_rx));

        for config in circuits {
            supervisor.add_circuit(config)?;
        }

        let api_cancel = CancellationToken::new();
        let _api_guard = api_cancel.clone().drop_guard();
        let api_task: Option<JoinHandle<Result<()>>> = if settings.api.enabled {
            let listener = api::bind(&settings.api.listen).await?;
            let state = SharedState::new(supervisor.board(), modem_handle.clone());
            Some(tokio::spawn(api::serve(listener, state, api_cancel.clone())))
        } else {
            None
        };

        info!(circuits = supervisor.len(), "Barrier monitor running");
        self.shutdown.cancelled().await;
        info!("Shutting down");

        supervisor.shutdown_all().await;
        // Last sender goes with the supervisor, letting the dispatcher
        // finish once the queue is empty.
        drop(supervisor);
        if let Err(e) = dispatcher_task.await {
            error!(error = %e, "Dispatcher ended abnormally");
        }

        api_cancel.cancel();
        if let Some(task) = api_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server ended abnormally"),
            }
        }

        drop(modem_handle);
        modem_cancel.cancel();
        if let Some((_, task)) = modem {
            if let Err(e) = task.await {
                error!(error = %e, "Modem task ended abnormally");
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}
