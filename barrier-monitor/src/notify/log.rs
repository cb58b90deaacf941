use async_trait::async_trait;

use super::{AlertMessage, Notifier, NotifyError};
use crate::circuit::AlertKind;
use crate::tracing::prelude::*;

/// Writes alerts to the log. Always succeeds.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let event = &message.event;
        match event.kind {
            AlertKind::TimeoutAlert => warn!(
                circuit = %event.circuit_id,
                kind = %event.kind,
                duration_secs = event.duration_secs(),
                "{}",
                message.body()
            ),
            AlertKind::Opened | AlertKind::Closed => info!(
                circuit = %event.circuit_id,
                kind = %event.kind,
                duration_secs = event.duration_secs(),
                "{}",
                message.body()
            ),
        }
        Ok(())
    }
}
