//! Alert delivery.
//!
//! Circuit loops push [`AlertEvent`](crate::circuit::AlertEvent)s into a
//! bounded queue; the [`dispatcher::NotificationDispatcher`] drains it and
//! hands each alert to every configured [`Notifier`] in turn.

pub mod dispatcher;
pub mod log;
pub mod message;
pub mod sms;

use async_trait::async_trait;
use thiserror::Error;

use crate::modem::ModemError;

pub use dispatcher::{DispatchOptions, DispatchReport, NotificationDispatcher};
pub use log::LogNotifier;
pub use message::AlertMessage;
pub use sms::SmsNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Modem(#[from] ModemError),

    /// Some recipients got the message and some did not.
    #[error("delivered to {delivered} of {attempted} recipients, last error: {last}")]
    PartialDelivery {
        delivered: usize,
        attempted: usize,
        last: ModemError,
    },

    #[error("no recipients configured")]
    NoRecipients,
}

impl NotifyError {
    /// Partial deliveries are not retried, so nobody gets a duplicate.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Modem(e) => e.is_retryable(),
            NotifyError::PartialDelivery { .. } | NotifyError::NoRecipients => false,
        }
    }
}

/// A channel alerts can be delivered through.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs and reports.
    fn name(&self) -> &str;

    async fn notify(&self, message: &AlertMessage) -> Result<(), NotifyError>;
}
