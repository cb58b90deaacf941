use async_trait::async_trait;

use super::{AlertMessage, Notifier, NotifyError};
use crate::config::SmsSettings;
use crate::modem::ModemHandle;
use crate::modem::sms::{MAX_SMS_CHARS, truncate};
use crate::tracing::prelude::*;

/// Texts every recipient through the shared modem task.
pub struct SmsNotifier {
    modem: ModemHandle,
    recipients: Vec<String>,
    prefix: String,
}

impl SmsNotifier {
    pub fn new(modem: ModemHandle, recipients: Vec<String>, prefix: impl Into<String>) -> Self {
        Self {
            modem,
            recipients,
            prefix: prefix.into(),
        }
    }

    pub fn from_settings(modem: ModemHandle, settings: &SmsSettings) -> Self {
        Self::new(
            modem,
            settings.recipients.clone(),
            settings.message_prefix.clone(),
        )
    }

    /// Single-part SMS text for an alert.
    pub fn format(&self, message: &AlertMessage) -> String {
        let text = if self.prefix.is_empty() {
            message.body()
        } else {
            format!("{} {}", self.prefix, message.body())
        };
        truncate(&text, MAX_SMS_CHARS).to_string()
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    fn name(&self) -> &str {
        "sms"
    }

    async fn notify(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        if self.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let text = self.format(message);
        let mut delivered = 0;
        let mut last_error = None;

        // One failed number must not stop the others.
        for recipient in &self.recipients {
            match self.modem.send_sms(recipient.as_str(), text.as_str()).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "SMS delivery failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => Ok(()),
            Some(last) if delivered == 0 => Err(NotifyError::Modem(last)),
            Some(last) => Err(NotifyError::PartialDelivery {
                delivered,
                attempted: self.recipients.len(),
                last,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::circuit::{AlertEvent, AlertKind};
    use crate::modem::testing::{FakeConnector, FakeModem, ModemLog};
    use crate::modem::{ModemActor, ModemError, ModemOptions};

    fn alert() -> AlertMessage {
        AlertMessage::new(
            AlertEvent {
                circuit_id: "gate".into(),
                kind: AlertKind::TimeoutAlert,
                duration: Duration::from_secs(31),
                timestamp: datetime!(2024-03-10 12:00 UTC),
            },
            "Main Gate",
        )
    }

    fn modem(fake: FakeModem) -> (ModemHandle, ModemLog, CancellationToken) {
        let (transport, log) = fake.spawn();
        let cancel = CancellationToken::new();
        let options = ModemOptions {
            command_timeout: Duration::from_secs(1),
            submit_timeout: Duration::from_secs(1),
            ..ModemOptions::default()
        };
        let (handle, _task) =
            ModemActor::spawn(FakeConnector::new([transport]), options, 4, cancel.clone());
        (handle, log, cancel)
    }

    #[tokio::test]
    async fn formats_with_prefix_and_truncates() {
        let (handle, _log, cancel) = modem(FakeModem::new());
        let notifier = SmsNotifier::new(handle, vec![], "[BARRIER ALERT]");

        assert_eq!(
            notifier.format(&alert()),
            "[BARRIER ALERT] Main Gate has been open for 31 seconds."
        );

        let mut long = alert();
        long.circuit_name = "x".repeat(300);
        assert_eq!(notifier.format(&long).chars().count(), MAX_SMS_CHARS);
        cancel.cancel();
    }

    #[tokio::test]
    async fn sends_to_every_recipient() {
        let (handle, log, cancel) = modem(
            FakeModem::new()
                .reply("AT+CMGS=\"+1111\"", "\r\n> ")
                .reply("AT+CMGS=\"+2222\"", "\r\n> "),
        );
        let notifier = SmsNotifier::new(handle, vec!["+1111".into(), "+2222".into()], "");

        notifier.notify(&alert()).await.unwrap();

        let bodies = log
            .commands()
            .into_iter()
            .filter(|c| c.ends_with('\u{1a}'))
            .count();
        assert_eq!(bodies, 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn continues_past_failed_recipient() {
        let (handle, log, cancel) = modem(
            FakeModem::new()
                .reply("AT+CMGS=\"+1111\"", "\r\n+CMS ERROR: 21\r\n")
                .reply("AT+CMGS=\"+2222\"", "\r\n> "),
        );
        let notifier = SmsNotifier::new(handle, vec!["+1111".into(), "+2222".into()], "");

        let err = notifier.notify(&alert()).await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::PartialDelivery {
                delivered: 1,
                attempted: 2,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert!(log.commands().contains(&"AT+CMGS=\"+2222\"".to_string()));
        cancel.cancel();
    }

    #[tokio::test]
    async fn all_failed_reports_modem_error() {
        let (handle, _log, cancel) =
            modem(FakeModem::new().reply("AT+CMGS=\"+1111\"", "\r\nERROR\r\n"));
        let notifier = SmsNotifier::new(handle, vec!["+1111".into()], "");

        let err = notifier.notify(&alert()).await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Modem(ModemError::Rejected { .. })
        ));
        cancel.cancel();
    }

    #[tokio::test]
    async fn no_recipients_is_an_error() {
        let (handle, _log, cancel) = modem(FakeModem::new());
        let notifier = SmsNotifier::new(handle, vec![], "");
        assert!(matches!(
            notifier.notify(&alert()).await,
            Err(NotifyError::NoRecipients)
        ));
        cancel.cancel();
    }
}
