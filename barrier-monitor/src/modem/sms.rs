//! Text-mode SMS submission.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use super::codec::{ESC, SUB};
use super::engine::AtEngine;
use super::response::parse_cmgs;
use super::{ModemError, Result};
use crate::tracing::prelude::*;

/// Characters in a single-part GSM text message.
pub const MAX_SMS_CHARS: usize = 160;

/// Proof of submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsReceipt {
    pub recipient: String,
    /// Network message reference from `+CMGS`, when reported.
    pub reference: Option<u16>,
}

/// Accept `+` followed by digits, or digits alone.
pub fn validate_recipient(recipient: &str) -> Result<()> {
    let digits = recipient.strip_prefix('+').unwrap_or(recipient);
    if (3..=20).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ModemError::InvalidMessage(format!(
            "bad recipient number {recipient:?}"
        )))
    }
}

/// The body must be non-empty and free of the bytes that end or abort
/// submission.
pub fn validate_body(body: &str) -> Result<()> {
    if body.is_empty() {
        return Err(ModemError::InvalidMessage("empty body".to_string()));
    }
    if body.bytes().any(|b| b == SUB || b == ESC) {
        return Err(ModemError::InvalidMessage(
            "body contains a control terminator".to_string(),
        ));
    }
    Ok(())
}

/// Cut `text` to at most `max` characters.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Send one text message: select text mode, then submit through the
/// `"> "` prompt.
pub async fn send_sms<T>(
    engine: &mut AtEngine<T>,
    recipient: &str,
    body: &str,
    command_timeout: Duration,
    submit_timeout: Duration,
) -> Result<SmsReceipt>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    validate_recipient(recipient)?;
    validate_body(body)?;

    engine.execute("AT+CMGF=1", command_timeout).await?;

    let command = format!("AT+CMGS=\"{recipient}\"");
    let reply = engine
        .submit_with_prompt(&command, body, command_timeout, submit_timeout)
        .await?;

    let reference = parse_cmgs(&reply);
    info!(recipient, ?reference, "SMS submitted");
    Ok(SmsReceipt {
        recipient: recipient.to_string(),
        reference,
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::modem::testing::FakeModem;

    const SECOND: Duration = Duration::from_secs(1);

    #[test_case("+15551234567" ; "international")]
    #[test_case("0412345678" ; "national")]
    #[test_case("+1555" ; "short")]
    fn accepts_recipients(number: &str) {
        validate_recipient(number).unwrap();
    }

    #[test_case("" ; "empty")]
    #[test_case("+" ; "plus only")]
    #[test_case("+1 555 123" ; "spaces")]
    #[test_case("\"+1555\"" ; "quotes")]
    #[test_case("+1555\r\nAT+CFUN=0" ; "injected command")]
    fn rejects_recipients(number: &str) {
        assert!(matches!(
            validate_recipient(number),
            Err(ModemError::InvalidMessage(_))
        ));
    }

    #[test]
    fn rejects_bodies_with_terminators() {
        assert!(validate_body("gate open\u{1a}").is_err());
        assert!(validate_body("gate\u{1b}open").is_err());
        assert!(validate_body("").is_err());
        validate_body("gate open 35s").unwrap();
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate(&"x".repeat(200), MAX_SMS_CHARS).len(), 160);
    }

    #[tokio::test]
    async fn full_send_sequence() {
        let (modem, log) = FakeModem::new()
            .reply("AT+CMGF=1", "\r\nOK\r\n")
            .reply("AT+CMGS=\"+1555\"", "\r\n> ")
            .reply("Gate open", "\r\n+CMGS: 12\r\n\r\nOK\r\n")
            .spawn();
        let mut engine = AtEngine::new(modem);

        let receipt = send_sms(&mut engine, "+1555", "Gate open", SECOND, SECOND)
            .await
            .unwrap();

        assert_eq!(
            receipt,
            SmsReceipt {
                recipient: "+1555".into(),
                reference: Some(12),
            }
        );
        assert_eq!(
            log.commands(),
            vec!["AT+CMGF=1", "AT+CMGS=\"+1555\"", "Gate open\u{1a}"]
        );
    }

    #[tokio::test]
    async fn error_instead_of_prompt_sends_no_body() {
        let (modem, log) = FakeModem::new()
            .reply("AT+CMGS=\"+1555\"", "\r\nERROR\r\n")
            .spawn();
        let mut engine = AtEngine::new(modem);

        let err = send_sms(&mut engine, "+1555", "Gate open", SECOND, SECOND)
            .await
            .unwrap_err();
        assert!(matches!(err, ModemError::Rejected { .. }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(log.commands(), vec!["AT+CMGF=1", "AT+CMGS=\"+1555\""]);
        let raw = log.raw();
        assert!(!raw.windows(9).any(|w| w == b"Gate open"));
    }

    #[tokio::test]
    async fn text_mode_failure_stops_before_cmgs() {
        let (modem, log) = FakeModem::new()
            .reply("AT+CMGF=1", "\r\n+CMS ERROR: 302\r\n")
            .spawn();
        let mut engine = AtEngine::new(modem);

        assert!(
            send_sms(&mut engine, "+1555", "Gate open", SECOND, SECOND)
                .await
                .is_err()
        );
        assert_eq!(log.commands(), vec!["AT+CMGF=1"]);
    }

    #[tokio::test]
    async fn invalid_recipient_touches_nothing() {
        let (modem, log) = FakeModem::new().spawn();
        let mut engine = AtEngine::new(modem);

        let err = send_sms(&mut engine, "nobody", "hi", SECOND, SECOND)
            .await
            .unwrap_err();
        assert!(matches!(err, ModemError::InvalidMessage(_)));
        assert!(log.raw().is_empty());
    }
}
