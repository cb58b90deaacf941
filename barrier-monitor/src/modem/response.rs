//! Parsers for the information lines of AT replies.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::{ModemError, Result};

static CSQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+CSQ:\s*(\d+)\s*,\s*(\d+)").expect("valid regex"));

static CMGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+CMGS:\s*(\d+)").expect("valid regex"));

static CGPADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\+CGPADDR:\s*\d+\s*,\s*"?([0-9A-Fa-f.:]+)"?"#).expect("valid regex")
});

/// Raw value the modem uses for "not known or not detectable".
const UNKNOWN: u8 = 99;

/// Parsed `+CSQ` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalQuality {
    /// Received signal strength, 0..=31. "Unknown" is reported as 0.
    pub rssi: u8,
    /// Channel bit error rate class, if the modem reported one.
    pub ber: Option<u8>,
}

impl SignalQuality {
    pub fn has_signal(&self) -> bool {
        self.rssi > 0
    }

    /// Approximate signal strength in dBm (-113 + 2 * rssi).
    pub fn dbm(&self) -> Option<i32> {
        self.has_signal().then(|| -113 + 2 * i32::from(self.rssi))
    }
}

/// Parse the reply to `AT+CSQ`.
pub fn parse_csq(text: &str) -> Result<SignalQuality> {
    let unexpected = || ModemError::UnexpectedResponse {
        command: "AT+CSQ".to_string(),
        response: text.trim().to_string(),
    };

    let caps = CSQ.captures(text).ok_or_else(unexpected)?;
    let rssi: u8 = caps[1].parse().map_err(|_| unexpected())?;
    let ber: u8 = caps[2].parse().map_err(|_| unexpected())?;

    let rssi = match rssi {
        UNKNOWN => 0,
        0..=31 => rssi,
        _ => return Err(unexpected()),
    };
    let ber = (ber != UNKNOWN).then_some(ber);

    Ok(SignalQuality { rssi, ber })
}

/// Message reference from a `+CMGS: <mr>` line, if present.
pub fn parse_cmgs(text: &str) -> Option<u16> {
    CMGS.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// PDP address from `+CGPADDR: <cid>,<addr>`. An all-zero address means
/// the context has none.
pub fn parse_cgpaddr(text: &str) -> Option<IpAddr> {
    let caps = CGPADDR.captures(text)?;
    let addr: IpAddr = caps[1].parse().ok()?;
    (!addr.is_unspecified()).then_some(addr)
}
