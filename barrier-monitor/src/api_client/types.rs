//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::modem::SignalQuality;
use crate::supervisor::CircuitStatus;

/// Daemon status snapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct MonitorState {
    pub version: String,
    pub uptime_secs: u64,
    /// Whether SMS alerting and the modem are enabled.
    pub sms_enabled: bool,
    pub circuits: Vec<CircuitView>,
}

/// One monitored circuit.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct CircuitView {
    pub id: String,
    pub description: Option<String>,
    /// `NORMAL` or `FAULT`; absent before the first sample.
    pub state: Option<String>,
    pub fault_duration_secs: Option<u64>,
    pub notifications_sent_today: u32,
    /// Milliseconds since the last successful input read.
    pub last_sample_age_ms: Option<u64>,
    pub consecutive_read_failures: u32,
}

impl From<CircuitStatus> for CircuitView {
    fn from(status: CircuitStatus) -> Self {
        Self {
            id: status.id.to_string(),
            description: status.description,
            state: status.state.map(|s| s.to_string()),
            fault_duration_secs: status.fault_duration.map(|d| d.as_secs()),
            notifications_sent_today: status.notifications_sent_today,
            last_sample_age_ms: status
                .last_sample_age
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            consecutive_read_failures: status.consecutive_read_failures,
        }
    }
}

/// Cellular signal report.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct SignalView {
    /// 0..=31, 0 when unknown.
    pub rssi: u8,
    pub ber: Option<u8>,
    pub dbm: Option<i32>,
    pub has_signal: bool,
}

impl From<SignalQuality> for SignalView {
    fn from(quality: SignalQuality) -> Self {
        Self {
            rssi: quality.rssi,
            ber: quality.ber,
            dbm: quality.dbm(),
            has_signal: quality.has_signal(),
        }
    }
}
