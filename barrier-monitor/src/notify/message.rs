use crate::circuit::{AlertEvent, AlertKind};

/// Human-readable rendering of an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub event: AlertEvent,
    /// Circuit description, or its id when it has none.
    pub circuit_name: String,
}

impl AlertMessage {
    pub fn new(event: AlertEvent, circuit_name: impl Into<String>) -> Self {
        Self {
            event,
            circuit_name: circuit_name.into(),
        }
    }

    pub fn subject(&self) -> String {
        match self.event.kind {
            AlertKind::Opened => format!("{} opened", self.circuit_name),
            AlertKind::Closed => format!("{} closed", self.circuit_name),
            AlertKind::TimeoutAlert => format!("{} stuck open", self.circuit_name),
        }
    }

    pub fn body(&self) -> String {
        let secs = self.event.duration_secs();
        match self.event.kind {
            AlertKind::Opened => format!("{} is open.", self.circuit_name),
            AlertKind::Closed => format!("{} closed after {secs} seconds.", self.circuit_name),
            AlertKind::TimeoutAlert => {
                format!("{} has been open for {secs} seconds.", self.circuit_name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;

    fn message(kind: AlertKind, secs: u64) -> AlertMessage {
        AlertMessage::new(
            AlertEvent {
                circuit_id: "dock".into(),
                kind,
                duration: Duration::from_millis(secs * 1000 + 400),
                timestamp: datetime!(2024-03-10 12:00 UTC),
            },
            "Loading Dock",
        )
    }

    #[test]
    fn renders_timeout() {
        let m = message(AlertKind::TimeoutAlert, 35);
        assert_eq!(m.subject(), "Loading Dock stuck open");
        assert_eq!(m.body(), "Loading Dock has been open for 35 seconds.");
    }

    #[test]
    fn renders_transitions() {
        assert_eq!(message(AlertKind::Opened, 0).body(), "Loading Dock is open.");
        assert_eq!(
            message(AlertKind::Closed, 12).body(),
            "Loading Dock closed after 12 seconds."
        );
    }
}
