//! API v0 endpoints.
//!
//! Version 0 signals an unstable API. Breaking changes are expected until
//! 1.0.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::api_client::types::{CircuitView, MonitorState, SignalView};
use crate::tracing::prelude::*;

/// Longest a request waits behind queued modem work.
const MODEM_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_status))
        .routes(routes!(get_circuits))
        .routes(routes!(get_circuit))
        .routes(routes!(get_signal))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return uptime and every circuit's status.
#[utoipa::path(
    get,
    path = "/status",
    tag = "circuits",
    responses(
        (status = OK, description = "Daemon status", body = MonitorState),
    ),
)]
async fn get_status(State(state): State<SharedState>) -> Json<MonitorState> {
    Json(state.monitor_state())
}

/// Return all circuits, ordered by id.
#[utoipa::path(
    get,
    path = "/circuits",
    tag = "circuits",
    responses(
        (status = OK, description = "Monitored circuits", body = Vec<CircuitView>),
    ),
)]
async fn get_circuits(State(state): State<SharedState>) -> Json<Vec<CircuitView>> {
    Json(state.circuits())
}

/// Return a single circuit by id, or 404 if not found.
#[utoipa::path(
    get,
    path = "/circuits/{id}",
    tag = "circuits",
    params(
        ("id" = String, Path, description = "Circuit id"),
    ),
    responses(
        (status = OK, description = "Circuit status", body = CircuitView),
        (status = NOT_FOUND, description = "Circuit not found"),
    ),
)]
async fn get_circuit(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<CircuitView>, StatusCode> {
    state
        .board
        .status_of(&id)
        .map(|status| Json(status.into()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// Query the modem's signal quality.
#[utoipa::path(
    get,
    path = "/modem/signal",
    tag = "modem",
    responses(
        (status = OK, description = "Signal report", body = SignalView),
        (status = BAD_GATEWAY, description = "Modem command failed"),
        (status = SERVICE_UNAVAILABLE, description = "Modem not enabled"),
        (status = GATEWAY_TIMEOUT, description = "Modem busy"),
    ),
)]
async fn get_signal(State(state): State<SharedState>) -> Result<Json<SignalView>, StatusCode> {
    let modem = state.modem.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    match tokio::time::timeout(MODEM_REPLY_TIMEOUT, modem.signal_quality()).await {
        Ok(Ok(quality)) => Ok(Json(quality.into())),
        Ok(Err(e)) => {
            warn!(error = %e, "Signal query failed");
            Err(StatusCode::BAD_GATEWAY)
        }
        Err(_) => Err(StatusCode::GATEWAY_TIMEOUT),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::api::build_router;
    use crate::circuit::CircuitState;
    use crate::circuit::task::CircuitSnapshot;
    use crate::modem::testing::{FakeConnector, FakeModem};
    use crate::modem::{ModemActor, ModemHandle, ModemOptions};
    use crate::supervisor::StatusBoard;

    fn board() -> (StatusBoard, watch::Sender<CircuitSnapshot>) {
        let board = StatusBoard::default();
        let (tx, rx) = watch::channel(CircuitSnapshot {
            state: Some(CircuitState::Fault),
            notifications_sent_today: 1,
            ..CircuitSnapshot::default()
        });
        board.insert("gate".into(), Some("Main Gate".into()), rx);
        (board, tx)
    }

    fn modem(fake: FakeModem) -> (ModemHandle, CancellationToken) {
        let (transport, _log) = fake.spawn();
        let cancel = CancellationToken::new();
        let (handle, _task) = ModemActor::spawn(
            FakeConnector::new([transport]),
            ModemOptions {
                command_timeout: Duration::from_secs(1),
                ..ModemOptions::default()
            },
            4,
            cancel.clone(),
        );
        (handle, cancel)
    }

    async fn get(state: SharedState, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = build_router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn health_ok() {
        let (board, _tx) = board();
        let (status, body) = get(SharedState::new(board, None), "/api/v0/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn status_lists_circuits() {
        let (board, _tx) = board();
        let (status, body) = get(SharedState::new(board, None), "/api/v0/status").await;
        assert_eq!(status, StatusCode::OK);

        let state: MonitorState = serde_json::from_slice(&body).unwrap();
        assert!(!state.sms_enabled);
        assert_eq!(state.circuits.len(), 1);
        assert_eq!(state.circuits[0].id, "gate");
        assert_eq!(state.circuits[0].state.as_deref(), Some("FAULT"));
        assert_eq!(state.circuits[0].notifications_sent_today, 1);
    }

    #[tokio::test]
    async fn circuit_by_id() {
        let (board, _tx) = board();
        let state = SharedState::new(board, None);

        let (status, body) = get(state.clone(), "/api/v0/circuits/gate").await;
        assert_eq!(status, StatusCode::OK);
        let view: CircuitView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.description.as_deref(), Some("Main Gate"));

        let (status, _) = get(state, "/api/v0/circuits/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signal_unavailable_without_modem() {
        let (board, _tx) = board();
        let (status, _) = get(SharedState::new(board, None), "/api/v0/modem/signal").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn signal_from_modem() {
        let (board, _tx) = board();
        let (handle, cancel) =
            modem(FakeModem::new().reply("AT+CSQ", "\r\n+CSQ: 18,99\r\n\r\nOK\r\n"));

        let (status, body) = get(SharedState::new(board, Some(handle)), "/api/v0/modem/signal").await;
        assert_eq!(status, StatusCode::OK);
        let signal: SignalView = serde_json::from_slice(&body).unwrap();
        assert_eq!(signal.rssi, 18);
        assert_eq!(signal.dbm, Some(-77));
        cancel.cancel();
    }

    #[tokio::test]
    async fn signal_modem_failure_is_bad_gateway() {
        let (board, _tx) = board();
        let (handle, cancel) = modem(FakeModem::new().reply("AT+CSQ", "\r\nERROR\r\n"));

        let (status, _) = get(SharedState::new(board, Some(handle)), "/api/v0/modem/signal").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        cancel.cancel();
    }

    #[tokio::test]
    async fn serves_openapi_document() {
        let (board, _tx) = board();
        let (status, body) = get(SharedState::new(board, None), "/api-docs/openapi.json").await;
        assert_eq!(status, StatusCode::OK);

        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(doc["paths"]["/api/v0/circuits/{id}"].is_object());
    }
}
