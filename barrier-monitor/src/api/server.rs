use axum::Router;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::v0;
use crate::api_client::types::{CircuitView, MonitorState};
use crate::error::Result;
use crate::modem::ModemHandle;
use crate::supervisor::StatusBoard;
use crate::tracing::prelude::*;

#[derive(OpenApi)]
#[openapi(
    info(title = "barrier-monitor", description = "Safety-barrier circuit status"),
    tags(
        (name = "health", description = "Liveness"),
        (name = "circuits", description = "Monitored circuits"),
        (name = "modem", description = "Cellular modem"),
    )
)]
struct ApiDoc;

/// State shared by every handler.
#[derive(Clone)]
pub struct SharedState {
    pub board: StatusBoard,
    /// `None` when SMS alerting is disabled.
    pub modem: Option<ModemHandle>,
    started_at: Instant,
}

impl SharedState {
    pub fn new(board: StatusBoard, modem: Option<ModemHandle>) -> Self {
        Self {
            board,
            modem,
            started_at: Instant::now(),
        }
    }

    pub fn circuits(&self) -> Vec<CircuitView> {
        self.board
            .statuses()
            .into_iter()
            .map(CircuitView::from)
            .collect()
    }

    pub fn monitor_state(&self) -> MonitorState {
        MonitorState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            sms_enabled: self.modem.is_some(),
            circuits: self.circuits(),
        }
    }
}

/// Assemble the API and documentation routes.
pub fn build_router(state: SharedState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn bind(listen: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "API listening");
    Ok(listener)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    debug!("API server stopped");
    Ok(())
}
