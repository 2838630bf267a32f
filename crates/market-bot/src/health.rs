//! Health check endpoint

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::manager::HealthSnapshot;

/// Anything that can produce a health snapshot on demand.
pub trait HealthSource: Clone + Send + Sync + 'static {
    fn snapshot(&self) -> HealthSnapshot;
}

impl<Q: market_nats::QueueSource + 'static> HealthSource for crate::manager::SupervisorHandle<Q> {
    fn snapshot(&self) -> HealthSnapshot {
        crate::manager::SupervisorHandle::snapshot(self)
    }
}

async fn health_handler<H: HealthSource>(
    State(source): State<H>,
) -> (StatusCode, Json<HealthSnapshot>) {
    (StatusCode::OK, Json(source.snapshot()))
}

async fn live_handler() -> StatusCode {
    StatusCode::OK
}

/// Create the health check router
pub fn create_health_router<H: HealthSource>(source: H) -> Router {
    Router::new()
        .route("/health", get(health_handler::<H>))
        .route("/live", get(live_handler))
        .with_state(source)
}

/// Start the health check server
pub async fn start_health_server<H: HealthSource>(source: H, port: u16) -> anyhow::Result<()> {
    let app = create_health_router(source);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Health check server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
