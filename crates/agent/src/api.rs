//! HTTP API for health checks, Prometheus metrics and the latest job snapshot

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use inventory_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::InventoryMetrics,
    FleetReport, FleetSnapshot,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: InventoryMetrics,
    snapshot: RwLock<Option<FleetSnapshot>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: InventoryMetrics) -> Self {
        Self {
            health_registry,
            metrics,
            snapshot: RwLock::new(None),
        }
    }

    /// Fold a finished cycle into health, metrics and the served snapshot
    pub async fn observe_cycle(&self, report: &FleetReport) {
        self.health_registry.observe_cycle(report).await;
        self.metrics.record_cycle(report);
        *self.snapshot.write().await = Some(FleetSnapshot::from(report));
    }

    pub async fn snapshot(&self) -> Option<FleetSnapshot> {
        self.snapshot.read().await.clone()
    }
}

/// Health check response - returns 200 if healthy, 503 if no cluster is operational
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the first cycle completed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Latest job records - 503 until the first cycle completed
async fn jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.snapshot().await {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "No collection cycle completed yet" })),
        )
            .into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/jobs", get(jobs))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
