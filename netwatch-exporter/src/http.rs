/**
 * EXPOSITION HTTP - Serveur de scrape Prometheus
 *
 * RÔLE :
 * Expose le registre des sondes au format texte Prometheus sur /metrics,
 * et l'état de l'exporteur en JSON sur /health.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum sur sa propre tâche, indépendant de la boucle de collecte
 * - Lecture du registre sans verrou long (écritures atomiques par clé)
 * - Arrêt propre sur le même signal que le scheduler
 */

use crate::health::{ExporterHealth, HealthTracker};
use crate::metrics::ProbeMetrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<ProbeMetrics>,
    pub health: HealthTracker,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<ExporterHealth> {
    Json(state.health.get_health())
}
