use crate::{handlers, metrics, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submissions", post(handlers::submit))
        .route("/submissions/:id/report", get(handlers::get_report))
        .route("/submissions/:id/score", get(handlers::get_score))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(metrics::metrics_handler))
}
