// Prometheus counters for the accept and polling paths

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, Encoder, IntCounterVec, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref SUBMISSIONS_ACCEPTED: IntCounterVec = register_int_counter_vec!(
        "proctor_submissions_accepted_total",
        "Submissions recorded and queued for integrity analysis",
        &["language"]
    )
    .expect("valid metric definition");

    pub static ref REQUEST_ERRORS: IntCounterVec = register_int_counter_vec!(
        "proctor_request_errors_total",
        "Requests rejected by the API, by rejection kind",
        &["kind"]
    )
    .expect("valid metric definition");

    pub static ref POLLS: IntCounterVec = register_int_counter_vec!(
        "proctor_polls_total",
        "Report and score polls, by resource and answer",
        &["resource", "answer"]
    )
    .expect("valid metric definition");
}

/// Text exposition of every registered metric
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(buffer)
}

/// GET /metrics
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
