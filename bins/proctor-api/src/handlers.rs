// HTTP route handlers for the Proctor API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use proctor_common::redis;
use proctor_common::types::{FocusEvent, Submission, SubmissionStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::language_config::LanguageRegistry;
use crate::metrics::{POLLS, SUBMISSIONS_ACCEPTED};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    pub assessment_id: String,
    pub code: String,
    pub language: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub submit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub focus_events: Vec<FocusEvent>,
    /// Falls back to the length of the event log (losses and returns)
    #[serde(default)]
    pub focus_event_count: Option<u32>,
    #[serde(default)]
    pub is_auto_submitted: bool,
    #[serde(default)]
    pub auto_submit_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission_id: String,
}

/// Turn a request into a submission record; no side effects
pub fn validate(
    request: SubmitRequest,
    languages: &LanguageRegistry,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Submission, ApiError> {
    let author_id = request.author_id.trim().to_string();
    let assessment_id = request.assessment_id.trim().to_string();
    if author_id.is_empty() {
        return Err(ApiError::Validation("author_id must not be empty".to_string()));
    }
    if assessment_id.is_empty() {
        return Err(ApiError::Validation("assessment_id must not be empty".to_string()));
    }
    if request.code.trim().is_empty() {
        return Err(ApiError::Validation("code must not be empty".to_string()));
    }

    let language = proctor_common::types::Language::from_str(&request.language)
        .filter(|lang| languages.is_enabled(*lang))
        .ok_or_else(|| {
            ApiError::Validation(format!("unsupported language '{}'", request.language))
        })?;

    let submit_time = request.submit_time.unwrap_or(now);
    if submit_time < request.start_time {
        return Err(ApiError::Validation(
            "submit_time must not precede start_time".to_string(),
        ));
    }

    let focus_event_count = request
        .focus_event_count
        .unwrap_or(request.focus_events.len() as u32);
    let author_name = if request.author_name.trim().is_empty() {
        author_id.clone()
    } else {
        request.author_name.trim().to_string()
    };

    Ok(Submission {
        id,
        author_id,
        author_name,
        assessment_id,
        code: request.code,
        language,
        start_time: request.start_time,
        submit_time,
        elapsed_seconds: (submit_time - request.start_time).num_seconds(),
        focus_events: request.focus_events,
        focus_event_count,
        is_auto_submitted: request.is_auto_submitted,
        auto_submit_reason: request.auto_submit_reason,
    })
}

/// POST /submissions - Record a submission and queue integrity analysis
pub async fn submit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let submission = validate(request, &state.languages, Uuid::new_v4(), Utc::now())?;

    let mut conn = state.redis.clone();
    if redis::get_assessment(&mut conn, &submission.assessment_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!(
            "assessment '{}'",
            submission.assessment_id
        )));
    }

    // Claim, record, mark queued and enqueue in one step, so a failed write
    // leaves nothing behind and the client can retry
    if !redis::accept_submission(&mut conn, &submission).await? {
        warn!(
            author_id = %submission.author_id,
            assessment_id = %submission.assessment_id,
            "Duplicate submission rejected"
        );
        return Err(ApiError::Duplicate {
            author_id: submission.author_id,
            assessment_id: submission.assessment_id,
        });
    }

    SUBMISSIONS_ACCEPTED
        .with_label_values(&[submission.language.as_str()])
        .inc();
    info!(
        submission_id = %submission.id,
        assessment_id = %submission.assessment_id,
        language = %submission.language,
        focus_events = submission.focus_event_count,
        "Submission queued"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            submission_id: submission.id.to_string(),
        }),
    )
        .into_response())
}

/// GET /health - Liveness check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn parse_submission_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::Validation("Invalid submission ID format".to_string()))
}

fn pending(resource: &'static str, submission_id: Uuid, status: SubmissionStatus) -> Response {
    POLLS.with_label_values(&[resource, "pending"]).inc();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "submission_id": submission_id,
            "status": status,
            "message": format!("{} is not ready yet", resource),
        })),
    )
        .into_response()
}

/// Map a submission without a score breakdown onto the poll answer
pub fn unscored_response(submission_id: Uuid, status: SubmissionStatus) -> Response {
    let (code, answer) = match status {
        SubmissionStatus::TimedOut => (StatusCode::GATEWAY_TIMEOUT, "timed_out"),
        SubmissionStatus::Failed => (StatusCode::INTERNAL_SERVER_ERROR, "failed"),
        _ => return pending("score", submission_id, status),
    };
    POLLS.with_label_values(&["score", answer]).inc();
    (
        code,
        Json(serde_json::json!({
            "submission_id": submission_id,
            "status": status,
            "error": format!("Scoring {}", answer.replace('_', " ")),
        })),
    )
        .into_response()
}

/// GET /submissions/{id}/report - Poll the integrity report
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let submission_id = parse_submission_id(&id)?;
    let mut conn = state.redis.clone();

    if let Some(report) = redis::get_report(&mut conn, &submission_id).await? {
        POLLS.with_label_values(&["report", "ready"]).inc();
        return Ok((StatusCode::OK, Json(report)).into_response());
    }
    if redis::get_submission(&mut conn, &submission_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("submission '{}'", submission_id)));
    }

    let status = redis::get_status(&mut conn, &submission_id)
        .await?
        .unwrap_or(SubmissionStatus::Queued);
    Ok(pending("report", submission_id, status))
}

/// GET /submissions/{id}/score - Poll the score breakdown
pub async fn get_score(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let submission_id = parse_submission_id(&id)?;
    let mut conn = state.redis.clone();

    if let Some(breakdown) = redis::get_breakdown(&mut conn, &submission_id).await? {
        let tests = redis::get_test_results(&mut conn, &submission_id).await?;
        POLLS.with_label_values(&["score", "ready"]).inc();
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "breakdown": breakdown,
                "tests": tests,
            })),
        )
            .into_response());
    }
    if redis::get_submission(&mut conn, &submission_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("submission '{}'", submission_id)));
    }

    let status = redis::get_status(&mut conn, &submission_id)
        .await?
        .unwrap_or(SubmissionStatus::Queued);
    Ok(unscored_response(submission_id, status))
}
