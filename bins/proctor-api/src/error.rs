// Rejections on the accept and polling paths, mapped onto HTTP statuses

use crate::metrics::REQUEST_ERRORS;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("author '{author_id}' already submitted for assessment '{assessment_id}'")]
    Duplicate {
        author_id: String,
        assessment_id: String,
    },

    #[error("storage unavailable: {0}")]
    Storage(#[from] redis::RedisError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Duplicate { .. } => StatusCode::CONFLICT,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Duplicate { .. } => "duplicate",
            ApiError::Storage(_) => "storage",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Storage(e) = &self {
            error!(error = %e, "Redis request failed");
        }
        REQUEST_ERRORS.with_label_values(&[self.kind()]).inc();

        (
            self.status_code(),
            Json(serde_json::json!({
                "error": self.to_string(),
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("code must not be empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("assessment 'x'".into()).status_code(), StatusCode::NOT_FOUND);
        let duplicate = ApiError::Duplicate {
            author_id: "alice".into(),
            assessment_id: "sum-two".into(),
        };
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
        assert!(duplicate.to_string().contains("alice"));
    }

    #[test]
    fn test_into_response_keeps_status() {
        let response = ApiError::NotFound("submission".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
