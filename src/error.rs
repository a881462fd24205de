// src/error.rs
//! Typed errors for the catalog fetch, the scoring fan-out and the HTTP surface.
//!
//! Every error that reaches a client is reduced to a fixed public message; the
//! detail carried by these enums is for the server log only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::json_response;

pub const MSG_MISSING_QUERY: &str = "Missing query parameter 'q'";
pub const MSG_NOT_FOUND: &str = "Not found";
pub const MSG_PIPELINE_FAILED: &str = "Books or Sentiment processing failed";
pub const MSG_INTERNAL: &str = "Internal server error";

/// Failure of the external catalog fetch.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("catalog payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure of a single scoring task.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring engine could not be built: {0}")]
    EngineInit(String),

    #[error("scoring task panicked: {0}")]
    Panicked(String),
}

/// Terminal failure of one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] CatalogError),

    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("pipeline internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Upstream(_) => "upstream",
            PipelineError::Scoring(_) => "scoring",
            PipelineError::Internal(_) => "internal",
        }
    }
}

/// Everything the dispatcher can answer with besides a success body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or blank query parameter 'q'")]
    Validation,

    #[error("no route for path")]
    NotFound,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Pipeline(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::Validation => MSG_MISSING_QUERY,
            ApiError::NotFound => MSG_NOT_FOUND,
            ApiError::Pipeline(_) => MSG_PIPELINE_FAILED,
            ApiError::Internal(_) => MSG_INTERNAL,
        }
    }
}

#[derive(serde::Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_response(
            self.status(),
            &ErrorBody {
                error: self.public_message(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_messages_hide_internal_detail() {
        let err = ApiError::Pipeline(PipelineError::Internal("secret stack".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), MSG_PIPELINE_FAILED);

        let err = ApiError::Internal("db password".into());
        assert_eq!(err.public_message(), MSG_INTERNAL);
    }

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(ApiError::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        let upstream = PipelineError::Upstream(CatalogError::Status {
            status: 503,
            body: "busy".into(),
        });
        assert_eq!(upstream.kind(), "upstream");
        assert_eq!(
            ApiError::from(upstream).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
