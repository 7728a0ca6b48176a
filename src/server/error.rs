use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::{AccessError, AppError, PipelineError, RateLimited};

#[derive(Debug, Error)]
pub enum RestError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<AppError> for RestError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Access(e) => RestError::Access(e),
            AppError::RateLimited(e) => RestError::RateLimited(e),
            AppError::Pipeline(e) => RestError::Pipeline(e),
            other => RestError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for RestError {
    fn from(rejection: JsonRejection) -> Self {
        RestError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for RestError {
    fn from(rejection: QueryRejection) -> Self {
        RestError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        error!("{}", self);

        let status = match &self {
            RestError::Access(AccessError::HostNotAllowed { .. }) => StatusCode::BAD_REQUEST,
            RestError::Access(AccessError::InvalidClient { .. }) => StatusCode::BAD_REQUEST,
            RestError::Access(AccessError::AccessDenied { .. }) => StatusCode::FORBIDDEN,
            RestError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            RestError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::InvalidUrl(_) | RestError::InvalidRequest(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(json!({"detail": self.to_string()}));
        let mut response = (status, payload).into_response();

        if let RestError::RateLimited(limited) = &self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(limited.retry_after_secs),
            );
        }

        response
    }
}
