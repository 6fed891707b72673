use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("model error: {0}")]
    Model(#[from] shepherd_types::ModelError),
    #[error("unauthorized: {0}")]
    Unauthorized(Cow<'static, str>),
    #[error("not found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("conflict: {0}")]
    Conflict(Cow<'static, str>),
    #[error("gone: {0}")]
    Gone(Cow<'static, str>),
    #[error("bad request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl AppError {
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn gone(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Gone(message.into())
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Kube(err) => {
                tracing::error!(error = %err, "kubernetes API error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
            Self::Upstream(err) => {
                tracing::error!(error = %err, "upstream call failed");
                (StatusCode::BAD_GATEWAY, "upstream error".to_string())
            }
            Self::Token(err) => (StatusCode::UNAUTHORIZED, err.to_string()),
            Self::Model(err) => match err {
                shepherd_types::ModelError::ContextTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
                }
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            Self::Conflict(message) => (StatusCode::CONFLICT, message.to_string()),
            Self::Gone(message) => (StatusCode::GONE, message.to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.to_string()),
        };

        let body = Json(json!({ "error": status.canonical_reason().unwrap_or("error"), "details": message }));
        (status, body).into_response()
    }
}
