//! JSON error responses for the web adapter.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::domain::error::PortfolioError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

pub fn status_from_error(err: &PortfolioError) -> StatusCode {
    match err {
        PortfolioError::Validation { .. }
        | PortfolioError::InsufficientFunds { .. }
        | PortfolioError::InsufficientPosition { .. }
        | PortfolioError::SameAccount
        | PortfolioError::UnknownSymbol { .. } => StatusCode::BAD_REQUEST,
        PortfolioError::NoPriceData { .. }
        | PortfolioError::NoHistory { .. }
        | PortfolioError::NotFound { .. } => StatusCode::NOT_FOUND,
        PortfolioError::OpenPositions { .. } | PortfolioError::Conflict { .. } => {
            StatusCode::CONFLICT
        }
        PortfolioError::Database { .. }
        | PortfolioError::DatabaseQuery { .. }
        | PortfolioError::ConfigParse { .. }
        | PortfolioError::ConfigMissing { .. }
        | PortfolioError::ConfigInvalid { .. }
        | PortfolioError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PortfolioError> for WebError {
    fn from(err: PortfolioError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            // Store details stay in the log.
            tracing::error!(error = %err, "request failed");
            return Self::internal();
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
