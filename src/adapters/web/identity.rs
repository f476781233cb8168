//! Caller identity extraction.
//!
//! The identity header is set by an upstream authenticating proxy; this
//! service trusts it as-is.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::domain::portfolio::validate_email;

use super::{AppState, WebError};

/// The verified email of the user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = &state.settings.identity_header;
        let value = parts
            .headers
            .get(header)
            .ok_or_else(|| WebError::unauthorized(format!("missing {header} header")))?;
        let raw = value
            .to_str()
            .map_err(|_| WebError::unauthorized(format!("malformed {header} header")))?;
        let email = validate_email(raw)
            .map_err(|_| WebError::unauthorized(format!("malformed {header} header")))?;
        Ok(Caller(email))
    }
}
