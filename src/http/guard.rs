//! Request guard run ahead of every protected handler.
//!
//! Checks the shared API key (when one is configured), then extracts the
//! caller's user id. Either step short-circuits with its own rejection.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tracing::warn;

use super::error::ApiError;
use super::server::AppState;
use crate::credits::UserId;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_ID_HEADER: &str = "x-user-id";

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
}

/// Reject the request unless `X-Api-Key` matches `expected`.
pub(crate) fn check_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    match provided {
        Some(key) if !key.is_empty() && key == expected => Ok(()),
        _ => {
            warn!("Rejected request with missing or invalid API key");
            Err(ApiError::InvalidApiKey)
        }
    }
}

/// Read the caller's id from `X-User-Id`.
pub(crate) fn extract_user_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(UserId::parse)
        .ok_or(ApiError::MissingUserId)
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        check_api_key(&parts.headers, state.api_key.as_deref())?;
        let user_id = extract_user_id(&parts.headers)?;
        Ok(Caller { user_id })
    }
}
