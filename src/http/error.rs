//! Client-facing error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::error::CreditGateError;
use crate::vision::VisionError;

/// Every way a request can fail, as the caller sees it.
///
/// The display string is the exact `error` field sent on the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Missing required user ID")]
    MissingUserId,

    #[error("No data provided")]
    NoData,

    #[error("Missing required fields")]
    MissingFields,

    #[error("No more credits left")]
    InsufficientCredits,

    #[error("Image is not processable")]
    NotProcessable,

    #[error("Image cannot be identified")]
    Unidentified,

    #[error("Image too big")]
    ImageTooLarge,

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<CreditGateError> for ApiError {
    fn from(err: CreditGateError) -> Self {
        match err {
            CreditGateError::Vision(err) => err.into(),
            other => {
                error!(error = %other, "Request failed");
                ApiError::Internal
            }
        }
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::ImageTooLarge => ApiError::ImageTooLarge,
            other => {
                error!(error = %other, "Vision call failed");
                ApiError::Internal
            }
        }
    }
}
