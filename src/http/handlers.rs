//! Route handlers.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::error::ApiError;
use super::guard::Caller;
use super::server::AppState;
use crate::credits::Admission;
use crate::vision::{PictureDescription, VisionOutcome};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditsResponse {
    pub credits: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionResponse {
    pub name: String,
    pub description: String,
    pub fun_facts: Vec<String>,
}

impl From<PictureDescription> for DescriptionResponse {
    fn from(d: PictureDescription) -> Self {
        Self {
            name: d.name,
            description: d.description,
            fun_facts: d.fun_facts,
        }
    }
}

/// Validated body of `POST /analyze/image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub lang: String,
    pub image: String,
}

impl AnalyzeRequest {
    /// Parse and validate a raw request body.
    ///
    /// An empty, non-JSON or empty-object body is `NoData`; a body lacking a
    /// non-empty `lang` or `image` string is `MissingFields`.
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ApiError::NoData)?;
        let fields = match value.as_object() {
            Some(fields) if !fields.is_empty() => fields,
            _ => return Err(ApiError::NoData),
        };

        let field = |name: &str| {
            fields
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match (field("lang"), field("image")) {
            (Some(lang), Some(image)) => Ok(Self { lang, image }),
            _ => Err(ApiError::MissingFields),
        }
    }
}

/// Liveness probe reporting the server clock.
pub async fn index() -> Json<Value> {
    Json(json!({ "message": chrono::Utc::now().to_rfc3339() }))
}

/// `GET /credits`: read-only balance for the caller. Unknown users have zero.
#[instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn credits(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<CreditsResponse>, ApiError> {
    let credits = state.gate.balance(&caller.user_id).await?;
    debug!(credits, "Balance queried");
    Ok(Json(CreditsResponse { credits }))
}

/// `POST /analyze/image`: spend one credit, then describe the image.
///
/// The body is validated before the gate runs, so malformed and over-limit
/// requests never cost a credit. Once admitted the credit stays spent
/// whatever the model says.
#[instrument(
    skip_all,
    fields(user_id = %caller.user_id, request_id = %uuid::Uuid::new_v4())
)]
pub async fn analyze_image(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<DescriptionResponse>, ApiError> {
    let body = body.map_err(body_rejection)?;
    let request = AnalyzeRequest::parse(&body)?;

    match state.gate.admit(&caller.user_id).await? {
        Admission::Granted { remaining } => {
            info!(remaining, lang = %request.lang, "Admitted image analysis");
        }
        Admission::Denied => {
            info!("Rejected image analysis, no credits left");
            return Err(ApiError::InsufficientCredits);
        }
    }

    match state.vision.describe(&request.lang, &request.image).await? {
        VisionOutcome::Described(description) => Ok(Json(description.into())),
        VisionOutcome::Refused(reason) => {
            warn!(reason = %reason, "Model refused the image");
            Err(ApiError::NotProcessable)
        }
        VisionOutcome::Unidentified => Err(ApiError::Unidentified),
    }
}

/// Map a body that could not be buffered onto the caller-facing error.
fn body_rejection(rejection: BytesRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Rejected request body over the size limit");
        ApiError::ImageTooLarge
    } else {
        debug!(error = %rejection, "Failed to read request body");
        ApiError::NoData
    }
}

/// Fallback for a known route hit with the wrong method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
