use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the MFA subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MfaError {
    /// No staged secret (expired, consumed, or never created) or unknown entity.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or malformed request fields.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A submitted one-time code failed verification.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operation not permitted for this caller.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A privileged operation was attempted without an enabled factor.
    ///
    /// Distinct from [`MfaError::Unauthorized`]: the response carries a
    /// structured `mfaRequired` flag so the caller can route the user to
    /// enrollment instead of showing a generic auth error.
    #[error("MFA required: {0}")]
    MfaRequired(String),

    /// An invariant would be violated (second enabled device, duplicate primary admin).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Verification attempt limit hit for this owner key.
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Wire format for error responses.
///
/// Every failure is `{ "message": ... }`; MFA-gate denials additionally set
/// `"mfaRequired": true`.
#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "mfaRequired", skip_serializing_if = "Option::is_none")]
    mfa_required: Option<bool>,
}

impl MfaError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn mfa_required(msg: impl Into<String>) -> Self {
        Self::MfaRequired(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::MfaRequired(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a message safe to expose to clients.
    ///
    /// Client errors (4xx) pass through so the caller knows what went wrong.
    /// Server errors are reduced to a generic message; the real details are
    /// logged server-side and never include secret material.
    fn safe_message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::MfaRequired(msg)
            | Self::Conflict(msg)
            | Self::TooManyRequests(msg) => msg.clone(),

            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for MfaError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = ErrorBody {
            message: self.safe_message(),
            mfa_required: matches!(self, Self::MfaRequired(_)).then_some(true),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MfaError>;
