//! Error Handling
//!
//! This module defines the service's error types, covering missing request
//! parameters, failures while talking to the Graph API, and webhook
//! verification rejections. Every variant maps to a fixed HTTP status so the
//! boundary behaviour stays predictable regardless of where an error surfaced.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The **top-level error enum** for the onboarding service.
///
/// Each variant carries enough context to render a JSON error body at the
/// HTTP boundary via [`IntoResponse`]. It uses `#[non_exhaustive]` to allow
/// for future additions of error variants without breaking client code.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required request parameter was absent or empty.
    #[error("Missing required parameter: '{0}'")]
    MissingParameter(&'static str),

    /// The outbound request to the Graph API could not be completed
    /// (connection refused, DNS failure, TLS error, malformed response
    /// stream).
    #[error("A network error occurred while calling the Graph API: {0}")]
    Upstream(#[source] reqwest::Error),

    /// The Graph API did not respond within the configured request timeout.
    ///
    /// Kept distinct from [`Error::Upstream`] so slow upstreams surface as
    /// `504` rather than a generic `502`.
    #[error("The Graph API did not respond within the configured timeout: {0}")]
    UpstreamTimeout(#[source] reqwest::Error),

    /// The Graph API answered, but with a non-success status or a
    /// `success: false` body.
    ///
    /// Carries the upstream HTTP status and the parsed [`GraphError`]
    /// details so callers can see *why* Meta rejected the call.
    #[error("The Graph API rejected the request (HTTP status {status}): {error}")]
    UpstreamRejected {
        status: StatusCode,
        error: GraphError,
    },

    /// Asset discovery walked the business graph but found nothing to
    /// resolve (e.g. the token's business owns no WABA, or the WABA has no
    /// phone numbers).
    #[error("No {0} could be resolved for this business")]
    ResolutionNotFound(&'static str),

    /// The webhook handshake presented a verify token that does not match
    /// the configured one, or the wrong `hub.mode`.
    #[error("Webhook verification failed")]
    VerificationFailed,

    /// A flow data-exchange request carried an action this service does not
    /// implement.
    #[error("Unsupported flow action: '{0}'")]
    UnsupportedAction(String),
}

impl Error {
    /// The HTTP status this error renders as at the service boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ResolutionNotFound(_) => StatusCode::NOT_FOUND,
            Self::VerificationFailed => StatusCode::FORBIDDEN,
            Self::UnsupportedAction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::UpstreamTimeout(value)
        } else {
            Self::Upstream(value)
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // The handshake contract is status-only.
        if matches!(self, Self::VerificationFailed) {
            return status.into_response();
        }

        let body = match &self {
            Self::UpstreamRejected { error, .. } => json!({
                "success": false,
                "message": self.to_string(),
                "upstream": error,
            }),
            _ => json!({
                "success": false,
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Represents a **structured error reported by Meta** in a Graph API
/// response body.
///
/// # Example (from a Graph API response)
/// ```json
/// {
///   "error": {
///     "message": "(#100) Parameter missing",
///     "type": "OAuthException",
///     "code": 100,
///     "fbtrace_id": "A4K..."
///   }
/// }
/// ```
#[derive(thiserror::Error, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct GraphError {
    #[serde(default)]
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbtrace_id: Option<String>,
}

impl GraphError {
    /// Wraps an unstructured response body so nothing the upstream said is
    /// lost, even when it did not use the `{"error": {...}}` envelope.
    pub(crate) fn raw(body: impl Into<String>) -> Self {
        Self {
            message: Some(body.into()),
            ..Self::default()
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(code: {})", self.code)?;

        if let Some(r#type) = &self.r#type {
            write!(f, " (type: {})", r#type)?;
        }

        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }

        if let Some(id) = &self.fbtrace_id {
            write!(f, " [trace: {}]", id)?;
        }

        Ok(())
    }
}
