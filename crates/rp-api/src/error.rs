//! Error type returned by every handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rp_envelope::EnvelopeError;
use thiserror::Error;

use crate::flow::jwt::JwtError;

/// Errors surfaced at the HTTP boundary.
///
/// Messages are returned verbatim to the browser, so no variant ever carries
/// a client secret, token or cookie value.
#[derive(Error, Debug)]
pub enum ApiError {
    /// CSRF state or nonce mismatch, bad query parameters, OP-reported errors
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The OP could not be reached
    #[error("Transport error: {0}")]
    Transport(String),
    /// Malformed cookie, JSON or token
    #[error("Format error: {0}")]
    Format(String),
    /// AEAD tag or token signature failure
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// The OP answered with a non-200 status or an unexpected content type
    #[error("OP {endpoint} endpoint responded {status}\n{detail}")]
    UpstreamStatus {
        /// `token` or `userinfo`
        endpoint: &'static str,
        /// Status the OP sent
        status: StatusCode,
        /// Response body or content type details
        detail: String,
    },
    /// Failure on the RP side, such as serialization or randomness
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Short label used for metrics and logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Transport(_) => "transport",
            Self::Format(_) => "format",
            Self::Authentication(_) => "authentication",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, self.to_string()).into_response()
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Format(_) | EnvelopeError::Encoding(_) => {
                Self::Format(format!("Malformed flow cookie: {err}"))
            }
            EnvelopeError::Authentication => {
                Self::Authentication("Flow cookie could not be authenticated".to_string())
            }
            EnvelopeError::KeyLength(_) | EnvelopeError::Entropy(_) | EnvelopeError::Encryption => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Malformed(_) => Self::Format(format!("ID token {err}")),
            JwtError::SignatureMismatch => Self::Authentication(format!("ID token {err}")),
            JwtError::ClaimsRejected(_) => Self::Protocol(format!("ID token {err}")),
            JwtError::Signing(_) => Self::Internal(format!("Client assertion {err}")),
        }
    }
}
