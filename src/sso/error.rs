use axum::http::StatusCode;
use thiserror::Error;

use super::assertion::AssertionError;

/// Errors surfaced by the SSO handlers.
///
/// Every variant is terminal for the request; nothing here is retried.
#[derive(Debug, Error)]
pub enum SsoError {
    #[error("not authenticated")]
    AuthenticationMissing,
    #[error("insufficient privileges")]
    AuthorizationMissing,
    #[error("invalid {field}: {reason}")]
    ConfigurationInvalid { field: &'static str, reason: String },
    #[error("no credential provisioned")]
    CredentialMissing,
    #[error("downstream unreachable: {0}")]
    DownstreamUnreachable(String),
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl SsoError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            field,
            reason: reason.into(),
        }
    }

    /// HTTP status for this error when it ends a request.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationMissing | Self::Assertion(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationMissing | Self::CredentialMissing => StatusCode::FORBIDDEN,
            Self::ConfigurationInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DownstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
