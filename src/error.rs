//! Application error types.
//!
//! Domain code returns `anyhow::Result` and converts to `AppError` at the
//! HTTP boundary (teacher convention); the boundary mapper always emits the
//! RFC 6749 `{error, error_description?}` JSON shape for 4xx-class failures
//! and never leaks internal messages for 5xx-class ones.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// OAuth 2.0 / OIDC error kinds, per the error-code taxonomy in RFC 6749 §5.2
/// and the device-authorization-grant polling signals in RFC 8628 §3.5.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorKind {
    #[error("invalid_request")]
    InvalidRequest,
    #[error("invalid_client")]
    InvalidClient,
    #[error("invalid_grant")]
    InvalidGrant,
    #[error("unauthorized_client")]
    UnauthorizedClient,
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    #[error("access_denied")]
    AccessDenied,
    #[error("slow_down")]
    SlowDown,
    #[error("authorization_pending")]
    AuthorizationPending,
    #[error("expired_token")]
    ExpiredToken,
    #[error("invalid_token")]
    InvalidToken,
}

impl OAuthErrorKind {
    fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::AccessDenied => "access_denied",
            Self::SlowDown => "slow_down",
            Self::AuthorizationPending => "authorization_pending",
            Self::ExpiredToken => "expired_token",
            Self::InvalidToken => "invalid_token",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            Self::InvalidClient => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("not found")]
    NotFound,

    #[error("{kind}: {description}")]
    OAuth {
        kind: OAuthErrorKind,
        description: String,
    },

    /// The non-token-shaped MFA branch described in §4.9: HTTP 200 with
    /// `{error:"mfa_required", mfa_token}` rather than an error status.
    MfaRequired { mfa_token: String },
}

impl AppError {
    pub fn oauth(kind: OAuthErrorKind, description: impl Into<String>) -> Self {
        Self::OAuth {
            kind,
            description: description.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::InvalidRequest, msg)
    }

    pub fn invalid_client(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::InvalidClient, msg)
    }

    pub fn invalid_grant(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::InvalidGrant, msg)
    }

    pub fn unauthorized_client(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::UnauthorizedClient, msg)
    }

    pub fn unsupported_grant_type(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::UnsupportedGrantType, msg)
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::AccessDenied, msg)
    }

    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::InvalidToken, msg)
    }

    pub fn expired_token(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::ExpiredToken, msg)
    }

    pub fn authorization_pending(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::AuthorizationPending, msg)
    }

    pub fn slow_down(msg: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::SlowDown, msg)
    }
}

#[derive(Serialize)]
struct OAuthErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_description: Option<String>,
}

#[derive(Serialize)]
struct MfaRequiredBody {
    error: &'static str,
    mfa_token: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            AppError::OAuth { kind, description } => {
                tracing::debug!(error = %kind, description = %description, "oauth error");
                let body = OAuthErrorBody {
                    error: kind.code(),
                    error_description: if description.is_empty() {
                        None
                    } else {
                        Some(description)
                    },
                };
                (kind.status(), Json(body)).into_response()
            }
            AppError::MfaRequired { mfa_token } => (
                StatusCode::OK,
                Json(MfaRequiredBody {
                    error: "mfa_required",
                    mfa_token,
                }),
            )
                .into_response(),
        }
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
