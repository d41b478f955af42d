// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Only [`AuthError::KeyUnavailable`] is allowed to escape token verification.
//! Every other failure collapses into [`AuthError::TokenRejected`], whose
//! [`RejectReason`] is kept for diagnostics and never shown to the user.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// No token was supplied
    #[error("no token supplied")]
    MissingToken,
    /// Signature did not verify, or the token could not be decoded
    #[error("token signature is invalid or the token is undecodable")]
    InvalidSignature,
    /// `exp` is in the past
    #[error("token has expired")]
    Expired,
    /// `aud` does not match the configured audience
    #[error("token audience is invalid")]
    InvalidAudience,
    /// Claims are missing or have the wrong shape
    #[error("token is malformed: {0}")]
    Malformed(String),
    /// The portal's session-data lookup did not succeed
    #[error("session lookup failed: {0}")]
    SessionLookup(String),
}

impl RejectReason {
    /// Whether refreshing the public key could make this token verify.
    pub fn is_signature_failure(&self) -> bool {
        matches!(self, RejectReason::InvalidSignature)
    }
}

/// Authentication error type.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither the key cache nor the portal could supply a public key
    #[error("authentication unavailable: {0}")]
    KeyUnavailable(String),
    /// Any local or remote verification failure
    #[error("not authenticated")]
    TokenRejected(RejectReason),
    /// Background token refresh failed; the session is terminated
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::KeyUnavailable(_) => "authentication_unavailable",
            AuthError::TokenRejected(_) | AuthError::RefreshFailed(_) => "not_authenticated",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::KeyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::TokenRejected(_) | AuthError::RefreshFailed(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message safe to show to the end user.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::KeyUnavailable(_) => "Authentication is temporarily unavailable",
            AuthError::TokenRejected(_) | AuthError::RefreshFailed(_) => {
                "Invalid or expired token, please sign in again through the portal"
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message().to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
