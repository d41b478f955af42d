// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lazy SSO token verification.
//!
//! ## Phases
//!
//! 1. **Local**: RS256 signature, `exp` and `aud` are checked against the
//!    portal public key. A signature failure triggers exactly one forced key
//!    refresh and a second attempt; expiry and audience failures never do.
//! 2. **Remote**: the portal's session-data endpoint is queried with the
//!    token's `jti` and `email`. The response supplies profile, name, avatar
//!    and permissions; the token claims stay authoritative for
//!    `iss`/`aud`/`iat`/`exp`/`jti`.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::claims::{MinimalClaims, SessionClaims, SessionData};
use super::error::{AuthError, RejectReason};
use super::keys::{KeyStore, PublicKey};

/// Timeout for the session-data lookup.
const SESSION_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Only this many characters of a `jti` are ever logged.
const JTI_LOG_PREFIX: usize = 10;

#[derive(Serialize)]
struct SessionDataRequest<'a> {
    jti: &'a str,
    email: &'a str,
}

/// Verify a token's signature, expiry and audience with `key`.
///
/// No network access. The error is a tag the caller can branch on; only
/// [`RejectReason::InvalidSignature`] is worth retrying with a fresh key.
pub fn verify_local(
    token: &str,
    key: &PublicKey,
    audience: &str,
) -> Result<MinimalClaims, RejectReason> {
    let decoding_key = key.decoding_key().map_err(|e| {
        warn!(error = %e, "Portal public key is not a usable RSA key");
        RejectReason::InvalidSignature
    })?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = 0;
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "aud"]);

    decode::<MinimalClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Utf8(_) => RejectReason::InvalidSignature,
            ErrorKind::ExpiredSignature => RejectReason::Expired,
            ErrorKind::InvalidAudience => RejectReason::InvalidAudience,
            _ => RejectReason::Malformed(e.to_string()),
        })
}

fn jti_prefix(jti: &str) -> String {
    jti.chars().take(JTI_LOG_PREFIX).collect()
}

/// Two-phase token verifier.
pub struct TokenVerifier {
    keys: Arc<KeyStore>,
    audience: String,
    session_data_url: Url,
    client: reqwest::Client,
    lookup_timeout: Duration,
}

impl TokenVerifier {
    /// Create a verifier.
    ///
    /// # Arguments
    /// - `keys`: shared portal key store
    /// - `audience`: expected `aud` claim
    /// - `session_data_url`: the portal's `/internal/session-data` endpoint
    pub fn new(
        keys: Arc<KeyStore>,
        client: reqwest::Client,
        audience: impl Into<String>,
        session_data_url: Url,
    ) -> Self {
        Self {
            keys,
            audience: audience.into(),
            session_data_url,
            client,
            lookup_timeout: SESSION_LOOKUP_TIMEOUT,
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Verify a token and resolve its session claims.
    ///
    /// `Ok(None)` means "not authenticated" for any reason. The only error is
    /// [`AuthError::KeyUnavailable`].
    pub async fn verify(&self, token: &str) -> Result<Option<SessionClaims>, AuthError> {
        match self.authenticate(token).await {
            Ok(claims) => Ok(Some(claims)),
            Err(AuthError::TokenRejected(reason)) => {
                info!(reason = %reason, "Token rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`verify`](Self::verify), but rejections carry their reason.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<SessionClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::TokenRejected(RejectReason::MissingToken));
        }

        let minimal = self.verify_with_key_rotation(token).await?;
        debug!(
            sub = %minimal.sub,
            jti = %jti_prefix(&minimal.jti),
            "Token signature verified"
        );

        let claims = self.lookup_session(&minimal).await?;
        info!(
            email = %claims.email,
            profile = %claims.profile,
            permissions = claims.permissions.len(),
            "Session data resolved"
        );
        Ok(claims)
    }

    async fn verify_with_key_rotation(&self, token: &str) -> Result<MinimalClaims, AuthError> {
        let key = self.keys.get(false).await?;

        match verify_local(token, &key, &self.audience) {
            Ok(claims) => Ok(claims),
            Err(reason) if reason.is_signature_failure() => {
                warn!("Token signature check failed, refreshing portal public key");
                let key = self.keys.get(true).await?;
                verify_local(token, &key, &self.audience).map_err(|reason| {
                    if reason.is_signature_failure() {
                        warn!("Token signature invalid even after key refresh");
                    }
                    AuthError::TokenRejected(reason)
                })
            }
            Err(reason) => Err(AuthError::TokenRejected(reason)),
        }
    }

    async fn lookup_session(&self, minimal: &MinimalClaims) -> Result<SessionClaims, AuthError> {
        let reject = |msg: String| AuthError::TokenRejected(RejectReason::SessionLookup(msg));

        let response = self
            .client
            .post(self.session_data_url.clone())
            .timeout(self.lookup_timeout)
            .json(&SessionDataRequest {
                jti: &minimal.jti,
                email: &minimal.email,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.session_data_url, error = %e, "Session-data request failed");
                reject(e.to_string())
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                status = %status,
                jti = %jti_prefix(&minimal.jti),
                "Session-data lookup rejected by portal"
            );
            return Err(reject(format!("HTTP {status}")));
        }

        let data: SessionData = response.json().await.map_err(|e| {
            warn!(error = %e, "Session-data response is not valid");
            reject(e.to_string())
        })?;

        Ok(SessionClaims::resolve(minimal, data))
    }
}
