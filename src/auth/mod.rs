// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Relying-party side of the portal single sign-on.
//!
//! ## Auth Flow
//!
//! 1. The portal hands the user a signed RS256 token
//! 2. The application verifies it locally against the portal public key
//!    (fetched once, cached in memory and on disk, refetched on rotation)
//! 3. The portal's session-data endpoint resolves profile and permissions
//!    keyed by the token's `jti`
//! 4. A background task refreshes the token until the session ends
//!
//! ## Security
//!
//! - Only RS256 is accepted
//! - No clock skew tolerance on `exp`
//! - `iss`/`aud`/`iat`/`exp`/`jti` are never taken from the portal lookup
//! - Certificate verification is always on for portal calls

pub mod claims;
pub mod error;
pub mod keys;
pub mod refresher;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

use std::time::Duration;

pub use claims::{MinimalClaims, SessionClaims};
pub use error::{AuthError, RejectReason};
pub use keys::{KeyStore, PublicKey};
pub use refresher::TokenRefresher;
pub use verifier::TokenVerifier;

/// Connect timeout applied to every portal call.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the HTTP client shared by all portal calls.
///
/// Per-request timeouts are set by each caller.
pub fn portal_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        })
}
