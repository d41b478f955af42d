// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token refresh through the portal.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Timeout for a refresh call.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct RefreshRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Mints a replacement token for a still-valid session.
///
/// There is no retry here; the refresh loop owns the cadence.
#[derive(Clone)]
pub struct TokenRefresher {
    refresh_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl TokenRefresher {
    pub fn new(client: reqwest::Client, refresh_url: Url) -> Self {
        Self {
            refresh_url,
            client,
            timeout: REFRESH_TIMEOUT,
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exchange `current_token` for a new one.
    ///
    /// Returns `None` on a network error, a timeout, a non-200 status, an
    /// unparsable body or a body without a token.
    pub async fn refresh(&self, current_token: &str) -> Option<String> {
        let response = match self
            .client
            .post(self.refresh_url.clone())
            .timeout(self.timeout)
            .json(&RefreshRequest {
                token: current_token,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), "Token refresh request failed");
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = %status, "Token refresh rejected by portal");
            return None;
        }

        match response.json::<RefreshResponse>().await {
            Ok(RefreshResponse {
                token: Some(token),
            }) if !token.is_empty() => {
                debug!("Token refreshed");
                Some(token)
            }
            Ok(_) => {
                warn!("Token refresh response carried no token");
                None
            }
            Err(e) => {
                warn!(error = %e, "Token refresh response is not valid JSON");
                None
            }
        }
    }
}
