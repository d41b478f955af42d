// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup. Only the values
//! below influence the authentication core; everything else about the web
//! surface is fixed.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PORTAL_URL` | Public portal URL users re-enter through | Required |
//! | `PORTAL_INTERNAL_URL` | Base URL of the portal's internal API | `PORTAL_URL` |
//! | `APP_NAME` | Application display name | `Portal SSO` |
//! | `APP_AUDIENCE` | Expected `aud` claim | `portal-sso` |
//! | `TOKEN_REFRESH_INTERVAL` | Seconds between background refreshes | `240` |
//! | `TOKEN_MIN_VALIDITY` | Reserved, seconds | `60` |
//! | `PUBLIC_KEY_CACHE_PATH` | On-disk cache of the portal public key | `cache/portal_public.pem` |
//! | `BIND_ADDRESS` | HTTP listen address | `0.0.0.0:8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `portal_sso=info,tower_http=info` |

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const PORTAL_URL_ENV: &str = "PORTAL_URL";
pub const PORTAL_INTERNAL_URL_ENV: &str = "PORTAL_INTERNAL_URL";
pub const APP_NAME_ENV: &str = "APP_NAME";
pub const APP_AUDIENCE_ENV: &str = "APP_AUDIENCE";
pub const TOKEN_REFRESH_INTERVAL_ENV: &str = "TOKEN_REFRESH_INTERVAL";
pub const TOKEN_MIN_VALIDITY_ENV: &str = "TOKEN_MIN_VALIDITY";
pub const PUBLIC_KEY_CACHE_PATH_ENV: &str = "PUBLIC_KEY_CACHE_PATH";
pub const BIND_ADDRESS_ENV: &str = "BIND_ADDRESS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_APP_NAME: &str = "Portal SSO";
pub const DEFAULT_APP_AUDIENCE: &str = "portal-sso";
pub const DEFAULT_TOKEN_REFRESH_INTERVAL_SECS: u64 = 240;
pub const DEFAULT_TOKEN_MIN_VALIDITY_SECS: u64 = 60;
pub const DEFAULT_PUBLIC_KEY_CACHE_PATH: &str = "cache/portal_public.pem";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid portal URL in {var}: {reason}")]
    InvalidUrl { var: String, reason: String },

    #[error("Invalid duration in {var}: {reason}")]
    InvalidDuration { var: String, reason: String },
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// The portal's three internal endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalEndpoints {
    pub public_key: Url,
    pub session_data: Url,
    pub refresh: Url,
}

impl PortalEndpoints {
    /// Derive the endpoint URLs from the internal base URL.
    ///
    /// A path prefix on the base is preserved (`https://host/sso` yields
    /// `https://host/sso/internal/public-key`).
    pub fn from_base(base: &Url) -> Result<Self, url::ParseError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            public_key: base.join("internal/public-key")?,
            session_data: base.join("internal/session-data")?,
            refresh: base.join("internal/refresh")?,
        })
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Public portal URL (where users obtain a new token).
    pub portal_url: String,

    /// Internal portal endpoints consumed by the core.
    pub endpoints: PortalEndpoints,

    /// Display name of this application.
    pub app_name: String,

    /// Expected `aud` claim of inbound tokens.
    pub audience: String,

    /// Interval between background refresh ticks.
    pub refresh_interval: Duration,

    /// Reserved minimum token validity. Not enforced anywhere.
    pub min_validity: Duration,

    /// Durable cache file for the portal public key.
    pub public_key_path: PathBuf,

    /// HTTP listen address.
    pub bind_address: String,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let portal_url = vars
            .get(PORTAL_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(PORTAL_URL_ENV.to_string()))?
            .clone();
        parse_http_url(PORTAL_URL_ENV, &portal_url)?;

        let (internal_var, internal_raw) = match vars.get(PORTAL_INTERNAL_URL_ENV) {
            Some(v) if !v.trim().is_empty() => (PORTAL_INTERNAL_URL_ENV, v.as_str()),
            _ => (PORTAL_URL_ENV, portal_url.as_str()),
        };
        let internal_url = parse_http_url(internal_var, internal_raw)?;
        let endpoints =
            PortalEndpoints::from_base(&internal_url).map_err(|e| ConfigError::InvalidUrl {
                var: internal_var.to_string(),
                reason: e.to_string(),
            })?;

        let app_name = vars
            .get(APP_NAME_ENV)
            .cloned()
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        let audience = vars
            .get(APP_AUDIENCE_ENV)
            .cloned()
            .unwrap_or_else(|| DEFAULT_APP_AUDIENCE.to_string());

        let refresh_interval = parse_secs(
            vars,
            TOKEN_REFRESH_INTERVAL_ENV,
            DEFAULT_TOKEN_REFRESH_INTERVAL_SECS,
        )?;
        if refresh_interval.is_zero() {
            return Err(ConfigError::InvalidDuration {
                var: TOKEN_REFRESH_INTERVAL_ENV.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let min_validity = parse_secs(vars, TOKEN_MIN_VALIDITY_ENV, DEFAULT_TOKEN_MIN_VALIDITY_SECS)?;

        let public_key_path = vars
            .get(PUBLIC_KEY_CACHE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_KEY_CACHE_PATH));

        let bind_address = vars
            .get(BIND_ADDRESS_ENV)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let log_format = match vars.get(LOG_FORMAT_ENV).map(|v| v.to_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            portal_url,
            endpoints,
            app_name,
            audience,
            refresh_interval,
            min_validity,
            public_key_path,
            bind_address,
            log_format,
        })
    }
}

fn parse_http_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        var: var.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            var: var.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn parse_secs(
    vars: &HashMap<String, String>,
    var: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(var) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidDuration {
                var: var.to_string(),
                reason: format!("expected whole seconds, got '{raw}': {e}"),
            }),
        None => Ok(Duration::from_secs(default)),
    }
}
