// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Portal SSO - relying-party authentication for portal-issued tokens
//!
//! Verifies RS256 tokens minted by the central portal, resolves the user's
//! session data, and keeps each connection's token fresh in the background.
//!
//! ## Modules
//!
//! - `auth` - Public key cache, two-phase token verification, token refresh
//! - `session` - Per-connection sessions and refresh tasks
//! - `api` - HTTP surface (Axum)
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod telemetry;
