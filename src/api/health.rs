// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests.
    pub status: String,
    pub app: String,
    /// Expected `aud` claim of portal tokens.
    pub audience: String,
    /// Whether the portal public key is held in memory.
    pub public_key_cached: bool,
    pub active_sessions: usize,
}

/// Liveness and configuration summary.
///
/// Does not contact the portal.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        app: state.config.app_name.clone(),
        audience: state.verifier.audience().to_string(),
        public_key_cached: state.verifier.keys().is_cached().await,
        active_sessions: state.sessions.active_sessions().await,
    })
}
