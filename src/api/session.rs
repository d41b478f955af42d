// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use super::cookies;
use crate::auth::SessionClaims;
use crate::error::ApiError;
use crate::session::{RefreshState, SessionInfo};
use crate::state::AppState;

/// Form posted by the portal when it hands the user over.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackForm {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuthQuery {
    /// Token from the SSO callback redirect
    pub token: Option<String>,
    /// Set by the callback when the portal posted no token
    pub error: Option<String>,
}

/// Authenticated session as seen by the client.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    pub app_name: String,
    pub user: SessionClaims,
    /// Whether the portal granted this application to the user
    pub app_access: bool,
    pub login_time: DateTime<Utc>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub refresh_count: u32,
    pub refresh_state: RefreshState,
    /// Portal home, for navigating back
    pub portal_url: String,
}

impl SessionView {
    fn new(state: &AppState, info: SessionInfo) -> Self {
        let app_access = info.claims.has_permission(state.verifier.audience());
        Self {
            app_name: state.config.app_name.clone(),
            user: info.claims,
            app_access,
            login_time: info.created_at,
            last_refreshed_at: info.last_refreshed_at,
            refresh_count: info.refresh_count,
            refresh_state: info.refresh_state,
            portal_url: state.config.portal_url.clone(),
        }
    }
}

fn sign_in_again(state: &AppState, err: impl Into<ApiError>) -> ApiError {
    err.into().with_portal_url(state.config.portal_url.clone())
}

/// SSO callback: move the posted token into the query string.
#[utoipa::path(
    post,
    path = "/",
    tag = "Session",
    request_body(content = CallbackForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to the authenticate view")
    )
)]
pub async fn sso_callback(Form(form): Form<CallbackForm>) -> Redirect {
    match form.token.filter(|t| !t.is_empty()) {
        Some(token) => {
            let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
            Redirect::to(&format!("./?token={encoded}"))
        }
        None => {
            warn!("SSO callback without a token");
            Redirect::to("./?error=missing_token")
        }
    }
}

/// Authenticate the connection.
///
/// A query token is always verified and, on success, replaces the session.
/// Without one the existing session is returned as is; it is kept fresh by
/// the background refresh.
#[utoipa::path(
    get,
    path = "/",
    tag = "Session",
    params(AuthQuery),
    responses(
        (status = 200, description = "Authenticated", body = SessionView),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody),
        (status = 503, description = "Portal public key unavailable", body = crate::error::ErrorBody)
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<AuthQuery>,
) -> Result<(CookieJar, Json<SessionView>), (CookieJar, ApiError)> {
    let (jar, connection) = cookies::connection_or_new(jar);

    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return match state.sessions.session_info(&connection).await {
            Some(info) => Ok((jar, Json(SessionView::new(&state, info)))),
            None => {
                let code = match query.error.as_deref() {
                    Some("missing_token") => "missing_token",
                    _ => "not_authenticated",
                };
                let err = ApiError::unauthorized("No authentication token supplied").with_code(code);
                Err((jar, sign_in_again(&state, err)))
            }
        };
    };

    let claims = match state.verifier.authenticate(&token).await {
        Ok(claims) => claims,
        Err(e) => {
            warn!(connection = %connection, error = %e, "Authentication failed");
            return Err((jar, sign_in_again(&state, e)));
        }
    };

    info!(connection = %connection, email = %claims.email, "User authenticated");
    state.sessions.set_session(&connection, token, claims).await;

    match state.sessions.session_info(&connection).await {
        Some(info) => Ok((jar, Json(SessionView::new(&state, info)))),
        // Cleared concurrently by a logout on the same connection.
        None => Err((jar, sign_in_again(&state, ApiError::unauthorized("Session ended")))),
    }
}

/// Current session of the connection.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Session",
    responses(
        (status = 200, description = "Current session", body = SessionView),
        (status = 401, description = "No session", body = crate::error::ErrorBody)
    )
)]
pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Result<Json<SessionView>, ApiError> {
    let connection = cookies::existing_connection(&jar)
        .ok_or_else(|| sign_in_again(&state, ApiError::unauthorized("Not authenticated")))?;

    state
        .sessions
        .session_info(&connection)
        .await
        .map(|info| Json(SessionView::new(&state, info)))
        .ok_or_else(|| sign_in_again(&state, ApiError::unauthorized("Not authenticated")))
}

/// End the connection's session.
#[utoipa::path(
    post,
    path = "/logout",
    tag = "Session",
    responses(
        (status = 204, description = "Session cleared")
    )
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(connection) = cookies::existing_connection(&jar) {
        state.sessions.clear_session(&connection).await;
    }
    (cookies::clear_connection(jar), StatusCode::NO_CONTENT)
}
