// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::SessionClaims,
    error::ErrorBody,
    session::RefreshState,
    state::AppState,
};

pub mod cookies;
pub mod health;
pub mod session;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(session::authenticate).post(session::sso_callback))
        .route("/me", get(session::me))
        .route("/logout", post(session::logout))
        .route("/health", get(health::health))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        session::sso_callback,
        session::authenticate,
        session::me,
        session::logout
    ),
    components(
        schemas(
            health::HealthResponse,
            session::CallbackForm,
            session::SessionView,
            SessionClaims,
            RefreshState,
            ErrorBody
        )
    ),
    tags(
        (name = "Health", description = "Service status"),
        (name = "Session", description = "Portal single sign-on and session lifecycle")
    )
)]
struct ApiDoc;
