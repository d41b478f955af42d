// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

#![allow(dead_code)]

use std::collections::HashMap;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use portal_sso::{api::router, config::Config, state::AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PORTAL_PRIVATE: &str = include_str!("../fixtures/portal_private.pem");
pub const PORTAL_PUBLIC: &str = include_str!("../fixtures/portal_public.pem");
pub const ROTATED_PRIVATE: &str = include_str!("../fixtures/rotated_private.pem");

pub const AUDIENCE: &str = "portal-sso";

pub struct TestApp {
    pub portal: MockServer,
    pub state: AppState,
    pub app: Router,
    _cache_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_interval(3600).await
    }

    pub async fn spawn_with_interval(refresh_secs: u64) -> Self {
        let portal = MockServer::start().await;
        let cache_dir = TempDir::new().unwrap();
        let vars = HashMap::from([
            ("PORTAL_URL".to_string(), portal.uri()),
            ("APP_NAME".to_string(), "Test App".to_string()),
            ("TOKEN_REFRESH_INTERVAL".to_string(), refresh_secs.to_string()),
            (
                "PUBLIC_KEY_CACHE_PATH".to_string(),
                cache_dir.path().join("portal_public.pem").display().to_string(),
            ),
        ]);
        let state = AppState::new(Config::from_vars(&vars).unwrap());
        let app = router(state.clone());
        Self {
            portal,
            state,
            app,
            _cache_dir: cache_dir,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_form(&self, uri: &str, form: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn mount_public_key(&self, times: u64) {
        Mock::given(method("GET"))
            .and(path("/internal/public-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PORTAL_PUBLIC))
            .expect(times)
            .mount(&self.portal)
            .await;
    }

    pub async fn mount_session_data(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path("/internal/session-data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_data_body()))
            .expect(times)
            .mount(&self.portal)
            .await;
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn claims(jti: &str) -> Value {
    let now = now();
    json!({
        "sub": "123",
        "jti": jti,
        "email": "ana@example.com",
        "iss": "portal",
        "aud": AUDIENCE,
        "iat": now,
        "exp": now + 300
    })
}

pub fn sign(claims: &Value, private_pem: &str) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

pub fn session_data_body() -> Value {
    json!({
        "email": "ana@example.com",
        "name": "Ana",
        "profile": "Developer",
        "picture": "https://portal.example.com/ana.png",
        "permissions": ["portal-sso", "reports"],
        "department": "Engineering",
        "exp": 1
    })
}

/// `name=value` pair of the `sso_session` Set-Cookie header.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sso_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
