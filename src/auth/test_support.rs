// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for auth and session unit tests.

use std::sync::Arc;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::keys::KeyStore;
use super::refresher::TokenRefresher;
use super::verifier::TokenVerifier;

pub const PORTAL_PRIVATE: &str = include_str!("../../tests/fixtures/portal_private.pem");
pub const PORTAL_PUBLIC: &str = include_str!("../../tests/fixtures/portal_public.pem");
pub const ROTATED_PRIVATE: &str = include_str!("../../tests/fixtures/rotated_private.pem");
pub const ROTATED_PUBLIC: &str = include_str!("../../tests/fixtures/rotated_public.pem");

pub const AUDIENCE: &str = "portal-sso";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Token claims valid for five minutes.
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

/// Token claims that expired five minutes ago.
pub fn expired_claims(jti: &str) -> Value {
    let mut claims = claims(jti);
    let now = now();
    claims["iat"] = json!(now - 600);
    claims["exp"] = json!(now - 300);
    claims
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
        "permissions": ["portal-sso"]
    })
}

pub async fn mount_public_key(server: &MockServer, pem: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/internal/public-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(pem))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_session_data(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/internal/session-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_data_body()))
        .expect(times)
        .mount(server)
        .await;
}

fn endpoint(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

pub fn verifier(server: &MockServer, dir: &TempDir) -> TokenVerifier {
    let client = reqwest::Client::new();
    let keys = Arc::new(KeyStore::new(
        client.clone(),
        endpoint(server, "/internal/public-key"),
        dir.path().join("portal_public.pem"),
    ));
    TokenVerifier::new(
        keys,
        client,
        AUDIENCE,
        endpoint(server, "/internal/session-data"),
    )
}

pub fn refresher(server: &MockServer) -> TokenRefresher {
    TokenRefresher::new(reqwest::Client::new(), endpoint(server, "/internal/refresh"))
}
