// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{portal_http_client, KeyStore, TokenRefresher, TokenVerifier};
use crate::config::Config;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
    pub sessions: SessionStore,
}

impl AppState {
    /// Wire the key store, verifier, refresher and session store from config.
    ///
    /// All portal calls share one HTTP client.
    pub fn new(config: Config) -> Self {
        let client = portal_http_client();
        let keys = Arc::new(KeyStore::new(
            client.clone(),
            config.endpoints.public_key.clone(),
            config.public_key_path.clone(),
        ));
        let verifier = Arc::new(TokenVerifier::new(
            keys,
            client.clone(),
            config.audience.clone(),
            config.endpoints.session_data.clone(),
        ));
        let refresher = TokenRefresher::new(client, config.endpoints.refresh.clone());
        let sessions = SessionStore::new(verifier.clone(), refresher, config.refresh_interval);

        Self {
            config: Arc::new(config),
            verifier,
            sessions,
        }
    }
}
