// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Portal public key fetching and caching.
//!
//! ## Lookup Order
//!
//! 1. In-memory copy (unless a refresh is forced)
//! 2. On-disk cache file (unless a refresh is forced)
//! 3. `GET {portal}/internal/public-key`
//!
//! A fetched key is written to memory and, best effort, to the cache file.
//! The fetch-and-store sequence runs under a mutex so concurrent callers never
//! interleave writes to either copy.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::error::AuthError;

/// Timeout for the public key request. Kept short so a dead portal fails fast.
const KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// PEM-encoded portal signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    pem: Arc<str>,
}

impl PublicKey {
    /// Accepts the text only if it is a well-formed PEM document.
    pub fn from_pem(text: impl Into<String>) -> Result<Self, pem::PemError> {
        let text = text.into();
        pem::parse(text.as_bytes())?;
        Ok(Self {
            pem: Arc::from(text),
        })
    }

    pub fn as_pem(&self) -> &str {
        &self.pem
    }

    /// Build a jsonwebtoken RSA decoding key from the PEM.
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_rsa_pem(self.pem.as_bytes())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("len", &self.pem.len())
            .finish()
    }
}

/// Portal public key store with a memory copy and a durable cache file.
pub struct KeyStore {
    key_url: Url,
    cache_path: PathBuf,
    client: reqwest::Client,
    key: RwLock<Option<PublicKey>>,
    fetch_lock: Mutex<()>,
}

impl KeyStore {
    /// Create a key store. The cache directory is created on first write.
    pub fn new(client: reqwest::Client, key_url: Url, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            key_url,
            cache_path: cache_path.into(),
            client,
            key: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Whether a key is currently held in memory.
    pub async fn is_cached(&self) -> bool {
        self.key.read().await.is_some()
    }

    /// Get the portal public key.
    ///
    /// With `force_refresh` both caches are bypassed and the key is always
    /// fetched from the portal.
    pub async fn get(&self, force_refresh: bool) -> Result<PublicKey, AuthError> {
        if !force_refresh {
            if let Some(key) = self.key.read().await.as_ref() {
                return Ok(key.clone());
            }
        }

        let _guard = self.fetch_lock.lock().await;

        if !force_refresh {
            // Another caller may have populated the slot while we waited.
            if let Some(key) = self.key.read().await.as_ref() {
                return Ok(key.clone());
            }

            if let Some(key) = self.load_cache_file().await {
                *self.key.write().await = Some(key.clone());
                info!(path = %self.cache_path.display(), "Public key loaded from cache file");
                return Ok(key);
            }
        }

        let key = self.fetch().await?;
        *self.key.write().await = Some(key.clone());
        self.write_cache_file(&key).await;

        Ok(key)
    }

    /// Drop the memory copy and delete the cache file.
    pub async fn invalidate(&self) {
        let _guard = self.fetch_lock.lock().await;
        *self.key.write().await = None;

        match tokio::fs::remove_file(&self.cache_path).await {
            Ok(()) => info!(path = %self.cache_path.display(), "Public key cache invalidated"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.cache_path.display(),
                error = %e,
                "Could not delete public key cache file"
            ),
        }
    }

    /// Best effort. On failure any older file is removed so the disk never
    /// serves a key other than the one in memory.
    async fn write_cache_file(&self, key: &PublicKey) {
        if let Some(parent) = self.cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "Could not create key cache directory");
            }
        }

        let Err(e) = tokio::fs::write(&self.cache_path, key.as_pem()).await else {
            info!(path = %self.cache_path.display(), "Public key fetched and cached");
            return;
        };
        warn!(
            path = %self.cache_path.display(),
            error = %e,
            "Public key fetched but cache file could not be written"
        );

        match tokio::fs::remove_file(&self.cache_path).await {
            Ok(()) => info!(path = %self.cache_path.display(), "Stale public key cache removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.cache_path.display(), error = %e, "No stale key cache removed"),
        }
    }

    async fn load_cache_file(&self) -> Option<PublicKey> {
        let text = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "Error reading key cache");
                return None;
            }
        };

        match PublicKey::from_pem(text) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "Key cache is not valid PEM");
                None
            }
        }
    }

    async fn fetch(&self) -> Result<PublicKey, AuthError> {
        debug!(url = %self.key_url, "Fetching portal public key");

        let response = self
            .client
            .get(self.key_url.clone())
            .timeout(KEY_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.key_url, error = %e, "Public key request failed");
                AuthError::KeyUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.key_url, status = %status, "Public key endpoint returned error");
            return Err(AuthError::KeyUnavailable(format!(
                "HTTP {status} from public key endpoint"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::KeyUnavailable(e.to_string()))?;

        PublicKey::from_pem(body).map_err(|e| {
            warn!(url = %self.key_url, error = %e, "Public key endpoint returned invalid PEM");
            AuthError::KeyUnavailable(format!("invalid PEM from public key endpoint: {e}"))
        })
    }
}
