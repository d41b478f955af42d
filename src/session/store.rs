// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-connection session state.
//!
//! Every client connection owns at most one [`Session`] and at most one
//! [`RefreshTask`]. The map is the only place sessions live; nothing else in
//! the crate holds session state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::refresh::{RefreshScheduler, RefreshState, RefreshTask};
use crate::auth::{SessionClaims, TokenRefresher, TokenVerifier};

/// Opaque identity of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Authenticated state of one connection.
struct Session {
    token: String,
    claims: SessionClaims,
    created_at: DateTime<Utc>,
    last_refreshed_at: Option<DateTime<Utc>>,
    refresh_count: u32,
    task: RefreshTask,
}

/// Read-only snapshot of a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    pub claims: SessionClaims,
    /// When the session was established
    pub created_at: DateTime<Utc>,
    /// Last successful background rotation
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub refresh_count: u32,
    pub refresh_state: RefreshState,
}

struct StoreInner {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
    verifier: Arc<TokenVerifier>,
    refresher: TokenRefresher,
    refresh_interval: Duration,
    next_task_id: AtomicU64,
}

/// Session storage keyed by connection.
///
/// Cloning is cheap; clones share the same map.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

/// Non-owning handle held by refresh tasks.
#[derive(Clone)]
pub(crate) struct WeakSessionStore(Weak<StoreInner>);

impl WeakSessionStore {
    pub(crate) fn upgrade(&self) -> Option<SessionStore> {
        self.0.upgrade().map(|inner| SessionStore { inner })
    }
}

impl SessionStore {
    pub fn new(
        verifier: Arc<TokenVerifier>,
        refresher: TokenRefresher,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                sessions: RwLock::new(HashMap::new()),
                verifier,
                refresher,
                refresh_interval,
                next_task_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.inner.verifier
    }

    pub(crate) fn refresher(&self) -> &TokenRefresher {
        &self.inner.refresher
    }

    pub(crate) fn downgrade(&self) -> WeakSessionStore {
        WeakSessionStore(Arc::downgrade(&self.inner))
    }

    /// Claims of the connection's session, if any.
    pub async fn current_user(&self, connection: &ConnectionId) -> Option<SessionClaims> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(connection).map(|s| s.claims.clone())
    }

    /// Token of the connection's session, if any.
    pub async fn current_token(&self, connection: &ConnectionId) -> Option<String> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(connection).map(|s| s.token.clone())
    }

    pub async fn session_info(&self, connection: &ConnectionId) -> Option<SessionInfo> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(connection).map(|s| SessionInfo {
            claims: s.claims.clone(),
            created_at: s.created_at,
            last_refreshed_at: s.last_refreshed_at,
            refresh_count: s.refresh_count,
            refresh_state: s.task.state(),
        })
    }

    /// Install a verified token and its claims, and (re)start background refresh.
    ///
    /// A refresh task already running for this connection is cancelled first.
    pub async fn set_session(
        &self,
        connection: &ConnectionId,
        token: impl Into<String>,
        claims: SessionClaims,
    ) {
        let mut sessions = self.inner.sessions.write().await;

        if let Some(previous) = sessions.remove(connection) {
            previous.task.cancel();
        }

        let task_id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = RefreshTask::spawn(RefreshScheduler::new(
            self.downgrade(),
            *connection,
            task_id,
            self.inner.refresh_interval,
        ));

        info!(
            connection = %connection,
            email = %claims.email,
            interval_secs = self.inner.refresh_interval.as_secs(),
            "Session established, token refresh started"
        );

        sessions.insert(
            *connection,
            Session {
                token: token.into(),
                claims,
                created_at: Utc::now(),
                last_refreshed_at: None,
                refresh_count: 0,
                task,
            },
        );
    }

    /// Cancel background refresh and drop the connection's session.
    ///
    /// Clearing a connection without a session does nothing.
    pub async fn clear_session(&self, connection: &ConnectionId) {
        let removed = self.inner.sessions.write().await.remove(connection);
        if let Some(session) = removed {
            session.task.cancel();
            info!(connection = %connection, email = %session.claims.email, "Session cleared");
        }
    }

    /// Refresh state of the connection; `Idle` when there is no session.
    pub async fn refresh_state(&self, connection: &ConnectionId) -> RefreshState {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(connection)
            .map(|s| s.task.state())
            .unwrap_or(RefreshState::Idle)
    }

    /// Watch the connection's refresh task state transitions.
    pub async fn subscribe_refresh(
        &self,
        connection: &ConnectionId,
    ) -> Option<watch::Receiver<RefreshState>> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(connection).map(|s| s.task.subscribe())
    }

    pub async fn active_sessions(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Clear every session. Used on process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<Session> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in &drained {
            session.task.cancel();
        }
        info!(count = drained.len(), "All sessions cleared");
    }

    /// Token of the session, provided `task_id` still owns it.
    pub(crate) async fn token_for_task(
        &self,
        connection: &ConnectionId,
        task_id: u64,
    ) -> Option<String> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(connection)
            .filter(|s| s.task.id() == task_id && !s.task.is_cancelled())
            .map(|s| s.token.clone())
    }

    /// Replace token and claims in one step. Returns false if `task_id` no
    /// longer owns the session.
    pub(crate) async fn rotate(
        &self,
        connection: &ConnectionId,
        task_id: u64,
        token: String,
        claims: SessionClaims,
    ) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get_mut(connection) {
            Some(session) if session.task.id() == task_id && !session.task.is_cancelled() => {
                session.token = token;
                session.claims = claims;
                session.last_refreshed_at = Some(Utc::now());
                session.refresh_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Remove the session after a failed refresh, if `task_id` still owns it.
    pub(crate) async fn terminate(&self, connection: &ConnectionId, task_id: u64) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        let owned = sessions
            .get(connection)
            .is_some_and(|s| s.task.id() == task_id);
        if owned {
            sessions.remove(connection);
        }
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::*;
    use crate::auth::MinimalClaims;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::MockServer;

    fn sample_claims(jti: &str) -> SessionClaims {
        let token = MinimalClaims {
            sub: "123".to_string(),
            jti: jti.to_string(),
            email: "ana@example.com".to_string(),
            iss: "portal".to_string(),
            aud: AUDIENCE.to_string(),
            iat: now(),
            exp: now() + 300,
        };
        let data = serde_json::from_value(session_data_body()).unwrap();
        SessionClaims::resolve(&token, data)
    }

    fn store(server: &MockServer, dir: &TempDir) -> SessionStore {
        SessionStore::new(
            Arc::new(verifier(server, dir)),
            refresher(server),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn set_then_read() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = store(&server, &dir);
        let conn = ConnectionId::new();

        store.set_session(&conn, "tok", sample_claims("a")).await;

        assert_eq!(store.current_token(&conn).await.as_deref(), Some("tok"));
        assert_eq!(store.current_user(&conn).await.unwrap().jti, "a");
        assert_eq!(store.refresh_state(&conn).await, RefreshState::Active);

        let info = store.session_info(&conn).await.unwrap();
        assert_eq!(info.refresh_count, 0);
        assert!(info.last_refreshed_at.is_none());
        assert!(info.created_at <= Utc::now());
    }

    #[tokio::test]
    async fn clear_is_immediate_and_idempotent() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = store(&server, &dir);
        let conn = ConnectionId::new();

        store.set_session(&conn, "tok", sample_claims("a")).await;
        store.clear_session(&conn).await;

        assert_eq!(store.current_token(&conn).await, None);
        assert_eq!(store.current_user(&conn).await, None);
        assert_eq!(store.refresh_state(&conn).await, RefreshState::Idle);

        store.clear_session(&conn).await;
        store.clear_session(&ConnectionId::new()).await;
    }

    #[tokio::test]
    async fn second_set_replaces_refresh_task() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = store(&server, &dir);
        let conn = ConnectionId::new();

        store.set_session(&conn, "tok-1", sample_claims("a")).await;
        let mut first = store.subscribe_refresh(&conn).await.unwrap();
        let first_id = store.inner.sessions.read().await[&conn].task.id();

        store.set_session(&conn, "tok-2", sample_claims("b")).await;
        let second_id = store.inner.sessions.read().await[&conn].task.id();

        assert_ne!(first_id, second_id);
        tokio::time::timeout(
            Duration::from_secs(5),
            first.wait_for(|s| *s == RefreshState::Terminated),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(store.refresh_state(&conn).await, RefreshState::Active);
        assert_eq!(store.current_token(&conn).await.as_deref(), Some("tok-2"));
        assert_eq!(store.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn connections_are_independent() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = store(&server, &dir);
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();

        store.set_session(&alice, "tok-a", sample_claims("a")).await;
        store.set_session(&bob, "tok-b", sample_claims("b")).await;
        store.clear_session(&alice).await;

        assert_eq!(store.current_token(&alice).await, None);
        assert_eq!(store.current_token(&bob).await.as_deref(), Some("tok-b"));
        assert_eq!(store.refresh_state(&bob).await, RefreshState::Active);
    }

    #[tokio::test]
    async fn stale_task_cannot_rotate_or_terminate() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = store(&server, &dir);
        let conn = ConnectionId::new();

        store.set_session(&conn, "tok-1", sample_claims("a")).await;
        let stale_id = store.inner.sessions.read().await[&conn].task.id();
        store.set_session(&conn, "tok-2", sample_claims("b")).await;

        assert_eq!(store.token_for_task(&conn, stale_id).await, None);
        assert!(
            !store
                .rotate(&conn, stale_id, "tok-x".into(), sample_claims("x"))
                .await
        );
        assert!(!store.terminate(&conn, stale_id).await);
        assert_eq!(store.current_token(&conn).await.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn shutdown_clears_everything() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = store(&server, &dir);
        let conns: Vec<_> = (0..3).map(|_| ConnectionId::new()).collect();
        for (i, conn) in conns.iter().enumerate() {
            store
                .set_session(conn, format!("tok-{i}"), sample_claims("a"))
                .await;
        }

        store.shutdown().await;

        assert_eq!(store.active_sessions().await, 0);
        for conn in &conns {
            assert_eq!(store.current_user(conn).await, None);
        }
    }

    #[test]
    fn connection_id_round_trips_through_string() {
        let conn = ConnectionId::new();
        let parsed: ConnectionId = conn.to_string().parse().unwrap();
        assert_eq!(parsed, conn);
        assert!("not-a-uuid".parse::<ConnectionId>().is_err());
        assert_eq!(serde_json::to_value(conn).unwrap(), json!(conn.to_string()));
    }
}
