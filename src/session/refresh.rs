// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Background Token Refresh
//!
//! One task per session. Every `refresh_interval` the task:
//! 1. Reads the session's current token
//! 2. Exchanges it at the portal refresh endpoint
//! 3. Verifies the replacement through the full two-phase check
//! 4. Swaps token and claims in the store
//!
//! Any failure ends the session and the task. Ticks never overlap.
//!
//! ## Shutdown
//!
//! Each task is driven by its own `CancellationToken`. Clearing or replacing
//! the session cancels it; a stale task that wakes up after replacement finds
//! it no longer owns the session and exits without touching it.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::store::{ConnectionId, WeakSessionStore};
use crate::auth::AuthError;

/// Lifecycle of a connection's refresh task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    /// No session, no task
    Idle,
    /// Waiting for or running a tick
    Active,
    /// Cancelled, failed or orphaned
    Terminated,
}

/// Handle to a running refresh task. Dropping it cancels the task.
pub struct RefreshTask {
    id: u64,
    cancel: CancellationToken,
    state: watch::Receiver<RefreshState>,
}

impl RefreshTask {
    pub(crate) fn spawn(scheduler: RefreshScheduler) -> Self {
        let id = scheduler.task_id;
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(RefreshState::Active);
        tokio::spawn(scheduler.run(cancel.clone(), state_tx));
        Self { id, cancel, state }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.clone()
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Tick {
    Rotated,
    /// The session was cleared, replaced or the store dropped.
    Orphaned,
    Failed(AuthError),
}

/// Periodic refresh loop for one session.
pub(crate) struct RefreshScheduler {
    store: WeakSessionStore,
    connection: ConnectionId,
    task_id: u64,
    interval: Duration,
}

impl RefreshScheduler {
    pub(crate) fn new(
        store: WeakSessionStore,
        connection: ConnectionId,
        task_id: u64,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            connection,
            task_id,
            interval,
        }
    }

    async fn run(self, shutdown: CancellationToken, state: watch::Sender<RefreshState>) {
        debug!(
            connection = %self.connection,
            task_id = self.task_id,
            "Refresh task starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => break,
            }

            let tick = tokio::select! {
                tick = self.tick() => tick,
                _ = shutdown.cancelled() => break,
            };

            match tick {
                Tick::Rotated => {
                    debug!(connection = %self.connection, "Session token rotated");
                }
                Tick::Orphaned => break,
                Tick::Failed(e) => {
                    warn!(
                        connection = %self.connection,
                        error = %e,
                        "Token refresh failed, ending session"
                    );
                    if let Some(store) = self.store.upgrade() {
                        if store.terminate(&self.connection, self.task_id).await {
                            info!(connection = %self.connection, "Session cleared after refresh failure");
                        }
                    }
                    break;
                }
            }
        }

        state.send_replace(RefreshState::Terminated);
        debug!(
            connection = %self.connection,
            task_id = self.task_id,
            "Refresh task stopped"
        );
    }

    async fn tick(&self) -> Tick {
        let Some(store) = self.store.upgrade() else {
            return Tick::Orphaned;
        };
        let Some(token) = store.token_for_task(&self.connection, self.task_id).await else {
            return Tick::Orphaned;
        };

        let Some(new_token) = store.refresher().refresh(&token).await else {
            return Tick::Failed(AuthError::RefreshFailed(
                "portal did not issue a new token".to_string(),
            ));
        };

        let claims = match store.verifier().verify(&new_token).await {
            Ok(Some(claims)) => claims,
            Ok(None) => {
                return Tick::Failed(AuthError::RefreshFailed(
                    "refreshed token failed verification".to_string(),
                ))
            }
            Err(e) => return Tick::Failed(AuthError::RefreshFailed(e.to_string())),
        };

        if store
            .rotate(&self.connection, self.task_id, new_token, claims)
            .await
        {
            Tick::Rotated
        } else {
            Tick::Orphaned
        }
    }
}
