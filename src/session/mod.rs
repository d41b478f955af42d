// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connection-scoped sessions and their background token refresh.

pub mod refresh;
pub mod store;

pub use refresh::{RefreshState, RefreshTask};
pub use store::{ConnectionId, SessionInfo, SessionStore};
