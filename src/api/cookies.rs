// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connection identity cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::session::ConnectionId;

pub const SESSION_COOKIE_NAME: &str = "sso_session";

fn session_cookie(connection: &ConnectionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, connection.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Connection named by the cookie, if present and well formed.
pub(super) fn existing_connection(jar: &CookieJar) -> Option<ConnectionId> {
    jar.get(SESSION_COOKIE_NAME)
        .and_then(|c| c.value().parse().ok())
}

/// Connection named by the cookie, or a fresh one with the cookie set.
pub(super) fn connection_or_new(jar: CookieJar) -> (CookieJar, ConnectionId) {
    match existing_connection(&jar) {
        Some(connection) => (jar, connection),
        None => {
            let connection = ConnectionId::new();
            (jar.add(session_cookie(&connection)), connection)
        }
    }
}

/// Jar with the identity cookie removed.
pub(super) fn clear_connection(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE_NAME).path("/"))
}
