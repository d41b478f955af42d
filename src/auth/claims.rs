// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and resolved session claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Claims that are overlaid from the locally verified token onto the portal's
/// session-data payload. Values for these keys in the payload are discarded.
pub const OVERLAID_CLAIMS: [&str; 5] = ["iss", "aud", "iat", "exp", "jti"];

/// Claim set verifiable from the token alone.
///
/// Produced only by a successful signature check; every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimalClaims {
    /// Subject (portal user id)
    pub sub: String,
    /// Unique token id, the session-data lookup key
    pub jti: String,
    pub email: String,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expires at (Unix seconds)
    pub exp: i64,
}

/// Body of the portal's session-data response.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionData {
    pub email: String,
    pub name: String,
    pub profile: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Everything else the portal sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Authoritative identity record for a session.
///
/// `jti`, `iss`, `aud`, `iat` and `exp` always come from the verified token,
/// never from the portal lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionClaims {
    pub sub: String,
    pub jti: String,
    pub email: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Portal profile (role label)
    pub profile: String,
    /// Display name
    pub name: String,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Granted application identifiers, in portal order
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Additional fields returned by the portal
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

impl SessionClaims {
    /// Combine the portal payload with the verified token claims.
    pub fn resolve(token: &MinimalClaims, data: SessionData) -> Self {
        let mut extra = data.extra;
        extra.retain(|key, _| !OVERLAID_CLAIMS.contains(&key.as_str()) && key != "sub");

        Self {
            sub: token.sub.clone(),
            jti: token.jti.clone(),
            email: data.email,
            iss: token.iss.clone(),
            aud: token.aud.clone(),
            iat: token.iat,
            exp: token.exp,
            profile: data.profile,
            name: data.name,
            picture: data.picture,
            permissions: data.permissions,
            extra,
        }
    }

    pub fn has_permission(&self, app: &str) -> bool {
        self.permissions.iter().any(|p| p == app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> MinimalClaims {
        MinimalClaims {
            sub: "123".to_string(),
            jti: "tok-abc".to_string(),
            email: "ana@example.com".to_string(),
            iss: "portal".to_string(),
            aud: "portal-sso".to_string(),
            iat: 1_700_000_000,
            exp: 1_700_000_300,
        }
    }

    #[test]
    fn resolve_discards_remote_token_claims() {
        let data: SessionData = serde_json::from_value(json!({
            "email": "ana@example.com",
            "name": "Ana",
            "profile": "Developer",
            "permissions": ["crm", "portal-sso"],
            "iss": "evil",
            "aud": "other-app",
            "iat": 1,
            "exp": 9_999_999_999i64,
            "jti": "forged",
            "sub": "999",
            "department": "IT"
        }))
        .unwrap();

        let claims = SessionClaims::resolve(&minimal(), data);

        assert_eq!(claims.iss, "portal");
        assert_eq!(claims.aud, "portal-sso");
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.exp, 1_700_000_300);
        assert_eq!(claims.jti, "tok-abc");
        assert_eq!(claims.sub, "123");
        assert_eq!(claims.permissions, vec!["crm", "portal-sso"]);
        assert_eq!(claims.extra.len(), 1);
        assert_eq!(claims.extra["department"], "IT");
    }

    #[test]
    fn serialized_claims_carry_verified_values_only() {
        let data: SessionData = serde_json::from_value(json!({
            "email": "ana@example.com",
            "name": "Ana",
            "profile": "Developer",
            "exp": 1
        }))
        .unwrap();

        let value = serde_json::to_value(SessionClaims::resolve(&minimal(), data)).unwrap();

        assert_eq!(value["exp"], 1_700_000_300);
        assert_eq!(value["permissions"], json!([]));
        assert!(value.get("picture").is_none());
    }

    #[test]
    fn session_data_requires_identity_fields() {
        let result = serde_json::from_value::<SessionData>(json!({
            "email": "ana@example.com",
            "permissions": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn has_permission_matches_exact_id() {
        let data: SessionData = serde_json::from_value(json!({
            "email": "ana@example.com",
            "name": "Ana",
            "profile": "Developer",
            "permissions": ["crm"]
        }))
        .unwrap();
        let claims = SessionClaims::resolve(&minimal(), data);

        assert!(claims.has_permission("crm"));
        assert!(!claims.has_permission("cr"));
    }
}
