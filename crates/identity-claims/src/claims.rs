//! Custom-claim filtering.
//!
//! ID tokens carry standard claims (issuer, audience, expiry, ...) next to the
//! application's custom claims. Only the custom ones are exposed to callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Deref;

/// Claim names reserved by the token format or the identity provider.
pub const STANDARD_CLAIMS: [&str; 14] = [
    "aud",
    "auth_time",
    "email",
    "email_verified",
    "exp",
    "firebase",
    "iat",
    "iss",
    "name",
    "phone_number",
    "picture",
    "sub",
    "uid",
    "user_id",
];

/// Returns true if `name` is one of [`STANDARD_CLAIMS`].
pub fn is_standard_claim(name: &str) -> bool {
    STANDARD_CLAIMS.contains(&name)
}

/// Claims left after removing [`STANDARD_CLAIMS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomClaims(Map<String, Value>);

impl CustomClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl Deref for CustomClaims {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Map<String, Value>> for CustomClaims {
    fn from(claims: Map<String, Value>) -> Self {
        filter_standard_claims(&claims)
    }
}

/// Strip standard claims from a raw claim set.
///
/// Pure and idempotent: filtering an already-filtered set returns it unchanged.
pub fn filter_standard_claims(claims: &Map<String, Value>) -> CustomClaims {
    CustomClaims(
        claims
            .iter()
            .filter(|(name, _)| !is_standard_claim(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn strips_standard_claims() {
        let raw = as_map(json!({
            "iss": "https://securetoken.google.com/project",
            "aud": "project",
            "exp": 1700000000,
            "iat": 1699996400,
            "sub": "u1",
            "user_id": "u1",
            "auth_time": 1699996400,
            "firebase": { "sign_in_provider": "password" },
            "role": "admin",
            "tier": 3
        }));

        let custom = filter_standard_claims(&raw);

        assert_eq!(custom.len(), 2);
        assert_eq!(custom.get("role"), Some(&json!("admin")));
        assert_eq!(custom.get("tier"), Some(&json!(3)));
    }

    #[test]
    fn filtering_is_idempotent() {
        let raw = as_map(json!({ "iss": "x", "role": "admin", "email": "a@b.c" }));

        let once = filter_standard_claims(&raw);
        let twice = filter_standard_claims(&once);

        assert_eq!(once, twice);
        assert!(twice.keys().all(|k| !is_standard_claim(k)));
    }

    #[test]
    fn empty_claims_stay_empty() {
        assert!(filter_standard_claims(&Map::new()).is_empty());
    }

    #[test]
    fn from_map_filters() {
        let custom: CustomClaims = as_map(json!({ "aud": "p", "beta": true })).into();
        assert_eq!(custom.into_inner(), as_map(json!({ "beta": true })));
    }

    #[test]
    fn serializes_as_plain_object() {
        let custom = filter_standard_claims(&as_map(json!({ "role": "admin" })));
        assert_eq!(serde_json::to_string(&custom).unwrap(), r#"{"role":"admin"}"#);
    }
}
