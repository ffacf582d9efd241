//! Token extraction and caller identity resolution.
//!
//! Resolution is a pure function of the auth mode, the extracted token,
//! the startup token map, and the payload's optional `identity` object.
//! It performs no I/O and never touches the downstream store; auth
//! failures are detected synchronously before any write is attempted.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::config::{AuthMode, TokenMap};
use crate::error::{AuthSubcode, CollectorError};

/// Resolved caller identity, attached to every enriched record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Verified {
        id: String,
        name: Option<String>,
        kind: Option<String>,
        tags: BTreeMap<String, String>,
    },
    /// Arbitrary caller-supplied fields, trusted verbatim. Only this
    /// variant carries an open-ended payload.
    Passthrough { fields: Map<String, Value> },
}

impl Identity {
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Verified { .. } => "verified",
            Self::Passthrough { .. } => "passthrough",
        }
    }

    /// JSON form written into enriched records. The `mode` key always
    /// reflects the variant, including on passthrough payloads that
    /// tried to set their own.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Anonymous => {
                let mut obj = Map::new();
                obj.insert("mode".into(), Value::String("anonymous".into()));
                Value::Object(obj)
            }
            Self::Verified { id, name, kind, tags } => {
                let mut obj = Map::new();
                obj.insert("mode".into(), Value::String("verified".into()));
                obj.insert("id".into(), Value::String(id.clone()));
                if let Some(name) = name {
                    obj.insert("name".into(), Value::String(name.clone()));
                }
                if let Some(kind) = kind {
                    obj.insert("type".into(), Value::String(kind.clone()));
                }
                if !tags.is_empty() {
                    obj.insert(
                        "tags".into(),
                        Value::Object(
                            tags.iter()
                                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                                .collect(),
                        ),
                    );
                }
                Value::Object(obj)
            }
            Self::Passthrough { fields } => {
                let mut obj = fields.clone();
                obj.insert("mode".into(), Value::String("passthrough".into()));
                Value::Object(obj)
            }
        }
    }
}

/// Pull the caller's token out of the request headers.
///
/// Precedence: `Authorization: Devlogs1 <t>`, then
/// `Authorization: Bearer <t>`, then `X-Devlogs-Token`. The first form
/// present wins; the rest are ignored.
#[must_use]
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Devlogs1 ") {
            return non_empty(token);
        }
        if let Some(token) = value.strip_prefix("Bearer ") {
            return non_empty(token);
        }
    }

    headers
        .get("x-devlogs-token")
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
}

fn non_empty(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

const fn in_alphabet(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

/// Check the verified-mode token shape: `dl1_<kid>_<secret>` with `kid`
/// 6-24 and `secret` 32-64 chars of `[A-Za-z0-9_-]`.
///
/// `_` is both separator and alphabet member, so the token is
/// well-formed if any `_` position satisfies both length ranges.
#[must_use]
pub fn is_wellformed_token(token: &str) -> bool {
    let Some(rest) = token.strip_prefix("dl1_") else {
        return false;
    };
    let bytes = rest.as_bytes();
    if !bytes.iter().all(|&c| in_alphabet(c)) {
        return false;
    }

    bytes.iter().enumerate().any(|(i, &c)| {
        c == b'_' && (6..=24).contains(&i) && (32..=64).contains(&(bytes.len() - i - 1))
    })
}

/// Resolve the caller identity for one request.
///
/// Pure and deterministic given its inputs; see the module docs.
pub fn resolve_identity(
    mode: AuthMode,
    token: Option<&str>,
    tokens: &TokenMap,
    payload_identity: Option<&Map<String, Value>>,
) -> Result<Identity, CollectorError> {
    match mode {
        AuthMode::AllowAnonymous => Ok(token
            .and_then(|t| tokens.get(t))
            .map_or(Identity::Anonymous, verified)),

        AuthMode::RequireTokenPassthrough => {
            if token.is_none() {
                return Err(missing_token());
            }
            Ok(payload_identity.map_or(Identity::Anonymous, |fields| Identity::Passthrough {
                fields: fields.clone(),
            }))
        }

        AuthMode::RequireTokenVerified => {
            let token = token.ok_or_else(missing_token)?;
            // Shape check comes before any map lookup
            if !is_wellformed_token(token) {
                return Err(CollectorError::Auth {
                    subcode: AuthSubcode::MalformedToken,
                    message: "token does not match dl1_<kid>_<secret>".into(),
                });
            }
            tokens.get(token).map(verified).ok_or(CollectorError::Auth {
                subcode: AuthSubcode::UnknownToken,
                message: "token is not recognized".into(),
            })
        }
    }
}

fn verified(entry: &crate::config::TokenEntry) -> Identity {
    Identity::Verified {
        id: entry.id.clone(),
        name: entry.name.clone(),
        kind: entry.kind.clone(),
        tags: entry.tags.clone(),
    }
}

fn missing_token() -> CollectorError {
    CollectorError::Auth {
        subcode: AuthSubcode::MissingToken,
        message: "a token is required in this auth mode".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenEntry;

    fn wellformed() -> String {
        format!("dl1_svckey_{}", "a".repeat(32))
    }

    fn token_map(token: &str) -> TokenMap {
        let mut map = TokenMap::new();
        map.insert(
            token.to_string(),
            TokenEntry {
                id: "svc-a".into(),
                name: Some("Service A".into()),
                kind: Some("service".into()),
                tags: [("team".to_string(), "core".to_string())].into(),
            },
        );
        map
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                k.parse::<axum::http::HeaderName>().unwrap(),
                v.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn devlogs1_scheme_wins_over_devlogs_header() {
        let headers = headers(&[
            ("authorization", "Devlogs1 tok-a"),
            ("x-devlogs-token", "tok-b"),
        ]);
        assert_eq!(extract_token(&headers).as_deref(), Some("tok-a"));
    }

    #[test]
    fn bearer_scheme_is_second() {
        let headers = headers(&[
            ("authorization", "Bearer tok-bearer"),
            ("x-devlogs-token", "tok-b"),
        ]);
        assert_eq!(extract_token(&headers).as_deref(), Some("tok-bearer"));
    }

    #[test]
    fn devlogs_header_is_the_fallback() {
        let headers = headers(&[("x-devlogs-token", "tok-b")]);
        assert_eq!(extract_token(&headers).as_deref(), Some("tok-b"));
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[test]
    fn unknown_authorization_scheme_falls_through() {
        let headers = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz"),
            ("x-devlogs-token", "tok-b"),
        ]);
        assert_eq!(extract_token(&headers).as_deref(), Some("tok-b"));
    }

    #[test]
    fn token_shape_boundaries() {
        assert!(is_wellformed_token(&format!("dl1_abcdef_{}", "a".repeat(32))));
        assert!(is_wellformed_token(&format!(
            "dl1_{}_{}",
            "k".repeat(24),
            "s".repeat(64)
        )));
        // kid too short
        assert!(!is_wellformed_token(&format!("dl1_abcde_{}", "a".repeat(32))));
        // secret too short
        assert!(!is_wellformed_token(&format!("dl1_abcdef_{}", "a".repeat(31))));
        // wrong prefix
        assert!(!is_wellformed_token(&format!("dl2_abcdef_{}", "a".repeat(32))));
        // character outside the alphabet
        assert!(!is_wellformed_token(&format!("dl1_abc!ef_{}", "a".repeat(32))));
        // no separator at all
        assert!(!is_wellformed_token(&format!("dl1_{}", "a".repeat(40))));
    }

    #[test]
    fn underscores_inside_kid_are_accepted() {
        // kid "svc_key_x" has underscores; a valid split still exists
        assert!(is_wellformed_token(&format!(
            "dl1_svc_key_x_{}",
            "a".repeat(32)
        )));
    }

    #[test]
    fn anonymous_mode_never_fails() {
        let token = wellformed();
        let map = token_map(&token);

        let id = resolve_identity(AuthMode::AllowAnonymous, None, &map, None).unwrap();
        assert_eq!(id, Identity::Anonymous);

        let id =
            resolve_identity(AuthMode::AllowAnonymous, Some("garbage !!"), &map, None).unwrap();
        assert_eq!(id, Identity::Anonymous);

        let id = resolve_identity(AuthMode::AllowAnonymous, Some(&token), &map, None).unwrap();
        assert_eq!(id.mode(), "verified");
    }

    #[test]
    fn passthrough_requires_a_token_but_not_a_shape() {
        let map = TokenMap::new();

        let err = resolve_identity(AuthMode::RequireTokenPassthrough, None, &map, None)
            .unwrap_err();
        assert_eq!(err.subcode(), Some("MISSING_TOKEN"));

        let id = resolve_identity(AuthMode::RequireTokenPassthrough, Some("anything"), &map, None)
            .unwrap();
        assert_eq!(id, Identity::Anonymous);
    }

    #[test]
    fn passthrough_copies_payload_identity_and_forces_mode() {
        let mut fields = Map::new();
        fields.insert("user".into(), Value::String("jdoe".into()));
        fields.insert("mode".into(), Value::String("verified".into()));

        let id = resolve_identity(
            AuthMode::RequireTokenPassthrough,
            Some("anything"),
            &TokenMap::new(),
            Some(&fields),
        )
        .unwrap();

        let value = id.to_value();
        assert_eq!(value["user"], "jdoe");
        assert_eq!(value["mode"], "passthrough");
    }

    #[test]
    fn verified_mode_rejects_malformed_before_lookup() {
        // The malformed token IS in the map; shape check must win anyway
        let map = token_map("not-a-dl1-token");
        let err = resolve_identity(
            AuthMode::RequireTokenVerified,
            Some("not-a-dl1-token"),
            &map,
            None,
        )
        .unwrap_err();
        assert_eq!(err.subcode(), Some("MALFORMED_TOKEN"));
    }

    #[test]
    fn verified_mode_distinguishes_missing_and_unknown() {
        let token = wellformed();
        let map = token_map(&token);

        let err =
            resolve_identity(AuthMode::RequireTokenVerified, None, &map, None).unwrap_err();
        assert_eq!(err.subcode(), Some("MISSING_TOKEN"));

        let unknown = format!("dl1_otherkey_{}", "b".repeat(32));
        let err = resolve_identity(AuthMode::RequireTokenVerified, Some(&unknown), &map, None)
            .unwrap_err();
        assert_eq!(err.subcode(), Some("UNKNOWN_TOKEN"));

        let id = resolve_identity(AuthMode::RequireTokenVerified, Some(&token), &map, None)
            .unwrap();
        let value = id.to_value();
        assert_eq!(value["mode"], "verified");
        assert_eq!(value["id"], "svc-a");
        assert_eq!(value["tags"]["team"], "core");
    }
}
