//! Structured bearer tokens (JWTs) and the claims read from them.
//!
//! Tokens are parsed without checking their signature: any well-formed token is routed to claim
//! extraction. Integrators that need authenticity install a [`TokenVerifier`] on the resolver.

use crate::identity::{Error, Identity};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

pub const SERVICE_ACCOUNT_ISSUER: &str = "kubernetes/serviceaccount";
pub const SERVICE_ACCOUNT_NAMESPACE_CLAIM: &str = "kubernetes.io/serviceaccount/namespace";
pub const SERVICE_ACCOUNTS_GROUP: &str = "system:serviceaccounts";
pub const GROUPS_CLAIM: &str = "groups";

const KNOWN_ALGORITHMS: [&str; 14] = [
    "HS256", "HS384", "HS512", "RS256", "RS384", "RS512", "ES256", "ES384", "ES512", "PS256",
    "PS384", "PS512", "EdDSA", "none",
];

/// A token with the three-segment JWT shape whose header and payload decode to JSON objects.
#[derive(Debug, Clone)]
pub struct StructuredToken {
    algorithm: String,
    header: Map<String, Value>,
    claims: Map<String, Value>,
    signing_input: String,
    signature: String,
}

impl StructuredToken {
    /// Returns `None` for anything that is not a structured token; such tokens are opaque.
    pub fn parse(token: &str) -> Option<Self> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments.as_slice() else {
            return None;
        };

        let header_map = decode_segment(header)?;
        let algorithm = header_map.get("alg")?.as_str()?.to_string();
        if !KNOWN_ALGORITHMS.contains(&algorithm.as_str()) {
            return None;
        }
        let claims = decode_segment(payload)?;

        Some(Self {
            algorithm,
            header: header_map,
            claims,
            signing_input: format!("{header}.{payload}"),
            signature: (*signature).to_string(),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// `<header>.<payload>` as received, the input a signature is computed over.
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

fn decode_segment(segment: &str) -> Option<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Authenticity check applied to structured tokens before their claims are trusted.
///
/// Rejections must be reported as [`Error::TokenRejected`].
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &StructuredToken) -> Result<(), Error>;
}

/// Accepts every structured token: claims are read without signature verification.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnverifiedClaims;

impl TokenVerifier for UnverifiedClaims {
    fn verify(&self, _token: &StructuredToken) -> Result<(), Error> {
        Ok(())
    }
}

/// Identity-relevant claims, validated in one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenClaims {
    ServiceAccount { subject: String, namespace: String },
    Generic { username: String, groups: Vec<String> },
}

impl TokenClaims {
    pub fn decode(claims: &Map<String, Value>, username_claim_field: &str) -> Result<Self, Error> {
        if claims.get("iss").and_then(Value::as_str) == Some(SERVICE_ACCOUNT_ISSUER) {
            return Ok(TokenClaims::ServiceAccount {
                subject: string_claim(claims, "sub")?,
                namespace: string_claim(claims, SERVICE_ACCOUNT_NAMESPACE_CLAIM)?,
            });
        }

        let username = claims
            .get(username_claim_field)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingUsernameClaim(username_claim_field.to_string()))?
            .to_string();

        let groups = match claims.get(GROUPS_CLAIM) {
            None => return Err(Error::MissingGroupsClaim),
            Some(Value::Array(values)) => values
                .iter()
                .map(|value| value.as_str().map(String::from).ok_or_else(groups_type_error))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(groups_type_error()),
        };

        Ok(TokenClaims::Generic { username, groups })
    }

    pub fn into_identity(self) -> Identity {
        match self {
            TokenClaims::ServiceAccount { subject, namespace } => Identity::new(
                subject,
                [
                    SERVICE_ACCOUNTS_GROUP.to_string(),
                    format!("{SERVICE_ACCOUNTS_GROUP}:{namespace}"),
                ],
            ),
            TokenClaims::Generic { username, groups } => Identity::new(username, groups),
        }
    }
}

fn string_claim(claims: &Map<String, Value>, claim: &str) -> Result<String, Error> {
    claims
        .get(claim)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| Error::ClaimTypeError {
            claim: claim.to_string(),
        })
}

fn groups_type_error() -> Error {
    Error::ClaimTypeError {
        claim: GROUPS_CLAIM.to_string(),
    }
}

/// Builds an unsigned token from JSON header and claims, for tests.
#[cfg(test)]
pub fn encode_test_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims_of(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("Expected a JSON object"),
        }
    }

    #[test]
    fn test_parse_structured_token() {
        let token = encode_test_token(
            &json!({"alg": "RS256", "typ": "JWT"}),
            &json!({"sub": "alice"}),
        );

        let parsed = StructuredToken::parse(&token).unwrap();
        assert_eq!(parsed.algorithm(), "RS256");
        assert_eq!(parsed.claims().get("sub"), Some(&json!("alice")));
        assert_eq!(parsed.header().get("typ"), Some(&json!("JWT")));
        assert_eq!(parsed.signature(), "c2lnbmF0dXJl");
        assert!(token.starts_with(parsed.signing_input()));
    }

    #[test]
    fn test_parse_accepts_padded_segments() {
        let header = base64::engine::general_purpose::URL_SAFE.encode(r#"{"alg":"HS256"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"a":1}"#);
        let token = format!("{header}.{payload}.sig");

        assert!(StructuredToken::parse(&token).is_some());
    }

    #[test]
    fn test_parse_rejects_opaque_tokens() {
        assert!(StructuredToken::parse("opaque-token").is_none());
        assert!(StructuredToken::parse("a.b").is_none());
        assert!(StructuredToken::parse("a.b.c.d").is_none());
        assert!(StructuredToken::parse("!!!.???.sig").is_none());

        let unknown_alg = encode_test_token(&json!({"alg": "XX999"}), &json!({}));
        assert!(StructuredToken::parse(&unknown_alg).is_none());

        let missing_alg = encode_test_token(&json!({"typ": "JWT"}), &json!({}));
        assert!(StructuredToken::parse(&missing_alg).is_none());

        let array_payload = encode_test_token(&json!({"alg": "HS256"}), &json!(["a"]));
        assert!(StructuredToken::parse(&array_payload).is_none());
    }

    #[test]
    fn test_service_account_claims() {
        let claims = claims_of(json!({
            "iss": "kubernetes/serviceaccount",
            "sub": "alice",
            "kubernetes.io/serviceaccount/namespace": "ns1"
        }));

        let decoded = TokenClaims::decode(&claims, "preferred_username").unwrap();
        let identity = decoded.into_identity();

        assert_eq!(identity.username(), "alice");
        assert_eq!(
            identity.groups(),
            ["system:serviceaccounts", "system:serviceaccounts:ns1"]
        );
    }

    #[test]
    fn test_service_account_subject_must_be_string() {
        let claims = claims_of(json!({
            "iss": "kubernetes/serviceaccount",
            "sub": 42,
            "kubernetes.io/serviceaccount/namespace": "ns1"
        }));

        assert_eq!(
            TokenClaims::decode(&claims, "preferred_username"),
            Err(Error::ClaimTypeError {
                claim: "sub".to_string()
            })
        );
    }

    #[test]
    fn test_service_account_namespace_required() {
        let claims = claims_of(json!({
            "iss": "kubernetes/serviceaccount",
            "sub": "alice"
        }));

        assert_eq!(
            TokenClaims::decode(&claims, "preferred_username"),
            Err(Error::ClaimTypeError {
                claim: SERVICE_ACCOUNT_NAMESPACE_CLAIM.to_string()
            })
        );
    }

    #[test]
    fn test_generic_claims() {
        let claims = claims_of(json!({
            "iss": "https://issuer.example.com",
            "email": "alice@example.com",
            "groups": ["eng", "ops"]
        }));

        let decoded = TokenClaims::decode(&claims, "email").unwrap();
        assert_eq!(
            decoded,
            TokenClaims::Generic {
                username: "alice@example.com".to_string(),
                groups: vec!["eng".to_string(), "ops".to_string()],
            }
        );
    }

    #[test]
    fn test_generic_claims_missing_username() {
        let claims = claims_of(json!({"groups": ["eng"]}));
        assert_eq!(
            TokenClaims::decode(&claims, "email"),
            Err(Error::MissingUsernameClaim("email".to_string()))
        );

        let claims = claims_of(json!({"email": 7, "groups": ["eng"]}));
        assert_eq!(
            TokenClaims::decode(&claims, "email"),
            Err(Error::MissingUsernameClaim("email".to_string()))
        );
    }

    #[test]
    fn test_generic_claims_missing_groups() {
        let claims = claims_of(json!({"email": "alice@example.com", "sub": "alice"}));
        assert_eq!(
            TokenClaims::decode(&claims, "email"),
            Err(Error::MissingGroupsClaim)
        );
    }

    #[test]
    fn test_generic_claims_group_types() {
        let claims = claims_of(json!({"email": "alice", "groups": ["eng", 3]}));
        assert_eq!(
            TokenClaims::decode(&claims, "email"),
            Err(Error::ClaimTypeError {
                claim: "groups".to_string()
            })
        );

        let claims = claims_of(json!({"email": "alice", "groups": "eng"}));
        assert!(matches!(
            TokenClaims::decode(&claims, "email"),
            Err(Error::ClaimTypeError { .. })
        ));
    }

    #[test]
    fn test_unverified_claims_accepts_everything() {
        let token = encode_test_token(&json!({"alg": "none"}), &json!({}));
        let parsed = StructuredToken::parse(&token).unwrap();
        assert!(UnverifiedClaims.verify(&parsed).is_ok());
    }
}
