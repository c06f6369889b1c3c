use crate::identity::HeaderExt;
use hyper::http::request::Parts;
use std::fmt;
use std::sync::Arc;

/// Extension type carrying the DER-encoded peer certificate chain (leaf first) from the TLS layer.
#[derive(Clone, Debug)]
pub struct PeerCertificates(pub Arc<Vec<Vec<u8>>>);

impl PeerCertificates {
    pub fn leaf(&self) -> Option<&[u8]> {
        self.0.first().map(Vec::as_slice)
    }
}

/// Credential presented by a request.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialKind {
    Certificate,
    BearerToken(String),
    Anonymous,
}

impl CredentialKind {
    /// A peer certificate always wins over a bearer token sent on the same request, so a caller
    /// cannot pick a weaker authentication path.
    pub fn classify(parts: &Parts) -> Self {
        let has_certificate = parts
            .extensions
            .get::<PeerCertificates>()
            .is_some_and(|chain| !chain.0.is_empty());

        match (has_certificate, parts.bearer_token()) {
            (true, _) => CredentialKind::Certificate,
            (false, Some(token)) => CredentialKind::BearerToken(token),
            (false, None) => CredentialKind::Anonymous,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            CredentialKind::Certificate => "certificate",
            CredentialKind::BearerToken(_) => "bearer",
            CredentialKind::Anonymous => "anonymous",
        }
    }
}

impl fmt::Debug for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Certificate => write!(f, "Certificate"),
            CredentialKind::BearerToken(_) => write!(f, "BearerToken(<redacted>)"),
            CredentialKind::Anonymous => write!(f, "Anonymous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::AUTHORIZATION;
    use hyper::Request;

    fn build_parts(authorization: Option<&str>, chain: Option<Vec<Vec<u8>>>) -> Parts {
        let mut builder = Request::builder();
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        let mut request = builder.body(()).unwrap();
        if let Some(chain) = chain {
            request
                .extensions_mut()
                .insert(PeerCertificates(Arc::new(chain)));
        }
        let (parts, ()) = request.into_parts();
        parts
    }

    #[test]
    fn test_certificate_takes_precedence_over_bearer() {
        let parts = build_parts(Some("Bearer some-token"), Some(vec![vec![0x30]]));
        assert_eq!(CredentialKind::classify(&parts), CredentialKind::Certificate);
    }

    #[test]
    fn test_bearer_token() {
        let parts = build_parts(Some("Bearer some-token"), None);
        assert_eq!(
            CredentialKind::classify(&parts),
            CredentialKind::BearerToken("some-token".to_string())
        );
    }

    #[test]
    fn test_empty_chain_falls_back_to_bearer() {
        let parts = build_parts(Some("Bearer some-token"), Some(vec![]));
        assert_eq!(CredentialKind::classify(&parts).method(), "bearer");
    }

    #[test]
    fn test_anonymous() {
        assert_eq!(
            CredentialKind::classify(&build_parts(None, None)),
            CredentialKind::Anonymous
        );
        assert_eq!(
            CredentialKind::classify(&build_parts(Some("Bearer "), None)),
            CredentialKind::Anonymous
        );
        assert_eq!(
            CredentialKind::classify(&build_parts(Some("Basic dXNlcjpwYXNz"), None)),
            CredentialKind::Anonymous
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let kind = CredentialKind::BearerToken("secret".to_string());
        assert!(!format!("{kind:?}").contains("secret"));
    }
}
