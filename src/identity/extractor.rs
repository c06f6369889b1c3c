use crate::authority::{TokenReviewQuery, TokenReviewer};
use crate::identity::claims::{StructuredToken, TokenClaims, TokenVerifier};
use crate::identity::{CredentialKind, Error, Identity, PeerCertificates, RequestContext};
use hyper::http::request::Parts;
use std::sync::Arc;
use tracing::{debug, instrument};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// Turns the classified credential of a request into a username and groups.
pub struct IdentityExtractor {
    username_claim_field: String,
    verifier: Arc<dyn TokenVerifier>,
    token_reviewer: Arc<dyn TokenReviewer>,
}

impl IdentityExtractor {
    pub fn new(
        username_claim_field: String,
        verifier: Arc<dyn TokenVerifier>,
        token_reviewer: Arc<dyn TokenReviewer>,
    ) -> Self {
        Self {
            username_claim_field,
            verifier,
            token_reviewer,
        }
    }

    pub fn set_verifier(&mut self, verifier: Arc<dyn TokenVerifier>) {
        self.verifier = verifier;
    }

    pub async fn extract(
        &self,
        context: &RequestContext,
        parts: &Parts,
        kind: &CredentialKind,
    ) -> Result<Identity, Error> {
        match kind {
            CredentialKind::Certificate => {
                let chain = parts.extensions.get::<PeerCertificates>();
                let leaf = chain
                    .and_then(PeerCertificates::leaf)
                    .ok_or(Error::MissingPeerCertificate)?;
                certificate_identity(leaf)
            }
            CredentialKind::BearerToken(token) => self.bearer_identity(context, token).await,
            CredentialKind::Anonymous => Err(Error::NoCredentials),
        }
    }

    async fn bearer_identity(&self, context: &RequestContext, token: &str) -> Result<Identity, Error> {
        match StructuredToken::parse(token) {
            Some(structured) => {
                debug!(alg = structured.algorithm(), "Reading claims from structured token");
                self.verifier.verify(&structured)?;
                let claims = TokenClaims::decode(structured.claims(), &self.username_claim_field)?;
                Ok(claims.into_identity())
            }
            None => self.review_token(context, token).await,
        }
    }

    #[instrument(skip_all)]
    async fn review_token(&self, context: &RequestContext, token: &str) -> Result<Identity, Error> {
        debug!("Token is opaque, delegating to token review");
        let query = TokenReviewQuery {
            token: token.to_string(),
        };

        let response = context
            .run(|| self.token_reviewer.review(&query))
            .await?
            .map_err(|error| Error::TokenReviewFailed(error.to_string()))?;

        if let Some(status_error) = response.status_error.filter(|e| !e.is_empty()) {
            debug!("Token review reported an error: {status_error}");
            return Err(Error::TokenReviewDenied(status_error));
        }

        Ok(Identity::new(response.username, response.groups))
    }
}

/// Subject common name becomes the username, subject organizations the groups.
fn certificate_identity(der: &[u8]) -> Result<Identity, Error> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
        debug!("Failed to parse client certificate: {:?}", e);
        Error::MalformedCertificate(format!("{e:?}"))
    })?;
    let subject = cert.subject();

    let username = subject
        .iter_common_name()
        .next()
        .map(|cn| cn.as_str().map(String::from))
        .transpose()
        .map_err(|_| {
            Error::MalformedCertificate("Unable to parse certificate common name".to_string())
        })?
        .unwrap_or_default();

    let groups = subject
        .iter_organization()
        .map(|o| o.as_str().map(String::from))
        .collect::<Result<Vec<String>, _>>()
        .map_err(|_| {
            Error::MalformedCertificate("Unable to parse certificate organizations".to_string())
        })?;

    Ok(Identity::new(username, groups))
}
