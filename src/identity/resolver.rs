use crate::authority::{AccessReviewer, TokenReviewer};
use crate::identity::extractor::IdentityExtractor;
use crate::identity::impersonation::{ImpersonationEnforcer, ImpersonationRequest};
use crate::identity::{
    Config, CredentialKind, Error, Identity, RequestContext, TokenVerifier, UnverifiedClaims,
};
use crate::metrics_provider::IDENTITY_RESOLUTIONS;
use hyper::http::request::Parts;
use std::sync::Arc;
use tracing::{debug, field, instrument, Span};

/// Resolves the effective identity of an inbound request.
pub struct IdentityResolver {
    extractor: IdentityExtractor,
    enforcer: ImpersonationEnforcer,
}

impl IdentityResolver {
    pub fn new(
        config: &Config,
        access_reviewer: Arc<dyn AccessReviewer>,
        token_reviewer: Arc<dyn TokenReviewer>,
    ) -> Self {
        Self {
            extractor: IdentityExtractor::new(
                config.username_claim_field.clone(),
                Arc::new(UnverifiedClaims),
                token_reviewer,
            ),
            enforcer: ImpersonationEnforcer::new(access_reviewer),
        }
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.extractor.set_verifier(verifier);
        self
    }

    #[instrument(skip_all, fields(auth_method = field::Empty, username = field::Empty))]
    pub async fn resolve(&self, context: &RequestContext, parts: &Parts) -> Result<Identity, Error> {
        let kind = CredentialKind::classify(parts);
        let method = kind.method();
        Span::current().record("auth_method", method);

        let result = self.resolve_kind(context, parts, &kind).await;

        let outcome = match &result {
            Ok(identity) => {
                Span::current().record("username", identity.username());
                "success"
            }
            Err(error) => {
                debug!("Identity resolution failed: {error}");
                error.kind()
            }
        };
        IDENTITY_RESOLUTIONS
            .with_label_values(&[method, outcome])
            .inc();

        result
    }

    async fn resolve_kind(
        &self,
        context: &RequestContext,
        parts: &Parts,
        kind: &CredentialKind,
    ) -> Result<Identity, Error> {
        if *kind == CredentialKind::Anonymous {
            return Err(Error::NoCredentials);
        }

        let identity = self.extractor.extract(context, parts, kind).await?;
        if identity.username().is_empty() {
            return Err(Error::EmptyUsername);
        }

        let impersonation = ImpersonationRequest::from_parts(parts)?;

        self.enforcer.enforce(context, identity, &impersonation).await
    }
}
