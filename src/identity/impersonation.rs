use crate::authority::{AccessReviewQuery, AccessReviewer, ReviewResource};
use crate::identity::{Error, Identity, ImpersonationKind, RequestContext};
use futures_util::stream::{self, TryStreamExt};
use hyper::http::request::Parts;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const IMPERSONATE_USER_HEADER: &str = "impersonate-user";
pub const IMPERSONATE_GROUP_HEADER: &str = "impersonate-group";

/// Identity override requested through the impersonation headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImpersonationRequest {
    pub target_user: Option<String>,
    pub target_groups: Vec<String>,
}

impl ImpersonationRequest {
    pub fn from_parts(parts: &Parts) -> Result<Self, Error> {
        let mut target_users = header_values(parts, IMPERSONATE_USER_HEADER)?;
        let target_groups = header_values(parts, IMPERSONATE_GROUP_HEADER)?;

        let target_user = if target_users.is_empty() {
            None
        } else {
            Some(target_users.swap_remove(0))
        };

        Ok(Self {
            target_user,
            target_groups,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.target_user.is_none() && self.target_groups.is_empty()
    }
}

fn header_values(parts: &Parts, name: &str) -> Result<Vec<String>, Error> {
    let mut values = Vec::new();
    for value in parts.headers.get_all(name) {
        let value = value.to_str().map_err(|_| {
            warn!("Rejecting non-ASCII {name} header");
            Error::InvalidImpersonationHeader(format!("{name} must be visible ASCII"))
        })?;
        let value = value.trim();
        if !value.is_empty() {
            values.push(value.to_string());
        }
    }
    Ok(values)
}

/// Authorizes and applies impersonation requests.
pub struct ImpersonationEnforcer {
    access_reviewer: Arc<dyn AccessReviewer>,
}

impl ImpersonationEnforcer {
    pub fn new(access_reviewer: Arc<dyn AccessReviewer>) -> Self {
        Self { access_reviewer }
    }

    /// Returns the caller unchanged when nothing is requested, otherwise the overridden identity
    /// once every target has been authorized for the caller.
    ///
    /// Checks run one at a time and the first denial stops the whole operation.
    #[instrument(skip_all, fields(actor = caller.username()))]
    pub async fn enforce(
        &self,
        context: &RequestContext,
        caller: Identity,
        request: &ImpersonationRequest,
    ) -> Result<Identity, Error> {
        if request.is_empty() {
            return Ok(caller);
        }

        let mut username = caller.username().to_string();
        if let Some(target_user) = &request.target_user {
            self.authorize(context, &caller, ImpersonationKind::User, target_user)
                .await?;
            username.clone_from(target_user);
        }

        let actor = &caller;
        let groups = stream::iter(request.target_groups.iter().map(Ok))
            .try_fold(caller.groups().to_vec(), move |mut groups, target_group| async move {
                self.authorize(context, actor, ImpersonationKind::Group, target_group)
                    .await?;
                groups.push(target_group.clone());
                Ok::<_, Error>(groups)
            })
            .await?;

        debug!("Impersonation granted to {}: now acting as {username}", caller.username());
        // Identity::new drops groups the caller already had or that were requested twice.
        Ok(Identity::new(username, groups))
    }

    async fn authorize(
        &self,
        context: &RequestContext,
        caller: &Identity,
        kind: ImpersonationKind,
        target: &str,
    ) -> Result<(), Error> {
        let resource = match kind {
            ImpersonationKind::User => ReviewResource::Users,
            ImpersonationKind::Group => ReviewResource::Groups,
        };
        let query =
            AccessReviewQuery::impersonate(caller.username(), caller.groups(), resource, target);

        let response = context.run(|| self.access_reviewer.review(&query)).await??;
        if !response.allowed {
            debug!("{} cannot impersonate the {kind} {target}", caller.username());
            return Err(Error::ImpersonationDenied {
                kind,
                actor: caller.username().to_string(),
                target: target.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{self, AccessReviewResponse, MockAccessReviewer};
    use hyper::header::HeaderValue;
    use hyper::Request;
    use mockall::predicate::eq;
    use tokio_util::sync::CancellationToken;

    fn caller() -> Identity {
        Identity::new("bob", vec!["eng".to_string()])
    }

    fn request(user: Option<&str>, groups: &[&str]) -> ImpersonationRequest {
        ImpersonationRequest {
            target_user: user.map(String::from),
            target_groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    fn query(resource: ReviewResource, name: &str) -> AccessReviewQuery {
        AccessReviewQuery::impersonate("bob", &["eng".to_string()], resource, name)
    }

    fn allow(allowed: bool) -> Result<AccessReviewResponse, authority::Error> {
        Ok(AccessReviewResponse { allowed })
    }

    #[tokio::test]
    async fn test_no_impersonation_requested() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer.expect_review().never();
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let identity = enforcer
            .enforce(&RequestContext::default(), caller(), &request(None, &[]))
            .await
            .unwrap();

        assert_eq!(identity, caller());
    }

    #[tokio::test]
    async fn test_user_and_group_impersonation() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .with(eq(query(ReviewResource::Users, "carol")))
            .times(1)
            .returning(|_| allow(true));
        reviewer
            .expect_review()
            .with(eq(query(ReviewResource::Groups, "admins")))
            .times(1)
            .returning(|_| allow(true));
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let identity = enforcer
            .enforce(
                &RequestContext::default(),
                caller(),
                &request(Some("carol"), &["admins"]),
            )
            .await
            .unwrap();

        assert_eq!(identity.username(), "carol");
        assert_eq!(identity.groups(), ["eng", "admins"]);
    }

    #[tokio::test]
    async fn test_user_denial_skips_group_checks() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .with(eq(query(ReviewResource::Users, "carol")))
            .times(1)
            .returning(|_| allow(false));
        reviewer
            .expect_review()
            .withf(|q| q.resource == ReviewResource::Groups)
            .never();
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let result = enforcer
            .enforce(
                &RequestContext::default(),
                caller(),
                &request(Some("carol"), &["admins"]),
            )
            .await;

        assert_eq!(
            result,
            Err(Error::ImpersonationDenied {
                kind: ImpersonationKind::User,
                actor: "bob".to_string(),
                target: "carol".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_group_denial_discards_earlier_grants() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .with(eq(query(ReviewResource::Groups, "ops")))
            .times(1)
            .returning(|_| allow(true));
        reviewer
            .expect_review()
            .with(eq(query(ReviewResource::Groups, "admins")))
            .times(1)
            .returning(|_| allow(false));
        reviewer
            .expect_review()
            .with(eq(query(ReviewResource::Groups, "sre")))
            .never();
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let result = enforcer
            .enforce(
                &RequestContext::default(),
                caller(),
                &request(None, &["ops", "admins", "sre"]),
            )
            .await;

        assert_eq!(
            result,
            Err(Error::ImpersonationDenied {
                kind: ImpersonationKind::Group,
                actor: "bob".to_string(),
                target: "admins".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_group_checks_use_original_caller() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .withf(|q| q.acting_user == "bob")
            .times(2)
            .returning(|_| allow(true));
        reviewer
            .expect_review()
            .withf(|q| q.acting_user != "bob")
            .never();
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let identity = enforcer
            .enforce(
                &RequestContext::default(),
                caller(),
                &request(Some("carol"), &["admins"]),
            )
            .await
            .unwrap();

        assert_eq!(identity.username(), "carol");
    }

    #[tokio::test]
    async fn test_already_present_group_is_not_duplicated() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer.expect_review().times(2).returning(|_| allow(true));
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let identity = enforcer
            .enforce(
                &RequestContext::default(),
                caller(),
                &request(None, &["eng", "admins"]),
            )
            .await
            .unwrap();

        assert_eq!(identity.username(), "bob");
        assert_eq!(identity.groups(), ["eng", "admins"]);
    }

    #[tokio::test]
    async fn test_many_target_groups() {
        let targets: Vec<String> = (0..20_000).map(|i| format!("team-{i}")).collect();
        let target_refs: Vec<&str> = targets.iter().map(String::as_str).collect();
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .times(targets.len())
            .returning(|_| allow(true));
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let identity = enforcer
            .enforce(
                &RequestContext::default(),
                caller(),
                &request(None, &target_refs),
            )
            .await
            .unwrap();

        assert_eq!(identity.groups().len(), targets.len() + 1);
        assert_eq!(identity.groups()[0], "eng");
        assert_eq!(identity.groups()[1..], targets[..]);
    }

    #[tokio::test]
    async fn test_backend_error() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .returning(|_| Err(authority::Error::Timeout));
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let result = enforcer
            .enforce(
                &RequestContext::default(),
                caller(),
                &request(Some("carol"), &[]),
            )
            .await;

        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancelled_context_issues_no_review() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer.expect_review().never();
        let enforcer = ImpersonationEnforcer::new(Arc::new(reviewer));

        let token = CancellationToken::new();
        token.cancel();

        let result = enforcer
            .enforce(
                &RequestContext::new(token),
                caller(),
                &request(Some("carol"), &["admins"]),
            )
            .await;

        assert_eq!(result, Err(Error::Cancelled));
    }

    #[test]
    fn test_request_from_headers() {
        let (parts, ()) = Request::builder()
            .header("Impersonate-User", "carol")
            .header("Impersonate-User", "dave")
            .header("Impersonate-Group", "admins")
            .header("Impersonate-Group", "")
            .header("Impersonate-Group", "ops")
            .body(())
            .unwrap()
            .into_parts();

        let request = ImpersonationRequest::from_parts(&parts).unwrap();

        assert_eq!(request.target_user.as_deref(), Some("carol"));
        assert_eq!(request.target_groups, ["admins", "ops"]);
    }

    #[test]
    fn test_request_without_headers() {
        let (parts, ()) = Request::builder()
            .header("Impersonate-User", " ")
            .body(())
            .unwrap()
            .into_parts();

        let request = ImpersonationRequest::from_parts(&parts).unwrap();
        assert!(request.is_empty());
    }

    #[test]
    fn test_non_ascii_header_is_rejected() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        parts.headers.insert(
            IMPERSONATE_USER_HEADER,
            HeaderValue::from_bytes("carolé".as_bytes()).unwrap(),
        );

        let result = ImpersonationRequest::from_parts(&parts);
        assert!(matches!(result, Err(Error::InvalidImpersonationHeader(_))));
    }
}
