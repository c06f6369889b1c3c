//! Collaborators the identity resolver delegates to.
//!
//! The resolver only knows the two review traits; `kubernetes::ReviewClient` implements both
//! against the Kubernetes review APIs.

mod error;
pub mod http_client;
pub mod kubernetes;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub use error::Error;
pub use kubernetes::ReviewClient;

pub const IMPERSONATE_VERB: &str = "impersonate";

/// Resource an impersonation access review is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewResource {
    Users,
    Groups,
}

impl ReviewResource {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewResource::Users => "users",
            ReviewResource::Groups => "groups",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessReviewQuery {
    pub acting_user: String,
    pub acting_groups: Vec<String>,
    pub verb: &'static str,
    pub resource: ReviewResource,
    pub resource_name: String,
}

impl AccessReviewQuery {
    pub fn impersonate(
        acting_user: &str,
        acting_groups: &[String],
        resource: ReviewResource,
        resource_name: &str,
    ) -> Self {
        Self {
            acting_user: acting_user.to_string(),
            acting_groups: acting_groups.to_vec(),
            verb: IMPERSONATE_VERB,
            resource,
            resource_name: resource_name.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessReviewResponse {
    pub allowed: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenReviewQuery {
    pub token: String,
}

impl fmt::Debug for TokenReviewQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenReviewQuery")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenReviewResponse {
    pub username: String,
    pub groups: Vec<String>,
    pub status_error: Option<String>,
}

/// Decides whether a subject may perform an action.
///
/// Implementations are shared between concurrent resolutions and must not keep per-request state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    async fn review(&self, query: &AccessReviewQuery) -> Result<AccessReviewResponse, Error>;
}

/// Validates opaque bearer tokens and tells who they belong to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenReviewer: Send + Sync {
    async fn review(&self, query: &TokenReviewQuery) -> Result<TokenReviewResponse, Error>;
}
