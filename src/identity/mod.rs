//! Caller identity resolution.
//!
//! A request is classified by the credential it carries, turned into an [`Identity`], and then
//! optionally overridden through the `Impersonate-User` / `Impersonate-Group` headers once every
//! requested target has been authorized.

pub mod claims;
mod context;
pub mod credential;
mod error;
pub mod extractor;
pub mod impersonation;
mod request_ext;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use claims::{TokenVerifier, UnverifiedClaims};
pub use context::RequestContext;
pub use credential::{CredentialKind, PeerCertificates};
pub use error::{Error, ImpersonationKind};
pub use request_ext::HeaderExt;
pub use resolver::IdentityResolver;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Claim read as the username from structured tokens not issued to service accounts.
    #[serde(default = "Config::default_username_claim_field")]
    pub username_claim_field: String,
}

impl Config {
    fn default_username_claim_field() -> String {
        "preferred_username".to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username_claim_field: Self::default_username_claim_field(),
        }
    }
}

/// Resolved caller identity.
///
/// Groups keep their first-seen order and never contain duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Identity {
    username: String,
    groups: Vec<String>,
}

impl Identity {
    pub fn new<I>(username: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let unique_groups = groups
            .into_iter()
            .filter(|group| seen.insert(group.clone()))
            .collect();

        Self {
            username: username.into(),
            groups: unique_groups,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}
