use crate::authority::http_client::{HttpClient, HttpClientConfig};
use crate::authority::{
    AccessReviewQuery, AccessReviewResponse, AccessReviewer, Error, TokenReviewQuery,
    TokenReviewResponse, TokenReviewer,
};
use crate::configuration;
use crate::metrics_provider::{AUTHORITY_REVIEWS, AUTHORITY_REVIEW_DURATION};
use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const SUBJECT_ACCESS_REVIEW_PATH: &str = "/apis/authorization.k8s.io/v1/subjectaccessreviews";
const TOKEN_REVIEW_PATH: &str = "/apis/authentication.k8s.io/v1/tokenreviews";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub url: String,
    #[serde(default = "Config::default_timeout_ms")]
    pub timeout_ms: u64,
    pub bearer_token_file: Option<PathBuf>,
    pub server_ca_bundle: Option<String>,
    pub client_certificate: Option<String>,
    pub client_private_key: Option<String>,
}

impl Config {
    fn default_timeout_ms() -> u64 {
        5000
    }

    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if let Some(path) = self.bearer_token_file.as_mut() {
            *path = configuration::resolve_path(base_dir, &*path);
        }
        let paths = [
            self.server_ca_bundle.as_mut(),
            self.client_certificate.as_mut(),
            self.client_private_key.as_mut(),
        ];
        for path in paths.into_iter().flatten() {
            *path = configuration::resolve_path(base_dir, &*path)
                .to_string_lossy()
                .into_owned();
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.client_certificate.is_some() != self.client_private_key.is_some() {
            return Err(Error::Configuration(
                "Both certificate and key required for mTLS".to_string(),
            ));
        }

        let uri = Uri::try_from(&self.url)
            .map_err(|e| Error::Configuration(format!("Invalid authority URL: {e}")))?;
        if !matches!(uri.scheme_str(), Some("http" | "https")) {
            return Err(Error::Configuration(format!(
                "Authority URL must be http or https: {}",
                self.url
            )));
        }

        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectAccessReview<'a> {
    api_version: &'static str,
    kind: &'static str,
    spec: SubjectAccessReviewSpec<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectAccessReviewSpec<'a> {
    resource_attributes: ResourceAttributes<'a>,
    user: &'a str,
    groups: &'a [String],
}

#[derive(Serialize)]
struct ResourceAttributes<'a> {
    verb: &'a str,
    resource: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct SubjectAccessReviewResult {
    #[serde(default)]
    status: SubjectAccessReviewStatus,
}

#[derive(Default, Deserialize)]
struct SubjectAccessReviewStatus {
    #[serde(default)]
    allowed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenReview<'a> {
    api_version: &'static str,
    kind: &'static str,
    spec: TokenReviewSpec<'a>,
}

#[derive(Serialize)]
struct TokenReviewSpec<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct TokenReviewResult {
    #[serde(default)]
    status: TokenReviewStatus,
}

#[derive(Default, Deserialize)]
struct TokenReviewStatus {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    user: UserInfo,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default, Deserialize)]
struct UserInfo {
    #[serde(default)]
    username: String,
    #[serde(default)]
    groups: Vec<String>,
}

/// Client for the `SubjectAccessReview` and `TokenReview` APIs of a Kubernetes API server.
pub struct ReviewClient {
    base_url: String,
    bearer_token: Option<String>,
    client: HttpClient,
}

impl ReviewClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let bearer_token = match &config.bearer_token_file {
            Some(path) => Some(fs::read_to_string(path)?.trim().to_string()),
            None => None,
        };

        let client = HttpClient::new(HttpClientConfig {
            server_ca_bundle: config.server_ca_bundle.clone(),
            client_certificate: config.client_certificate.clone(),
            client_private_key: config.client_private_key.clone(),
            timeout: Some(Duration::from_millis(config.timeout_ms)),
        })?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            bearer_token,
            client,
        })
    }

    async fn post_json<B, R>(&self, review: &str, path: &str, body: &B) -> Result<R, Error>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let timer = AUTHORITY_REVIEW_DURATION
            .with_label_values(&[review])
            .start_timer();

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{path}", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        if let Some(token) = &self.bearer_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = builder.body(Full::new(Bytes::from(serde_json::to_vec(body)?)))?;
        let result = self.client.send(request).await;
        timer.observe_duration();

        let (status, body) = result.inspect_err(|error| {
            warn!("{review} request failed: {error}");
            AUTHORITY_REVIEWS.with_label_values(&[review, "error"]).inc();
        })?;

        if !status.is_success() {
            warn!("{review} request answered with HTTP {status}");
            AUTHORITY_REVIEWS.with_label_values(&[review, "error"]).inc();
            return Err(Error::Status(status));
        }

        serde_json::from_slice(&body).map_err(|error| {
            AUTHORITY_REVIEWS.with_label_values(&[review, "error"]).inc();
            Error::from(error)
        })
    }
}

#[async_trait]
impl AccessReviewer for ReviewClient {
    #[instrument(skip(self, query), fields(resource = query.resource.as_str(), name = %query.resource_name))]
    async fn review(&self, query: &AccessReviewQuery) -> Result<AccessReviewResponse, Error> {
        let review = SubjectAccessReview {
            api_version: "authorization.k8s.io/v1",
            kind: "SubjectAccessReview",
            spec: SubjectAccessReviewSpec {
                resource_attributes: ResourceAttributes {
                    verb: query.verb,
                    resource: query.resource.as_str(),
                    name: &query.resource_name,
                },
                user: &query.acting_user,
                groups: &query.acting_groups,
            },
        };

        let result: SubjectAccessReviewResult = self
            .post_json("subject_access_review", SUBJECT_ACCESS_REVIEW_PATH, &review)
            .await?;

        let allowed = result.status.allowed;
        debug!("Subject access review for {}: allowed={allowed}", query.acting_user);

        let label = if allowed { "allow" } else { "deny" };
        AUTHORITY_REVIEWS
            .with_label_values(&["subject_access_review", label])
            .inc();

        Ok(AccessReviewResponse { allowed })
    }
}

#[async_trait]
impl TokenReviewer for ReviewClient {
    #[instrument(skip(self, query))]
    async fn review(&self, query: &TokenReviewQuery) -> Result<TokenReviewResponse, Error> {
        let review = TokenReview {
            api_version: "authentication.k8s.io/v1",
            kind: "TokenReview",
            spec: TokenReviewSpec {
                token: &query.token,
            },
        };

        let result: TokenReviewResult = self
            .post_json("token_review", TOKEN_REVIEW_PATH, &review)
            .await?;

        let TokenReviewStatus {
            authenticated,
            user,
            error,
        } = result.status;

        // An unauthenticated review without an explicit error still has to reject the token.
        let status_error = match error.filter(|e| !e.is_empty()) {
            Some(error) => Some(error),
            None if !authenticated => Some("token is not authenticated".to_string()),
            None => None,
        };

        let label = if status_error.is_none() { "allow" } else { "deny" };
        AUTHORITY_REVIEWS
            .with_label_values(&["token_review", label])
            .inc();

        Ok(TokenReviewResponse {
            username: user.username,
            groups: user.groups,
            status_error,
        })
    }
}
