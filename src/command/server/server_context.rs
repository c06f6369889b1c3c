use crate::authority::ReviewClient;
use crate::configuration::{self, Configuration};
use crate::identity::{IdentityResolver, RequestContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-configuration state shared by every connection.
///
/// Swapped as a whole on configuration reload; the shutdown token outlives reloads.
pub struct ServerContext {
    pub resolver: IdentityResolver,
    pub resolve_timeout: Duration,
    shutdown: CancellationToken,
}

impl ServerContext {
    pub fn new(
        resolver: IdentityResolver,
        resolve_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            resolver,
            resolve_timeout,
            shutdown,
        }
    }

    pub fn from_configuration(
        config: &Configuration,
        shutdown: CancellationToken,
    ) -> Result<Self, configuration::Error> {
        let review_client = Arc::new(ReviewClient::new(&config.authority)?);
        let resolver = IdentityResolver::new(&config.identity, review_client.clone(), review_client);

        Ok(Self::new(
            resolver,
            Duration::from_millis(config.server.resolve_timeout_ms),
            shutdown,
        ))
    }

    /// Cancellation scope for one inbound request: cancelled on shutdown, bounded by the resolve
    /// timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(self.shutdown.child_token())
            .with_deadline(Instant::now() + self.resolve_timeout)
    }
}
