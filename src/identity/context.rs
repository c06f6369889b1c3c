use crate::identity::Error;
use std::future::Future;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation scope of the inbound request.
///
/// Every collaborator call made while resolving a request goes through [`RequestContext::run`],
/// so a cancelled or expired request stops issuing review calls.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Runs a collaborator call unless the request is already over, and abandons it as soon as
    /// the request is cancelled or its deadline passes.
    pub async fn run<F, Fut>(&self, call: F) -> Result<Fut::Output, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(Error::DeadlineExceeded);
        }

        let call = call();
        let bounded = async {
            match self.deadline {
                Some(deadline) => timeout_at(deadline, call)
                    .await
                    .map_err(|_| Error::DeadlineExceeded),
                None => Ok(call.await),
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            result = bounded => result,
        }
    }
}
