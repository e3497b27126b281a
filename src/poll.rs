use std::future::Future;
use std::time::Duration;

use crate::error::SearchError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_TRIALS: u32 = 50;

/// Result of one readiness check against the external form.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Ready(T),
    NotReady(String),
    Fatal(SearchError),
}

impl<T> PollOutcome<T> {
    /// Collapses the outcome into a `Result`, turning a terminal `NotReady`
    /// into [`SearchError::NotReady`].
    pub fn into_result(self) -> Result<T, SearchError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::NotReady(reason) => Err(SearchError::NotReady(reason)),
            Self::Fatal(err) => Err(err),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl<T> From<Result<T, SearchError>> for PollOutcome<T> {
    fn from(result: Result<T, SearchError>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(SearchError::NotReady(reason)) => Self::NotReady(reason),
            Err(err) => Self::Fatal(err),
        }
    }
}

/// Bounded retry schedule for one poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_trials: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_trials: DEFAULT_MAX_TRIALS,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_trials: u32) -> Self {
        Self {
            interval,
            max_trials,
        }
    }

    /// Upper bound on the time spent sleeping between trials.
    pub fn worst_case_wait(&self) -> Duration {
        self.interval
            .saturating_mul(self.max_trials.saturating_sub(1))
    }

    /// Invokes `execute` until it reports `Ready` or `Fatal`, or until
    /// `max_trials` invocations all reported `NotReady`.
    ///
    /// Trial counting is local to the call, so independent sessions can run
    /// concurrently on the same policy.
    pub async fn poll<T, F, Fut>(&self, mut execute: F) -> PollOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PollOutcome<T>>,
    {
        let max_trials = self.max_trials.max(1);
        let mut trial = 1;
        loop {
            match execute(trial).await {
                PollOutcome::NotReady(reason) if trial < max_trials => {
                    tracing::trace!(trial, max_trials, %reason, "not ready; retrying");
                    tokio::time::sleep(self.interval).await;
                    trial += 1;
                }
                PollOutcome::NotReady(reason) => {
                    tracing::debug!(trial, %reason, "giving up after max trials");
                    return PollOutcome::NotReady(reason);
                }
                outcome => return outcome,
            }
        }
    }
}

/// Polls with the default interval and trial bound.
pub async fn poll<T, F, Fut>(execute: F) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollOutcome<T>>,
{
    PollPolicy::default().poll(execute).await
}
