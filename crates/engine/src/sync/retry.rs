use std::time::Duration;

use mirrorsync_common::types::{RemoteDescriptor, RepositoryHandle, SyncOutcome};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::SyncError;
use super::synchronizer::Synchronizer;
use crate::git::worker::CommandExecutor;

/// How many times to run the whole sequence after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self { max_attempts: 1, backoff: Duration::ZERO }
    }

    /// One attempt plus `retries` more, `backoff` apart.
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { max_attempts: retries.saturating_add(1), backoff }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    pub outcome: SyncOutcome,
    pub attempts: u32,
}

impl<E: CommandExecutor + Clone> Synchronizer<E> {
    /// Run [`Synchronizer::synchronize`] until it produces something other
    /// than a transport failure or the policy is exhausted.
    pub async fn synchronize_with_retry(
        &self,
        source: &RepositoryHandle,
        destination: &RemoteDescriptor,
        policy: &RetryPolicy,
        run_id: Uuid,
    ) -> Result<RetryReport, SyncError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let span = info_span!(
                "sync",
                %run_id,
                attempt,
                remote = destination.name(),
                branch = source.branch()
            );
            let outcome = self.synchronize(source, destination).instrument(span).await?;

            if !outcome.is_retryable() || attempt >= max_attempts {
                info!(%run_id, attempt, status = outcome.kind(), "sync finished");
                return Ok(RetryReport { outcome, attempts: attempt });
            }

            warn!(
                %run_id,
                attempt,
                max_attempts,
                diagnostic = outcome.diagnostic(),
                backoff_ms = policy.backoff.as_millis() as u64,
                "transport failure; retrying"
            );
            tokio::time::sleep(policy.backoff).await;
            attempt += 1;
        }
    }
}
