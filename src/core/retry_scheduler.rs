//! Retry scheduler
//!
//! Records future-dated jobs for gateway calls that did not produce a
//! definitive answer. Execution is left to an external drain worker, which
//! reads due jobs and decodes their [`RetryAction`] payload.

use std::sync::Arc;

use tracing::info;

use crate::config::RetryConfig;
use crate::core::clock::Clock;
use crate::core::traits::RetryQueue;
use crate::types::{LedgerError, RetryAction, RetryJob};

#[derive(Clone)]
pub struct RetryScheduler {
    queue: Arc<dyn RetryQueue>,
    clock: Arc<dyn Clock>,
    config: RetryConfig,
}

impl RetryScheduler {
    pub fn new(queue: Arc<dyn RetryQueue>, clock: Arc<dyn Clock>, config: RetryConfig) -> Self {
        RetryScheduler { queue, clock, config }
    }

    /// Upsert `job` by id
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] if `run_at` is not in the future.
    pub async fn enqueue(&self, job: RetryJob) -> Result<(), LedgerError> {
        if job.run_at <= self.clock.now() {
            return Err(LedgerError::validation("run_at", "retry jobs must be future-dated"));
        }
        info!(job_id = %job.id, run_at = %job.run_at, "retry scheduled");
        self.queue.upsert(job).await
    }

    /// Schedule `action` after the backoff for `retry_count` earlier attempts
    pub async fn schedule(&self, action: &RetryAction, retry_count: u32) -> Result<RetryJob, LedgerError> {
        let run_at = self.clock.now() + self.config.backoff(retry_count);
        let job = RetryJob::for_action(action, run_at)?;
        self.enqueue(job.clone()).await?;
        Ok(job)
    }

    /// Jobs ready to run now
    pub async fn due(&self) -> Result<Vec<RetryJob>, LedgerError> {
        self.queue.due(self.clock.now()).await
    }

    /// Drop a job once its transaction has settled
    pub async fn complete(&self, job_id: &str) -> Result<bool, LedgerError> {
        self.queue.remove(job_id).await
    }
}
