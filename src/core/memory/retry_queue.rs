use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::traits::RetryQueue;
use crate::types::{LedgerError, RetryJob};

/// In-memory retry jobs keyed by job id
#[derive(Debug, Default)]
pub struct MemoryRetryQueue {
    jobs: DashMap<String, RetryJob>,
}

impl MemoryRetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl RetryQueue for MemoryRetryQueue {
    async fn upsert(&self, job: RetryJob) -> Result<(), LedgerError> {
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RetryJob>, LedgerError> {
        Ok(self.jobs.get(id).map(|entry| entry.value().clone()))
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<RetryJob>, LedgerError> {
        let mut due: Vec<RetryJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().run_at <= now)
            .map(|entry| entry.value().clone())
            .collect();
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at).then_with(|| a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn remove(&self, id: &str) -> Result<bool, LedgerError> {
        Ok(self.jobs.remove(id).is_some())
    }
}
