//! Journal replay
//!
//! Rebuilds wallet balances from a credit/debit journal for reconciliation
//! audits. Lines are read in batches; each batch is partitioned per wallet
//! so different wallets replay concurrently while lines for the same wallet
//! keep their journal order.
//!
//! ```text
//! JournalReader ─ batch ─→ partition_by_wallet ─→ buffer_unordered(max_concurrent)
//!                                                    └── WalletLedger (debit / credit)
//! ```
//!
//! Batches are processed one after another, so a wallet whose lines span
//! several batches still sees them in order.

use std::collections::HashMap;
use std::path::Path;

use futures::stream::{self, StreamExt};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, info, warn};

use crate::core::wallet_ledger::WalletLedger;
use crate::io::async_reader::JournalReader;
use crate::io::csv_format::{JournalEntry, JournalOp};
use crate::types::{LedgerError, UserId, WalletType};

/// Batching parameters for journal replay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Journal lines per batch
    pub batch_size: usize,
    /// Wallet partitions replayed at once
    pub max_concurrent: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl ReplayConfig {
    /// Zero values fall back to the defaults
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();
        if batch_size == 0 {
            warn!(default = default.batch_size, "invalid batch size, using default");
        }
        if max_concurrent == 0 {
            warn!(default = default.max_concurrent, "invalid concurrency, using default");
        }
        Self {
            batch_size: if batch_size == 0 { default.batch_size } else { batch_size },
            max_concurrent: if max_concurrent == 0 {
                default.max_concurrent
            } else {
                max_concurrent
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    /// Lines that could not be parsed or were refused by the ledger
    pub rejected: usize,
}

/// Group entries per wallet, keeping journal order within each group
pub fn partition_by_wallet(batch: Vec<JournalEntry>) -> HashMap<(UserId, WalletType), Vec<JournalEntry>> {
    let mut partitions: HashMap<(UserId, WalletType), Vec<JournalEntry>> = HashMap::new();
    for entry in batch {
        partitions
            .entry((entry.user_id, entry.wallet_type))
            .or_default()
            .push(entry);
    }
    partitions
}

async fn replay_wallet(ledger: &WalletLedger, entries: Vec<JournalEntry>) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let Some(first) = entries.first() else {
        return summary;
    };
    if let Err(e) = ledger.provision(first.user_id).await {
        warn!(user_id = %first.user_id, error = %e, "could not provision wallets for replay");
        summary.rejected = entries.len();
        return summary;
    }

    for entry in entries {
        let result = match entry.op {
            JournalOp::Credit => ledger.credit(entry.user_id, entry.wallet_type, entry.amount).await,
            JournalOp::Debit => ledger.debit(entry.user_id, entry.wallet_type, entry.amount).await,
        };
        match result {
            Ok(_) => summary.applied += 1,
            Err(e) => {
                summary.rejected += 1;
                debug!(
                    user_id = %entry.user_id,
                    wallet = %entry.wallet_type,
                    amount = %entry.amount,
                    code = e.code(),
                    "journal entry refused"
                );
            }
        }
    }
    summary
}

/// Replay one batch with bounded concurrency across wallets
pub async fn replay_batch(ledger: &WalletLedger, batch: Vec<JournalEntry>, max_concurrent: usize) -> ReplaySummary {
    stream::iter(partition_by_wallet(batch).into_values())
        .map(|entries| replay_wallet(ledger, entries))
        .buffer_unordered(max_concurrent.max(1))
        .fold(ReplaySummary::default(), |mut total, part| async move {
            total.applied += part.applied;
            total.rejected += part.rejected;
            total
        })
        .await
}

/// Replay a journal file into `ledger`
///
/// # Errors
///
/// [`LedgerError::Io`] if the file cannot be opened. Bad lines are counted
/// in the summary, not returned as errors.
pub async fn replay_journal(
    path: &Path,
    ledger: &WalletLedger,
    config: &ReplayConfig,
) -> Result<ReplaySummary, LedgerError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| LedgerError::Io {
        message: format!("failed to open '{}': {}", path.display(), e),
    })?;
    let mut reader = JournalReader::new(file.compat());

    let mut summary = ReplaySummary::default();
    loop {
        let batch = reader.read_batch(config.batch_size).await;
        if batch.is_empty() {
            break;
        }
        let part = replay_batch(ledger, batch, config.max_concurrent).await;
        summary.applied += part.applied;
        summary.rejected += part.rejected;
    }
    summary.rejected += reader.rejected();

    info!(
        path = %path.display(),
        applied = summary.applied,
        rejected = summary.rejected,
        "journal replayed"
    );
    Ok(summary)
}
