//! Transaction ledger entry writer
//!
//! Creates transaction records after enforcing the amount rules and the
//! per-transaction and daily ceilings, and moves them through their status
//! lifecycle.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::LimitConfig;
use crate::core::clock::Clock;
use crate::core::traits::{GuardedUpdate, InsertOutcome, TransactionPatch, TransactionStore};
use crate::types::{LedgerError, Money, NewTransaction, Transaction, TransactionId, TransactionStatus};

#[derive(Clone)]
pub struct TransactionWriter {
    transactions: Arc<dyn TransactionStore>,
    clock: Arc<dyn Clock>,
    limits: LimitConfig,
}

impl TransactionWriter {
    pub fn new(transactions: Arc<dyn TransactionStore>, clock: Arc<dyn Clock>, limits: LimitConfig) -> Self {
        TransactionWriter {
            transactions,
            clock,
            limits,
        }
    }

    pub fn limits(&self) -> &LimitConfig {
        &self.limits
    }

    /// Validate and persist a new transaction
    ///
    /// Gateway-bound types are stored `pending`; internal movements are
    /// stored `completed`. Only payment, transfer, deposit and withdrawal
    /// amounts are subject to the limits.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AmountNotInteger`] for fractional amounts
    /// - [`LedgerError::Validation`] for non-positive amounts or broken links
    /// - [`LedgerError::SingleLimitExceeded`] above the per-transaction ceiling
    /// - [`LedgerError::DailyLimitExceeded`] if today's spend plus this amount
    ///   exceeds the daily ceiling
    pub async fn create(&self, entry: NewTransaction) -> Result<Transaction, LedgerError> {
        let amount = Money::from_decimal(entry.amount)?;
        if !amount.is_positive() {
            return Err(LedgerError::validation(
                "amount",
                format!("must be positive, got {}", amount),
            ));
        }

        let now = self.clock.now();
        let transaction = entry.into_transaction(amount, now);
        transaction.validate()?;

        if !transaction.transaction_type().counts_toward_daily_limit() {
            self.transactions.insert(transaction.clone()).await?;
            info!(
                transaction_id = %transaction.id,
                user_id = %transaction.user_id,
                kind = %transaction.transaction_type(),
                amount = %amount,
                "transaction recorded"
            );
            return Ok(transaction);
        }

        if amount > self.limits.single_transaction_limit {
            warn!(user_id = %transaction.user_id, amount = %amount, "single transaction limit exceeded");
            return Err(LedgerError::single_limit_exceeded(
                amount,
                self.limits.single_transaction_limit,
            ));
        }

        let day_start = self.limits.day_start(now);
        match self
            .transactions
            .insert_within_daily_ceiling(transaction.clone(), day_start, self.limits.daily_limit)
            .await?
        {
            InsertOutcome::Inserted => {
                info!(
                    transaction_id = %transaction.id,
                    user_id = %transaction.user_id,
                    kind = %transaction.transaction_type(),
                    status = %transaction.status,
                    amount = %amount,
                    "transaction recorded"
                );
                Ok(transaction)
            }
            InsertOutcome::OverDailyCeiling { spent_today } => {
                let available_today = self.limits.daily_limit.saturating_sub(spent_today).non_negative();
                warn!(
                    user_id = %transaction.user_id,
                    amount = %amount,
                    spent_today = %spent_today,
                    "daily limit exceeded"
                );
                Err(LedgerError::daily_limit_exceeded(
                    self.limits.daily_limit,
                    available_today,
                    amount,
                ))
            }
        }
    }

    pub async fn get(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.transactions
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("transaction", id))
    }

    /// Transition `id` to `status`, stamping `completed_at` on completion
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidStatusTransition`] if the transaction is
    /// already terminal.
    pub async fn mark_status(&self, id: TransactionId, status: TransactionStatus) -> Result<Transaction, LedgerError> {
        let mut transaction = self.get(id).await?;
        transaction.transition(status, self.clock.now())?;
        self.transactions.update(transaction.clone()).await?;
        info!(transaction_id = %id, status = %status, "transaction status updated");
        Ok(transaction)
    }

    /// Move `id` from `expected` to `next` only if nobody else has
    ///
    /// Returns `None` if the transaction had already left `expected`; used to
    /// make settlement paths run exactly once.
    pub async fn claim(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Option<Transaction>, LedgerError> {
        let claimed = self
            .transactions
            .compare_and_set_status(id, expected, next, self.clock.now())
            .await?;
        if claimed.is_some() {
            info!(transaction_id = %id, from = %expected, to = %next, "transaction status updated");
        }
        Ok(claimed)
    }

    /// Apply non-status changes to `id` while it is still pending
    ///
    /// A row settled in the meantime comes back as
    /// [`GuardedUpdate::Skipped`] and is not touched.
    pub async fn save_if_pending(&self, id: TransactionId, patch: TransactionPatch<'_>) -> Result<GuardedUpdate, LedgerError> {
        let now = self.clock.now();
        let stamped = |tx: &mut Transaction| {
            patch(tx);
            tx.updated_at = now;
        };
        self.transactions
            .update_if_status(id, TransactionStatus::Pending, &stamped)
            .await
    }

    /// Persist non-status changes (gateway ids, retry bookkeeping, links)
    pub async fn save(&self, mut transaction: Transaction) -> Result<Transaction, LedgerError> {
        transaction.updated_at = self.clock.now();
        self.transactions.update(transaction.clone()).await?;
        Ok(transaction)
    }
}
