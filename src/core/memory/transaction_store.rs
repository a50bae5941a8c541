//! Thread-safe in-memory transaction storage
//!
//! # Design
//!
//! Transactions are grouped per user in a `DashMap<UserId, Vec<Transaction>>`
//! with a secondary id index. Holding a user's entry serializes everything
//! that must be atomic for that user: the daily-ceiling check and insert, and
//! status compare-and-set. Lock order is always user entry first, then index,
//! and the index is never held while acquiring a user entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::traits::{GuardedUpdate, InsertOutcome, TransactionPatch, TransactionStore};
use crate::types::{LedgerError, Money, Transaction, TransactionId, TransactionStatus, UserId};

#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    by_user: DashMap<UserId, Vec<Transaction>>,
    index: DashMap<TransactionId, UserId>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            by_user: DashMap::new(),
            index: DashMap::new(),
        }
    }

    fn owner_of(&self, id: TransactionId) -> Option<UserId> {
        self.index.get(&id).map(|entry| *entry.value())
    }
}

/// Spend counting towards the daily ceiling in `transactions` since `since`
fn spent_since(transactions: &[Transaction], since: DateTime<Utc>) -> Result<Money, LedgerError> {
    transactions
        .iter()
        .filter(|tx| tx.transaction_type().counts_toward_daily_limit())
        .filter(|tx| !matches!(tx.status, TransactionStatus::Failed | TransactionStatus::Cancelled))
        .filter(|tx| tx.created_at >= since)
        .try_fold(Money::ZERO, |total, tx| {
            total
                .checked_add(tx.amount)
                .ok_or_else(|| LedgerError::arithmetic_overflow("daily spend"))
        })
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let mut entry = self.by_user.entry(transaction.user_id).or_default();
        if self.index.contains_key(&transaction.id) {
            return Err(LedgerError::DuplicateTransaction { id: transaction.id });
        }
        self.index.insert(transaction.id, transaction.user_id);
        entry.value_mut().push(transaction);
        Ok(())
    }

    async fn insert_within_daily_ceiling(
        &self,
        transaction: Transaction,
        day_start: DateTime<Utc>,
        ceiling: Money,
    ) -> Result<InsertOutcome, LedgerError> {
        let mut entry = self.by_user.entry(transaction.user_id).or_default();
        if self.index.contains_key(&transaction.id) {
            return Err(LedgerError::DuplicateTransaction { id: transaction.id });
        }

        let spent_today = spent_since(entry.value(), day_start)?;
        let projected = spent_today
            .checked_add(transaction.amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("daily spend"))?;
        if projected > ceiling {
            return Ok(InsertOutcome::OverDailyCeiling { spent_today });
        }

        self.index.insert(transaction.id, transaction.user_id);
        entry.value_mut().push(transaction);
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        let Some(user_id) = self.owner_of(id) else {
            return Ok(None);
        };
        Ok(self
            .by_user
            .get(&user_id)
            .and_then(|entry| entry.value().iter().find(|tx| tx.id == id).cloned()))
    }

    async fn update(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let user_id = self
            .owner_of(transaction.id)
            .ok_or_else(|| LedgerError::not_found("transaction", transaction.id))?;
        let mut entry = self
            .by_user
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::not_found("transaction", transaction.id))?;
        let stored = entry
            .value_mut()
            .iter_mut()
            .find(|tx| tx.id == transaction.id)
            .ok_or_else(|| LedgerError::not_found("transaction", transaction.id))?;

        if stored.status != transaction.status && !stored.status.can_transition_to(transaction.status) {
            return Err(LedgerError::invalid_status_transition(
                stored.id,
                stored.status,
                transaction.status,
            ));
        }
        *stored = transaction;
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, LedgerError> {
        let user_id = self
            .owner_of(id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;
        let mut entry = self
            .by_user
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;
        let stored = entry
            .value_mut()
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;

        if stored.status != expected {
            return Ok(None);
        }
        stored.transition(next, now)?;
        Ok(Some(stored.clone()))
    }

    async fn update_if_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        patch: TransactionPatch<'_>,
    ) -> Result<GuardedUpdate, LedgerError> {
        let user_id = self
            .owner_of(id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;
        let mut entry = self
            .by_user
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;
        let stored = entry
            .value_mut()
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;

        if stored.status != expected {
            return Ok(GuardedUpdate::Skipped(stored.clone()));
        }
        patch(stored);
        stored.status = expected;
        Ok(GuardedUpdate::Applied(stored.clone()))
    }

    async fn sum_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<Money, LedgerError> {
        match self.by_user.get(&user_id) {
            Some(entry) => spent_since(entry.value(), since),
            None => Ok(Money::ZERO),
        }
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        let mut transactions = self
            .by_user
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewTransaction, TransactionDetails};
    use chrono::Duration;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn withdrawal(user: UserId, amount: i64, at: DateTime<Utc>) -> Transaction {
        NewTransaction::new(
            user,
            Decimal::new(amount, 0),
            TransactionDetails::Withdrawal {
                account_number: "0000000001".to_string(),
                bank_code: "044".to_string(),
            },
        )
        .into_transaction(Money::from_minor(amount), at)
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = MemoryTransactionStore::new();
        let tx = withdrawal(Uuid::from_u128(1), 100, Utc::now());
        store.insert(tx.clone()).await.unwrap();

        let err = store.insert(tx.clone()).await.unwrap_err();
        assert_eq!(err, LedgerError::DuplicateTransaction { id: tx.id });
        assert_eq!(store.get(tx.id).await.unwrap(), Some(tx));
    }

    #[rstest]
    #[case::fits(1_950_000, 50_000, true)]
    #[case::over(1_950_000, 100_000, false)]
    #[case::empty_day(0, 2_000_000, true)]
    #[tokio::test]
    async fn test_insert_within_daily_ceiling(
        #[case] prior: i64,
        #[case] amount: i64,
        #[case] inserted: bool,
    ) {
        let store = MemoryTransactionStore::new();
        let user = Uuid::from_u128(1);
        let now = Utc::now();
        if prior > 0 {
            store.insert(withdrawal(user, prior, now)).await.unwrap();
        }

        let tx = withdrawal(user, amount, now);
        let outcome = store
            .insert_within_daily_ceiling(tx.clone(), now - Duration::hours(1), Money::from_minor(2_000_000))
            .await
            .unwrap();

        if inserted {
            assert_eq!(outcome, InsertOutcome::Inserted);
            assert!(store.get(tx.id).await.unwrap().is_some());
        } else {
            assert_eq!(
                outcome,
                InsertOutcome::OverDailyCeiling {
                    spent_today: Money::from_minor(prior)
                }
            );
            assert!(store.get(tx.id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_sum_since_ignores_failed_and_old() {
        let store = MemoryTransactionStore::new();
        let user = Uuid::from_u128(1);
        let now = Utc::now();

        store.insert(withdrawal(user, 100, now)).await.unwrap();
        store
            .insert(withdrawal(user, 1_000, now - Duration::days(1)))
            .await
            .unwrap();
        let mut failed = withdrawal(user, 10_000, now);
        failed.status = TransactionStatus::Failed;
        store.insert(failed).await.unwrap();

        let spent = store.sum_since(user, now - Duration::hours(1)).await.unwrap();
        assert_eq!(spent, Money::from_minor(100));
    }

    #[tokio::test]
    async fn test_update_if_status_leaves_settled_rows_alone() {
        let store = MemoryTransactionStore::new();
        let tx = withdrawal(Uuid::from_u128(1), 100, Utc::now());
        store.insert(tx.clone()).await.unwrap();

        let tag = |stored: &mut Transaction| stored.external_transaction_id = Some("TRF_1".to_string());
        match store.update_if_status(tx.id, TransactionStatus::Pending, &tag).await.unwrap() {
            GuardedUpdate::Applied(updated) => {
                assert_eq!(updated.external_transaction_id.as_deref(), Some("TRF_1"));
                assert_eq!(updated.status, TransactionStatus::Pending);
            }
            other => panic!("expected applied, got {:?}", other),
        }

        store
            .compare_and_set_status(tx.id, TransactionStatus::Pending, TransactionStatus::Completed, Utc::now())
            .await
            .unwrap();
        let retag = |stored: &mut Transaction| stored.external_transaction_id = Some("TRF_2".to_string());
        match store.update_if_status(tx.id, TransactionStatus::Pending, &retag).await.unwrap() {
            GuardedUpdate::Skipped(current) => {
                assert_eq!(current.status, TransactionStatus::Completed);
                assert_eq!(current.external_transaction_id.as_deref(), Some("TRF_1"));
            }
            other => panic!("expected skipped, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_status_only_once() {
        let store = MemoryTransactionStore::new();
        let tx = withdrawal(Uuid::from_u128(1), 100, Utc::now());
        store.insert(tx.clone()).await.unwrap();

        let now = Utc::now();
        let first = store
            .compare_and_set_status(tx.id, TransactionStatus::Pending, TransactionStatus::Completed, now)
            .await
            .unwrap();
        assert_eq!(first.unwrap().completed_at, Some(now));

        let second = store
            .compare_and_set_status(tx.id, TransactionStatus::Pending, TransactionStatus::Failed, now)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_update_refuses_to_leave_terminal_status() {
        let store = MemoryTransactionStore::new();
        let mut tx = withdrawal(Uuid::from_u128(1), 100, Utc::now());
        tx.status = TransactionStatus::Cancelled;
        store.insert(tx.clone()).await.unwrap();

        tx.status = TransactionStatus::Pending;
        let err = store.update(tx).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStatusTransition { .. }));
    }
}
