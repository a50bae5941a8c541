//! Storage seams for the ledger
//!
//! Every piece of persistent state sits behind one of these traits. The
//! contract each backend must honor is per-row atomicity: a wallet mutation,
//! a lockout counter update or a status compare-and-set either happens
//! entirely against the latest row or not at all. The ledger never holds an
//! in-process lock of its own; serialization lives in these operations.
//!
//! `memory` provides DashMap-backed implementations of all of them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    LedgerError, Money, PinCredentials, PinToken, RetryJob, RoundUpRule, Transaction,
    TransactionId, TransactionStatus, UserId, UserProfile, Wallet, WalletMutation, WalletType,
};

/// Wallet rows, one per `(user_id, wallet_type)`
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Insert the wallet unless one already exists for its user and type
    ///
    /// Returns the stored wallet, which is the existing one on conflict.
    async fn insert_if_absent(&self, wallet: Wallet) -> Result<Wallet, LedgerError>;

    async fn get(&self, user_id: UserId, wallet_type: WalletType) -> Result<Option<Wallet>, LedgerError>;

    /// Apply a mutation as a single conditional update
    ///
    /// Returns the wallet after the change. On error the row is unchanged.
    async fn apply(
        &self,
        user_id: UserId,
        wallet_type: WalletType,
        mutation: WalletMutation,
        now: DateTime<Utc>,
    ) -> Result<Wallet, LedgerError>;

    async fn list(&self) -> Result<Vec<Wallet>, LedgerError>;
}

/// Result of a limit-checked insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Nothing was written; `spent_today` is what already counts towards the ceiling
    OverDailyCeiling { spent_today: Money },
}

/// Result of a status-guarded update
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedUpdate {
    /// The change was written; holds the new row
    Applied(Transaction),
    /// The row had already left the expected status and was left as is
    Skipped(Transaction),
}

/// Patch applied to a stored transaction; it must not change the status
pub type TransactionPatch<'a> = &'a (dyn Fn(&mut Transaction) + Send + Sync);

/// Transaction rows
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Fails with [`LedgerError::DuplicateTransaction`] if the id exists
    async fn insert(&self, transaction: Transaction) -> Result<(), LedgerError>;

    /// Insert only if the user's spend since `day_start` plus this amount
    /// stays within `ceiling`, checked and written atomically per user
    async fn insert_within_daily_ceiling(
        &self,
        transaction: Transaction,
        day_start: DateTime<Utc>,
        ceiling: Money,
    ) -> Result<InsertOutcome, LedgerError>;

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError>;

    /// Replace a stored transaction
    ///
    /// Refuses to change the status of a terminal transaction.
    async fn update(&self, transaction: Transaction) -> Result<(), LedgerError>;

    /// Move `id` from `expected` to `next` if it is still in `expected`
    ///
    /// Returns `None` when another writer got there first.
    async fn compare_and_set_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Apply `patch` to `id` only while it is still in `expected`
    ///
    /// The status check and the write happen under one row lock, so a
    /// concurrent settlement is never overwritten by a stale copy.
    async fn update_if_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        patch: TransactionPatch<'_>,
    ) -> Result<GuardedUpdate, LedgerError>;

    /// Spend counting towards the daily ceiling since `since`
    async fn sum_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<Money, LedgerError>;

    /// Newest first
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError>;
}

/// Round-up rules, one per user
#[async_trait]
pub trait RoundUpRuleStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<RoundUpRule>, LedgerError>;

    async fn upsert(&self, rule: RoundUpRule) -> Result<(), LedgerError>;

    /// Atomically bump the rule's count and saved total
    async fn record_round_up(
        &self,
        user_id: UserId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<RoundUpRule, LedgerError>;
}

/// PIN hashes, lockout counters and authorization tokens
#[async_trait]
pub trait PinStore: Send + Sync {
    async fn get_credentials(&self, user_id: UserId) -> Result<Option<PinCredentials>, LedgerError>;

    async fn upsert_credentials(&self, credentials: PinCredentials) -> Result<(), LedgerError>;

    /// Compare-and-set the failure counter
    ///
    /// Increments `failed_pin_attempts` (capped at the maximum) and stamps
    /// `at` only if the counter still equals `expected_attempts`. Returns
    /// `None` if it moved.
    async fn record_failed_attempt(
        &self,
        user_id: UserId,
        expected_attempts: u8,
        at: DateTime<Utc>,
    ) -> Result<Option<PinCredentials>, LedgerError>;

    async fn reset_attempts(&self, user_id: UserId) -> Result<(), LedgerError>;

    async fn insert_token(&self, token: PinToken) -> Result<(), LedgerError>;

    async fn get_token(&self, token: &str) -> Result<Option<PinToken>, LedgerError>;

    /// Validate and consume in one step; true if this call consumed it
    async fn consume_token(&self, user_id: UserId, token: &str, now: DateTime<Utc>) -> Result<bool, LedgerError>;

    /// Make the token unusable; unknown and already-spent tokens are fine
    async fn invalidate_token(&self, token: &str) -> Result<(), LedgerError>;
}

/// User contact details
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<UserProfile>, LedgerError>;

    async fn upsert(&self, profile: UserProfile) -> Result<(), LedgerError>;
}

/// Future-dated gateway retry jobs
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Insert or replace by job id
    async fn upsert(&self, job: RetryJob) -> Result<(), LedgerError>;

    async fn get(&self, id: &str) -> Result<Option<RetryJob>, LedgerError>;

    /// Jobs with `run_at <= now`, earliest first
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<RetryJob>, LedgerError>;

    async fn remove(&self, id: &str) -> Result<bool, LedgerError>;
}

/// Handles to every store the ledger needs
#[derive(Clone)]
pub struct Stores {
    pub wallets: Arc<dyn WalletStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub rules: Arc<dyn RoundUpRuleStore>,
    pub pins: Arc<dyn PinStore>,
    pub users: Arc<dyn UserDirectory>,
    pub retries: Arc<dyn RetryQueue>,
}
