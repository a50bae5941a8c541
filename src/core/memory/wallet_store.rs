//! Thread-safe in-memory wallet storage
//!
//! # Design
//!
//! Wallets live in a `DashMap` keyed by `(user_id, wallet_type)`. A mutation
//! runs while holding the entry's shard lock, so the availability check and
//! the balance change are one step: two debits against the same wallet can
//! never both observe the pre-debit balance. Operations on different wallets
//! proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::traits::WalletStore;
use crate::types::{LedgerError, UserId, Wallet, WalletMutation, WalletType};

#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    wallets: DashMap<(UserId, WalletType), Wallet>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
        }
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn insert_if_absent(&self, wallet: Wallet) -> Result<Wallet, LedgerError> {
        let stored = self
            .wallets
            .entry((wallet.user_id, wallet.wallet_type))
            .or_insert(wallet);
        Ok(stored.value().clone())
    }

    async fn get(&self, user_id: UserId, wallet_type: WalletType) -> Result<Option<Wallet>, LedgerError> {
        Ok(self
            .wallets
            .get(&(user_id, wallet_type))
            .map(|entry| entry.value().clone()))
    }

    async fn apply(
        &self,
        user_id: UserId,
        wallet_type: WalletType,
        mutation: WalletMutation,
        now: DateTime<Utc>,
    ) -> Result<Wallet, LedgerError> {
        let mut entry = self
            .wallets
            .get_mut(&(user_id, wallet_type))
            .ok_or_else(|| LedgerError::not_found("wallet", format!("{}/{}", user_id, wallet_type)))?;
        entry.value_mut().apply(mutation, now)?;
        Ok(entry.value().clone())
    }

    async fn list(&self) -> Result<Vec<Wallet>, LedgerError> {
        let mut wallets: Vec<Wallet> = self.wallets.iter().map(|entry| entry.value().clone()).collect();
        wallets.sort_by(|a, b| (a.user_id, a.wallet_type).cmp(&(b.user_id, b.wallet_type)));
        Ok(wallets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Money;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first_wallet() {
        let store = MemoryWalletStore::new();
        let user = Uuid::from_u128(1);
        let first = store
            .insert_if_absent(Wallet::new(user, WalletType::Main, Utc::now()))
            .await
            .unwrap();
        let second = store
            .insert_if_absent(Wallet::new(user, WalletType::Main, Utc::now()))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_missing_wallet() {
        let store = MemoryWalletStore::new();
        let err = store
            .apply(
                Uuid::from_u128(1),
                WalletType::Savings,
                WalletMutation::Credit(Money::from_minor(1)),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let store = Arc::new(MemoryWalletStore::new());
        let user = Uuid::from_u128(1);
        let now = Utc::now();
        store
            .insert_if_absent(Wallet::new(user, WalletType::Main, now))
            .await
            .unwrap();
        store
            .apply(user, WalletType::Main, WalletMutation::Credit(Money::from_minor(1_000)), now)
            .await
            .unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .apply(user, WalletType::Main, WalletMutation::Debit(Money::from_minor(30)), now)
                        .await
                        .is_ok()
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        let wallet = store.get(user, WalletType::Main).await.unwrap().unwrap();
        assert_eq!(succeeded, 33);
        assert_eq!(wallet.balance, Money::from_minor(1_000 - 33 * 30));
        assert_eq!(wallet.available_balance, wallet.balance);
    }
}
