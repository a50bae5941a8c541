//! Wallet ledger
//!
//! Per-user, per-wallet-type balances. Every balance change is a single
//! atomic conditional update in the [`WalletStore`]; this layer adds
//! provisioning, settlement-aware reads and logging.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::clock::Clock;
use crate::core::traits::WalletStore;
use crate::types::{LedgerError, Money, UserId, Wallet, WalletMutation, WalletType};

#[derive(Clone)]
pub struct WalletLedger {
    wallets: Arc<dyn WalletStore>,
    clock: Arc<dyn Clock>,
    savings_settlement_delay_minutes: u32,
}

impl WalletLedger {
    pub fn new(wallets: Arc<dyn WalletStore>, clock: Arc<dyn Clock>) -> Self {
        WalletLedger {
            wallets,
            clock,
            savings_settlement_delay_minutes: 0,
        }
    }

    /// Savings wallets created from now on hold credits for `minutes`
    pub fn with_savings_settlement_delay(mut self, minutes: u32) -> Self {
        self.savings_settlement_delay_minutes = minutes;
        self
    }

    /// Create the user's main and savings wallets if they do not exist yet
    ///
    /// Idempotent: existing wallets are returned untouched.
    pub async fn provision(&self, user_id: UserId) -> Result<(Wallet, Wallet), LedgerError> {
        let now = self.clock.now();
        let main = self
            .wallets
            .insert_if_absent(Wallet::new(user_id, WalletType::Main, now))
            .await?;
        let savings = self
            .wallets
            .insert_if_absent(
                Wallet::new(user_id, WalletType::Savings, now)
                    .with_settlement_delay(self.savings_settlement_delay_minutes),
            )
            .await?;
        info!(user_id = %user_id, "wallets provisioned");
        Ok((main, savings))
    }

    /// Debit `amount` from the wallet's available balance
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientFunds`] if `available_balance < amount`;
    ///   the wallet is unchanged
    /// - [`LedgerError::NotFound`] if the wallet does not exist
    pub async fn debit(&self, user_id: UserId, wallet_type: WalletType, amount: Money) -> Result<Wallet, LedgerError> {
        self.mutate(user_id, wallet_type, WalletMutation::Debit(amount)).await
    }

    /// Credit `amount`, immediately available
    pub async fn credit(&self, user_id: UserId, wallet_type: WalletType, amount: Money) -> Result<Wallet, LedgerError> {
        self.mutate(user_id, wallet_type, WalletMutation::Credit(amount)).await
    }

    /// Credit `amount`, held back from the available balance while the
    /// wallet's settlement delay runs
    pub async fn credit_with_settlement(
        &self,
        user_id: UserId,
        wallet_type: WalletType,
        amount: Money,
    ) -> Result<Wallet, LedgerError> {
        self.mutate(user_id, wallet_type, WalletMutation::CreditWithSettlement(amount))
            .await
    }

    /// Current wallet snapshot, with any elapsed settlement lock released
    pub async fn get_wallet(&self, user_id: UserId, wallet_type: WalletType) -> Result<Wallet, LedgerError> {
        let wallet = self
            .wallets
            .get(user_id, wallet_type)
            .await?
            .ok_or_else(|| LedgerError::not_found("wallet", format!("{}/{}", user_id, wallet_type)))?;
        Ok(wallet.settled_view(self.clock.now()))
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        let now = self.clock.now();
        Ok(self
            .wallets
            .list()
            .await?
            .into_iter()
            .map(|wallet| wallet.settled_view(now))
            .collect())
    }

    async fn mutate(
        &self,
        user_id: UserId,
        wallet_type: WalletType,
        mutation: WalletMutation,
    ) -> Result<Wallet, LedgerError> {
        let result = self
            .wallets
            .apply(user_id, wallet_type, mutation, self.clock.now())
            .await;
        match &result {
            Ok(wallet) => info!(
                user_id = %user_id,
                wallet = %wallet_type,
                op = mutation.name(),
                amount = %mutation.amount(),
                balance = %wallet.balance,
                available = %wallet.available_balance,
                "wallet updated"
            ),
            Err(e) => debug!(
                user_id = %user_id,
                wallet = %wallet_type,
                op = mutation.name(),
                amount = %mutation.amount(),
                error = %e,
                "wallet update rejected"
            ),
        }
        result
    }
}
