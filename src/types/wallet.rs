//! Wallet types
//!
//! This module defines the [`Wallet`] record and the [`WalletMutation`]s the
//! ledger applies to it. Mutations are pure functions of the current wallet
//! state; stores run them inside a single atomic update so debits and credits
//! are linearizable per wallet.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::LedgerError;
use super::ids::{UserId, WalletId};
use super::money::Money;

/// Kind of wallet; each user owns exactly one of each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Main,
    Savings,
}

impl WalletType {
    pub const ALL: [WalletType; 2] = [WalletType::Main, WalletType::Savings];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Main => "main",
            WalletType::Savings => "savings",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(WalletType::Main),
            "savings" => Ok(WalletType::Savings),
            other => Err(LedgerError::validation(
                "wallet_type",
                format!("unknown wallet type '{}'", other),
            )),
        }
    }
}

/// Settlement lock on incoming funds
///
/// While `locked_until` is in the future, credited funds count towards
/// `balance` but not `available_balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRestrictions {
    pub min_settlement_delay_minutes: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl WithdrawalRestrictions {
    pub fn new(min_settlement_delay_minutes: u32) -> Self {
        WithdrawalRestrictions {
            min_settlement_delay_minutes,
            locked_until: None,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// A user's wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub wallet_type: WalletType,

    /// Total funds, including credits still inside a settlement lock
    pub balance: Money,

    /// Funds that can be debited right now
    ///
    /// Equal to `balance` unless a settlement lock is active, in which case
    /// it is lower by the locked amount.
    pub available_balance: Money,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_restrictions: Option<WithdrawalRestrictions>,
    pub last_transaction_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single balance change applied atomically to one wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletMutation {
    /// Decrement balance and available balance; fails if not enough is available
    Debit(Money),
    /// Increment balance and available balance
    Credit(Money),
    /// Increment balance, holding the funds back from the available balance
    /// for the wallet's settlement delay (plain credit if it has none)
    CreditWithSettlement(Money),
}

impl WalletMutation {
    pub fn amount(&self) -> Money {
        match self {
            WalletMutation::Debit(amount)
            | WalletMutation::Credit(amount)
            | WalletMutation::CreditWithSettlement(amount) => *amount,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletMutation::Debit(_) => "debit",
            WalletMutation::Credit(_) => "credit",
            WalletMutation::CreditWithSettlement(_) => "credit_with_settlement",
        }
    }
}

impl Wallet {
    /// Create an empty wallet
    pub fn new(user_id: UserId, wallet_type: WalletType, now: DateTime<Utc>) -> Self {
        Wallet {
            id: Uuid::new_v4(),
            user_id,
            wallet_type,
            balance: Money::ZERO,
            available_balance: Money::ZERO,
            withdrawal_restrictions: None,
            last_transaction_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a settlement delay; zero minutes means no restriction
    pub fn with_settlement_delay(mut self, minutes: u32) -> Self {
        self.withdrawal_restrictions = (minutes > 0).then(|| WithdrawalRestrictions::new(minutes));
        self
    }

    /// Funds currently held back by a settlement lock
    pub fn locked_amount(&self) -> Money {
        self.balance.saturating_sub(self.available_balance)
    }

    /// Release an elapsed settlement lock, making all funds available
    ///
    /// Returns true if a lock was released.
    fn release_elapsed_lock(&mut self, now: DateTime<Utc>) -> bool {
        let Some(restrictions) = self.withdrawal_restrictions.as_mut() else {
            return false;
        };
        match restrictions.locked_until {
            Some(until) if until <= now => {
                restrictions.locked_until = None;
                self.available_balance = self.balance;
                true
            }
            _ => false,
        }
    }

    /// Snapshot with any elapsed settlement lock released
    pub fn settled_view(&self, now: DateTime<Utc>) -> Wallet {
        let mut wallet = self.clone();
        wallet.release_elapsed_lock(now);
        wallet
    }

    /// Apply a mutation in place
    ///
    /// The wallet is left unchanged when an error is returned.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for non-positive amounts
    /// - [`LedgerError::InsufficientFunds`] if a debit exceeds the available balance
    /// - [`LedgerError::ArithmeticOverflow`] if a credit would overflow
    pub fn apply(&mut self, mutation: WalletMutation, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let amount = mutation.amount();
        if !amount.is_positive() {
            return Err(LedgerError::validation(
                "amount",
                format!("{} amount must be positive, got {}", mutation.name(), amount),
            ));
        }

        let mut next = self.clone();
        next.release_elapsed_lock(now);

        match mutation {
            WalletMutation::Debit(amount) => {
                if next.available_balance < amount {
                    return Err(LedgerError::insufficient_funds(
                        next.user_id,
                        next.wallet_type,
                        next.available_balance,
                        amount,
                    ));
                }
                next.available_balance = next
                    .available_balance
                    .checked_sub(amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("debit"))?;
                next.balance = next
                    .balance
                    .checked_sub(amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("debit"))?;
            }
            WalletMutation::Credit(amount) => {
                next.balance = next
                    .balance
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("credit"))?;
                next.available_balance = next
                    .available_balance
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("credit"))?;
            }
            WalletMutation::CreditWithSettlement(amount) => {
                next.balance = next
                    .balance
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("credit"))?;
                match next.withdrawal_restrictions.as_mut() {
                    Some(restrictions) if restrictions.min_settlement_delay_minutes > 0 => {
                        let delay = Duration::minutes(i64::from(restrictions.min_settlement_delay_minutes));
                        restrictions.locked_until = Some(now + delay);
                    }
                    _ => {
                        next.available_balance = next
                            .available_balance
                            .checked_add(amount)
                            .ok_or_else(|| LedgerError::arithmetic_overflow("credit"))?;
                    }
                }
            }
        }

        next.last_transaction_at = Some(now);
        next.updated_at = now;
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn funded(amount: i64) -> Wallet {
        let mut wallet = Wallet::new(Uuid::from_u128(1), WalletType::Main, now());
        wallet.balance = Money::from_minor(amount);
        wallet.available_balance = Money::from_minor(amount);
        wallet
    }

    #[rstest]
    #[case::debit_partial(1000, WalletMutation::Debit(Money::from_minor(400)), 600)]
    #[case::debit_exact(1000, WalletMutation::Debit(Money::from_minor(1000)), 0)]
    #[case::credit(1000, WalletMutation::Credit(Money::from_minor(250)), 1250)]
    #[case::credit_without_lock(0, WalletMutation::CreditWithSettlement(Money::from_minor(99)), 99)]
    fn test_apply_success(#[case] start: i64, #[case] mutation: WalletMutation, #[case] expected: i64) {
        let mut wallet = funded(start);
        wallet.apply(mutation, now()).unwrap();
        assert_eq!(wallet.balance, Money::from_minor(expected));
        assert_eq!(wallet.available_balance, Money::from_minor(expected));
        assert_eq!(wallet.last_transaction_at, Some(now()));
    }

    #[test]
    fn test_failed_debit_leaves_wallet_unchanged() {
        let mut wallet = funded(45_000);
        let before = wallet.clone();
        let err = wallet
            .apply(WalletMutation::Debit(Money::from_minor(45_001)), now())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::insufficient_funds(
                wallet.user_id,
                WalletType::Main,
                Money::from_minor(45_000),
                Money::from_minor(45_001)
            )
        );
        assert_eq!(wallet, before);
    }

    #[rstest]
    #[case::zero(WalletMutation::Credit(Money::ZERO))]
    #[case::negative(WalletMutation::Debit(Money::from_minor(-5)))]
    fn test_apply_rejects_non_positive(#[case] mutation: WalletMutation) {
        let mut wallet = funded(100);
        assert!(matches!(
            wallet.apply(mutation, now()),
            Err(LedgerError::Validation { .. })
        ));
        assert_eq!(wallet.balance, Money::from_minor(100));
    }

    #[test]
    fn test_credit_overflow() {
        let mut wallet = funded(i64::MAX);
        assert!(matches!(
            wallet.apply(WalletMutation::Credit(Money::from_minor(1)), now()),
            Err(LedgerError::ArithmeticOverflow { .. })
        ));
    }

    #[test]
    fn test_settlement_lock_holds_then_releases() {
        let mut wallet = funded(100).with_settlement_delay(30);
        wallet
            .apply(WalletMutation::CreditWithSettlement(Money::from_minor(500)), now())
            .unwrap();

        assert_eq!(wallet.balance, Money::from_minor(600));
        assert_eq!(wallet.available_balance, Money::from_minor(100));
        assert_eq!(wallet.locked_amount(), Money::from_minor(500));
        assert!(wallet
            .withdrawal_restrictions
            .as_ref()
            .unwrap()
            .is_locked(now()));

        let err = wallet
            .apply(WalletMutation::Debit(Money::from_minor(200)), now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let later = now() + Duration::minutes(30);
        let view = wallet.settled_view(later);
        assert_eq!(view.available_balance, Money::from_minor(600));
        assert_eq!(view.withdrawal_restrictions.unwrap().locked_until, None);

        wallet
            .apply(WalletMutation::Debit(Money::from_minor(200)), later)
            .unwrap();
        assert_eq!(wallet.balance, Money::from_minor(400));
        assert_eq!(wallet.available_balance, Money::from_minor(400));
    }

    #[rstest]
    #[case::main("main", WalletType::Main)]
    #[case::savings_mixed_case(" Savings ", WalletType::Savings)]
    fn test_wallet_type_from_str(#[case] input: &str, #[case] expected: WalletType) {
        assert_eq!(input.parse::<WalletType>().unwrap(), expected);
    }

    #[test]
    fn test_wallet_type_from_str_unknown() {
        assert!("checking".parse::<WalletType>().is_err());
    }
}
