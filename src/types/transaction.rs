//! Transaction-related types for the wallet ledger
//!
//! This module defines the transaction record, its status state machine and
//! the closed set of per-type details. Transactions are never deleted; they
//! only move forward through their status lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::LedgerError;
use super::ids::{TransactionId, UserId};
use super::money::Money;
use super::round_up::IncrementType;

/// Transaction types recorded by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Payment to a merchant through the gateway
    Payment,
    /// Transfer to another person's bank account through the gateway
    TransferOut,
    /// Funding of the main wallet through a gateway checkout
    Deposit,
    /// Payout of wallet funds to the user's own bank account
    Withdrawal,
    /// Micro-savings moved from main to savings alongside a payment
    RoundUp,
    InvestmentAllocation,
    InvestmentRedemption,
    InterestPayout,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "payment",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::RoundUp => "round_up",
            TransactionType::InvestmentAllocation => "investment_allocation",
            TransactionType::InvestmentRedemption => "investment_redemption",
            TransactionType::InterestPayout => "interest_payout",
        }
    }

    /// Whether the amount counts towards the user's daily ceiling
    pub fn counts_toward_daily_limit(&self) -> bool {
        matches!(
            self,
            TransactionType::Payment
                | TransactionType::TransferOut
                | TransactionType::Deposit
                | TransactionType::Withdrawal
        )
    }

    /// Internal movements complete immediately; anything touching the
    /// gateway starts out pending
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            TransactionType::RoundUp
                | TransactionType::InvestmentAllocation
                | TransactionType::InvestmentRedemption
                | TransactionType::InterestPayout
        )
    }

    fn default_category(&self) -> &'static str {
        match self {
            TransactionType::Payment => "payments",
            TransactionType::TransferOut => "transfers",
            TransactionType::Deposit | TransactionType::Withdrawal => "funding",
            TransactionType::RoundUp => "savings",
            TransactionType::InvestmentAllocation
            | TransactionType::InvestmentRedemption
            | TransactionType::InterestPayout => "investments",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction lifecycle status
///
/// `Pending` is the only non-terminal state. Completed, failed and cancelled
/// transactions never change status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next != TransactionStatus::Pending
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merchant receiving a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantInfo {
    pub merchant_id: String,
    pub name: String,
    pub account_number: String,
    pub bank_code: String,
    pub category: Option<String>,
    /// Gateway recipient code, filled in once the recipient is registered
    pub recipient_code: Option<String>,
}

/// Person receiving a peer transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecipient {
    pub name: String,
    pub account_number: String,
    pub bank_code: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub recipient_code: Option<String>,
}

/// Type-specific transaction details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionDetails {
    Payment {
        merchant: MerchantInfo,
        description: Option<String>,
    },
    TransferOut {
        recipient: PeerRecipient,
        description: Option<String>,
    },
    Deposit {
        email: String,
        checkout_url: Option<String>,
        access_code: Option<String>,
    },
    Withdrawal {
        account_number: String,
        bank_code: String,
    },
    RoundUp,
    InvestmentAllocation {
        investment_id: String,
    },
    InvestmentRedemption {
        investment_id: String,
    },
    InterestPayout {
        investment_id: String,
    },
}

impl TransactionDetails {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionDetails::Payment { .. } => TransactionType::Payment,
            TransactionDetails::TransferOut { .. } => TransactionType::TransferOut,
            TransactionDetails::Deposit { .. } => TransactionType::Deposit,
            TransactionDetails::Withdrawal { .. } => TransactionType::Withdrawal,
            TransactionDetails::RoundUp => TransactionType::RoundUp,
            TransactionDetails::InvestmentAllocation { .. } => TransactionType::InvestmentAllocation,
            TransactionDetails::InvestmentRedemption { .. } => TransactionType::InvestmentRedemption,
            TransactionDetails::InterestPayout { .. } => TransactionType::InterestPayout,
        }
    }
}

/// Link between a payment and the round-up it triggered
///
/// On the parent, `related_transaction_id` points at the round-up
/// transaction; on the round-up it points back at the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundUpDetails {
    pub original_amount: Money,
    pub round_up_amount: Money,
    pub round_up_rule: IncrementType,
    pub related_transaction_id: Option<TransactionId>,
}

/// Gateway retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryInfo {
    pub count: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// A stored transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub status: TransactionStatus,
    /// Always a positive whole number of minor units
    pub amount: Money,
    pub fee: Money,
    pub category: String,
    pub details: TransactionDetails,
    pub round_up_details: Option<RoundUpDetails>,
    /// Reference handed to the gateway; doubles as its idempotency key
    pub external_reference: Option<String>,
    /// Gateway-side identifier (transfer code, charge id)
    pub external_transaction_id: Option<String>,
    pub retry: RetryInfo,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn transaction_type(&self) -> TransactionType {
        self.details.transaction_type()
    }

    /// Check record-level invariants
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] for non-positive amounts, negative fees or
    /// a round-up transaction without a link to its parent.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::validation(
                "amount",
                format!("must be positive, got {}", self.amount),
            ));
        }
        if self.fee.is_negative() {
            return Err(LedgerError::validation(
                "fee",
                format!("must not be negative, got {}", self.fee),
            ));
        }
        if self.transaction_type() == TransactionType::RoundUp {
            let linked = self
                .round_up_details
                .as_ref()
                .and_then(|details| details.related_transaction_id);
            if linked.is_none() {
                return Err(LedgerError::validation(
                    "round_up_details.related_transaction_id",
                    "round-up transactions must reference their parent",
                ));
            }
        }
        Ok(())
    }

    /// Move to `next`, stamping `completed_at` on completion
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidStatusTransition`] if the transaction is already
    /// terminal.
    pub fn transition(&mut self, next: TransactionStatus, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::invalid_status_transition(self.id, self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        if next == TransactionStatus::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

/// Request to record a new transaction
///
/// The amount is taken as a decimal so fractional input is caught by the
/// writer instead of being silently truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub fee: Money,
    pub category: Option<String>,
    pub details: TransactionDetails,
    pub round_up_details: Option<RoundUpDetails>,
}

impl NewTransaction {
    pub fn new(user_id: UserId, amount: Decimal, details: TransactionDetails) -> Self {
        NewTransaction {
            id: Uuid::new_v4(),
            user_id,
            amount,
            fee: Money::ZERO,
            category: None,
            details,
            round_up_details: None,
        }
    }

    pub fn with_fee(mut self, fee: Money) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_round_up_details(mut self, details: RoundUpDetails) -> Self {
        self.round_up_details = Some(details);
        self
    }

    /// Build the stored record once the amount has been converted
    pub fn into_transaction(self, amount: Money, now: DateTime<Utc>) -> Transaction {
        let transaction_type = self.details.transaction_type();
        let status = if transaction_type.is_internal() {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Pending
        };
        let category = self
            .category
            .unwrap_or_else(|| transaction_type.default_category().to_string());
        Transaction {
            id: self.id,
            user_id: self.user_id,
            status,
            amount,
            fee: self.fee,
            category,
            details: self.details,
            round_up_details: self.round_up_details,
            external_reference: Some(self.id.to_string()),
            external_transaction_id: None,
            retry: RetryInfo::default(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: (status == TransactionStatus::Completed).then_some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn merchant() -> MerchantInfo {
        MerchantInfo {
            merchant_id: "m-1".to_string(),
            name: "Corner Shop".to_string(),
            account_number: "0123456789".to_string(),
            bank_code: "058".to_string(),
            category: Some("groceries".to_string()),
            recipient_code: None,
        }
    }

    fn payment(amount: i64) -> Transaction {
        NewTransaction::new(
            Uuid::from_u128(1),
            Decimal::new(amount, 0),
            TransactionDetails::Payment {
                merchant: merchant(),
                description: None,
            },
        )
        .into_transaction(Money::from_minor(amount), Utc::now())
    }

    #[rstest]
    #[case::pending_to_completed(TransactionStatus::Pending, TransactionStatus::Completed, true)]
    #[case::pending_to_failed(TransactionStatus::Pending, TransactionStatus::Failed, true)]
    #[case::pending_to_cancelled(TransactionStatus::Pending, TransactionStatus::Cancelled, true)]
    #[case::pending_to_pending(TransactionStatus::Pending, TransactionStatus::Pending, false)]
    #[case::completed_to_failed(TransactionStatus::Completed, TransactionStatus::Failed, false)]
    #[case::cancelled_to_pending(TransactionStatus::Cancelled, TransactionStatus::Pending, false)]
    #[case::failed_to_completed(TransactionStatus::Failed, TransactionStatus::Completed, false)]
    fn test_status_transitions(
        #[case] from: TransactionStatus,
        #[case] to: TransactionStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case::payment(TransactionType::Payment, true, false)]
    #[case::transfer(TransactionType::TransferOut, true, false)]
    #[case::deposit(TransactionType::Deposit, true, false)]
    #[case::withdrawal(TransactionType::Withdrawal, true, false)]
    #[case::round_up(TransactionType::RoundUp, false, true)]
    #[case::interest(TransactionType::InterestPayout, false, true)]
    fn test_type_classification(
        #[case] transaction_type: TransactionType,
        #[case] daily: bool,
        #[case] internal: bool,
    ) {
        assert_eq!(transaction_type.counts_toward_daily_limit(), daily);
        assert_eq!(transaction_type.is_internal(), internal);
    }

    #[test]
    fn test_gateway_transactions_start_pending() {
        let tx = payment(43_000);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.category, "payments");
        assert_eq!(tx.external_reference, Some(tx.id.to_string()));
        assert!(tx.completed_at.is_none());
    }

    #[test]
    fn test_transition_stamps_completion() {
        let mut tx = payment(100);
        let now = Utc::now();
        tx.transition(TransactionStatus::Completed, now).unwrap();
        assert_eq!(tx.completed_at, Some(now));

        let err = tx.transition(TransactionStatus::Failed, now).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStatusTransition { .. }));
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_round_up_requires_parent_link() {
        let mut tx = NewTransaction::new(Uuid::from_u128(1), Decimal::new(999, 0), TransactionDetails::RoundUp)
            .into_transaction(Money::from_minor(999), Utc::now());
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.validate().is_err());

        tx.round_up_details = Some(RoundUpDetails {
            original_amount: Money::from_minor(43_001),
            round_up_amount: Money::from_minor(999),
            round_up_rule: IncrementType::Ten,
            related_transaction_id: Some(Uuid::from_u128(2)),
        });
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn test_details_are_tagged_by_type() {
        let json = serde_json::to_value(&payment(10).details).unwrap();
        assert_eq!(json["type"], "payment");
        assert_eq!(json["merchant"]["name"], "Corner Shop");
    }
}
