//! Error types for the wallet ledger
//!
//! Every fallible ledger, PIN, limit and gateway operation reports a
//! [`LedgerError`]. Variants carry enough context for a caller to act on the
//! failure (show the balance, show the unlock time, retry later).
//!
//! # Error Categories
//!
//! - **Validation Errors**: malformed input, fractional amounts, self-transfers
//! - **Limit Errors**: per-transaction and daily ceilings
//! - **Authorization Errors**: expired PIN tokens, PIN lockout
//! - **Funds Errors**: insufficient available balance, arithmetic overflow
//! - **Gateway Errors**: the payment gateway could not complete a call
//! - **Storage / I/O Errors**: backing store and journal failures

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::money::Money;
use super::wallet::WalletType;

/// Main error type for the wallet ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The wallet's available balance does not cover the requested amount
    ///
    /// The wallet is left unchanged.
    #[error("Insufficient funds in {wallet_type} wallet of user {user_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        user_id: Uuid,
        wallet_type: WalletType,
        available: Money,
        requested: Money,
    },

    /// The PIN authorization token is unknown, expired, consumed or belongs
    /// to another user
    #[error("PIN authorization token is invalid or expired")]
    PinTokenExpired,

    /// Too many failed PIN attempts; no verification until `locked_until`
    #[error("PIN locked until {locked_until} ({attempts_remaining} attempts remaining)")]
    PinLocked {
        attempts_remaining: u8,
        locked_until: DateTime<Utc>,
    },

    /// Amount exceeds the per-transaction ceiling
    #[error("Amount {amount} exceeds the single transaction limit of {limit}")]
    SingleLimitExceeded { amount: Money, limit: Money },

    /// Amount would push today's spend over the daily ceiling
    #[error("Daily limit of {limit} exceeded: {available_today} available today, requested {requested}")]
    DailyLimitExceeded {
        limit: Money,
        available_today: Money,
        requested: Money,
    },

    /// The recipient resolves to the sender
    #[error("Transfers to yourself are not allowed")]
    SelfTransferNotAllowed,

    /// Amount is not a whole number of minor units
    #[error("Amount {amount} is not a whole number of minor units")]
    AmountNotInteger { amount: String },

    /// The payment gateway did not complete the call
    ///
    /// `retryable` is false when the gateway gave a definitive answer.
    #[error("Payment gateway unavailable during {operation}: {message}")]
    GatewayUnavailable {
        operation: String,
        message: String,
        retryable: bool,
    },

    /// Input failed validation
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    /// A transaction with this id has already been recorded
    #[error("Duplicate transaction {id}")]
    DuplicateTransaction { id: Uuid },

    /// Status change would move a transaction backwards or out of a
    /// terminal state
    #[error("Transaction {id} cannot move from {from} to {to}")]
    InvalidStatusTransition { id: Uuid, from: String, to: String },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow { operation: String },

    /// The backing store failed
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// I/O error while reading or writing files
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Malformed journal record
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse { line: Option<u64>, message: String },

    /// Unexpected internal failure (task join, hashing)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        LedgerError::Parse {
            line: error.position().map(|pos| pos.line()),
            message: error.to_string(),
        }
    }
}

impl From<csv_async::Error> for LedgerError {
    fn from(error: csv_async::Error) -> Self {
        LedgerError::Parse {
            line: None,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        LedgerError::Internal {
            message: format!("serialization: {}", error),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    pub fn insufficient_funds(
        user_id: Uuid,
        wallet_type: WalletType,
        available: Money,
        requested: Money,
    ) -> Self {
        LedgerError::InsufficientFunds {
            user_id,
            wallet_type,
            available,
            requested,
        }
    }

    pub fn pin_locked(attempts_remaining: u8, locked_until: DateTime<Utc>) -> Self {
        LedgerError::PinLocked {
            attempts_remaining,
            locked_until,
        }
    }

    pub fn single_limit_exceeded(amount: Money, limit: Money) -> Self {
        LedgerError::SingleLimitExceeded { amount, limit }
    }

    pub fn daily_limit_exceeded(limit: Money, available_today: Money, requested: Money) -> Self {
        LedgerError::DailyLimitExceeded {
            limit,
            available_today,
            requested,
        }
    }

    pub fn amount_not_integer(amount: impl ToString) -> Self {
        LedgerError::AmountNotInteger {
            amount: amount.to_string(),
        }
    }

    pub fn gateway_unavailable(operation: &str, message: impl Into<String>, retryable: bool) -> Self {
        LedgerError::GatewayUnavailable {
            operation: operation.to_string(),
            message: message.into(),
            retryable,
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid_status_transition(id: Uuid, from: impl ToString, to: impl ToString) -> Self {
        LedgerError::InvalidStatusTransition {
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn arithmetic_overflow(operation: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        LedgerError::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::PinTokenExpired => "pin_token_expired",
            LedgerError::PinLocked { .. } => "pin_locked",
            LedgerError::SingleLimitExceeded { .. } => "single_limit_exceeded",
            LedgerError::DailyLimitExceeded { .. } => "daily_limit_exceeded",
            LedgerError::SelfTransferNotAllowed => "self_transfer_not_allowed",
            LedgerError::AmountNotInteger { .. } => "amount_not_integer",
            LedgerError::GatewayUnavailable { .. } => "gateway_unavailable",
            LedgerError::Validation { .. } => "validation_error",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::DuplicateTransaction { .. } => "duplicate_transaction",
            LedgerError::InvalidStatusTransition { .. } => "invalid_status_transition",
            LedgerError::ArithmeticOverflow { .. } => "arithmetic_overflow",
            LedgerError::Storage { .. } => "storage_error",
            LedgerError::Io { .. } => "io_error",
            LedgerError::Parse { .. } => "parse_error",
            LedgerError::Internal { .. } => "internal_error",
        }
    }

    /// Whether the same call may succeed if repeated later
    ///
    /// Validation, limit and authorization failures are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::GatewayUnavailable { retryable, .. } => *retryable,
            LedgerError::Storage { .. } => true,
            _ => false,
        }
    }
}
