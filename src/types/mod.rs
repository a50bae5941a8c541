//! Types module
//!
//! Contains the value and record types shared by the ledger:
//! - `money`: integer minor-unit amounts
//! - `wallet`: wallets and the mutations applied to them
//! - `transaction`: transaction records, statuses and per-type details
//! - `round_up`: round-up rules
//! - `pin`: PIN credentials, lockout windows and authorization tokens
//! - `retry`: retry jobs and their payloads
//! - `error`: the crate-wide error type

pub mod error;
pub mod ids;
pub mod money;
pub mod pin;
pub mod retry;
pub mod round_up;
pub mod transaction;
pub mod user;
pub mod wallet;

pub use error::LedgerError;
pub use ids::{parse_id, RuleId, TransactionId, UserId, WalletId};
pub use money::Money;
pub use pin::{lockout_window, PinCredentials, PinToken, PinVerification, MAX_PIN_ATTEMPTS};
pub use retry::{RetryAction, RetryJob};
pub use round_up::{AutoSettings, IncrementType, RoundUpCalculation, RoundUpRule};
pub use transaction::{
    MerchantInfo, NewTransaction, PeerRecipient, RetryInfo, RoundUpDetails, Transaction,
    TransactionDetails, TransactionStatus, TransactionType,
};
pub use user::UserProfile;
pub use wallet::{Wallet, WalletMutation, WalletType, WithdrawalRestrictions};
