//! Payment gateway seam
//!
//! The ledger talks to the external payment gateway only through
//! [`PaymentGateway`]. All amounts are integer minor units and every call
//! that moves money carries the ledger transaction id as its `reference`,
//! which the gateway treats as an idempotency key.
//!
//! - `http`: reqwest client for a Paystack-style REST API

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{LedgerError, Money};

pub use http::HttpGateway;

/// Start a hosted checkout for a deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializeTransaction {
    pub email: String,
    pub amount: Money,
    pub reference: String,
    pub currency: String,
}

/// Hosted checkout the user is redirected to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
    #[serde(other)]
    Unknown,
}

/// State of a deposit charge as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChargeVerification {
    pub reference: String,
    pub status: ChargeStatus,
    pub amount: Money,
}

/// Register a bank account as a transfer destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub account_number: String,
    pub bank_code: String,
    pub currency: String,
}

/// Send money to a registered recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub source: String,
    pub amount: Money,
    pub recipient: String,
    pub reference: String,
    pub reason: Option<String>,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Pending,
    /// Waiting for an OTP on the gateway side
    Otp,
    Queued,
    Failed,
    Reversed,
    #[serde(other)]
    Unknown,
}

impl TransferStatus {
    /// The transfer will not complete
    pub fn is_definitive_failure(&self) -> bool {
        matches!(self, TransferStatus::Failed | TransferStatus::Reversed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferResult {
    pub reference: String,
    pub transfer_code: Option<String>,
    pub status: TransferStatus,
}

/// Why a gateway call did not produce a usable answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("gateway returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// The gateway understood the request and refused it
    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// A definitive answer; repeating the call will not help
    pub fn is_definitive(&self) -> bool {
        match self {
            GatewayError::Rejected(_) => true,
            GatewayError::Status { code, .. } => (400..500).contains(code) && *code != 408 && *code != 429,
            GatewayError::Transport(_) | GatewayError::Timeout | GatewayError::MalformedResponse(_) => false,
        }
    }

    pub fn into_ledger_error(self, operation: &str) -> LedgerError {
        let retryable = !self.is_definitive();
        LedgerError::gateway_unavailable(operation, self.to_string(), retryable)
    }
}

/// External payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_transaction(&self, request: InitializeTransaction) -> Result<CheckoutSession, GatewayError>;

    async fn verify_transaction(&self, reference: &str) -> Result<ChargeVerification, GatewayError>;

    /// Returns the recipient code used by transfers
    async fn create_transfer_recipient(&self, request: RecipientRequest) -> Result<String, GatewayError>;

    async fn initiate_transfer(&self, request: TransferRequest) -> Result<TransferResult, GatewayError>;

    async fn verify_transfer(&self, reference: &str) -> Result<TransferResult, GatewayError>;
}

/// Gateway fee for a transfer of `amount`, recorded on the transaction
pub fn fee_for_transfer(amount: Money) -> Money {
    match amount.minor_units() {
        units if units <= 500_000 => Money::from_minor(1_000),
        units if units <= 5_000_000 => Money::from_minor(2_500),
        _ => Money::from_minor(5_000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::small(43_000, 1_000)]
    #[case::tier_edge(500_000, 1_000)]
    #[case::middle(500_001, 2_500)]
    #[case::upper_edge(5_000_000, 2_500)]
    #[case::large(5_000_001, 5_000)]
    fn test_fee_tiers(#[case] amount: i64, #[case] fee: i64) {
        assert_eq!(fee_for_transfer(Money::from_minor(amount)), Money::from_minor(fee));
    }

    #[rstest]
    #[case::rejected(GatewayError::Rejected("invalid account".to_string()), true)]
    #[case::bad_request(GatewayError::Status { code: 400, message: "bad".to_string() }, true)]
    #[case::rate_limited(GatewayError::Status { code: 429, message: "slow down".to_string() }, false)]
    #[case::server_error(GatewayError::Status { code: 503, message: "down".to_string() }, false)]
    #[case::timeout(GatewayError::Timeout, false)]
    #[case::transport(GatewayError::Transport("reset".to_string()), false)]
    #[case::malformed(GatewayError::MalformedResponse("eof".to_string()), false)]
    fn test_is_definitive(#[case] error: GatewayError, #[case] definitive: bool) {
        assert_eq!(error.is_definitive(), definitive);
        assert_eq!(error.into_ledger_error("transfer").is_retryable(), !definitive);
    }

    #[test]
    fn test_unknown_transfer_status_deserializes() {
        let status: TransferStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(status, TransferStatus::Unknown);
        assert!(!status.is_definitive_failure());
    }
}
