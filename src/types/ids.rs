//! Identifier aliases
//!
//! All entity identifiers are UUIDs. Parsing from untrusted strings happens at
//! the boundary through [`parse_id`], which reports the offending field.

use uuid::Uuid;

use super::error::LedgerError;

/// Owner of wallets, rules and PIN credentials
pub type UserId = Uuid;

/// Wallet identifier (one wallet per user and wallet type)
pub type WalletId = Uuid;

/// Transaction identifier, also used as the gateway idempotency reference
pub type TransactionId = Uuid;

/// Round-up rule identifier
pub type RuleId = Uuid;

/// Parse a UUID, naming the field in the validation error.
pub fn parse_id(value: &str, field: &str) -> Result<Uuid, LedgerError> {
    Uuid::parse_str(value.trim())
        .map_err(|e| LedgerError::validation(field, format!("invalid identifier: {}", e)))
}
