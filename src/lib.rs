//! Wallet Ledger Library
//! # Overview
//!
//! A per-user wallet ledger (`main` and `savings`) with payment orchestration:
//! PIN-authorized merchant payments and peer transfers, automatic round-up
//! savings, limit enforcement, deposits through a hosted checkout and
//! asynchronous retries of ambiguous gateway calls.
//!
//! # Architecture
//!
//! - [`types`] - Money, wallets, transactions, rules, PIN state and errors
//! - [`config`] - Environment-driven configuration
//! - [`core`] - Business logic components:
//!   - [`core::wallet_ledger`] - Atomic balance changes per wallet
//!   - [`core::round_up`] - Round-up calculation
//!   - [`core::pin_gate`] - PIN verification, lockout and single-use tokens
//!   - [`core::transaction_writer`] - Transaction records and limit checks
//!   - [`core::orchestrator`] - Payment, transfer and deposit flows
//!   - [`core::retry_scheduler`] - Future-dated retry jobs
//!   - [`core::webhook`] - Signed gateway callbacks
//!   - [`core::memory`] - In-memory store implementations
//! - [`gateway`] - Payment gateway seam and HTTP client
//! - [`io`] - Journal CSV reading, replay and wallet CSV output
//! - [`cli`] - CLI arguments parsing
//!
//! # Amounts
//!
//! Every amount is an integer number of minor currency units ([`Money`]).
//! Decimal inputs with a fractional part are rejected, never rounded.
//!
//! # Wallet States
//!
//! Each wallet maintains:
//! - `balance`: everything credited and not yet debited
//! - `available_balance`: the part that may be spent now; lower than
//!   `balance` only while a settlement lock holds recent credits

pub mod cli;
pub mod config;
pub mod core;
pub mod gateway;
pub mod io;
pub mod types;

pub use config::LedgerConfig;
pub use core::{PaymentOrchestrator, Stores, WalletLedger, WebhookProcessor};
pub use gateway::{HttpGateway, PaymentGateway};
pub use io::write_wallets_csv;
pub use types::{LedgerError, Money, Transaction, TransactionStatus, TransactionType, Wallet, WalletType};
