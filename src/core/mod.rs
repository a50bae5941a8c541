//! Core business logic module
//!
//! This module contains the ledger and payment components:
//! - `traits` - Storage seams shared by every component
//! - `clock` - Injectable time source
//! - `wallet_ledger` - Wallet provisioning and atomic balance changes
//! - `round_up` - Round-up calculation and feasibility
//! - `pin_gate` - PIN verification, lockout and single-use tokens
//! - `transaction_writer` - Transaction records with limit enforcement
//! - `orchestrator` - Payments, transfers, deposits and settlement
//! - `retry_scheduler` - Future-dated retry jobs
//! - `recipient` - Contact normalization and self-transfer checks
//! - `webhook` - Signed gateway callbacks
//! - `memory` - In-memory store implementations

pub mod clock;
pub mod memory;
pub mod orchestrator;
pub mod pin_gate;
pub mod recipient;
pub mod retry_scheduler;
pub mod round_up;
pub mod traits;
pub mod transaction_writer;
pub mod wallet_ledger;
pub mod webhook;

pub use clock::{Clock, ManualClock, SystemClock};
pub use orchestrator::{
    DepositCheckout, GatewayOutcome, MerchantPayment, PaymentOrchestrator, PaymentReceipt, PeerTransfer,
    RoundUpOutcome, ROUND_UP_SKIP_REASON,
};
pub use pin_gate::PinGate;
pub use retry_scheduler::RetryScheduler;
pub use round_up::{calculate_round_up, can_apply_round_up};
pub use traits::{
    GuardedUpdate, InsertOutcome, PinStore, RetryQueue, RoundUpRuleStore, Stores, TransactionPatch,
    TransactionStore, UserDirectory, WalletStore,
};
pub use transaction_writer::TransactionWriter;
pub use wallet_ledger::WalletLedger;
pub use webhook::{sign_payload, verify_signature, WebhookAck, WebhookProcessor, SIGNATURE_HEADER};
