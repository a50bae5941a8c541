//! In-memory store implementations
//!
//! Thread-safe implementations of every storage trait, backed by `DashMap`
//! for fine-grained per-entry locking:
//!
//! - **MemoryWalletStore**: wallet rows with atomic conditional mutations
//! - **MemoryTransactionStore**: transactions with per-user limit checks
//! - **MemoryRuleStore**: round-up rules and counters
//! - **MemoryPinStore**: PIN credentials, lockout CAS and tokens
//! - **MemoryUserDirectory**: user contact details
//! - **MemoryRetryQueue**: future-dated retry jobs
//!
//! Operations on different rows proceed in parallel; operations on the same
//! row are serialized by the entry lock.

pub mod pin_store;
pub mod retry_queue;
pub mod rule_store;
pub mod transaction_store;
pub mod user_directory;
pub mod wallet_store;

use std::sync::Arc;

pub use pin_store::MemoryPinStore;
pub use retry_queue::MemoryRetryQueue;
pub use rule_store::MemoryRuleStore;
pub use transaction_store::MemoryTransactionStore;
pub use user_directory::MemoryUserDirectory;
pub use wallet_store::MemoryWalletStore;

use super::traits::Stores;

impl Stores {
    /// A fresh, empty set of in-memory stores
    pub fn in_memory() -> Self {
        Stores {
            wallets: Arc::new(MemoryWalletStore::new()),
            transactions: Arc::new(MemoryTransactionStore::new()),
            rules: Arc::new(MemoryRuleStore::new()),
            pins: Arc::new(MemoryPinStore::new()),
            users: Arc::new(MemoryUserDirectory::new()),
            retries: Arc::new(MemoryRetryQueue::new()),
        }
    }
}
