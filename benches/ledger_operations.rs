//! Benchmark suite for the hot ledger paths
//!
//! ```bash
//! cargo bench
//! ```
//!
//! - round-up calculation for every increment kind
//! - a single wallet mutation
//! - replay of a generated journal batch, sequential and concurrent

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;
use wallet_ledger::core::memory::MemoryWalletStore;
use wallet_ledger::core::{calculate_round_up, SystemClock, WalletLedger};
use wallet_ledger::io::replay::replay_batch;
use wallet_ledger::io::{JournalEntry, JournalOp};
use wallet_ledger::types::{IncrementType, Money, RoundUpRule, Wallet, WalletMutation, WalletType};

fn main() {
    divan::main();
}

fn rule(increment: IncrementType) -> RoundUpRule {
    let rule = RoundUpRule::new(Uuid::nil(), increment, Utc::now());
    match increment {
        IncrementType::Percentage => rule.with_percentage(Decimal::new(25, 1)),
        IncrementType::Auto => rule.with_auto_settings(Money::from_minor(500), Money::from_minor(5_000)),
        _ => rule,
    }
}

#[divan::bench(args = [IncrementType::Ten, IncrementType::Hundred, IncrementType::Percentage, IncrementType::Auto])]
fn round_up(bencher: divan::Bencher, increment: IncrementType) {
    let rule = rule(increment);
    bencher.bench(|| calculate_round_up(divan::black_box(Money::from_minor(123_456)), Some(&rule)));
}

#[divan::bench]
fn wallet_debit_credit(bencher: divan::Bencher) {
    let now = Utc::now();
    let mut wallet = Wallet::new(Uuid::nil(), WalletType::Main, now);
    let _ = wallet.apply(WalletMutation::Credit(Money::from_minor(1_000_000)), now);
    bencher.bench_local(|| {
        let _ = wallet.apply(WalletMutation::Debit(Money::from_minor(100)), now);
        let _ = wallet.apply(WalletMutation::Credit(Money::from_minor(100)), now);
    });
}

fn journal(users: u128, lines_per_user: usize) -> Vec<JournalEntry> {
    (0..lines_per_user)
        .flat_map(|line| {
            (0..users).map(move |user| JournalEntry {
                op: if line % 3 == 2 { JournalOp::Debit } else { JournalOp::Credit },
                user_id: Uuid::from_u128(user + 1),
                wallet_type: WalletType::Main,
                amount: Money::from_minor(1_000),
            })
        })
        .collect()
}

#[divan::bench(args = [1, 8])]
fn replay_1000_lines(bencher: divan::Bencher, max_concurrent: usize) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();
    bencher
        .with_inputs(|| {
            (
                WalletLedger::new(Arc::new(MemoryWalletStore::new()), Arc::new(SystemClock)),
                journal(50, 20),
            )
        })
        .bench_local_values(|(ledger, batch)| runtime.block_on(replay_batch(&ledger, batch, max_concurrent)));
}
