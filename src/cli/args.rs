use crate::io::ReplayConfig;
use crate::types::IncrementType;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Wallet ledger operations tooling
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "Wallet ledger reconciliation and round-up tooling", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a credit/debit journal and print the resulting wallets as CSV
    Replay {
        /// Journal CSV with columns op,user,wallet,amount
        #[arg(value_name = "JOURNAL")]
        input_file: PathBuf,

        /// Journal lines per batch
        #[arg(long = "batch-size", value_name = "SIZE")]
        batch_size: Option<usize>,

        /// Wallets replayed concurrently (default: CPU cores)
        #[arg(long = "max-concurrent", value_name = "COUNT")]
        max_concurrent: Option<usize>,
    },

    /// Print the round-up for a payment as JSON
    RoundUp {
        /// Payment amount in minor units
        #[arg(long, value_name = "MINOR")]
        amount: i64,

        /// Increment: 10, 50, 100, auto or percentage
        #[arg(long, value_name = "KIND")]
        increment: IncrementType,

        /// Percentage for `percentage` rules
        #[arg(long, value_name = "PERCENT")]
        percentage: Option<Decimal>,

        /// Lower bound for `auto` rules, minor units
        #[arg(long = "min-increment", value_name = "MINOR")]
        min_increment: Option<i64>,

        /// Upper bound for `auto` rules, minor units
        #[arg(long = "max-increment", value_name = "MINOR")]
        max_increment: Option<i64>,
    },

    /// Sign a webhook payload file with the configured secret
    SignWebhook {
        #[arg(value_name = "PAYLOAD")]
        payload_file: PathBuf,

        /// Overrides WEBHOOK_SECRET
        #[arg(long, value_name = "SECRET")]
        secret: Option<String>,
    },
}

impl Command {
    /// Replay batching from the flags, defaults where absent
    pub fn to_replay_config(&self) -> Option<ReplayConfig> {
        match self {
            Command::Replay {
                batch_size,
                max_concurrent,
                ..
            } => {
                let default = ReplayConfig::default();
                Some(ReplayConfig::new(
                    batch_size.unwrap_or(default.batch_size),
                    max_concurrent.unwrap_or(default.max_concurrent),
                ))
            }
            _ => None,
        }
    }
}
