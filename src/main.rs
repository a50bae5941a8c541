//! Wallet ledger CLI
//!
//! Operations tooling around the ledger library.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- replay journal.csv > wallets.csv
//! cargo run -- replay --batch-size 2000 --max-concurrent 8 journal.csv > wallets.csv
//! cargo run -- round-up --amount 43001 --increment 10
//! cargo run -- round-up --amount 55000 --increment auto --min-increment 300 --max-increment 5000
//! cargo run -- sign-webhook payload.json
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `wallet_ledger=info`) so stdout
//! carries only the command output.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (bad configuration, unreadable file, invalid rule, etc.)

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use wallet_ledger::cli::{self, Command};
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::core::memory::MemoryWalletStore;
use wallet_ledger::core::{calculate_round_up, sign_payload, SystemClock, WalletLedger};
use wallet_ledger::io::{replay_journal, write_wallets_csv};
use wallet_ledger::types::{IncrementType, Money, RoundUpRule};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wallet_ledger=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    let config = LedgerConfig::from_env().context("invalid configuration")?;

    match &args.command {
        Command::Replay { input_file, .. } => {
            let replay_config = args.command.to_replay_config().unwrap_or_default();
            let ledger = WalletLedger::new(Arc::new(MemoryWalletStore::new()), Arc::new(SystemClock));
            let summary = replay_journal(input_file, &ledger, &replay_config)
                .await
                .with_context(|| format!("failed to replay {}", input_file.display()))?;
            tracing::info!(applied = summary.applied, rejected = summary.rejected, "replay finished");

            let wallets = ledger.list_wallets().await?;
            write_wallets_csv(&wallets, &mut std::io::stdout())?;
        }
        Command::RoundUp {
            amount,
            increment,
            percentage,
            min_increment,
            max_increment,
        } => {
            let mut rule = RoundUpRule::new(uuid::Uuid::nil(), *increment, Utc::now());
            if let Some(percentage) = percentage {
                rule = rule.with_percentage(*percentage);
            }
            if *increment == IncrementType::Auto {
                let (Some(min), Some(max)) = (min_increment, max_increment) else {
                    bail!("auto increments need --min-increment and --max-increment");
                };
                rule = rule.with_auto_settings(Money::from_minor(*min), Money::from_minor(*max));
            }
            rule.validate()?;

            let calculation = calculate_round_up(Money::from_minor(*amount), Some(&rule));
            println!("{}", serde_json::to_string_pretty(&calculation)?);
        }
        Command::SignWebhook { payload_file, secret } => {
            let body = tokio::fs::read(payload_file)
                .await
                .with_context(|| format!("failed to read {}", payload_file.display()))?;
            let secret = secret.clone().unwrap_or(config.webhook_secret);
            if secret.is_empty() {
                bail!("no webhook secret: set WEBHOOK_SECRET or pass --secret");
            }
            println!("{}", sign_payload(&secret, &body)?);
        }
    }

    Ok(())
}
