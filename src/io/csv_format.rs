//! CSV format handling for journal records and wallet output
//!
//! This module centralizes all CSV format concerns, providing:
//! - JournalRecord structure for deserialization
//! - Conversion from journal records to ledger operations
//! - Wallet output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use std::io::Write;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::{parse_id, LedgerError, Money, UserId, Wallet, WalletType};

/// Raw journal line with columns: op, user, wallet, amount
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct JournalRecord {
    pub op: String,
    pub user: String,
    pub wallet: String,
    pub amount: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOp {
    Credit,
    Debit,
}

/// A validated journal line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub op: JournalOp,
    pub user_id: UserId,
    pub wallet_type: WalletType,
    pub amount: Money,
}

/// Convert a JournalRecord to a JournalEntry
///
/// Amounts are integer minor units; fractional amounts are rejected with
/// [`LedgerError::AmountNotInteger`].
pub fn convert_journal_record(record: JournalRecord) -> Result<JournalEntry, LedgerError> {
    let op = match record.op.to_lowercase().as_str() {
        "credit" => JournalOp::Credit,
        "debit" => JournalOp::Debit,
        other => return Err(LedgerError::validation("op", format!("unknown journal operation '{}'", other))),
    };
    let user_id = parse_id(record.user.trim(), "user")?;
    let wallet_type = WalletType::from_str(&record.wallet.to_lowercase())?;
    let amount = Decimal::from_str(record.amount.trim())
        .map_err(|_| LedgerError::validation("amount", format!("invalid amount '{}'", record.amount)))?;

    Ok(JournalEntry {
        op,
        user_id,
        wallet_type,
        amount: Money::from_decimal(amount)?,
    })
}

/// Write wallet states to CSV format
///
/// Columns: user, wallet, balance, available_balance. Rows are sorted by
/// user then wallet type for deterministic output.
pub fn write_wallets_csv(wallets: &[Wallet], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["user", "wallet", "balance", "available_balance"])?;

    let mut sorted = wallets.to_vec();
    sorted.sort_by_key(|wallet| (wallet.user_id, wallet.wallet_type.as_str()));

    for wallet in sorted {
        writer.write_record(&[
            wallet.user_id.to_string(),
            wallet.wallet_type.to_string(),
            wallet.balance.to_string(),
            wallet.available_balance.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use uuid::Uuid;

    const USER: &str = "00000000-0000-0000-0000-000000000001";

    fn record(op: &str, wallet: &str, amount: &str) -> JournalRecord {
        JournalRecord {
            op: op.to_string(),
            user: USER.to_string(),
            wallet: wallet.to_string(),
            amount: amount.to_string(),
        }
    }

    #[rstest]
    #[case::credit_main("credit", "main", "5000", JournalOp::Credit, WalletType::Main)]
    #[case::debit_savings("debit", "savings", "1", JournalOp::Debit, WalletType::Savings)]
    #[case::mixed_case("CREDIT", "Main", "5000", JournalOp::Credit, WalletType::Main)]
    fn test_convert_valid(
        #[case] op: &str,
        #[case] wallet: &str,
        #[case] amount: &str,
        #[case] expected_op: JournalOp,
        #[case] expected_wallet: WalletType,
    ) {
        let entry = convert_journal_record(record(op, wallet, amount)).unwrap();
        assert_eq!(entry.op, expected_op);
        assert_eq!(entry.wallet_type, expected_wallet);
        assert_eq!(entry.user_id, Uuid::from_u128(1));
    }

    #[rstest]
    #[case::unknown_op(record("refund", "main", "10"), "validation_error")]
    #[case::unknown_wallet(record("credit", "checking", "10"), "validation_error")]
    #[case::fractional(record("credit", "main", "10.5"), "amount_not_integer")]
    #[case::not_a_number(record("credit", "main", "ten"), "validation_error")]
    fn test_convert_invalid(#[case] input: JournalRecord, #[case] code: &str) {
        assert_eq!(convert_journal_record(input).unwrap_err().code(), code);
    }

    #[test]
    fn test_write_wallets_csv_sorted() {
        let now = Utc::now();
        let mut savings = Wallet::new(Uuid::from_u128(1), WalletType::Savings, now);
        savings.balance = Money::from_minor(700);
        let mut main = Wallet::new(Uuid::from_u128(1), WalletType::Main, now);
        main.balance = Money::from_minor(1_500);
        main.available_balance = Money::from_minor(1_500);

        let mut output = Vec::new();
        write_wallets_csv(&[savings, main], &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "user,wallet,balance,available_balance");
        assert_eq!(lines[1], format!("{},main,1500,1500", USER));
        assert_eq!(lines[2], format!("{},savings,700,0", USER));
    }
}
