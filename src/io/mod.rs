//! I/O module
//!
//! Handles journal CSV parsing and wallet CSV output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `async_reader` - Asynchronous journal reader with batch reading interface
//! - `replay` - Concurrent journal replay against a wallet ledger

pub mod async_reader;
pub mod csv_format;
pub mod replay;

pub use async_reader::JournalReader;
pub use csv_format::{convert_journal_record, write_wallets_csv, JournalEntry, JournalOp, JournalRecord};
pub use replay::{replay_journal, ReplayConfig, ReplaySummary};
