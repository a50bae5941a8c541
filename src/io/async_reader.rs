//! Asynchronous journal reader
//!
//! Streams journal lines from a CSV source in batches, keeping memory
//! constant regardless of journal size.
//!
//! ```text
//! CSV source → JournalReader → Batches of JournalEntry
//!                   ↓
//!            csv_format module
//!   (JournalRecord, convert_journal_record)
//! ```

use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

use crate::io::csv_format::{convert_journal_record, JournalEntry, JournalRecord};

/// Batch reader over journal entries
pub struct JournalReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    rejected: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> JournalReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = csv_async::AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader, rejected: 0 }
    }

    /// Read up to `batch_size` entries
    ///
    /// Unparseable lines are logged, counted and skipped. Returns an empty
    /// vector at end of input.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<JournalEntry> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut rejected = 0;
        {
            let mut records = self.csv_reader.deserialize::<JournalRecord>();
            while batch.len() < batch_size {
                match records.next().await {
                    Some(Ok(record)) => match convert_journal_record(record) {
                        Ok(entry) => batch.push(entry),
                        Err(e) => {
                            rejected += 1;
                            warn!(error = %e, "journal line rejected");
                        }
                    },
                    Some(Err(e)) => {
                        rejected += 1;
                        warn!(error = %e, "journal line unreadable");
                    }
                    None => break,
                }
            }
        }
        self.rejected += rejected;
        batch
    }

    /// Lines skipped so far
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}
