//! Asynchronous CSV reader with batch interface
//!
//! Provides a streaming interface over captured events from a CSV file,
//! read in batches for the async strategy.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - tokio (through the compat layer) for the file handle
//! - Batch reading so extraction can fan out over a bounded set of events
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of RawEvents
//!                  ↓
//!           event_format module
//!           (CsvEvent, convert_csv_event)
//! ```

use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

use crate::io::event_format::{convert_csv_event, CsvEvent};
use crate::types::{PipelineError, RawEvent};

/// Asynchronous CSV event reader
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader from an async reader
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read a batch of events
    ///
    /// Reads up to `batch_size` rows. Rows that fail to parse or convert are
    /// logged and skipped.
    ///
    /// # Returns
    ///
    /// The converted events in file order; empty at end of file.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<RawEvent> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut rows = self.csv_reader.deserialize::<CsvEvent>();

        while batch.len() < batch_size {
            match rows.next().await {
                Some(Ok(row)) => match convert_csv_event(row) {
                    Ok(event) => batch.push(event),
                    Err(e) => warn!(error = %e, "skipping event"),
                },
                Some(Err(e)) => warn!(error = %PipelineError::from(e), "skipping event"),
                None => break,
            }
        }

        batch
    }
}
