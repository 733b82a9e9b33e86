//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over captured events from a CSV file.
//! Delegates CSV format concerns to the event_format module.
//!
//! # Iterator Interface
//!
//! SyncReader implements the Iterator trait, yielding
//! `Result<RawEvent, PipelineError>` for each CSV row:
//!
//! ```no_run
//! use capture_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("events.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(event) => println!("captured from {}", event.source_app),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found) are returned from `new()`
//! - Individual row errors are yielded as `ParseError` with the line number
//!
//! The reader streams rows one at a time; memory use does not grow with the
//! file size.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::io::event_format::{convert_csv_event, CsvEvent};
use crate::types::{PipelineError, RawEvent};

/// Synchronous CSV event reader
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl SyncReader {
    /// Open an events CSV for streaming iteration
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if the file opened successfully
    /// * `Err(PipelineError::FileNotFound)` if it does not exist
    /// * `Err(PipelineError::IoError)` for any other open failure
    pub fn new(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => PipelineError::from(e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<RawEvent, PipelineError>;

    /// Read, deserialize and convert the next row
    fn next(&mut self) -> Option<Self::Item> {
        let mut rows = self.reader.deserialize::<CsvEvent>();
        let row = rows.next()?;
        self.line_num += 1;

        let line = Some(self.line_num);
        Some(
            row.map_err(PipelineError::from)
                .and_then(convert_csv_event)
                .map_err(|e| match e {
                    PipelineError::ParseError { message, .. } => {
                        PipelineError::ParseError { line, message }
                    }
                    other => PipelineError::ParseError {
                        line,
                        message: other.to_string(),
                    },
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));
        assert!(matches!(result, Err(PipelineError::FileNotFound { .. })));
    }

    #[test]
    fn test_sync_reader_iterates_events() {
        let file = create_temp_csv(
            "source_app,event_type,captured_at,payload\n\
             pay,notice,1000,paid 5 to Bob\n\
             bank,sms,2000,\"Card 1234: -12.00, Cafe\"\n",
        );

        let events: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &RawEvent::new("pay", EventType::Notice, "paid 5 to Bob", 1000)
        );
        let second = events[1].as_ref().unwrap();
        assert_eq!(second.event_type, EventType::Sms);
        assert_eq!(second.payload, "Card 1234: -12.00, Cafe");
    }

    #[test]
    fn test_sync_reader_reports_line_numbers_and_continues() {
        let file = create_temp_csv(
            "source_app,event_type,captured_at,payload\n\
             pay,notice,1000,ok\n\
             pay,carrier-pigeon,2000,bad type\n\
             pay,notice,not-a-time,bad time\n\
             pay,notice,3000,ok again\n",
        );

        let events: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(events.len(), 4);
        assert!(events[0].is_ok());
        assert!(matches!(
            events[1],
            Err(PipelineError::ParseError { line: Some(3), .. })
        ));
        assert!(matches!(
            events[2],
            Err(PipelineError::ParseError { line: Some(4), .. })
        ));
        assert!(events[3].is_ok());
    }

    #[test]
    fn test_sync_reader_empty_file_after_header() {
        let file = create_temp_csv("source_app,event_type,captured_at,payload\n");
        assert_eq!(SyncReader::new(file.path()).unwrap().count(), 0);
    }
}
