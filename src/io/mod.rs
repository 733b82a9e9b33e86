//! I/O module
//!
//! Handles event CSV parsing, rule book loading and ledger output.
//!
//! # Components
//!
//! - `event_format` - CSV format handling (row conversion, ledger serialization)
//! - `sync_reader` - Synchronous event reader with iterator interface
//! - `async_reader` - Asynchronous event reader with batch reading interface
//! - `rules_file` - Rule book JSON loading

pub mod async_reader;
pub mod event_format;
pub mod rules_file;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use event_format::{convert_csv_event, write_ledger_csv, CsvEvent};
pub use rules_file::RuleBook;
pub use sync_reader::SyncReader;
