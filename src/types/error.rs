//! Error types for the capture ledger pipeline
//!
//! This module defines all error types that can occur while turning captured
//! events into ledger entries.
//!
//! # Error Categories
//!
//! - **File I/O Errors**: event or rule book files missing, unreadable, etc.
//! - **Parsing Errors**: malformed CSV rows, malformed rule books, bad events
//! - **Store Errors**: failures reported by the ledger store during a commit
//! - **Queue Errors**: closed, cancelled, timed out or panicked commits
//!
//! Rule and classifier failures never surface here as hard errors: they are
//! logged and the pipeline moves on to the next rule or fallback stage.

use thiserror::Error;

/// Main error type for the capture pipeline
///
/// Each variant carries enough context to be printed directly by the CLI.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// File not found at the specified path
    ///
    /// This is a fatal error that prevents processing from starting.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    ///
    /// This is a recoverable error - the malformed event is skipped.
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// A captured event could not be converted into a `RawEvent`
    #[error("Invalid event: {message}")]
    InvalidEvent {
        /// Description of what was wrong with the event
        message: String,
    },

    /// The rule book could not be loaded
    #[error("Invalid rule book: {message}")]
    RuleBook {
        /// Description of the rule book problem
        message: String,
    },

    /// The ledger store rejected an operation
    ///
    /// The commit did not happen; retrying is the caller's responsibility.
    #[error("Store {operation} failed: {message}")]
    Store {
        /// Store operation that failed (insert, update, query...)
        operation: String,
        /// Message reported by the store
        message: String,
    },

    /// A group id was returned by a window query but its head row is gone
    #[error("Group head {group_id} not found")]
    GroupHeadMissing {
        /// The dangling group id
        group_id: i64,
    },

    /// The commit worker is no longer accepting tasks
    #[error("Commit queue is closed")]
    QueueClosed,

    /// The submitting caller withdrew the task before it ran
    #[error("Commit was cancelled before it started")]
    CommitCancelled,

    /// The caller stopped waiting for a commit result
    #[error("Commit did not complete within {timeout_ms} ms")]
    CommitTimeout {
        /// The timeout that elapsed
        timeout_ms: u64,
    },

    /// Rule evaluation for one event did not finish in time
    #[error("Extraction did not complete within {timeout_ms} ms")]
    ExtractionTimeout {
        /// The timeout that elapsed
        timeout_ms: u64,
    },

    /// A commit panicked inside the worker; the worker keeps running
    #[error("Commit worker panicked: {message}")]
    WorkerPanicked {
        /// Panic payload, when it was a string
        message: String,
    },

    /// The same payload was captured again inside the trigger window
    #[error("Repeated trigger from {source_app} ignored")]
    DuplicateTrigger {
        /// Application that fired the repeated event
        source_app: String,
    },

    /// The external classifier failed
    ///
    /// Only ever logged by the resolver, never propagated out of a commit.
    #[error("Classifier error: {message}")]
    Classifier {
        /// Description of the classifier failure
        message: String,
    },
}

// Conversion from io::Error to PipelineError
impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to PipelineError
impl From<csv::Error> for PipelineError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        PipelineError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<csv_async::Error> for PipelineError {
    fn from(error: csv_async::Error) -> Self {
        // csv-async already embeds the position in its message
        PipelineError::ParseError {
            line: None,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::RuleBook {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl PipelineError {
    /// Create a Store error
    pub fn store(operation: &str, message: impl Into<String>) -> Self {
        PipelineError::Store {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create an InvalidEvent error
    pub fn invalid_event(message: impl Into<String>) -> Self {
        PipelineError::InvalidEvent {
            message: message.into(),
        }
    }

    /// Create a RuleBook error
    pub fn rule_book(message: impl Into<String>) -> Self {
        PipelineError::RuleBook {
            message: message.into(),
        }
    }

    /// Create a GroupHeadMissing error
    pub fn group_head_missing(group_id: i64) -> Self {
        PipelineError::GroupHeadMissing { group_id }
    }

    /// Create a CommitTimeout error
    pub fn commit_timeout(timeout_ms: u64) -> Self {
        PipelineError::CommitTimeout { timeout_ms }
    }

    /// Create an ExtractionTimeout error
    pub fn extraction_timeout(timeout_ms: u64) -> Self {
        PipelineError::ExtractionTimeout { timeout_ms }
    }

    /// Create a WorkerPanicked error
    pub fn worker_panicked(message: impl Into<String>) -> Self {
        PipelineError::WorkerPanicked {
            message: message.into(),
        }
    }

    /// Create a DuplicateTrigger error
    pub fn duplicate_trigger(source_app: &str) -> Self {
        PipelineError::DuplicateTrigger {
            source_app: source_app.to_string(),
        }
    }

    /// Create a Classifier error
    pub fn classifier(message: impl Into<String>) -> Self {
        PipelineError::Classifier {
            message: message.into(),
        }
    }

    /// Whether the error only concerns a single event
    ///
    /// Strategies log recoverable errors and continue with the next event;
    /// anything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::FileNotFound { .. }
                | PipelineError::IoError { .. }
                | PipelineError::RuleBook { .. }
                | PipelineError::QueueClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::file_not_found(
        PipelineError::FileNotFound { path: "events.csv".to_string() },
        "File not found: events.csv"
    )]
    #[case::parse_error_with_line(
        PipelineError::ParseError { line: Some(7), message: "unequal lengths".to_string() },
        "CSV parse error at line 7: unequal lengths"
    )]
    #[case::parse_error_without_line(
        PipelineError::ParseError { line: None, message: "unequal lengths".to_string() },
        "CSV parse error: unequal lengths"
    )]
    #[case::store(
        PipelineError::store("insert", "disk full"),
        "Store insert failed: disk full"
    )]
    #[case::group_head_missing(
        PipelineError::group_head_missing(42),
        "Group head 42 not found"
    )]
    #[case::queue_closed(PipelineError::QueueClosed, "Commit queue is closed")]
    #[case::commit_timeout(
        PipelineError::commit_timeout(250),
        "Commit did not complete within 250 ms"
    )]
    #[case::duplicate_trigger(
        PipelineError::duplicate_trigger("com.tencent.mm"),
        "Repeated trigger from com.tencent.mm ignored"
    )]
    fn test_error_display(#[case] error: PipelineError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::parse(PipelineError::ParseError { line: None, message: String::new() }, true)]
    #[case::duplicate(PipelineError::duplicate_trigger("app"), true)]
    #[case::store(PipelineError::store("update", "locked"), true)]
    #[case::queue_closed(PipelineError::QueueClosed, false)]
    #[case::missing_file(PipelineError::FileNotFound { path: "x".to_string() }, false)]
    fn test_recoverable_split(#[case] error: PipelineError, #[case] recoverable: bool) {
        assert_eq!(error.is_recoverable(), recoverable);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: PipelineError = io_error.into();
        assert!(matches!(error, PipelineError::IoError { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }

    #[test]
    fn test_json_error_becomes_rule_book_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: PipelineError = json_error.into();
        assert!(matches!(error, PipelineError::RuleBook { .. }));
    }
}
