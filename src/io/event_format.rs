//! CSV format handling for captured events and ledger output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvEvent structure for deserialization
//! - Conversion from CSV rows to RawEvents
//! - Ledger output serialization
//!
//! All functions are pure (no file I/O) for easy testing.

use std::io::Write;

use serde::Deserialize;

use crate::types::{EventType, PipelineError, RawEvent, Transaction};

/// Ledger output columns, in order
pub const LEDGER_HEADER: [&str; 11] = [
    "id",
    "amount",
    "direction",
    "channel",
    "timestamp",
    "counterparty_from",
    "counterparty_to",
    "memo",
    "item_detail",
    "category",
    "group_id",
];

/// CSV row structure for deserialization
///
/// Matches the input CSV format with columns: source_app, event_type,
/// captured_at, payload
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvEvent {
    pub source_app: String,
    pub event_type: String,
    pub captured_at: i64,
    #[serde(default)]
    pub payload: String,
}

/// Convert a CsvEvent to a RawEvent
///
/// # Arguments
///
/// * `row` - The deserialized CSV row
///
/// # Returns
///
/// * `Ok(RawEvent)` - Successfully converted event
/// * `Err(PipelineError::InvalidEvent)` - Empty source app or unknown event type
pub fn convert_csv_event(row: CsvEvent) -> Result<RawEvent, PipelineError> {
    if row.source_app.trim().is_empty() {
        return Err(PipelineError::invalid_event(format!(
            "event captured at {} has no source app",
            row.captured_at
        )));
    }

    let event_type: EventType = row
        .event_type
        .parse()
        .map_err(|e: String| PipelineError::invalid_event(e))?;

    Ok(RawEvent::new(
        row.source_app.trim(),
        event_type,
        row.payload,
        row.captured_at,
    ))
}

/// Write ledger rows to CSV
///
/// Rows are sorted by id for deterministic output; amounts are written with
/// two decimal places.
///
/// # Arguments
///
/// * `rows` - Ledger rows to write
/// * `output` - Writer receiving the CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(PipelineError)` if a write error occurred
pub fn write_ledger_csv(rows: &[Transaction], output: &mut dyn Write) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(LEDGER_HEADER)?;

    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|row| row.id);

    for row in sorted {
        writer.write_record(&[
            row.id.to_string(),
            format!("{:.2}", row.amount.round_dp(2)),
            row.direction.to_string(),
            row.channel,
            row.timestamp.to_string(),
            row.counterparty_from,
            row.counterparty_to,
            row.memo,
            row.item_detail,
            row.category,
            row.group_id.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn csv_event(source_app: &str, event_type: &str) -> CsvEvent {
        CsvEvent {
            source_app: source_app.to_string(),
            event_type: event_type.to_string(),
            captured_at: 42,
            payload: "paid 5".to_string(),
        }
    }

    #[test]
    fn test_convert_valid_event() {
        let event = convert_csv_event(csv_event("pay", "notification")).unwrap();
        assert_eq!(event, RawEvent::new("pay", EventType::Notice, "paid 5", 42));
    }

    #[rstest]
    #[case::unknown_type(csv_event("pay", "email"))]
    #[case::blank_app(csv_event("  ", "sms"))]
    fn test_convert_rejects_invalid_event(#[case] row: CsvEvent) {
        assert!(matches!(
            convert_csv_event(row),
            Err(PipelineError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn test_write_ledger_sorted_with_two_decimals() {
        let mut second = Transaction::new(Decimal::new(5, 0), Direction::Income, "bank", 20);
        second.id = 2;
        second.group_id = 2;
        let mut first = Transaction::new(Decimal::new(123, 1), Direction::Expense, "pay", 10);
        first.id = 1;
        first.group_id = 1;
        first.memo = "a, b".to_string();
        first.category = "Food".to_string();

        let mut output = Vec::new();
        write_ledger_csv(&[second, first], &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "id,amount,direction,channel,timestamp,counterparty_from,counterparty_to,memo,item_detail,category,group_id",
                "1,12.30,expense,pay,10,,,\"a, b\",,Food,1",
                "2,5.00,income,bank,20,,,,,,2",
            ]
        );
    }
}
