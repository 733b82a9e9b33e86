//! Captured event types
//!
//! A `RawEvent` is what the platform capture layer hands to the pipeline: the
//! text of a notification, message or in-app signal, tagged with where it came
//! from. Each event is consumed exactly once by the extractor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Kind of capture that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Push notification
    #[serde(alias = "notification")]
    Notice,
    /// Intercepted text message
    Sms,
    /// Signal captured inside a payment app
    #[serde(alias = "data")]
    App,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Notice => "notice",
            EventType::Sms => "sms",
            EventType::App => "app",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "notice" | "notification" => Ok(EventType::Notice),
            "sms" => Ok(EventType::Sms),
            "app" | "data" => Ok(EventType::App),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// One captured event, as produced by the capture subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Application (package) that emitted the event
    pub source_app: String,

    pub event_type: EventType,

    /// Raw text handed to the rule scripts as `data`
    pub payload: String,

    /// When the event was captured
    pub captured_at: Timestamp,
}

impl RawEvent {
    pub fn new(
        source_app: impl Into<String>,
        event_type: EventType,
        payload: impl Into<String>,
        captured_at: Timestamp,
    ) -> Self {
        RawEvent {
            source_app: source_app.into(),
            event_type,
            payload: payload.into(),
            captured_at,
        }
    }
}
