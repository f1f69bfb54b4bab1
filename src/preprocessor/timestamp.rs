use super::MessagePreprocessor;
use crate::config::Context;
use crate::event::{Event, TIMESTAMP_HEADER};
use chrono::{DateTime, Timelike};
use tracing::debug;

/// Partitions events by the UTC hour of their `timestamp` header and prefixes
/// the body with the raw timestamp.
///
/// The topic is read from the `custom-topic` context parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampHourPreprocessor;

impl TimestampHourPreprocessor {
    pub const NAME: &'static str = "timestamp-hour";
    pub const TOPIC_PARAMETER: &'static str = "custom-topic";
    pub const DEFAULT_TOPIC: &'static str = "default-topic";
}

impl MessagePreprocessor for TimestampHourPreprocessor {
    fn extract_key(&self, event: &Event, _context: &Context) -> Option<String> {
        let raw = event.header(TIMESTAMP_HEADER)?;
        let millis = match raw.trim().parse::<i64>() {
            Ok(millis) => millis,
            Err(e) => {
                debug!(timestamp = %raw, error = %e, "Unparseable timestamp header");
                return None;
            }
        };

        DateTime::from_timestamp_millis(millis).map(|ts| ts.hour().to_string())
    }

    fn extract_topic(&self, _event: &Event, context: &Context) -> String {
        context
            .get_string_or(Self::TOPIC_PARAMETER, Self::DEFAULT_TOPIC)
            .to_string()
    }

    fn transform_message(&self, event: &Event, _context: &Context) -> String {
        let body = event.body_text();
        match event.header(TIMESTAMP_HEADER) {
            Some(timestamp) => format!("{}: {}", timestamp, body),
            None => body,
        }
    }
}
