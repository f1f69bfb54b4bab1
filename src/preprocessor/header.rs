use super::MessagePreprocessor;
use crate::config::{Context, DEFAULT_TOPIC, TOPIC};
use crate::event::Event;
use tracing::debug;

/// Routes events by header values.
///
/// The key comes from the header named by the `header.key` parameter
/// (default `key`). The topic comes from the header named by `header.topic`
/// (default `topic`), falling back to the static `topic` parameter and then
/// to the default topic. The body is passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderRoutingPreprocessor;

impl HeaderRoutingPreprocessor {
    pub const NAME: &'static str = "header-routing";
    pub const KEY_HEADER_PARAMETER: &'static str = "header.key";
    pub const TOPIC_HEADER_PARAMETER: &'static str = "header.topic";
}

impl MessagePreprocessor for HeaderRoutingPreprocessor {
    fn extract_key(&self, event: &Event, context: &Context) -> Option<String> {
        let header = context.get_string_or(Self::KEY_HEADER_PARAMETER, "key");
        let key = event.header(header).map(str::to_string);
        if key.is_none() {
            debug!(header, "Key header missing, using broker partitioning");
        }
        key
    }

    fn extract_topic(&self, event: &Event, context: &Context) -> String {
        let header = context.get_string_or(Self::TOPIC_HEADER_PARAMETER, "topic");
        event
            .header(header)
            .or_else(|| context.get_string(TOPIC))
            .unwrap_or(DEFAULT_TOPIC)
            .to_string()
    }

    fn transform_message(&self, event: &Event, _context: &Context) -> String {
        event.body_text()
    }
}
