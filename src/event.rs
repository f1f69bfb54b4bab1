use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

/// Header carrying the event's creation time in epoch milliseconds.
pub const TIMESTAMP_HEADER: &str = "timestamp";

/// A unit of work taken from a channel: string headers plus an opaque body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl Event {
    pub fn new(headers: HashMap<String, String>, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    pub fn with_body(body: impl Into<Bytes>) -> Self {
        Self::new(HashMap::new(), body)
    }

    /// Adds a header, replacing any previous value under the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut headers: Vec<_> = self.headers.iter().collect();
        headers.sort();

        write!(f, "[Event headers = {{")?;
        for (i, (name, value)) in headers.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}, body.length = {} ]", self.body.len())
    }
}

/// The resolved (topic, key, body) triple handed to the publish client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    /// Partitioning key. `None` leaves partition choice to the broker.
    pub key: Option<String>,
    pub body: String,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, key: Option<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key,
            body: body.into(),
        }
    }
}
