use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Context key holding the static topic.
pub const TOPIC: &str = "topic";
/// Context key holding the preprocessor registry name.
pub const PREPROCESSOR: &str = "preprocessor";
/// Prefix of context keys forwarded to the Kafka producer.
pub const PRODUCER_PROPERTY_PREFIX: &str = "kafka";
/// Topic used when neither a preprocessor nor a static topic is configured.
pub const DEFAULT_TOPIC: &str = "default-flume-topic";

/// Read-only key/value parameters shared by the sink and its preprocessor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    parameters: BTreeMap<String, String>,
}

impl Context {
    pub fn new(parameters: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            parameters: parameters.into_iter().collect(),
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn get_string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_string(key).unwrap_or(default)
    }

    /// Returns every parameter under `prefix.`, with the prefix removed and
    /// both key and value trimmed.
    pub fn sub_properties(&self, prefix: &str) -> BTreeMap<String, String> {
        let prefix = format!("{}.", prefix);
        self.parameters
            .iter()
            .filter_map(|(key, value)| {
                key.trim()
                    .strip_prefix(&prefix)
                    .map(|stripped| (stripped.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub sink: SinkConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SinkConfig {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub preprocessor: Option<String>,
    /// Producer properties passed through to the Kafka client.
    #[serde(default)]
    pub kafka: HashMap<String, String>,
    /// Extra parameters visible to preprocessors.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ::config::ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(
                ::config::Environment::with_prefix("KAFKA_SINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Flattens the `[sink]` section into the context handed to the sink.
    ///
    /// Producer properties land under `kafka.<name>`; `[sink.context]` entries
    /// keep their own names.
    pub fn context(&self) -> Context {
        let mut parameters: BTreeMap<String, String> = self
            .sink
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (name, value) in &self.sink.kafka {
            parameters.insert(
                format!("{}.{}", PRODUCER_PROPERTY_PREFIX, name),
                value.clone(),
            );
        }
        if let Some(topic) = &self.sink.topic {
            parameters.insert(TOPIC.to_string(), topic.clone());
        }
        if let Some(preprocessor) = &self.sink.preprocessor {
            parameters.insert(PREPROCESSOR.to_string(), preprocessor.clone());
        }

        Context { parameters }
    }
}

fn default_capacity() -> usize {
    10_000
}

fn default_backoff_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_properties_strip_prefix_and_trim() {
        let context: Context = [
            (" kafka.bootstrap.servers ", " localhost:9092 "),
            ("kafka.acks", "1"),
            ("kafkaesque", "no"),
            ("topic", "events"),
        ]
        .into_iter()
        .collect();

        let props = context.sub_properties(PRODUCER_PROPERTY_PREFIX);

        assert_eq!(props.len(), 2);
        assert_eq!(props["bootstrap.servers"], "localhost:9092");
        assert_eq!(props["acks"], "1");
    }

    #[test]
    fn test_get_string_or() {
        let context: Context = [("custom-topic", "clicks")].into_iter().collect();

        assert_eq!(context.get_string_or("custom-topic", "default-topic"), "clicks");
        assert_eq!(context.get_string_or("missing", "default-topic"), "default-topic");
        assert_eq!(context.get_string("missing"), None);
    }

    #[test]
    fn test_config_flattens_into_context() {
        let config = Config {
            sink: SinkConfig {
                topic: Some("events".to_string()),
                preprocessor: Some("timestamp-hour".to_string()),
                kafka: HashMap::from([("acks".to_string(), "all".to_string())]),
                context: HashMap::from([("custom-topic".to_string(), "clicks".to_string())]),
            },
            channel: ChannelConfig::default(),
            runner: RunnerConfig::default(),
        };

        let context = config.context();

        assert_eq!(context.get_string(TOPIC), Some("events"));
        assert_eq!(context.get_string(PREPROCESSOR), Some("timestamp-hour"));
        assert_eq!(context.get_string("kafka.acks"), Some("all"));
        assert_eq!(context.get_string("custom-topic"), Some("clicks"));
    }
}
