use super::PublishClient;
use crate::config::{Context, PRODUCER_PROPERTY_PREFIX};
use crate::error::TransportError;
use crate::event::OutboundMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// [`PublishClient`] backed by an rdkafka [`FutureProducer`].
///
/// The producer is created on `start` from the pass-through properties and
/// flushed and dropped on `stop`.
pub struct KafkaPublishClient {
    properties: BTreeMap<String, String>,
    producer: RwLock<Option<FutureProducer>>,
    flush_timeout: Duration,
}

impl KafkaPublishClient {
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self {
            properties,
            producer: RwLock::new(None),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Builds a client from the `kafka.`-prefixed parameters of `context`.
    pub fn from_context(context: &Context) -> Self {
        let properties = context.sub_properties(PRODUCER_PROPERTY_PREFIX);
        for (key, value) in &properties {
            debug!(key = %key, value = %value, "Reading a Kafka producer property");
        }
        Self::new(properties)
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config
    }

    fn current_producer(&self) -> Result<FutureProducer, TransportError> {
        let guard = self
            .producer
            .read()
            .map_err(|_| TransportError::Rejected("producer lock poisoned".to_string()))?;
        guard.clone().ok_or(TransportError::NotStarted)
    }
}

impl PublishClient for KafkaPublishClient {
    fn start(&self) -> Result<(), TransportError> {
        let mut guard = self
            .producer
            .write()
            .map_err(|_| TransportError::Rejected("producer lock poisoned".to_string()))?;
        if guard.is_some() {
            debug!("Kafka producer already running");
            return Ok(());
        }

        let producer: FutureProducer = self.client_config().create()?;
        info!(properties = self.properties.len(), "Kafka producer created");
        *guard = Some(producer);
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        let producer = self
            .producer
            .write()
            .map_err(|_| TransportError::Rejected("producer lock poisoned".to_string()))?
            .take();

        if let Some(producer) = producer {
            if let Err(e) = producer.flush(Timeout::After(self.flush_timeout)) {
                warn!(error = %e, "Failed to flush Kafka producer");
                return Err(e.into());
            }
            info!("Kafka producer flushed and closed");
        }
        Ok(())
    }

    #[instrument(skip(self, message), fields(topic = %message.topic))]
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let producer = self.current_producer()?;

        let mut record = FutureRecord::<str, str>::to(&message.topic).payload(&message.body);
        if let Some(key) = &message.key {
            record = record.key(key.as_str());
        }

        let delivery = producer
            .send_result(record)
            .map_err(|(e, _)| TransportError::Kafka(e))?;

        let (partition, offset) = futures::executor::block_on(delivery)
            .map_err(|_| TransportError::Canceled)?
            .map_err(|(e, _)| TransportError::Kafka(e))?;

        debug!(partition, offset, "Message delivered");
        Ok(())
    }
}
