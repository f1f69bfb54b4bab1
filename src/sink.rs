//! The transactional publish cycle.
//!
//! [`KafkaSink::run_once`] performs one take-transform-publish traversal:
//!
//! 1. begin a channel transaction
//! 2. take at most one event (none means [`CycleStatus::Backoff`])
//! 3. resolve topic, key and body, through the preprocessor if one is configured
//! 4. publish, then commit on success or roll back on failure
//! 5. release the transaction, whatever happened above
//!
//! Nothing is retried inside a cycle. A failed publish rolls the event back
//! into the channel and surfaces an [`Error::Delivery`]; the next call will
//! take the same event again.

use crate::channel::{Channel, Transaction};
use crate::config::{Context, DEFAULT_TOPIC, PREPROCESSOR, TOPIC};
use crate::error::DeliveryCause;
use crate::event::{Event, OutboundMessage};
use crate::kafka::PublishClient;
use crate::preprocessor::{MessagePreprocessor, PreprocessorRegistry};
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Outcome of a successful [`KafkaSink::run_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// An event was published and committed.
    Ready,
    /// The channel was empty; the caller should pause before the next call.
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Started,
    Stopped,
}

/// How the outbound message is derived from an event.
enum Routing {
    Preprocessor(Box<dyn MessagePreprocessor>),
    /// Raw body, no key, fixed topic.
    Static { topic: String },
}

/// Drains a [`Channel`] into a [`PublishClient`], one event per cycle.
pub struct KafkaSink {
    name: String,
    channel: Arc<dyn Channel>,
    client: Arc<dyn PublishClient>,
    context: Arc<Context>,
    routing: Routing,
    lifecycle: RwLock<Lifecycle>,
}

impl KafkaSink {
    /// Builds a sink from its context.
    ///
    /// When the `preprocessor` parameter is set it is resolved through
    /// `registry` and the static `topic` parameter is ignored. Otherwise the
    /// static topic is read once here, falling back to [`DEFAULT_TOPIC`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the preprocessor name is not registered.
    pub fn configure(
        context: Context,
        registry: &PreprocessorRegistry,
        channel: Arc<dyn Channel>,
        client: Arc<dyn PublishClient>,
    ) -> Result<Self> {
        let routing = match context.get_string(PREPROCESSOR) {
            Some(name) => {
                let preprocessor = registry.resolve(name)?;
                info!(preprocessor = %name.trim(), "Using message preprocessor");
                Routing::Preprocessor(preprocessor)
            }
            None => {
                let topic = context.get_string_or(TOPIC, DEFAULT_TOPIC).to_string();
                if topic == DEFAULT_TOPIC {
                    warn!(
                        "The properties '{}' or '{}' are not set. Using the default topic name {}",
                        PREPROCESSOR, TOPIC, DEFAULT_TOPIC
                    );
                } else {
                    info!(topic = %topic, "Using the static topic");
                }
                Routing::Static { topic }
            }
        };

        Ok(Self {
            name: "kafka-sink".to_string(),
            channel,
            client,
            context: Arc::new(context),
            routing,
            lifecycle: RwLock::new(Lifecycle::Idle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The topic used for every event, or `None` when a preprocessor decides.
    pub fn static_topic(&self) -> Option<&str> {
        match &self.routing {
            Routing::Static { topic } => Some(topic.as_str()),
            Routing::Preprocessor(_) => None,
        }
    }

    pub fn has_preprocessor(&self) -> bool {
        matches!(self.routing, Routing::Preprocessor(_))
    }

    pub fn is_started(&self) -> bool {
        *self.lifecycle.read().unwrap_or_else(PoisonError::into_inner) == Lifecycle::Started
    }

    /// Starts the publish client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if the sink is running, or
    /// [`Error::ResourceAcquisition`] if the client fails to start.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        if *lifecycle == Lifecycle::Started {
            error!(sink = %self.name, "Sink started twice");
            return Err(Error::AlreadyStarted);
        }

        self.client
            .start()
            .map_err(|e| Error::acquisition("publish client", e))?;
        *lifecycle = Lifecycle::Started;
        info!(sink = %self.name, "Sink started");
        Ok(())
    }

    /// Stops the publish client. Stopping a sink that is not running does nothing.
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        if *lifecycle != Lifecycle::Started {
            debug!(sink = %self.name, "Sink not running, nothing to stop");
            return Ok(());
        }

        *lifecycle = Lifecycle::Stopped;
        self.client.stop().map_err(Error::Shutdown)?;
        info!(sink = %self.name, "Sink stopped");
        Ok(())
    }

    /// Runs one transactional cycle.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] if called outside `start`/`stop`.
    /// - [`Error::ResourceAcquisition`] if no transaction could be begun.
    /// - [`Error::Delivery`] if the event could not be published or committed.
    ///   The transaction has been rolled back.
    #[instrument(skip(self), fields(sink = %self.name))]
    pub fn run_once(&self) -> Result<CycleStatus> {
        let lifecycle = self.lifecycle.read().unwrap_or_else(PoisonError::into_inner);
        if *lifecycle != Lifecycle::Started {
            return Err(Error::NotStarted);
        }

        let tx = self
            .channel
            .transaction()
            .map_err(|e| Error::acquisition("transaction", e))?;
        let mut tx = ReleaseOnDrop(tx);
        tx.0.begin()
            .map_err(|e| Error::acquisition("transaction", e))?;

        self.drive(tx.0.as_mut())
    }

    /// Derives the outbound message for `event`.
    pub fn resolve(&self, event: &Event) -> OutboundMessage {
        match &self.routing {
            Routing::Preprocessor(preprocessor) => {
                let body = preprocessor.transform_message(event, &self.context);
                let topic = preprocessor.extract_topic(event, &self.context);
                let key = preprocessor.extract_key(event, &self.context);
                OutboundMessage { topic, key, body }
            }
            Routing::Static { topic } => OutboundMessage::new(topic.clone(), None, event.body_text()),
        }
    }

    fn drive(&self, tx: &mut dyn Transaction) -> Result<CycleStatus> {
        let event = match tx.take() {
            Ok(Some(event)) => event,
            Ok(None) => {
                if let Err(e) = tx.rollback() {
                    warn!(error = %e, "Failed to roll back empty transaction");
                }
                return Ok(CycleStatus::Backoff);
            }
            Err(e) => return Err(self.abort(tx, None, e.into())),
        };

        let message = self.resolve(&event);
        debug!(
            topic = %message.topic,
            key = ?message.key,
            body = %message.body,
            "{{Event}}"
        );

        if let Err(e) = self.client.send(&message) {
            return Err(self.abort(tx, Some(event), e.into()));
        }
        if let Err(e) = tx.commit() {
            return Err(self.abort(tx, Some(event), e.into()));
        }

        Ok(CycleStatus::Ready)
    }

    fn abort(&self, tx: &mut dyn Transaction, event: Option<Event>, cause: DeliveryCause) -> Error {
        if let Err(e) = tx.rollback() {
            warn!(error = %e, "Failed to roll back transaction");
        }

        let err = Error::Delivery { event, source: cause };
        error!(error = %err, "Delivery failed, transaction rolled back");
        err
    }
}

impl fmt::Debug for KafkaSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaSink")
            .field("name", &self.name)
            .field("static_topic", &self.static_topic())
            .field("has_preprocessor", &self.has_preprocessor())
            .finish_non_exhaustive()
    }
}

/// Releases the wrapped transaction when the cycle ends, on every path.
struct ReleaseOnDrop<'a>(Box<dyn Transaction + 'a>);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.release() {
            warn!(error = %e, "Failed to release transaction");
        }
    }
}
