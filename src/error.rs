//! Error types and result handling for kafka-sink.
//!
//! This module defines the main error type [`Error`], the collaborator errors
//! [`ChannelError`] and [`TransportError`], and a convenience [`Result`] type
//! alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use kafka_sink::{Error, Result};
//!
//! fn load_preprocessor(name: &str) -> Result<()> {
//!     Err(Error::Config(format!("unknown preprocessor '{}'", name)))
//! }
//!
//! match load_preprocessor("missing") {
//!     Ok(()) => println!("Loaded"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use crate::channel::TransactionState;
use crate::event::Event;
use thiserror::Error;

/// The main error type for kafka-sink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, reported before any cycle runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A transaction or the publish client could not be acquired.
    ///
    /// This is fatal for the sink instance and is never retried locally.
    #[error("Failed to acquire {resource}: {source}")]
    ResourceAcquisition {
        /// What was being acquired
        resource: &'static str,
        /// Underlying failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An event could not be delivered to the broker.
    ///
    /// The transaction has already been rolled back when this is returned,
    /// so the channel will hand the same event out again on a later take.
    #[error("Failed to publish event: {}", describe_event(.event))]
    Delivery {
        /// The event that was taken in this cycle, if any
        event: Option<Event>,
        /// Why delivery failed
        #[source]
        source: DeliveryCause,
    },

    /// `start` was called on a sink that is already running.
    #[error("Sink is already started")]
    AlreadyStarted,

    /// `run_once` was called before `start` or after `stop`.
    #[error("Sink is not started")]
    NotStarted,

    /// The publish client failed to flush or close while stopping.
    #[error("Shutdown error: {0}")]
    Shutdown(#[source] TransportError),

    /// Channel error outside a publish cycle, e.g. while putting events.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A blocking cycle task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O error, typically from reading the event input.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn acquisition<E>(resource: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::ResourceAcquisition {
            resource,
            source: Box::new(source),
        }
    }

    /// Returns `true` for errors the caller should log and retry on the next call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Delivery { .. })
    }
}

fn describe_event(event: &Option<Event>) -> String {
    match event {
        Some(event) => event.to_string(),
        None => "<no event taken>".to_string(),
    }
}

/// The reason a cycle failed after a transaction was begun.
#[derive(Error, Debug)]
pub enum DeliveryCause {
    /// The publish client rejected the message or could not reach the broker.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The channel failed while taking or committing.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors raised by a channel or one of its transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is at capacity.
    #[error("Channel is full (capacity {capacity})")]
    Full {
        /// Configured capacity of the channel
        capacity: usize,
    },

    /// A transaction operation was called in the wrong state.
    #[error("Cannot {operation} a transaction in state {state:?}")]
    InvalidState {
        /// The operation that was attempted
        operation: &'static str,
        /// The state the transaction was in
        state: TransactionState,
    },

    /// The channel's internal lock was poisoned by a panicking thread.
    #[error("Channel lock poisoned")]
    Poisoned,
}

/// Errors raised by a [`PublishClient`](crate::kafka::PublishClient).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The delivery report was dropped before the broker answered.
    #[error("Delivery report canceled")]
    Canceled,

    /// `send` was called on a client that has not been started.
    #[error("Publish client is not started")]
    NotStarted,

    /// The message was refused for a client-specific reason.
    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// A convenient Result type alias for kafka-sink operations.
///
/// This is equivalent to `std::result::Result<T, kafka_sink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
