//! Pluggable per-event key, topic and body derivation.
//!
//! A sink either has exactly one [`MessagePreprocessor`] or none at all. With
//! a preprocessor, all three of key, topic and body come from it. Without one,
//! the sink publishes the raw body to its static topic with no key.
//!
//! Implementations are looked up by name through a [`PreprocessorRegistry`]
//! when the sink is configured:
//!
//! ```rust
//! use kafka_sink::preprocessor::{MessagePreprocessor, PreprocessorRegistry};
//! use kafka_sink::{Context, Event};
//!
//! struct Upper;
//!
//! impl MessagePreprocessor for Upper {
//!     fn extract_key(&self, _event: &Event, _context: &Context) -> Option<String> {
//!         None
//!     }
//!
//!     fn extract_topic(&self, _event: &Event, context: &Context) -> String {
//!         context.get_string_or("topic", "upper").to_string()
//!     }
//!
//!     fn transform_message(&self, event: &Event, _context: &Context) -> String {
//!         event.body_text().to_uppercase()
//!     }
//! }
//!
//! let mut registry = PreprocessorRegistry::with_builtins();
//! registry.register("upper", || Box::new(Upper));
//! assert!(registry.resolve("upper").is_ok());
//! ```

mod header;
mod timestamp;

pub use header::HeaderRoutingPreprocessor;
pub use timestamp::TimestampHourPreprocessor;

use crate::config::Context;
use crate::event::Event;
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Derives the key, topic and body of the message published for an event.
///
/// The three methods are independent. The sink may call them in any order,
/// and each must return the same result for the same inputs.
pub trait MessagePreprocessor: Send + Sync {
    /// Partitioning key for the event. `None` lets the broker pick a partition.
    fn extract_key(&self, event: &Event, context: &Context) -> Option<String>;

    /// Destination topic. An empty string is passed to the broker as is.
    fn extract_topic(&self, event: &Event, context: &Context) -> String;

    /// Message body to publish, e.g. the raw body augmented with header data.
    fn transform_message(&self, event: &Event, context: &Context) -> String;
}

/// Constructor registered under a preprocessor name.
pub type PreprocessorFactory = fn() -> Box<dyn MessagePreprocessor>;

/// Maps configuration names to preprocessor constructors.
#[derive(Debug, Clone, Default)]
pub struct PreprocessorRegistry {
    factories: BTreeMap<String, PreprocessorFactory>,
}

impl PreprocessorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the preprocessors shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(TimestampHourPreprocessor::NAME, || {
            Box::new(TimestampHourPreprocessor)
        });
        registry.register(HeaderRoutingPreprocessor::NAME, || {
            Box::new(HeaderRoutingPreprocessor)
        });
        registry
    }

    /// Registers `factory` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, factory: PreprocessorFactory) {
        let name = name.into();
        debug!(preprocessor = %name, "Registering message preprocessor");
        self.factories.insert(name, factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiates the preprocessor registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if nothing is registered under the trimmed name.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn MessagePreprocessor>> {
        let name = name.trim();
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => {
                let known: Vec<_> = self.names().collect();
                error!(preprocessor = %name, ?known, "Unknown message preprocessor");
                Err(Error::Config(format!(
                    "unknown message preprocessor '{}' (registered: {})",
                    name,
                    known.join(", ")
                )))
            }
        }
    }
}
