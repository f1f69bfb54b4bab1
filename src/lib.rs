pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod preprocessor;
pub mod runner;
pub mod sink;

pub mod kafka;

pub use crate::config::{Config, Context};
pub use error::{Error, Result};
pub use event::{Event, OutboundMessage};
pub use runner::SinkRunner;
pub use sink::{CycleStatus, KafkaSink};
