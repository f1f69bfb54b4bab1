#![allow(dead_code)]

use kafka_sink::channel::{Channel, MemoryChannel, Transaction, TransactionState};
use kafka_sink::error::{ChannelError, TransportError};
use kafka_sink::kafka::PublishClient;
use kafka_sink::preprocessor::{MessagePreprocessor, PreprocessorRegistry};
use kafka_sink::{Context, Event, KafkaSink, OutboundMessage};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};

/// Publish client that records every message and can be told to fail.
#[derive(Default)]
pub struct RecordingClient {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub fail_sends: AtomicBool,
    pub reject_when_stopped: AtomicBool,
    pub fail_stop: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl RecordingClient {
    pub fn failing() -> Self {
        let client = Self::default();
        client.fail_sends.store(true, Ordering::SeqCst);
        client
    }

    /// A client that refuses sends unless more starts than stops have been seen.
    pub fn closing_on_stop() -> Self {
        let client = Self::default();
        client.reject_when_stopped.store(true, Ordering::SeqCst);
        client
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl PublishClient for RecordingClient {
    fn start(&self) -> Result<(), TransportError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("flush timed out".to_string()));
        }
        Ok(())
    }

    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        if self.reject_when_stopped.load(Ordering::SeqCst)
            && self.stops.load(Ordering::SeqCst) >= self.starts.load(Ordering::SeqCst)
        {
            return Err(TransportError::NotStarted);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("broker unavailable".to_string()));
        }
        if message.topic.is_empty() {
            return Err(TransportError::Rejected("invalid topic ''".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Failure switches and counters shared by a [`ScriptedChannel`] and its transactions.
#[derive(Default)]
pub struct Script {
    pub fail_transaction: AtomicBool,
    pub fail_begin: AtomicBool,
    pub fail_take: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
    pub fail_release: AtomicBool,
    pub transactions: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub releases: AtomicUsize,
    pub final_states: Mutex<Vec<TransactionState>>,
}

/// Memory channel wrapper that counts transaction calls and injects failures.
#[derive(Clone)]
pub struct ScriptedChannel {
    pub inner: MemoryChannel,
    pub script: Arc<Script>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self {
            inner: MemoryChannel::new(64),
            script: Arc::new(Script::default()),
        }
    }

    pub fn put(&self, event: Event) {
        self.inner.put(event).unwrap();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl Channel for ScriptedChannel {
    fn transaction(&self) -> Result<Box<dyn Transaction + '_>, ChannelError> {
        if self.script.fail_transaction.load(Ordering::SeqCst) {
            return Err(ChannelError::Poisoned);
        }
        self.script.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTransaction {
            inner: self.inner.transaction()?,
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedTransaction<'a> {
    inner: Box<dyn Transaction + 'a>,
    script: Arc<Script>,
}

impl ScriptedTransaction<'_> {
    fn check(&self, flag: &AtomicBool) -> Result<(), ChannelError> {
        if flag.load(Ordering::SeqCst) {
            Err(ChannelError::Poisoned)
        } else {
            Ok(())
        }
    }
}

impl Transaction for ScriptedTransaction<'_> {
    fn begin(&mut self) -> Result<(), ChannelError> {
        self.check(&self.script.fail_begin)?;
        self.inner.begin()
    }

    fn take(&mut self) -> Result<Option<Event>, ChannelError> {
        self.check(&self.script.fail_take)?;
        self.inner.take()
    }

    fn commit(&mut self) -> Result<(), ChannelError> {
        self.check(&self.script.fail_commit)?;
        self.script.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), ChannelError> {
        self.script.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.check(&self.script.fail_rollback)?;
        self.inner.rollback()
    }

    fn release(&mut self) -> Result<(), ChannelError> {
        self.script.releases.fetch_add(1, Ordering::SeqCst);
        let result = self.check(&self.script.fail_release).and(self.inner.release());
        self.script
            .final_states
            .lock()
            .unwrap()
            .push(self.inner.state());
        result
    }

    fn state(&self) -> TransactionState {
        self.inner.state()
    }
}

/// Preprocessor that ignores its input entirely.
pub struct FixedPreprocessor;

impl MessagePreprocessor for FixedPreprocessor {
    fn extract_key(&self, _event: &Event, _context: &Context) -> Option<String> {
        Some("K".to_string())
    }

    fn extract_topic(&self, _event: &Event, _context: &Context) -> String {
        "X".to_string()
    }

    fn transform_message(&self, _event: &Event, _context: &Context) -> String {
        "Y".to_string()
    }
}

/// Number of calls made to any [`CountingPreprocessor`].
pub static PREPROCESSOR_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Preprocessor that counts how often it is consulted.
pub struct CountingPreprocessor;

impl MessagePreprocessor for CountingPreprocessor {
    fn extract_key(&self, _event: &Event, _context: &Context) -> Option<String> {
        PREPROCESSOR_CALLS.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn extract_topic(&self, _event: &Event, _context: &Context) -> String {
        PREPROCESSOR_CALLS.fetch_add(1, Ordering::SeqCst);
        "counted".to_string()
    }

    fn transform_message(&self, event: &Event, _context: &Context) -> String {
        PREPROCESSOR_CALLS.fetch_add(1, Ordering::SeqCst);
        event.body_text()
    }
}

/// Preprocessor that returns an empty topic.
pub struct EmptyTopicPreprocessor;

impl MessagePreprocessor for EmptyTopicPreprocessor {
    fn extract_key(&self, _event: &Event, _context: &Context) -> Option<String> {
        None
    }

    fn extract_topic(&self, _event: &Event, _context: &Context) -> String {
        String::new()
    }

    fn transform_message(&self, event: &Event, _context: &Context) -> String {
        event.body_text()
    }
}

pub fn test_registry() -> PreprocessorRegistry {
    let mut registry = PreprocessorRegistry::with_builtins();
    registry.register("fixed", || Box::new(FixedPreprocessor));
    registry.register("empty-topic", || Box::new(EmptyTopicPreprocessor));
    registry.register("counting", || Box::new(CountingPreprocessor));
    registry
}

pub fn context(pairs: &[(&str, &str)]) -> Context {
    pairs.iter().copied().collect()
}

/// Builds and starts a sink over `channel` and `client`.
pub fn started_sink<C: PublishClient + 'static>(
    pairs: &[(&str, &str)],
    channel: &ScriptedChannel,
    client: &Arc<C>,
) -> KafkaSink {
    let sink = KafkaSink::configure(
        context(pairs),
        &test_registry(),
        Arc::new(channel.clone()),
        Arc::clone(client) as Arc<dyn PublishClient>,
    )
    .unwrap();
    sink.start().unwrap();
    sink
}

/// Tracing layer that keeps the level and message of every event.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<(Level, String)>>>);

impl CapturedLogs {
    /// Runs `f` with this layer installed as the thread's default subscriber.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}
