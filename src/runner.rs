use crate::channel::MemoryChannel;
use crate::config::RunnerConfig;
use crate::sink::{CycleStatus, KafkaSink};
use crate::Result;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters collected over one [`SinkRunner::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    pub published: u64,
    pub backoffs: u64,
    pub failures: u64,
}

/// Drives a started sink until shutdown.
///
/// Each cycle runs on the blocking pool. After a backoff or a delivery
/// failure the runner pauses for the configured interval before the next
/// cycle. Any other error ends the run. Shutdown is only observed between
/// cycles and during pauses.
pub struct SinkRunner {
    sink: Arc<KafkaSink>,
    backoff: Duration,
}

impl SinkRunner {
    pub fn new(sink: Arc<KafkaSink>, config: &RunnerConfig) -> Self {
        Self {
            sink,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    pub async fn run<F>(&self, shutdown: F) -> Result<RunnerStats>
    where
        F: Future<Output = ()>,
    {
        info!(sink = %self.sink.name(), backoff_ms = self.backoff.as_millis() as u64, "Runner starting");
        tokio::pin!(shutdown);
        let mut stats = RunnerStats::default();

        loop {
            // An in-flight cycle always runs to completion
            if shutdown.as_mut().now_or_never().is_some() {
                break;
            }

            let sink = Arc::clone(&self.sink);
            let outcome = tokio::task::spawn_blocking(move || sink.run_once()).await?;

            match outcome {
                Ok(CycleStatus::Ready) => {
                    stats.published += 1;
                    continue;
                }
                Ok(CycleStatus::Backoff) => {
                    stats.backoffs += 1;
                    debug!("Channel empty, backing off");
                }
                Err(e) if e.is_transient() => {
                    stats.failures += 1;
                    warn!(error = %e, "Cycle failed, will retry");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        info!(
            published = stats.published,
            backoffs = stats.backoffs,
            failures = stats.failures,
            "Runner stopped"
        );
        Ok(stats)
    }

    /// Runs until shutdown, then stops the sink.
    ///
    /// A run error takes precedence over a failure to stop; the latter is
    /// only returned when the run itself succeeded.
    pub async fn run_and_stop<F>(&self, shutdown: F) -> Result<RunnerStats>
    where
        F: Future<Output = ()>,
    {
        let outcome = self.run(shutdown).await;
        let stopped = self.sink.stop();

        if let Err(e) = &stopped {
            error!(sink = %self.sink.name(), error = %e, "Failed to stop the sink cleanly");
        }

        let stats = outcome?;
        stopped?;
        Ok(stats)
    }
}

/// Shutdown signal for a runner fed from a finite input.
///
/// Resolves as soon as `interrupt` does, or once `input` has completed and
/// `channel` has been drained. `interrupt` stays armed while the drain is
/// awaited, so a stuck drain can still be cut short.
pub async fn drained_or_interrupted<I, F>(
    interrupt: I,
    input: F,
    channel: MemoryChannel,
    poll: Duration,
) where
    I: Future<Output = ()>,
    F: Future<Output = ()>,
{
    let drained = async {
        input.await;
        while !channel.is_empty() {
            tokio::time::sleep(poll).await;
        }
    };

    tokio::select! {
        _ = interrupt => info!("Shutdown requested"),
        _ = drained => info!("Input exhausted and channel drained"),
    }
}
