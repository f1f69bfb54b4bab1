use clap::Parser;
use kafka_sink::channel::MemoryChannel;
use kafka_sink::error::ChannelError;
use kafka_sink::event::TIMESTAMP_HEADER;
use kafka_sink::kafka::{KafkaPublishClient, SharedClient};
use kafka_sink::preprocessor::PreprocessorRegistry;
use kafka_sink::runner::drained_or_interrupted;
use kafka_sink::{Config, Error, Event, KafkaSink, Result, SinkRunner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "kafka-sink")]
#[command(about = "Drains line events through a transactional channel into Kafka", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, value_name = "FILE", help = "Read events from FILE instead of stdin")]
    input: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting kafka-sink");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(Error::Config(e.to_string()));
        }
    };

    info!(
        topic = ?config.sink.topic,
        preprocessor = ?config.sink.preprocessor,
        producer_properties = config.sink.kafka.len(),
        channel_capacity = config.channel.capacity,
        backoff_ms = config.runner.backoff_ms,
        "Configuration summary"
    );

    let context = config.context();
    let channel = MemoryChannel::new(config.channel.capacity);
    let client = Arc::new(SharedClient::new(KafkaPublishClient::from_context(&context)));
    let sink = KafkaSink::configure(
        context,
        &PreprocessorRegistry::with_builtins(),
        Arc::new(channel.clone()),
        client,
    )?;
    let sink = Arc::new(sink);
    sink.start()?;

    let feeder = tokio::spawn(feed_input(args.input.clone(), channel.clone()));

    let runner = SinkRunner::new(Arc::clone(&sink), &config.runner);
    let drain_poll = Duration::from_millis(config.runner.backoff_ms.max(10));
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let input_done = async move {
        match feeder.await {
            Ok(Ok(count)) => info!(events = count, "Input exhausted"),
            Ok(Err(e)) => error!(error = %e, "Failed to read input"),
            Err(e) => error!(error = %e, "Input task failed"),
        }
    };
    let shutdown = drained_or_interrupted(interrupt, input_done, channel.clone(), drain_poll);

    let outcome = runner.run_and_stop(shutdown).await;

    if !channel.is_empty() {
        warn!(remaining = channel.len(), "Events left undelivered in the channel");
    }

    let stats = outcome?;
    info!(published = stats.published, failures = stats.failures, "kafka-sink finished");
    Ok(())
}

async fn feed_input(input: Option<PathBuf>, channel: MemoryChannel) -> Result<u64> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path).await?;
            info!("Reading events from {:?}", path);
            feed(BufReader::new(file), &channel).await
        }
        None => feed(BufReader::new(tokio::io::stdin()), &channel).await,
    }
}

/// Puts one event per input line into the channel, waiting while it is full.
async fn feed<R>(reader: R, channel: &MemoryChannel) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        let event = Event::with_body(line)
            .with_header(TIMESTAMP_HEADER, chrono::Utc::now().timestamp_millis().to_string());
        loop {
            match channel.put(event.clone()) {
                Ok(()) => break,
                Err(ChannelError::Full { .. }) => tokio::time::sleep(Duration::from_millis(50)).await,
                Err(e) => return Err(e.into()),
            }
        }
        count += 1;
    }

    Ok(count)
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("kafka_sink=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_sink=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
