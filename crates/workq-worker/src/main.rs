use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workq_queue::{KeySpace, WorkQueue};
use workq_store::RedisStore;
use workq_worker::{builtin_registry, ConsumerLoop, ResultPublisher, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "workq-worker")]
#[command(about = "Lease-based work queue worker", long_about = None)]
struct Args {
    /// Store URL (defaults to REDIS_HOST/REDIS_PORT, then localhost)
    #[arg(short, long)]
    store_url: Option<String>,

    /// Queue key prefix
    #[arg(short, long)]
    queue: Option<String>,

    /// Handler to run ("expression" or "primes")
    #[arg(long)]
    handler: Option<String>,

    /// Language tag stamped on result envelopes
    #[arg(short, long)]
    language: Option<String>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration, then override with CLI args
    let mut config = if let Some(path) = &args.config {
        WorkerConfig::from_file(path)?
    } else {
        WorkerConfig::default()
    };
    if let Some(url) = args.store_url {
        config.store_url = Some(url);
    }
    if let Some(queue) = args.queue {
        config.queue_prefix = queue;
    }
    if let Some(handler) = args.handler {
        config.handler = handler;
    }
    if let Some(language) = args.language {
        config.language = language;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }

    let registry = builtin_registry();
    let handler = registry.get(&config.handler).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown handler '{}' (available: {:?})",
            config.handler,
            registry.names()
        )
    })?;

    let store_url = config.resolved_store_url();
    let store = Arc::new(RedisStore::connect(&store_url).await?);
    tracing::info!(store = %store_url, queue = %config.queue_prefix, "connected to store");

    let queue = Arc::new(WorkQueue::new(
        store.clone(),
        KeySpace::new(config.queue_prefix.clone()),
    ));
    let publisher = ResultPublisher::new(store);
    let worker_id = config.generate_worker_id();

    let consumer = ConsumerLoop::new(
        queue,
        publisher,
        handler,
        config.consumer_options(),
        worker_id,
    );

    // Handle shutdown signals
    let shutdown = consumer.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("received shutdown signal");
        shutdown.notify_one();
    });

    consumer.run().await;

    Ok(())
}
