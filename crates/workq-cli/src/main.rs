use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::sync::Arc;
use workq_core::result_channel;
use workq_queue::{KeySpace, WorkQueue};
use workq_store::{RedisStore, StoreAdapter};

#[derive(Parser, Debug)]
#[command(name = "workq")]
#[command(about = "Work queue operator CLI", long_about = None)]
struct Args {
    /// Store URL (defaults to REDIS_HOST/REDIS_PORT, then localhost)
    #[arg(short, long)]
    store_url: Option<String>,

    /// Queue key prefix
    #[arg(short, long, default_value = "jobs")]
    queue: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enqueue a task
    Enqueue {
        /// Arithmetic expression payload
        #[arg(short, long, conflicts_with = "number")]
        expression: Option<String>,

        /// Prime-count payload
        #[arg(short, long)]
        number: Option<u64>,

        /// Client id echoed into the result envelope
        #[arg(short, long, default_value = "cli")]
        client_id: String,
    },

    /// Print result envelopes from a channel as they arrive
    Watch {
        /// Language tag of the channel to watch
        #[arg(short, long, default_value = "rust")]
        language: String,
    },

    /// Return expired leases to the pending pool once
    Reap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let url = args
        .store_url
        .clone()
        .unwrap_or_else(RedisStore::url_from_env);
    let store = Arc::new(RedisStore::connect(&url).await?);

    match args.command {
        Commands::Enqueue {
            expression,
            number,
            client_id,
        } => {
            let mut payload = serde_json::Map::new();
            match (expression, number) {
                (Some(expression), _) => {
                    payload.insert("expression".to_string(), expression.into());
                }
                (None, Some(number)) => {
                    payload.insert("number".to_string(), number.into());
                }
                (None, None) => anyhow::bail!("provide --expression or --number"),
            }
            payload.insert("clientId".to_string(), client_id.into());
            payload.insert(
                "timestamp".to_string(),
                chrono::Utc::now().timestamp_millis().into(),
            );

            let queue = WorkQueue::new(store, KeySpace::new(args.queue));
            let task_id = queue.enqueue(payload.into()).await?;
            println!("Task enqueued: {task_id}");
        }

        Commands::Watch { language } => {
            let channel = result_channel(&language);
            let mut messages = store.subscribe(&channel).await?;
            eprintln!("Watching {channel} (ctrl-c to stop)");
            while let Some(message) = messages.next().await {
                println!("{message}");
            }
        }

        Commands::Reap => {
            let queue = WorkQueue::new(store, KeySpace::new(args.queue));
            let count = queue.requeue_expired().await?;
            println!("Requeued {count} expired lease(s)");
        }
    }

    Ok(())
}
