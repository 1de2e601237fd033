use crate::handler::TaskHandler;
use crate::publisher::ResultPublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use workq_core::{result_channel, ResultEnvelope, TaskId};
use workq_queue::{LeasedTask, QueueError, WorkQueue};

/// Tunables for one consumer loop instance
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// How long an acquired task stays exclusively ours
    pub lease_duration: Duration,
    /// How long one lease call waits for a task before giving up
    pub block_timeout: Duration,
    /// Pause after a store failure before the next attempt
    pub backoff: Duration,
    /// How often expired leases are swept back to the pending pool
    pub reaper_interval: Duration,
    /// Tag stamped on result envelopes
    pub language: String,
    /// Channel result envelopes are published on
    pub channel: String,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        ConsumerOptions {
            lease_duration: Duration::from_secs(30),
            block_timeout: Duration::from_secs(5),
            backoff: Duration::from_secs(1),
            reaper_interval: Duration::from_secs(10),
            language: "rust".to_string(),
            channel: result_channel("rust"),
        }
    }
}

/// The worker's processing loop: lease one task, run the handler, publish
/// the result envelope, finalize or abandon the lease, repeat.
///
/// Single-threaded per instance — an iteration fully completes before the
/// next lease call. Horizontal scaling is many instances against the same
/// queue.
///
/// The separation this loop enforces: a handler-reported error is a valid
/// terminal outcome (published, then completed), while an infrastructure
/// failure mid-processing (handler crash, publish failure) leaves the
/// lease to expire so another worker redelivers the task.
pub struct ConsumerLoop {
    queue: Arc<WorkQueue>,
    publisher: ResultPublisher,
    handler: Arc<dyn TaskHandler>,
    options: ConsumerOptions,
    worker_id: String,
    shutdown: Arc<Notify>,
}

impl ConsumerLoop {
    pub fn new(
        queue: Arc<WorkQueue>,
        publisher: ResultPublisher,
        handler: Arc<dyn TaskHandler>,
        options: ConsumerOptions,
        worker_id: String,
    ) -> Self {
        ConsumerLoop {
            queue,
            publisher,
            handler,
            options,
            worker_id,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop the loop from another task
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until shutdown. The loop is the top-level recovery point: no
    /// single task's failure terminates it. Shutdown takes effect at the
    /// next await point; an in-flight lease is abandoned to expire, which
    /// is exactly the crash path the protocol already covers.
    pub async fn run(&self) {
        info!(worker_id = %self.worker_id, channel = %self.options.channel, "consumer loop starting");
        let reaper = self.spawn_reaper();

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!(worker_id = %self.worker_id, "consumer loop stopping");
                    break;
                }
                outcome = self.poll_once() => {
                    if let Err(err) = outcome {
                        if err.is_retryable() {
                            warn!(error = %err, "queue unavailable; backing off");
                        } else {
                            error!(error = %err, "unexpected queue failure; backing off");
                        }
                        tokio::time::sleep(self.options.backoff).await;
                    }
                }
            }
        }

        reaper.abort();
    }

    /// One Idle → Leased → Idle transition: lease (blocking up to the
    /// block timeout), process, return the processed task's id. Public so
    /// the loop can be driven step by step.
    pub async fn poll_once(&self) -> Result<Option<TaskId>, QueueError> {
        let leased = self
            .queue
            .lease(
                &self.worker_id,
                self.options.lease_duration,
                Some(self.options.block_timeout),
            )
            .await?;

        let Some(leased) = leased else {
            return Ok(None);
        };
        let id = leased.id();
        self.process(leased).await;
        Ok(Some(id))
    }

    async fn process(&self, leased: LeasedTask) {
        let task = &leased.task;
        info!(task_id = %task.id, "processing task");

        // The handler runs in its own task so a panic is contained here
        // and the lease is left to expire instead of taking the loop down
        let handler = self.handler.clone();
        let payload = task.payload.clone();
        let invocation = tokio::spawn(async move { handler.handle(payload).await });

        let outcome = match invocation.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(task_id = %task.id, error = %err, "handler crashed; leaving lease to expire");
                return;
            }
        };

        let envelope = match outcome {
            Ok(result) => {
                debug!(task_id = %task.id, result = %result, "handler succeeded");
                ResultEnvelope::success(task, &self.options.language, result)
            }
            Err(message) => {
                debug!(task_id = %task.id, error = %message, "handler reported a task-level failure");
                ResultEnvelope::failure(task, &self.options.language, message)
            }
        };

        if let Err(err) = self.publisher.publish(&self.options.channel, &envelope).await {
            warn!(task_id = %task.id, error = %err, "publish failed; abandoning lease for redelivery");
            return;
        }

        match self.queue.complete(&leased).await {
            Ok(true) => debug!(task_id = %task.id, "task completed"),
            Ok(false) => debug!(task_id = %task.id, "lease no longer held; completion skipped"),
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "completion failed; task may be redelivered")
            }
        }
    }

    fn spawn_reaper(&self) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let interval = self.options.reaper_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match queue.requeue_expired().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "reaper returned expired leases to the queue"),
                    Err(err) => warn!(error = %err, "reaper sweep failed"),
                }
            }
        })
    }
}
