use crate::{KeySpace, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use workq_core::{Task, TaskId, TaskPayload};
use workq_store::StoreAdapter;

/// A task held under a live lease. Returned by [`WorkQueue::lease`] and
/// required by [`WorkQueue::complete`] as proof of ownership.
#[derive(Debug, Clone)]
pub struct LeasedTask {
    pub task: Task,
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

impl LeasedTask {
    pub fn id(&self) -> TaskId {
        self.task.id
    }
}

/// The lease protocol over a shared store.
///
/// A task id lives on exactly one of two lists: `pending` (leasable) or
/// `processing` (leased, or expired and awaiting reap). Moving between
/// them is a single atomic shift, which is what guarantees that no two
/// workers acquire the same task. The lease itself is a keyed record with
/// the lease duration as its TTL; a worker that dies simply stops being
/// the holder when the record expires, and [`requeue_expired`] returns the
/// task to `pending`.
///
/// [`requeue_expired`]: WorkQueue::requeue_expired
pub struct WorkQueue {
    store: Arc<dyn StoreAdapter>,
    keys: KeySpace,
}

impl WorkQueue {
    pub fn new(store: Arc<dyn StoreAdapter>, keys: KeySpace) -> Self {
        WorkQueue { store, keys }
    }

    /// Append a new task to the pending pool and return its fresh id.
    /// Never blocks on consumers.
    pub async fn enqueue(&self, payload: TaskPayload) -> Result<TaskId> {
        let task = Task::new(payload);
        let record = task.to_json()?;

        // Record first, id second: an id on the pending list always has a
        // record behind it
        self.store.put(&self.keys.task(task.id), &record).await?;
        self.store
            .list_push(self.keys.pending(), &task.id.to_string())
            .await?;

        debug!(task_id = %task.id, "enqueued task");
        Ok(task.id)
    }

    /// Atomically acquire one pending task under a lease of
    /// `lease_duration`. With `block` set, wait up to that long for a task
    /// to arrive before returning `None`; otherwise return immediately.
    ///
    /// Expired tasks re-enter the pending pool at the back, so a leased
    /// task is always the oldest one available.
    pub async fn lease(
        &self,
        holder: &str,
        lease_duration: Duration,
        block: Option<Duration>,
    ) -> Result<Option<LeasedTask>> {
        let shifted = match block {
            Some(timeout) => {
                self.store
                    .list_shift_blocking(self.keys.pending(), self.keys.processing(), timeout)
                    .await?
            }
            None => {
                self.store
                    .list_shift(self.keys.pending(), self.keys.processing())
                    .await?
            }
        };
        let Some(id) = shifted else {
            return Ok(None);
        };

        self.store
            .put_with_ttl(&self.keys.lease(&id), holder, lease_duration)
            .await?;
        let expires_at = Utc::now() + ChronoDuration::milliseconds(lease_duration.as_millis() as i64);

        let Some(record) = self.store.get(&self.keys.task(&id)).await? else {
            // Record already gone: the task was completed while its id was
            // being requeued. Drop the dangling id.
            self.drop_leased_id(&id).await?;
            debug!(task_id = %id, "dropped dangling id without a task record");
            return Ok(None);
        };

        let task = match Task::from_json(&record) {
            Ok(task) => task,
            Err(err) => {
                warn!(task_id = %id, error = %err, "evicting unreadable task record");
                self.drop_leased_id(&id).await?;
                self.store.delete(&self.keys.task(&id)).await?;
                return Ok(None);
            }
        };

        debug!(task_id = %id, holder, "leased task");
        Ok(Some(LeasedTask {
            task,
            holder: holder.to_string(),
            expires_at,
        }))
    }

    /// Idempotently finalize a leased task, removing its lease and its
    /// record. Ownership-checked: when the lease has expired or been
    /// reassigned to another holder, this is a no-op returning `false`,
    /// so a stale worker's late call cannot corrupt the new holder's
    /// in-progress task.
    pub async fn complete(&self, leased: &LeasedTask) -> Result<bool> {
        let id = leased.task.id.to_string();

        if !self
            .store
            .delete_if_equals(&self.keys.lease(&id), &leased.holder)
            .await?
        {
            debug!(task_id = %id, "lease expired or reassigned; skipping completion");
            return Ok(false);
        }

        self.store.list_remove(self.keys.processing(), &id).await?;
        self.store.delete(&self.keys.task(&id)).await?;
        debug!(task_id = %id, "completed task");
        Ok(true)
    }

    /// Return every expired lease's task to the pending pool and report
    /// how many came back. This is what delivers at-least-once: a crashed
    /// worker's task resurfaces at most one lease duration plus one reap
    /// interval after it was acquired.
    pub async fn requeue_expired(&self) -> Result<usize> {
        let mut requeued = 0;

        for id in self.store.list_items(self.keys.processing()).await? {
            if self.store.exists(&self.keys.lease(&id)).await? {
                continue;
            }
            // Raced with a completer: it already took the id off the list
            if self.store.list_remove(self.keys.processing(), &id).await? == 0 {
                continue;
            }
            if self.store.exists(&self.keys.task(&id)).await? {
                self.store.list_push(self.keys.pending(), &id).await?;
                warn!(task_id = %id, "requeued task with expired lease");
                requeued += 1;
            }
            // No record means the task finished; nothing to restore
        }

        Ok(requeued)
    }

    async fn drop_leased_id(&self, id: &str) -> Result<()> {
        self.store.list_remove(self.keys.processing(), id).await?;
        self.store.delete(&self.keys.lease(id)).await?;
        Ok(())
    }
}
