use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    /// Transient: callers retry after backoff, never treat as fatal.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Raw messages delivered to one channel subscriber
pub type Subscription = BoxStream<'static, String>;

/// Primitive contract the work-queue protocol is built on: a shared
/// key-value/list store with atomic operations and pub/sub. Implementations
/// wrap an external store; they do not add queue semantics of their own.
///
/// Lists are ordered: `list_push` inserts at the head, `list_shift` takes
/// the oldest element from the tail, so a list used with only these two
/// operations behaves as a FIFO queue.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Insert a value at the head of a list
    async fn list_push(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Atomically take the oldest element of `src` and insert it into
    /// `dst`, returning it. `None` when `src` is empty.
    async fn list_shift(&self, src: &str, dst: &str) -> StoreResult<Option<String>>;

    /// As [`list_shift`](Self::list_shift), but wait up to `timeout` for an
    /// element to arrive before returning `None`
    async fn list_shift_blocking(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>>;

    /// Remove every occurrence of `value` from a list, returning the count
    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Snapshot of a list's contents, head first
    async fn list_items(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Set a key to a value, without expiry
    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Set a key to a value that disappears after `ttl`
    async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Read a key. `None` when absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Delete a key, reporting whether it existed
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Atomically delete a key only while it still holds `expected`.
    /// Returns `false` when the key is absent, expired, or holds another
    /// value. This is the ownership check behind lease completion.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Whether a key exists and is not expired
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Publish a message on a channel. Fire-and-forget.
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;

    /// Subscribe to a channel, receiving messages published from now on
    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription>;
}
