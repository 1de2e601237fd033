use crate::{StoreAdapter, StoreError, StoreResult, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::debug;

/// Delete the key only while it still holds the expected value
const DELETE_IF_EQUALS: &str =
    r"if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('del', KEYS[1]) else return 0 end";

/// Redis-backed store. Holds three connections: one for plain queue
/// operations, one dedicated to blocking pops, and one for publishing —
/// a connection parked in a blocking pop cannot serve anything else.
pub struct RedisStore {
    client: Client,
    queue: MultiplexedConnection,
    blocking: MultiplexedConnection,
    publisher: MultiplexedConnection,
    delete_if_equals: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(StoreError::from)?;
        let queue = client.get_multiplexed_async_connection().await?;
        let blocking = client.get_multiplexed_async_connection().await?;
        let publisher = client.get_multiplexed_async_connection().await?;
        debug!(url, "connected to redis");

        Ok(RedisStore {
            client,
            queue,
            blocking,
            publisher,
            delete_if_equals: Script::new(DELETE_IF_EQUALS),
        })
    }

    /// Store URL from `REDIS_HOST`/`REDIS_PORT`, defaulting to localhost
    pub fn url_from_env() -> String {
        let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
        format!("redis://{host}:{port}")
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable {
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    async fn list_push(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.queue.clone();
        conn.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn list_shift(&self, src: &str, dst: &str) -> StoreResult<Option<String>> {
        let mut conn = self.queue.clone();
        let shifted: Option<String> = conn.rpoplpush(src, dst).await?;
        Ok(shifted)
    }

    async fn list_shift_blocking(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let mut conn = self.blocking.clone();
        let shifted: Option<String> = conn.brpoplpush(src, dst, timeout.as_secs_f64()).await?;
        Ok(shifted)
    }

    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.queue.clone();
        let removed: u64 = conn.lrem(key, 0, value).await?;
        Ok(removed)
    }

    async fn list_items(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.queue.clone();
        let items: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(items)
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.queue.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.queue.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.queue.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.queue.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.queue.clone();
        let removed: u64 = self
            .delete_if_equals
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.queue.clone();
        let present: bool = conn.exists(key).await?;
        Ok(present)
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let messages = pubsub
            .into_on_message()
            .filter_map(|message| async move { message.get_payload::<String>().ok() });
        Ok(messages.boxed())
    }
}
