use crate::{StoreAdapter, StoreResult, Subscription};
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    entries: HashMap<String, Entry>,
}

impl State {
    fn evict_if_expired(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(Entry::is_expired) {
            self.entries.remove(key);
        }
    }
}

struct Inner {
    state: Mutex<State>,
    pushed: Notify,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

/// In-process store for tests and single-process deployments. Lists and
/// keyed values live behind one mutex; TTLs are checked lazily; blocking
/// shift waits on a notifier; pub/sub rides on broadcast channels.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                pushed: Notify::new(),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn try_shift(&self, src: &str, dst: &str) -> Option<String> {
        let mut state = self.inner.state.lock();
        let value = state.lists.get_mut(src)?.pop_back()?;
        state
            .lists
            .entry(dst.to_string())
            .or_default()
            .push_front(value.clone());
        Some(value)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn list_push(&self, key: &str, value: &str) -> StoreResult<()> {
        {
            let mut state = self.inner.state.lock();
            state
                .lists
                .entry(key.to_string())
                .or_default()
                .push_front(value.to_string());
        }
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn list_shift(&self, src: &str, dst: &str) -> StoreResult<Option<String>> {
        Ok(self.try_shift(src, dst))
    }

    async fn list_shift_blocking(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so a push between the
            // check and the wait is not missed
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_shift(src, dst) {
                return Ok(Some(value));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut state = self.inner.state.lock();
        let removed = match state.lists.get_mut(key) {
            Some(list) => {
                let before = list.len();
                list.retain(|item| item != value);
                (before - list.len()) as u64
            }
            None => 0,
        };
        Ok(removed)
    }

    async fn list_items(&self, key: &str) -> StoreResult<Vec<String>> {
        let state = self.inner.state.lock();
        Ok(state
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut state = self.inner.state.lock();
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.inner.state.lock();
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.inner.state.lock();
        state.evict_if_expired(key);
        Ok(state.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.inner.state.lock();
        state.evict_if_expired(key);
        Ok(state.entries.remove(key).is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut state = self.inner.state.lock();
        state.evict_if_expired(key);
        if state
            .entries
            .get(key)
            .is_some_and(|entry| entry.value == expected)
        {
            state.entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.inner.state.lock();
        state.evict_if_expired(key);
        Ok(state.entries.contains_key(key))
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let sender = self.inner.channels.lock().get(channel).cloned();
        if let Some(sender) = sender {
            // No receivers is fine: fire-and-forget
            let _ = sender.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let receiver = {
            let mut channels = self.inner.channels.lock();
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let messages = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_are_fifo() {
        let store = MemoryStore::new();
        store.list_push("q", "a").await.unwrap();
        store.list_push("q", "b").await.unwrap();

        assert_eq!(store.list_shift("q", "p").await.unwrap(), Some("a".into()));
        assert_eq!(store.list_shift("q", "p").await.unwrap(), Some("b".into()));
        assert_eq!(store.list_shift("q", "p").await.unwrap(), None);
        assert_eq!(store.list_items("p").await.unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_blocking_shift_wakes_on_push() {
        let store = MemoryStore::new();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .list_shift_blocking("q", "p", Duration::from_secs(5))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.list_push("q", "late").await.unwrap();

        assert_eq!(waiter.await.unwrap(), Some("late".into()));
    }

    #[tokio::test]
    async fn test_blocking_shift_times_out() {
        let store = MemoryStore::new();
        let started = Instant::now();

        let shifted = store
            .list_shift_blocking("q", "p", Duration::from_millis(30))
            .await
            .unwrap();

        assert_eq!(shifted, None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .put_with_ttl("lease", "w-1", Duration::from_millis(20))
            .await
            .unwrap();

        assert!(store.exists("lease").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists("lease").await.unwrap());
        assert_eq!(store.get("lease").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let store = MemoryStore::new();
        store.put("lease", "w-1").await.unwrap();

        assert!(!store.delete_if_equals("lease", "w-2").await.unwrap());
        assert!(store.exists("lease").await.unwrap());
        assert!(store.delete_if_equals("lease", "w-1").await.unwrap());
        assert!(!store.delete_if_equals("lease", "w-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_remove() {
        let store = MemoryStore::new();
        store.list_push("q", "a").await.unwrap();
        store.list_push("q", "b").await.unwrap();
        store.list_push("q", "a").await.unwrap();

        assert_eq!(store.list_remove("q", "a").await.unwrap(), 2);
        assert_eq!(store.list_items("q").await.unwrap(), vec!["b"]);
        assert_eq!(store.list_remove("missing", "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let store = MemoryStore::new();
        let mut messages = store.subscribe("results:rust").await.unwrap();

        store.publish("results:rust", "hello").await.unwrap();
        assert_eq!(messages.next().await, Some("hello".into()));

        // Publishing with no subscriber is a quiet no-op
        store.publish("results:none", "dropped").await.unwrap();
    }
}
