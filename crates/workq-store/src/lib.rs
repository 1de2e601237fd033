mod adapter;
mod memory;
mod redis_store;

pub use adapter::{StoreAdapter, StoreError, StoreResult, Subscription};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
