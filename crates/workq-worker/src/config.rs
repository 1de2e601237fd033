use crate::consumer::ConsumerOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use workq_core::result_channel;
use workq_store::RedisStore;

/// Worker process configuration. Everything here is externally supplied;
/// none of it is part of the queue protocol itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Store URL; falls back to `REDIS_HOST`/`REDIS_PORT` when unset
    pub store_url: Option<String>,
    pub queue_prefix: String,
    /// Name of the registered handler to run
    pub handler: String,
    /// Tag stamped on result envelopes
    pub language: String,
    /// Result channel; defaults to `results:<language>`
    pub result_channel: Option<String>,
    pub lease_duration_secs: u64,
    pub block_timeout_secs: u64,
    pub backoff_secs: u64,
    pub reaper_interval_secs: u64,
    /// Worker identity; auto-generated when unset
    pub worker_id: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            store_url: None,
            queue_prefix: "jobs".to_string(),
            handler: "expression".to_string(),
            language: "rust".to_string(),
            result_channel: None,
            lease_duration_secs: 30,
            block_timeout_secs: 5,
            backoff_secs: 1,
            reaper_interval_secs: 10,
            worker_id: None,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn resolved_store_url(&self) -> String {
        self.store_url
            .clone()
            .unwrap_or_else(RedisStore::url_from_env)
    }

    pub fn resolved_channel(&self) -> String {
        self.result_channel
            .clone()
            .unwrap_or_else(|| result_channel(&self.language))
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            lease_duration: Duration::from_secs(self.lease_duration_secs),
            block_timeout: Duration::from_secs(self.block_timeout_secs),
            backoff: Duration::from_secs(self.backoff_secs),
            reaper_interval: Duration::from_secs(self.reaper_interval_secs),
            language: self.language.clone(),
            channel: self.resolved_channel(),
        }
    }

    pub fn generate_worker_id(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let mut random = Uuid::new_v4().simple().to_string();
        random.truncate(8);

        format!("{host}-{pid}-{random}")
    }
}
