use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use workq_core::ResultEnvelope;
use workq_store::{StoreAdapter, StoreError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("envelope serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Emits result envelopes on a named channel via the store's pub/sub
/// primitive. Fire-and-forget: no acknowledgment, no persistence.
pub struct ResultPublisher {
    store: Arc<dyn StoreAdapter>,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        ResultPublisher { store }
    }

    pub async fn publish(
        &self,
        channel: &str,
        envelope: &ResultEnvelope,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_string(envelope)?;
        self.store.publish(channel, &payload).await?;
        debug!(task_id = %envelope.task_id, channel, "published result envelope");
        Ok(())
    }
}
