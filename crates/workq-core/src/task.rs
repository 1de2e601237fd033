use crate::{Result, TaskError, MAX_PAYLOAD_BYTES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Task payload: arbitrary JSON, expected to carry a `clientId` field so
/// results can be routed back to the originating request
pub type TaskPayload = Value;

/// A unit of work as stored in the queue. Immutable once enqueued; the id
/// is assigned at enqueue time and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Handler-specific input
    pub payload: TaskPayload,

    /// When the task entered the queue
    pub enqueue_time: DateTime<Utc>,
}

impl Task {
    /// Create a new task with a fresh id
    pub fn new(payload: TaskPayload) -> Self {
        Task {
            id: Uuid::new_v4(),
            payload,
            enqueue_time: Utc::now(),
        }
    }

    /// Serialize the task record, enforcing the payload size cap
    pub fn to_json(&self) -> Result<String> {
        let encoded = serde_json::to_string(self)?;
        if encoded.len() > MAX_PAYLOAD_BYTES {
            return Err(TaskError::PayloadTooLarge {
                max: MAX_PAYLOAD_BYTES,
                actual: encoded.len(),
            });
        }
        Ok(encoded)
    }

    /// Deserialize a task record
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The `clientId` field of the payload, if present
    pub fn client_id(&self) -> Option<&str> {
        self.payload.get("clientId").and_then(Value::as_str)
    }
}
