use crate::Task;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload fields never echoed into the envelope: routing metadata, plus
/// names the envelope itself owns.
const RESERVED_FIELDS: [&str; 6] = [
    "clientId",
    "timestamp",
    "taskId",
    "result",
    "error",
    "language",
];

/// Message published once per handler invocation. Exactly one of
/// `result`/`error` is populated; both keys are always present in the
/// serialized JSON. Fire-and-forget: never persisted, no delivery
/// guarantee to subscribers that are not currently listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub task_id: String,
    pub client_id: String,

    /// Echoed input fields from the task payload
    #[serde(flatten)]
    pub input: Map<String, Value>,

    pub result: Option<String>,
    pub error: Option<String>,

    /// Tag of the handler category that produced the result
    pub language: String,

    /// Production time, integer milliseconds since the epoch
    pub timestamp: i64,
}

impl ResultEnvelope {
    /// Envelope for a handler that produced a value
    pub fn success(task: &Task, language: &str, result: String) -> Self {
        Self::build(task, language, Some(result), None)
    }

    /// Envelope for a handler that reported a task-level failure
    pub fn failure(task: &Task, language: &str, error: String) -> Self {
        Self::build(task, language, None, Some(error))
    }

    fn build(task: &Task, language: &str, result: Option<String>, error: Option<String>) -> Self {
        let input = match task.payload.as_object() {
            Some(fields) => fields
                .iter()
                .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            None => Map::new(),
        };

        ResultEnvelope {
            task_id: task.id.to_string(),
            client_id: task.client_id().unwrap_or_default().to_string(),
            input,
            result,
            error,
            language: language.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Name of the pub/sub channel carrying results for one handler category
pub fn result_channel(language: &str) -> String {
    format!("results:{language}")
}
