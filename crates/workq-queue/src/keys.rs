use std::fmt::Display;

/// Key naming scheme for one logical queue. All keys of a queue share a
/// prefix so several queues can coexist in one store.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
    pending: String,
    processing: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        KeySpace {
            pending: format!("{prefix}:pending"),
            processing: format!("{prefix}:processing"),
            prefix,
        }
    }

    /// List of task ids waiting to be leased, oldest served first
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// List of task ids currently under a lease or awaiting reap
    pub fn processing(&self) -> &str {
        &self.processing
    }

    /// Key holding one task's record
    pub fn task(&self, id: impl Display) -> String {
        format!("{}:task:{}", self.prefix, id)
    }

    /// Key holding one task's lease; the value is the holder's worker id
    /// and the TTL is the lease duration
    pub fn lease(&self, id: impl Display) -> String {
        format!("{}:lease:{}", self.prefix, id)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        KeySpace::new("jobs")
    }
}
