mod error;
mod keys;
mod queue;

pub use error::{QueueError, Result};
pub use keys::KeySpace;
pub use queue::{LeasedTask, WorkQueue};
