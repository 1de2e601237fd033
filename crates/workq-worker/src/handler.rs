use crate::expr;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use workq_core::TaskPayload;

/// Outcome of one handler invocation: the result value, or a
/// business-level failure message. Never both.
pub type HandlerResult = Result<String, String>;

/// A pluggable computation applied to each leased task.
///
/// Handlers report business-level failures as `Err` and never decide
/// completion — that is the consumer loop's responsibility. At-least-once
/// delivery means a handler may run more than once for one logical task,
/// possibly concurrently on two workers, so handlers must tolerate
/// re-invocation with the same payload.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: TaskPayload) -> HandlerResult;
}

/// Registry of task handlers by name
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under a name
    pub fn register<H: TaskHandler + 'static>(&self, name: impl Into<String>, handler: H) {
        let mut handlers = self.handlers.write();
        handlers.insert(name.into(), Arc::new(handler));
    }

    /// Look up a handler by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        let handlers = self.handlers.read();
        handlers.get(name).cloned()
    }

    /// All registered handler names
    pub fn names(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        handlers.keys().cloned().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry preloaded with the built-in handlers
pub fn builtin_registry() -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    registry.register("expression", ExpressionHandler);
    registry.register("primes", PrimeCountHandler);
    registry
}

/// Evaluates the payload's `expression` field with the restricted
/// arithmetic evaluator
pub struct ExpressionHandler;

#[async_trait]
impl TaskHandler for ExpressionHandler {
    async fn handle(&self, payload: TaskPayload) -> HandlerResult {
        let raw = payload
            .get("expression")
            .and_then(|value| value.as_str())
            .ok_or_else(|| "payload missing 'expression' field".to_string())?;

        match expr::evaluate(raw) {
            Ok(value) => Ok(value.to_string()),
            Err(err) => Err(err.to_string()),
        }
    }
}

/// Counts primes up to and including the payload's `number` field
pub struct PrimeCountHandler;

/// Inputs above this bound would not reliably finish within a lease
const MAX_PRIME_INPUT: u64 = 10_000_000;

#[async_trait]
impl TaskHandler for PrimeCountHandler {
    async fn handle(&self, payload: TaskPayload) -> HandlerResult {
        let number = payload
            .get("number")
            .and_then(|value| value.as_u64())
            .ok_or_else(|| "payload missing numeric 'number' field".to_string())?;

        if number > MAX_PRIME_INPUT {
            return Err(format!(
                "number {number} exceeds the supported bound of {MAX_PRIME_INPUT}"
            ));
        }
        Ok(count_primes(number).to_string())
    }
}

fn count_primes(limit: u64) -> u64 {
    if limit < 2 {
        return 0;
    }
    let limit = limit as usize;
    let mut sieve = vec![true; limit + 1];
    sieve[0] = false;
    sieve[1] = false;

    let mut p = 2;
    while p * p <= limit {
        if sieve[p] {
            let mut multiple = p * p;
            while multiple <= limit {
                sieve[multiple] = false;
                multiple += p;
            }
        }
        p += 1;
    }

    sieve.iter().filter(|&&is_prime| is_prime).count() as u64
}
