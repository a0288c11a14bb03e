//! Error bookkeeping, circuit breaking, and pluggable recovery
//!
//! Shared by every call site that names an operation. Counter and error maps
//! live behind a single mutex; call sites never touch them directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cancel::CancellationSignal;
use crate::error::{Error, Result};

/// Errors within the reset window before the circuit opens
pub const MAX_ERRORS_PER_OPERATION: u32 = 5;

/// Idle gap after which an operation's error count resets
pub const ERROR_RESET_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Cooldown during which an open circuit rejects calls outright
pub const CIRCUIT_BREAKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Backoff configuration for retries inside [`ErrorRecoveryCoordinator::execute_operation`]
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Record of the most recent error for an operation
#[derive(Debug, Clone)]
pub struct ErrorState {
    pub operation: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Result of a recovery attempt
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl RecoveryOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failure() -> Self {
        Self {
            success: false,
            message: None,
        }
    }
}

/// A pluggable recovery capability registered per operation name
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    async fn recover(&self, error: &ErrorState) -> RecoveryOutcome;
}

/// Health of a single named operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationHealth {
    /// No recorded errors
    Healthy,
    /// Errors counted recently but none currently active
    Recovering,
    /// An active error, circuit still closed
    Degraded,
    /// Circuit open; calls are rejected
    Unavailable,
}

/// Aggregate health across all known operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemHealth {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

struct ErrorCounter {
    count: u32,
    last_error_at: Instant,
}

#[derive(Default)]
struct Inner {
    errors: HashMap<String, ErrorState>,
    counters: HashMap<String, ErrorCounter>,
}

/// Per-operation error counters, circuit breaker, and recovery strategies
pub struct ErrorRecoveryCoordinator {
    inner: Mutex<Inner>,
    strategies: Mutex<HashMap<String, Arc<dyn RecoveryStrategy>>>,
    retry: RetryConfig,
}

impl Default for ErrorRecoveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRecoveryCoordinator {
    /// Create a coordinator with default retry backoff
    pub fn new() -> Self {
        Self::with_retry_config(RetryConfig::default())
    }

    /// Create a coordinator with explicit retry backoff
    pub fn with_retry_config(retry: RetryConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            strategies: Mutex::new(HashMap::new()),
            retry,
        }
    }

    /// Register a recovery strategy for an operation name
    pub fn register_strategy(&self, operation: impl Into<String>, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.lock().insert(operation.into(), strategy);
    }

    /// Record an error and attempt registered recovery.
    ///
    /// Returns whether a strategy recovered. Recovery is skipped while the
    /// circuit is open; the counter still increments and the error is still
    /// recorded.
    pub async fn handle_error(
        &self,
        operation: &str,
        error: &Error,
        context: Option<serde_json::Value>,
    ) -> bool {
        let circuit_open = self.record(operation, error, context);
        if circuit_open {
            return false;
        }
        self.run_strategy(operation).await
    }

    /// Like [`handle_error`](Self::handle_error), but on successful recovery
    /// executes `action` and returns its result.
    pub async fn handle_error_with<F, Fut, T>(
        &self,
        operation: &str,
        error: &Error,
        context: Option<serde_json::Value>,
        action: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.handle_error(operation, error, context).await {
            Some(action().await)
        } else {
            None
        }
    }

    /// Execute an operation under the circuit breaker, a per-attempt
    /// timeout, and a transient-only retry loop.
    ///
    /// Cancellation, if observed, takes effect before any timeout or retry
    /// decision: a cancelled operation is neither retried nor counted as an
    /// error.
    pub async fn execute_operation<T, F, Fut>(
        &self,
        operation: &str,
        op: F,
        max_retries: u32,
        timeout: Duration,
        signal: Option<&CancellationSignal>,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.is_circuit_open(operation) {
            return Err(Error::ServiceUnavailable {
                operation: operation.to_string(),
            });
        }

        // A fresh attempt supersedes any stale recorded error.
        self.inner.lock().errors.remove(operation);

        let mut attempt = 0u32;
        loop {
            if signal.is_some_and(|s| s.is_cancelled()) {
                return Err(Error::Aborted);
            }

            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(Error::Timeout {
                    operation: operation.to_string(),
                }),
            };

            match result {
                Ok(value) => {
                    self.inner.lock().counters.remove(operation);
                    return Ok(value);
                }
                Err(e) => {
                    if signal.is_some_and(|s| s.is_cancelled()) {
                        return Err(Error::Aborted);
                    }
                    if e.is_transient() && attempt < max_retries {
                        let delay = self.retry.delay_for_attempt(attempt);
                        tracing::warn!(
                            operation,
                            attempt = attempt + 1,
                            max_retries,
                            "transient failure, retrying in {:?}: {}",
                            delay,
                            e
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    self.handle_error(operation, &e, None).await;
                    return Err(e);
                }
            }
        }
    }

    /// True iff the operation has reached the error threshold within the
    /// circuit-breaker cooldown.
    pub fn is_circuit_open(&self, operation: &str) -> bool {
        let inner = self.inner.lock();
        match inner.counters.get(operation) {
            Some(counter) => {
                counter.count >= MAX_ERRORS_PER_OPERATION
                    && counter.last_error_at.elapsed() < CIRCUIT_BREAKER_TIMEOUT
            }
            None => false,
        }
    }

    /// Health of a single named operation
    pub fn get_operation_health(&self, operation: &str) -> OperationHealth {
        if self.is_circuit_open(operation) {
            return OperationHealth::Unavailable;
        }
        let inner = self.inner.lock();
        if inner.errors.contains_key(operation) {
            OperationHealth::Degraded
        } else if inner.counters.get(operation).is_some_and(|c| c.count > 0) {
            OperationHealth::Recovering
        } else {
            OperationHealth::Healthy
        }
    }

    /// Aggregate health across all operations seen so far
    pub fn get_system_health(&self) -> SystemHealth {
        let operations = self.tracked_operations();
        let healths: Vec<OperationHealth> = operations
            .iter()
            .map(|name| self.get_operation_health(name))
            .collect();

        if healths.contains(&OperationHealth::Unavailable) {
            return SystemHealth::Critical;
        }
        let degraded = healths
            .iter()
            .filter(|h| **h == OperationHealth::Degraded)
            .count();
        if degraded * 2 > healths.len() {
            SystemHealth::Degraded
        } else if degraded > 0 {
            SystemHealth::Warning
        } else {
            SystemHealth::Healthy
        }
    }

    /// Error count currently recorded for an operation
    pub fn error_count(&self, operation: &str) -> u32 {
        self.inner
            .lock()
            .counters
            .get(operation)
            .map_or(0, |c| c.count)
    }

    /// Names of all operations with recorded errors or counters
    pub fn tracked_operations(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let names: HashSet<&String> = inner.counters.keys().chain(inner.errors.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Explicitly reset one operation, independent of the window-based reset
    pub fn clear_error(&self, operation: &str) {
        let mut inner = self.inner.lock();
        inner.errors.remove(operation);
        inner.counters.remove(operation);
    }

    /// Explicitly reset every operation
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.errors.clear();
        inner.counters.clear();
    }

    /// Increment the counter (resetting first after an idle window), record
    /// the error, and report whether the circuit is now open.
    fn record(&self, operation: &str, error: &Error, context: Option<serde_json::Value>) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let counter = inner
            .counters
            .entry(operation.to_string())
            .or_insert(ErrorCounter {
                count: 0,
                last_error_at: now,
            });
        if now.duration_since(counter.last_error_at) > ERROR_RESET_WINDOW {
            counter.count = 0;
        }
        counter.count += 1;
        counter.last_error_at = now;
        let count = counter.count;

        inner.errors.insert(
            operation.to_string(),
            ErrorState {
                operation: operation.to_string(),
                message: error.to_string(),
                occurred_at: Utc::now(),
            },
        );

        let context = context.map(|c| c.to_string()).unwrap_or_default();
        tracing::warn!(operation, count, context = %context, "operation error: {}", error);

        count >= MAX_ERRORS_PER_OPERATION
    }

    /// Run the registered strategy, clearing the stored error on success.
    async fn run_strategy(&self, operation: &str) -> bool {
        let strategy = self.strategies.lock().get(operation).cloned();
        let Some(strategy) = strategy else {
            return false;
        };
        let error_state = self.inner.lock().errors.get(operation).cloned();
        let Some(error_state) = error_state else {
            return false;
        };

        let outcome = strategy.recover(&error_state).await;
        if outcome.success {
            if let Some(message) = outcome.message {
                tracing::debug!(operation, "recovery succeeded: {}", message);
            }
            self.inner.lock().errors.remove(operation);
            true
        } else {
            false
        }
    }
}
