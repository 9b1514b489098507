//! Concurrency gate for inference executions.
//!
//! Bounds the number of inference calls running at once across all
//! connections. Acquiring waits for as long as it takes; there is no queue
//! timeout, so sustained overload shows up as sessions waiting here.

use gateway_core::GatewayError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Process-wide pool of inference permits
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    capacity: u32,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    /// Create a gate allowing `capacity` concurrent executions
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
        }
    }

    /// Wait for a permit.
    ///
    /// The permit is released when dropped.
    ///
    /// # Errors
    /// Returns an internal error only if the gate has been closed
    pub async fn acquire(&self) -> Result<ConcurrencyPermit, GatewayError> {
        if self.semaphore.available_permits() == 0 {
            debug!(
                capacity = self.capacity,
                "Concurrency gate at capacity, waiting for a permit"
            );
        }

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::internal("Concurrency gate closed"))?;

        debug!(
            in_flight = self.in_flight(),
            capacity = self.capacity,
            "Concurrency permit acquired"
        );

        Ok(ConcurrencyPermit { _permit: permit })
    }

    /// Take a permit only if one is free right now
    #[must_use]
    pub fn try_acquire(&self) -> Option<ConcurrencyPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| ConcurrencyPermit { _permit: permit })
    }

    /// Configured maximum
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of free permits
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of outstanding permits
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        let available = self.semaphore.available_permits() as u32;
        self.capacity.saturating_sub(available)
    }

    /// Whether every permit is taken
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.available_permits() == 0
    }
}

/// Right to run one inference execution.
///
/// Released automatically when dropped.
#[derive(Debug)]
pub struct ConcurrencyPermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        debug!("Concurrency permit released");
    }
}
