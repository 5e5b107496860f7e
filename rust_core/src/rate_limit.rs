//! Process-wide cap on concurrent catalog calls.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of catalog calls allowed in flight at once.
pub const CONCURRENT_API_CALLS_LIMIT: usize = 16;

/// Counting semaphore handed to every enricher. Clones share the same
/// permits.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot; released on drop.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot. `None` once the limiter has been closed.
    pub async fn acquire(&self) -> Option<Slot> {
        let permit = self.permits.clone().acquire_owned().await.ok()?;
        Some(Slot { _permit: permit })
    }

    /// Wakes every waiter with `None` and refuses new acquisitions.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(CONCURRENT_API_CALLS_LIMIT)
    }
}
