use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Returned by [`DispatchLimiter::acquire`] when the wait was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Counting gate that caps how many processors run at once.
#[derive(Debug, Clone)]
pub struct DispatchLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Permission to run one processor. The slot goes back to the limiter when
/// this is dropped or [`released`](DispatchSlot::release), whichever comes first.
#[derive(Debug)]
pub struct DispatchSlot {
    permit: Option<OwnedSemaphorePermit>,
}

impl DispatchSlot {
    pub fn release(&mut self) {
        self.permit.take();
    }
}

impl DispatchLimiter {
    /// Largest capacity the limiter can both grant and drain in one go.
    pub const MAX_CAPACITY: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
        Semaphore::MAX_PERMITS
    } else {
        u32::MAX as usize
    };

    /// Capacity is clamped to `1..=MAX_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Self::MAX_CAPACITY);
        DispatchLimiter {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Waits for a free slot, giving up as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<DispatchSlot, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            permit = self.semaphore.clone().acquire_owned() => permit
                .map(|p| DispatchSlot { permit: Some(p) })
                .map_err(|_| Cancelled),
        }
    }

    /// Resolves once every slot has been returned.
    pub async fn drain(&self) {
        let all_slots = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        // Errs only on a closed semaphore, and this one is never closed.
        if let Ok(all) = self.semaphore.acquire_many(all_slots).await {
            drop(all);
        }
    }
}
