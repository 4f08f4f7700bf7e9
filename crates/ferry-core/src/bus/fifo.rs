use std::collections::VecDeque;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{BusError, BusResult};
use crate::event::Event;

/// Wait for `lock`, giving up if `cancel` fires first. The guard is the only
/// way to reach the data, so an abandoned wait leaves nothing half-acquired.
pub(crate) async fn acquire<'a, T>(
    lock: &'a Mutex<T>,
    cancel: &CancellationToken,
) -> BusResult<MutexGuard<'a, T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BusError::Cancelled),
        guard = lock.lock() => Ok(guard),
    }
}

/// Unbounded FIFO buffer behind a single gate. Empty reads give `None`;
/// the owning handler turns that into an error naming itself.
#[derive(Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, event: Event, cancel: &CancellationToken) -> BusResult<()> {
        acquire(&self.events, cancel).await?.push_back(event);
        Ok(())
    }

    pub async fn poll(&self, cancel: &CancellationToken) -> BusResult<Option<Event>> {
        Ok(acquire(&self.events, cancel).await?.pop_front())
    }

    pub async fn peek(&self, cancel: &CancellationToken) -> BusResult<Option<Event>> {
        Ok(acquire(&self.events, cancel).await?.front().cloned())
    }

    pub async fn count(&self, cancel: &CancellationToken) -> BusResult<usize> {
        Ok(acquire(&self.events, cancel).await?.len())
    }

    pub async fn clear(&self, cancel: &CancellationToken) -> BusResult<()> {
        acquire(&self.events, cancel).await?.clear();
        Ok(())
    }
}
