mod partitioned;
mod single;

pub use partitioned::PartitionedEventHandler;
pub use single::EventHandler;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::BusResult;
use crate::event::Event;
use crate::queue::{QueueInfo, QueueType};

/// A successful poll: the event, its delivery id and the handler that
/// served it (a partition name for partitioned queues).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub event: Event,
    pub delivery_id: Uuid,
    pub served_by: String,
}

/// What a timeout sweep decided for one expired delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Already pushed back onto the handler's own queue.
    Requeued,
    /// Must be pushed to `dead_letter_queue` by the caller.
    DeadLettered {
        dead_letter_queue: String,
        event: Event,
    },
    /// Retry limit reached; the event is gone.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub queue_name: String,
    pub delivery_id: Uuid,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub outcomes: Vec<SweepOutcome>,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.outcomes.extend(other.outcomes);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn requeued(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Requeued))
    }

    pub fn dead_lettered(&self) -> usize {
        self.count(|d| matches!(d, Disposition::DeadLettered { .. }))
    }

    pub fn dropped(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Dropped))
    }

    fn count(&self, pred: impl Fn(&Disposition) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.disposition)).count()
    }
}

/// The handler registered for a queue name: one buffer, or a fan-out over
/// several partition buffers.
#[derive(Clone)]
pub enum QueueHandler {
    Single(Arc<EventHandler>),
    Partitioned(Arc<PartitionedEventHandler>),
}

impl QueueHandler {
    pub fn name(&self) -> &str {
        match self {
            QueueHandler::Single(h) => h.name(),
            QueueHandler::Partitioned(h) => h.name(),
        }
    }

    pub fn queue_type(&self) -> QueueType {
        match self {
            QueueHandler::Single(h) => h.queue_type(),
            QueueHandler::Partitioned(h) => h.queue_type(),
        }
    }

    pub fn number_of_partitions(&self) -> usize {
        match self {
            QueueHandler::Single(_) => 1,
            QueueHandler::Partitioned(h) => h.number_of_partitions(),
        }
    }

    /// Child handlers. Empty for an unpartitioned queue.
    pub fn partitions(&self) -> Vec<Arc<EventHandler>> {
        match self {
            QueueHandler::Single(_) => Vec::new(),
            QueueHandler::Partitioned(h) => h.partitions(),
        }
    }

    /// Enqueue and return the name of the buffer that took the event.
    pub async fn push(
        &self,
        event: Event,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<String> {
        match self {
            QueueHandler::Single(h) => {
                h.push(event, log_event, cancel).await?;
                Ok(h.name().to_string())
            }
            QueueHandler::Partitioned(h) => h.push(event, log_event, cancel).await,
        }
    }

    pub async fn poll(
        &self,
        delivery_id: Option<Uuid>,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<Delivery> {
        match self {
            QueueHandler::Single(h) => h.poll(delivery_id, log_event, cancel).await,
            QueueHandler::Partitioned(h) => h.poll(delivery_id, log_event, cancel).await,
        }
    }

    pub async fn peek(&self, cancel: &CancellationToken) -> BusResult<Event> {
        match self {
            QueueHandler::Single(h) => h.peek(cancel).await,
            QueueHandler::Partitioned(h) => h.peek(cancel).await,
        }
    }

    /// Returns whether some buffer held the delivery.
    pub fn ack(&self, delivery_id: Uuid, log_event: bool) -> bool {
        match self {
            QueueHandler::Single(h) => h.ack(delivery_id, log_event),
            QueueHandler::Partitioned(h) => h.ack(delivery_id, log_event),
        }
    }

    pub fn pending_event(&self, delivery_id: Uuid) -> Option<Event> {
        match self {
            QueueHandler::Single(h) => h.pending_event(delivery_id),
            QueueHandler::Partitioned(h) => h.pending_event(delivery_id),
        }
    }

    pub async fn clear(&self, cancel: &CancellationToken) -> BusResult<()> {
        match self {
            QueueHandler::Single(h) => h.clear(cancel).await,
            QueueHandler::Partitioned(h) => h.clear(cancel).await,
        }
    }

    pub async fn count(&self, cancel: &CancellationToken) -> BusResult<usize> {
        match self {
            QueueHandler::Single(h) => h.count(cancel).await,
            QueueHandler::Partitioned(h) => h.count(cancel).await,
        }
    }

    pub fn unacked_count(&self) -> usize {
        match self {
            QueueHandler::Single(h) => h.unacked_count(),
            QueueHandler::Partitioned(h) => h.unacked_count(),
        }
    }

    pub async fn queue_info(&self, cancel: &CancellationToken) -> BusResult<QueueInfo> {
        match self {
            QueueHandler::Single(h) => h.queue_info(cancel).await,
            QueueHandler::Partitioned(h) => h.queue_info(cancel).await,
        }
    }

    pub async fn requeue_timed_out(&self, now: DateTime<Utc>) -> BusResult<SweepReport> {
        match self {
            QueueHandler::Single(h) => h.requeue_timed_out(now).await,
            QueueHandler::Partitioned(h) => h.requeue_timed_out(now).await,
        }
    }
}
