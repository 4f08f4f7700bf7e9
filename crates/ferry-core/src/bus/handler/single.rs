use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::{Delivery, Disposition, SweepOutcome, SweepReport};
use crate::bus::fifo::EventQueue;
use crate::bus::pending::PendingAcks;
use crate::error::{BusError, BusResult};
use crate::event::Event;
use crate::headers;
use crate::journal::{append_or_log, EventJournal, JournalRecord};
use crate::queue::{partition_name, PartitionStats, QueueInfo, QueueType};

/// One FIFO buffer plus its pending-ack store, bound to one queue or
/// partition name.
pub struct EventHandler {
    name: String,
    queue_type: QueueType,
    ack_timeout: u32,
    /// Where flagged deliveries go when their ack window closes. Set only
    /// for live queues and their partitions.
    dead_letter_queue: Option<String>,
    queue: Arc<EventQueue>,
    pending: Arc<Mutex<PendingAcks>>,
    journal: Arc<dyn EventJournal>,
}

impl EventHandler {
    pub fn new(
        name: impl Into<String>,
        queue_type: QueueType,
        ack_timeout: u32,
        dead_letter_queue: Option<String>,
        journal: Arc<dyn EventJournal>,
    ) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(EventQueue::new()),
            pending: Arc::new(Mutex::new(PendingAcks::new(ack_timeout))),
            queue_type,
            ack_timeout,
            dead_letter_queue,
            journal,
        }
    }

    /// Partition `index` of this queue, backed by the same buffer and
    /// pending store. A single-buffer queue that is scaled keeps its events
    /// this way while every partition still gets its own name.
    pub fn as_partition(&self, index: usize) -> Self {
        Self {
            name: partition_name(&self.name, index),
            queue_type: QueueType::Partition,
            ack_timeout: self.ack_timeout,
            dead_letter_queue: self.dead_letter_queue.clone(),
            queue: Arc::clone(&self.queue),
            pending: Arc::clone(&self.pending),
            journal: Arc::clone(&self.journal),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn ack_timeout(&self) -> u32 {
        self.ack_timeout
    }

    pub fn dead_letter_queue(&self) -> Option<&str> {
        self.dead_letter_queue.as_deref()
    }

    pub(crate) fn journal(&self) -> &Arc<dyn EventJournal> {
        &self.journal
    }

    pub async fn push(
        &self,
        event: Event,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        let record = log_event.then(|| JournalRecord::Push {
            queue_name: self.name.clone(),
            event: event.clone(),
        });
        self.queue.push(event, cancel).await?;
        if let Some(record) = record {
            append_or_log(self.journal.as_ref(), &record);
        }
        Ok(())
    }

    /// Dequeue the head and register it as pending under `delivery_id`, or a
    /// fresh v4 id when none is given.
    pub async fn poll(
        &self,
        delivery_id: Option<Uuid>,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<Delivery> {
        let event = self
            .queue
            .poll(cancel)
            .await?
            .ok_or_else(|| BusError::NoEventFound(self.name.clone()))?;
        let delivery_id = delivery_id.unwrap_or_else(Uuid::new_v4);
        self.pending.lock().add_event(delivery_id, event.clone());

        if log_event {
            append_or_log(
                self.journal.as_ref(),
                &JournalRecord::Poll {
                    queue_name: self.name.clone(),
                    delivery_id,
                },
            );
        }
        Ok(Delivery {
            event,
            delivery_id,
            served_by: self.name.clone(),
        })
    }

    pub async fn peek(&self, cancel: &CancellationToken) -> BusResult<Event> {
        self.queue
            .peek(cancel)
            .await?
            .ok_or_else(|| BusError::NoEventFound(self.name.clone()))
    }

    /// Unknown ids are a no-op. Only an ack that removed something is
    /// journaled.
    pub fn ack(&self, delivery_id: Uuid, log_event: bool) -> bool {
        let removed = self.pending.lock().remove_event(delivery_id);
        if removed && log_event {
            append_or_log(
                self.journal.as_ref(),
                &JournalRecord::Ack {
                    queue_name: self.name.clone(),
                    delivery_id,
                },
            );
        }
        removed
    }

    pub fn pending_event(&self, delivery_id: Uuid) -> Option<Event> {
        self.pending.lock().get_event(delivery_id).ok()
    }

    pub fn is_pending(&self, delivery_id: Uuid) -> bool {
        self.pending.lock().contains_event(delivery_id)
    }

    /// Empties the buffer. Outstanding deliveries stay pending.
    pub async fn clear(&self, cancel: &CancellationToken) -> BusResult<()> {
        self.queue.clear(cancel).await
    }

    pub async fn count(&self, cancel: &CancellationToken) -> BusResult<usize> {
        self.queue.count(cancel).await
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.lock().count()
    }

    pub async fn stats(&self, cancel: &CancellationToken) -> BusResult<PartitionStats> {
        Ok(PartitionStats {
            number_of_elements: self.count(cancel).await?,
            un_acked_poll_events: self.unacked_count(),
        })
    }

    pub async fn queue_info(&self, cancel: &CancellationToken) -> BusResult<QueueInfo> {
        let mut partitions = BTreeMap::new();
        partitions.insert(self.name.clone(), self.stats(cancel).await?);
        Ok(QueueInfo {
            queue_name: self.name.clone(),
            ack_timeout: self.ack_timeout,
            number_of_partitions: 1,
            queue_type: self.queue_type,
            partitions,
        })
    }

    /// Evict expired deliveries and decide what happens to each.
    ///
    /// Flagged events on a live queue are handed back for dead-lettering with
    /// the flag cleared. Everything else is re-pushed here with its timeout
    /// counter bumped, or dropped once the retry limit is reached. Re-pushes
    /// are not journaled: replaying the original poll recreates the pending
    /// entry, which times out again.
    pub async fn requeue_timed_out(&self, now: DateTime<Utc>) -> BusResult<SweepReport> {
        let expired = self.pending.lock().get_and_remove_timed_out_events(now);
        if expired.is_empty() {
            return Ok(SweepReport::default());
        }

        // the deliveries are already out of the store; finish regardless of callers
        let uncancellable = CancellationToken::new();
        let mut report = SweepReport::default();
        for delivery in expired {
            let mut event = delivery.event;
            let disposition = match &self.dead_letter_queue {
                Some(dlq) if headers::send_to_dlq_after_ack_timeout(&event) => {
                    headers::clear_send_to_dlq(&mut event);
                    Disposition::DeadLettered {
                        dead_letter_queue: dlq.clone(),
                        event,
                    }
                }
                _ if headers::should_be_requeued(&event) => {
                    headers::record_ack_timeout(&mut event, now);
                    self.queue.push(event, &uncancellable).await?;
                    Disposition::Requeued
                }
                _ => Disposition::Dropped,
            };
            debug!(
                queue = %self.name,
                delivery_id = %delivery.delivery_id,
                ?disposition,
                "ack timeout expired"
            );
            report.outcomes.push(SweepOutcome {
                queue_name: self.name.clone(),
                delivery_id: delivery.delivery_id,
                disposition,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::DisabledJournal;
    use chrono::Duration;

    fn handler(dead_letter_queue: Option<&str>) -> EventHandler {
        EventHandler::new(
            "q",
            QueueType::Queue,
            1,
            dead_letter_queue.map(str::to_string),
            Arc::new(DisabledJournal),
        )
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + Duration::minutes(2)
    }

    #[tokio::test]
    async fn poll_registers_pending_delivery() {
        let cancel = CancellationToken::new();
        let h = handler(None);
        h.push(Event::new("k", "b"), false, &cancel).await.unwrap();

        let delivery = h.poll(None, false, &cancel).await.unwrap();
        assert_eq!(delivery.served_by, "q");
        assert!(h.is_pending(delivery.delivery_id));
        assert_eq!(h.unacked_count(), 1);
        assert_eq!(h.count(&cancel).await.unwrap(), 0);

        assert!(h.ack(delivery.delivery_id, false));
        assert!(!h.ack(delivery.delivery_id, false));
        assert_eq!(h.unacked_count(), 0);
    }

    #[tokio::test]
    async fn poll_keeps_a_supplied_delivery_id() {
        let cancel = CancellationToken::new();
        let h = handler(None);
        h.push(Event::default(), false, &cancel).await.unwrap();
        let id = Uuid::new_v4();
        let delivery = h.poll(Some(id), false, &cancel).await.unwrap();
        assert_eq!(delivery.delivery_id, id);
        assert!(h.pending_event(id).is_some());
    }

    #[tokio::test]
    async fn empty_poll_creates_no_delivery() {
        let cancel = CancellationToken::new();
        let h = handler(None);
        assert!(matches!(
            h.poll(None, false, &cancel).await,
            Err(BusError::NoEventFound(_))
        ));
        assert_eq!(h.unacked_count(), 0);
    }

    #[tokio::test]
    async fn clear_keeps_outstanding_deliveries() {
        let cancel = CancellationToken::new();
        let h = handler(None);
        h.push(Event::new("a", ""), false, &cancel).await.unwrap();
        h.push(Event::new("b", ""), false, &cancel).await.unwrap();
        h.poll(None, false, &cancel).await.unwrap();

        h.clear(&cancel).await.unwrap();
        let info = h.queue_info(&cancel).await.unwrap();
        assert_eq!(info.number_of_elements(), 0);
        assert_eq!(info.un_acked_poll_events(), 1);
    }

    #[tokio::test]
    async fn sweep_requeues_with_bumped_counter() {
        let cancel = CancellationToken::new();
        let h = handler(Some("q-DLQ"));
        let mut event = Event::new("k", "b");
        headers::add_default_headers(&mut event, Utc::now());
        h.push(event, false, &cancel).await.unwrap();
        h.poll(None, false, &cancel).await.unwrap();

        let report = h.requeue_timed_out(later()).await.unwrap();
        assert_eq!(report.requeued(), 1);
        assert_eq!(h.unacked_count(), 0);

        let again = h.poll(None, false, &cancel).await.unwrap();
        assert_eq!(headers::current_ack_timeouts(&again.event), 1);
    }

    #[tokio::test]
    async fn sweep_hands_flagged_event_back_for_dead_lettering() {
        let cancel = CancellationToken::new();
        let h = handler(Some("q-DLQ"));
        let event = Event::new("k", "b").with_header(headers::SEND_TO_DLQ_AFTER_ACK_TIMEOUT, "true");
        h.push(event, false, &cancel).await.unwrap();
        let delivery = h.poll(None, false, &cancel).await.unwrap();

        let report = h.requeue_timed_out(later()).await.unwrap();
        assert_eq!(report.dead_lettered(), 1);
        match &report.outcomes[0].disposition {
            Disposition::DeadLettered {
                dead_letter_queue,
                event,
            } => {
                assert_eq!(dead_letter_queue, "q-DLQ");
                assert!(!headers::send_to_dlq_after_ack_timeout(event));
            }
            other => panic!("expected dead letter, got {other:?}"),
        }
        assert_eq!(report.outcomes[0].delivery_id, delivery.delivery_id);
        assert_eq!(h.count(&cancel).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn flag_is_ignored_without_a_dead_letter_queue() {
        let cancel = CancellationToken::new();
        let h = handler(None);
        let event = Event::default().with_header(headers::SEND_TO_DLQ_AFTER_ACK_TIMEOUT, "true");
        h.push(event, false, &cancel).await.unwrap();
        h.poll(None, false, &cancel).await.unwrap();

        let report = h.requeue_timed_out(later()).await.unwrap();
        assert_eq!(report.requeued(), 1);
        assert_eq!(h.count(&cancel).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_drops_event_at_retry_limit() {
        let cancel = CancellationToken::new();
        let h = handler(None);
        let event = Event::default()
            .with_header(headers::MAX_NUMBER_OF_ACK_TIMEOUTS, "1")
            .with_header(headers::CURRENT_NUMBER_OF_ACK_TIMEOUTS, "1");
        h.push(event, false, &cancel).await.unwrap();
        h.poll(None, false, &cancel).await.unwrap();

        let report = h.requeue_timed_out(later()).await.unwrap();
        assert_eq!(report.dropped(), 1);
        assert_eq!(h.count(&cancel).await.unwrap(), 0);
        assert_eq!(h.unacked_count(), 0);
    }

    #[tokio::test]
    async fn sweep_before_deadline_is_a_no_op() {
        let cancel = CancellationToken::new();
        let h = handler(None);
        h.push(Event::default(), false, &cancel).await.unwrap();
        h.poll(None, false, &cancel).await.unwrap();

        let report = h.requeue_timed_out(Utc::now()).await.unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(h.unacked_count(), 1);
    }
}
