use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::{Delivery, EventHandler, SweepReport};
use crate::error::{BusError, BusResult};
use crate::event::Event;
use crate::journal::EventJournal;
use crate::queue::{partition_name, QueueInfo, QueueType};

/// Spreads one logical queue over N child handlers.
///
/// Push, poll and peek each keep their own round-robin counter behind their
/// own lock. Counters survive rescaling.
pub struct PartitionedEventHandler {
    name: String,
    queue_type: QueueType,
    ack_timeout: u32,
    dead_letter_queue: Option<String>,
    journal: Arc<dyn EventJournal>,
    partitions: RwLock<Vec<Arc<EventHandler>>>,
    write_counter: Mutex<usize>,
    read_counter: Mutex<usize>,
    peek_counter: Mutex<usize>,
}

impl PartitionedEventHandler {
    pub fn new(
        name: impl Into<String>,
        queue_type: QueueType,
        ack_timeout: u32,
        number_of_partitions: usize,
        dead_letter_queue: Option<String>,
        journal: Arc<dyn EventJournal>,
    ) -> Self {
        let handler = Self::with_partitions(
            name.into(),
            queue_type,
            ack_timeout,
            dead_letter_queue,
            journal,
            Vec::new(),
        );
        handler.partitions.write().extend(handler.spawn_partitions(0, number_of_partitions));
        handler
    }

    /// Take over an unpartitioned handler. Its buffered and pending events
    /// become partition 0, named like any other partition so that pushes it
    /// serves are journaled and replicated to that partition.
    pub fn adopt(existing: &EventHandler) -> Self {
        Self::with_partitions(
            existing.name().to_string(),
            existing.queue_type(),
            existing.ack_timeout(),
            existing.dead_letter_queue().map(str::to_string),
            Arc::clone(existing.journal()),
            vec![Arc::new(existing.as_partition(0))],
        )
    }

    fn with_partitions(
        name: String,
        queue_type: QueueType,
        ack_timeout: u32,
        dead_letter_queue: Option<String>,
        journal: Arc<dyn EventJournal>,
        partitions: Vec<Arc<EventHandler>>,
    ) -> Self {
        Self {
            name,
            queue_type,
            ack_timeout,
            dead_letter_queue,
            journal,
            partitions: RwLock::new(partitions),
            write_counter: Mutex::new(0),
            read_counter: Mutex::new(0),
            peek_counter: Mutex::new(0),
        }
    }

    fn spawn_partitions(&self, from: usize, to: usize) -> Vec<Arc<EventHandler>> {
        (from..to)
            .map(|i| {
                Arc::new(EventHandler::new(
                    partition_name(&self.name, i),
                    QueueType::Partition,
                    self.ack_timeout,
                    self.dead_letter_queue.clone(),
                    Arc::clone(&self.journal),
                ))
            })
            .collect()
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

    pub fn number_of_partitions(&self) -> usize {
        self.partitions.read().len()
    }

    pub fn partitions(&self) -> Vec<Arc<EventHandler>> {
        self.partitions.read().clone()
    }

    fn next(counter: &Mutex<usize>, len: usize) -> usize {
        let mut counter = counter.lock();
        let index = *counter % len;
        *counter = counter.wrapping_add(1);
        index
    }

    pub async fn push(
        &self,
        event: Event,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<String> {
        let partitions = self.partitions();
        let target = &partitions[Self::next(&self.write_counter, partitions.len())];
        target.push(event, log_event, cancel).await?;
        Ok(target.name().to_string())
    }

    /// Starts at the next partition in turn and walks all of them once.
    pub async fn poll(
        &self,
        delivery_id: Option<Uuid>,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<Delivery> {
        let partitions = self.partitions();
        let start = Self::next(&self.read_counter, partitions.len());
        for offset in 0..partitions.len() {
            let partition = &partitions[(start + offset) % partitions.len()];
            match partition.poll(delivery_id, log_event, cancel).await {
                Err(BusError::NoEventFound(_)) => continue,
                other => return other,
            }
        }
        Err(BusError::NoEventFound(self.name.clone()))
    }

    pub async fn peek(&self, cancel: &CancellationToken) -> BusResult<Event> {
        let partitions = self.partitions();
        let start = Self::next(&self.peek_counter, partitions.len());
        for offset in 0..partitions.len() {
            let partition = &partitions[(start + offset) % partitions.len()];
            match partition.peek(cancel).await {
                Err(BusError::NoEventFound(_)) => continue,
                other => return other,
            }
        }
        Err(BusError::NoEventFound(self.name.clone()))
    }

    /// Broadcast: only the partition that issued the id holds it.
    pub fn ack(&self, delivery_id: Uuid, log_event: bool) -> bool {
        self.partitions()
            .iter()
            .fold(false, |removed, p| p.ack(delivery_id, log_event) || removed)
    }

    pub fn pending_event(&self, delivery_id: Uuid) -> Option<Event> {
        self.partitions()
            .iter()
            .find_map(|p| p.pending_event(delivery_id))
    }

    pub async fn clear(&self, cancel: &CancellationToken) -> BusResult<()> {
        for partition in self.partitions() {
            partition.clear(cancel).await?;
        }
        Ok(())
    }

    pub async fn count(&self, cancel: &CancellationToken) -> BusResult<usize> {
        let mut total = 0;
        for partition in self.partitions() {
            total += partition.count(cancel).await?;
        }
        Ok(total)
    }

    pub fn unacked_count(&self) -> usize {
        self.partitions().iter().map(|p| p.unacked_count()).sum()
    }

    pub async fn queue_info(&self, cancel: &CancellationToken) -> BusResult<QueueInfo> {
        let partitions = self.partitions();
        let mut stats = BTreeMap::new();
        for partition in &partitions {
            stats.insert(partition.name().to_string(), partition.stats(cancel).await?);
        }
        Ok(QueueInfo {
            queue_name: self.name.clone(),
            ack_timeout: self.ack_timeout,
            number_of_partitions: partitions.len(),
            queue_type: self.queue_type,
            partitions: stats,
        })
    }

    pub async fn requeue_timed_out(&self, now: DateTime<Utc>) -> BusResult<SweepReport> {
        let mut report = SweepReport::default();
        for partition in self.partitions() {
            report.merge(partition.requeue_timed_out(now).await?);
        }
        Ok(report)
    }

    /// Grow to `number_of_partitions` and return the new children. The caller
    /// registers them; the dispatcher does both under one registry lock.
    pub fn scale_number_of_partitions(
        &self,
        number_of_partitions: usize,
    ) -> BusResult<Vec<Arc<EventHandler>>> {
        let mut partitions = self.partitions.write();
        let current = partitions.len();
        if number_of_partitions <= current {
            return Err(BusError::InvalidOperation(format!(
                "queue {} has {current} partitions; partitions can only be increased",
                self.name
            )));
        }
        let added = self.spawn_partitions(current, number_of_partitions);
        partitions.extend(added.iter().cloned());
        info!(
            queue = %self.name,
            from = current,
            to = number_of_partitions,
            "scaled partitions"
        );
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::DisabledJournal;

    fn handler(n: usize) -> PartitionedEventHandler {
        PartitionedEventHandler::new(
            "orders",
            QueueType::Queue,
            1,
            n,
            Some("orders-DLQ".to_string()),
            Arc::new(DisabledJournal),
        )
    }

    #[tokio::test]
    async fn pushes_round_robin_across_partitions() {
        let cancel = CancellationToken::new();
        let h = handler(3);
        let mut served = Vec::new();
        for i in 0..3u8 {
            served.push(h.push(Event::new(vec![i], vec![]), false, &cancel).await.unwrap());
        }
        assert_eq!(
            served,
            vec!["orders-partition0", "orders-partition1", "orders-partition2"]
        );

        let info = h.queue_info(&cancel).await.unwrap();
        assert_eq!(info.number_of_partitions, 3);
        assert!(info.partitions.values().all(|p| p.number_of_elements == 1));
        assert_eq!(info.number_of_elements(), 3);
    }

    #[tokio::test]
    async fn poll_walks_past_empty_partitions() {
        let cancel = CancellationToken::new();
        let h = handler(3);
        // advances the read counter to partition1
        assert!(h.poll(None, false, &cancel).await.is_err());
        h.partitions()[0]
            .push(Event::new("only", ""), false, &cancel)
            .await
            .unwrap();

        let delivery = h.poll(None, false, &cancel).await.unwrap();
        assert_eq!(delivery.served_by, "orders-partition0");
        assert_eq!(delivery.event.key, b"only");
    }

    #[tokio::test]
    async fn poll_of_all_empty_partitions_reports_the_parent() {
        let cancel = CancellationToken::new();
        let h = handler(2);
        assert!(matches!(
            h.poll(None, false, &cancel).await,
            Err(BusError::NoEventFound(name)) if name == "orders"
        ));
        assert!(matches!(
            h.peek(&cancel).await,
            Err(BusError::NoEventFound(_))
        ));
    }

    #[tokio::test]
    async fn ack_finds_the_issuing_partition() {
        let cancel = CancellationToken::new();
        let h = handler(3);
        h.push(Event::new("a", ""), false, &cancel).await.unwrap();
        let delivery = h.poll(None, false, &cancel).await.unwrap();

        assert_eq!(h.unacked_count(), 1);
        assert!(h.pending_event(delivery.delivery_id).is_some());
        assert!(h.ack(delivery.delivery_id, false));
        assert!(!h.ack(delivery.delivery_id, false));
        assert_eq!(h.unacked_count(), 0);
    }

    #[tokio::test]
    async fn scale_only_grows_and_keeps_counters() {
        let cancel = CancellationToken::new();
        let h = handler(2);
        assert!(matches!(
            h.scale_number_of_partitions(2),
            Err(BusError::InvalidOperation(_))
        ));
        assert!(matches!(
            h.scale_number_of_partitions(1),
            Err(BusError::InvalidOperation(_))
        ));

        h.push(Event::default(), false, &cancel).await.unwrap();
        h.push(Event::default(), false, &cancel).await.unwrap();
        let added = h.scale_number_of_partitions(4).unwrap();
        let names: Vec<&str> = added.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["orders-partition2", "orders-partition3"]);
        assert!(added.iter().all(|p| p.dead_letter_queue() == Some("orders-DLQ")));

        // write counter is at 2, so the next push lands in a new partition
        let served = h.push(Event::default(), false, &cancel).await.unwrap();
        assert_eq!(served, "orders-partition2");
        assert_eq!(h.number_of_partitions(), 4);
    }

    #[tokio::test]
    async fn adopted_handler_keeps_its_events() {
        let cancel = CancellationToken::new();
        let single = Arc::new(EventHandler::new(
            "solo",
            QueueType::Queue,
            1,
            Some("solo-DLQ".to_string()),
            Arc::new(DisabledJournal),
        ));
        single.push(Event::new("kept", ""), false, &cancel).await.unwrap();

        let h = PartitionedEventHandler::adopt(&single);
        assert_eq!(h.queue_type(), QueueType::Queue);
        let added = h.scale_number_of_partitions(3).unwrap();
        assert_eq!(added[0].name(), "solo-partition1");
        let names: Vec<_> = h.partitions().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["solo-partition0", "solo-partition1", "solo-partition2"]);
        assert_eq!(h.partitions()[0].queue_type(), QueueType::Partition);

        let delivery = h.poll(None, false, &cancel).await.unwrap();
        assert_eq!(delivery.served_by, "solo-partition0");
        assert_eq!(delivery.event.key, b"kept");
        assert!(single.is_pending(delivery.delivery_id));
    }
}
