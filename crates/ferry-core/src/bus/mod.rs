pub mod config;
pub mod dispatcher;
pub mod fifo;
pub mod handler;
pub mod metrics;
pub mod pending;
pub mod sweeper;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cluster::{Leadership, StaticLeadership};
use crate::error::{BusError, BusResult};
use crate::event::{Event, PolledEvent};
use crate::journal::{append_or_log, DisabledJournal, EventJournal, JournalRecord};
use crate::queue::{
    dead_letter_queue_name, QueueInfo, QueueType, MAX_ACK_TIMEOUT_MINUTES, MAX_PARTITIONS,
    MAX_QUEUE_NAME_LENGTH,
};
use crate::replication::{NoopReplicator, ReplicatedOperation, Replicator};
use config::EventLimits;
use dispatcher::Dispatcher;
use handler::{Disposition, EventHandler, PartitionedEventHandler, QueueHandler, SweepReport};
use metrics::Metrics;

/// Entry point for every queue operation.
///
/// Validates input, owns the queue/DLQ naming convention, keeps each queue
/// paired with its dead-letter queue, and forwards mutations to followers
/// when this node leads. `log_event` is false while replaying the journal;
/// such calls neither journal nor replicate.
pub struct EventBus {
    dispatcher: Dispatcher,
    limits: EventLimits,
    journal: Arc<dyn EventJournal>,
    replicator: Arc<dyn Replicator>,
    leadership: Arc<dyn Leadership>,
    metrics: Arc<Metrics>,
}

impl EventBus {
    pub fn new(limits: EventLimits) -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            limits,
            journal: Arc::new(DisabledJournal),
            replicator: Arc::new(NoopReplicator),
            leadership: Arc::new(StaticLeadership::new(true)),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Must be set before any queue is created; handlers capture it.
    pub fn with_journal(mut self, journal: Arc<dyn EventJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_replicator(mut self, replicator: Arc<dyn Replicator>) -> Self {
        self.replicator = replicator;
        self
    }

    pub fn with_leadership(mut self, leadership: Arc<dyn Leadership>) -> Self {
        self.leadership = leadership;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    pub fn journal(&self) -> &Arc<dyn EventJournal> {
        &self.journal
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn limits(&self) -> EventLimits {
        self.limits
    }

    pub fn is_leader(&self) -> bool {
        self.leadership.is_leader()
    }

    #[tracing::instrument(skip_all, fields(queue = %name))]
    pub async fn create_queue(
        &self,
        name: &str,
        ack_timeout: u32,
        number_of_partitions: usize,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        validate_queue_name(name)?;
        validate_ack_timeout(ack_timeout)?;
        validate_partitions(number_of_partitions)?;
        ensure_not_cancelled(cancel)?;

        let dlq = dead_letter_queue_name(name);
        let mut entries = self.build_handlers(
            name,
            QueueType::Queue,
            ack_timeout,
            number_of_partitions,
            Some(dlq.clone()),
        );
        entries.extend(self.build_handlers(
            &dlq,
            QueueType::DeadLetterQueue,
            ack_timeout,
            number_of_partitions,
            None,
        ));
        self.dispatcher.add_event_handlers(entries)?;

        // the DLQ is recreated from this record on replay; it never gets its own
        if log_event {
            append_or_log(
                self.journal.as_ref(),
                &JournalRecord::CreateQueue {
                    queue_name: name.to_string(),
                    number_of_partitions,
                    ack_timeout,
                },
            );
        }
        info!(ack_timeout, partitions = number_of_partitions, %dlq, "created queue");

        self.replicate(
            log_event,
            ReplicatedOperation::CreateQueue {
                queue_name: name.to_string(),
                number_of_partitions,
                ack_timeout,
            },
        )
        .await;
        Ok(())
    }

    fn build_handlers(
        &self,
        name: &str,
        queue_type: QueueType,
        ack_timeout: u32,
        number_of_partitions: usize,
        dead_letter_queue: Option<String>,
    ) -> Vec<(QueueHandler, QueueType)> {
        if number_of_partitions == 1 {
            let handler = EventHandler::new(
                name,
                queue_type,
                ack_timeout,
                dead_letter_queue,
                Arc::clone(&self.journal),
            );
            return vec![(QueueHandler::Single(Arc::new(handler)), queue_type)];
        }

        let handler = Arc::new(PartitionedEventHandler::new(
            name,
            queue_type,
            ack_timeout,
            number_of_partitions,
            dead_letter_queue,
            Arc::clone(&self.journal),
        ));
        let mut entries = vec![(QueueHandler::Partitioned(Arc::clone(&handler)), queue_type)];
        entries.extend(
            handler
                .partitions()
                .into_iter()
                .map(|p| (QueueHandler::Single(p), QueueType::Partition)),
        );
        entries
    }

    /// Deletes the queue with its partitions and its DLQ. DLQs and
    /// partitions cannot be deleted on their own.
    #[tracing::instrument(skip_all, fields(queue = %name))]
    pub async fn delete_queue(
        &self,
        name: &str,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        require_name(name)?;
        ensure_not_cancelled(cancel)?;

        self.dispatcher
            .remove_queue(name, &dead_letter_queue_name(name))?;
        if log_event {
            append_or_log(
                self.journal.as_ref(),
                &JournalRecord::DeleteQueue {
                    queue_name: name.to_string(),
                },
            );
        }
        info!("deleted queue");

        self.replicate(
            log_event,
            ReplicatedOperation::DeleteQueue {
                queue_name: name.to_string(),
            },
        )
        .await;
        Ok(())
    }

    /// Grows a live queue and its DLQ to `number_of_partitions`.
    #[tracing::instrument(skip_all, fields(queue = %name))]
    pub async fn scale_partitions(
        &self,
        name: &str,
        number_of_partitions: usize,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        require_name(name)?;
        validate_partitions(number_of_partitions)?;
        ensure_not_cancelled(cancel)?;

        self.dispatcher
            .scale_queue(name, &dead_letter_queue_name(name), number_of_partitions)?;
        if log_event {
            append_or_log(
                self.journal.as_ref(),
                &JournalRecord::ScalePartitions {
                    queue_name: name.to_string(),
                    number_of_partitions,
                },
            );
        }
        info!(partitions = number_of_partitions, "scaled queue");

        self.replicate(
            log_event,
            ReplicatedOperation::ScalePartitions {
                queue_name: name.to_string(),
                number_of_partitions,
            },
        )
        .await;
        Ok(())
    }

    /// Enqueue `event` as given; header defaults are the caller's business.
    pub async fn push_event(
        &self,
        name: &str,
        event: Event,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        require_name(name)?;
        self.validate_event(&event)?;

        let replica = self.should_replicate(log_event).then(|| event.clone());
        let served_by = self.dispatcher.push(name, event, log_event, cancel).await?;
        self.metrics.record_push(name);
        debug!(queue = %name, %served_by, "pushed event");

        if let Some(event) = replica {
            self.replicate(
                log_event,
                ReplicatedOperation::Push {
                    queue_name: served_by,
                    event,
                },
            )
            .await;
        }
        Ok(())
    }

    pub async fn poll(
        &self,
        name: &str,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<PolledEvent> {
        self.poll_with_delivery_id(name, None, log_event, cancel)
            .await
    }

    /// Poll registering the delivery under `delivery_id` when given. Journal
    /// replay and replicated polls use this so acks keep matching.
    pub async fn poll_with_delivery_id(
        &self,
        name: &str,
        delivery_id: Option<Uuid>,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<PolledEvent> {
        require_name(name)?;
        let delivery = self
            .dispatcher
            .poll(name, delivery_id, log_event, cancel)
            .await?;
        self.metrics.record_poll(name);
        debug!(
            queue = %name,
            served_by = %delivery.served_by,
            delivery_id = %delivery.delivery_id,
            "polled event"
        );

        // read latency matters more than follower freshness here
        if self.should_replicate(log_event) {
            let replicator = Arc::clone(&self.replicator);
            let metrics = Arc::clone(&self.metrics);
            let operation = ReplicatedOperation::Poll {
                queue_name: delivery.served_by.clone(),
                delivery_id: delivery.delivery_id,
            };
            tokio::spawn(async move {
                report_replication(replicator.as_ref(), &metrics, &operation).await;
            });
        }

        Ok(PolledEvent {
            id: delivery.delivery_id,
            event: delivery.event,
        })
    }

    /// Head of the queue with a nil delivery id; no delivery is recorded.
    pub async fn peek(&self, name: &str, cancel: &CancellationToken) -> BusResult<PolledEvent> {
        require_name(name)?;
        let event = self.dispatcher.peek(name, cancel).await?;
        Ok(PolledEvent {
            id: Uuid::nil(),
            event,
        })
    }

    /// Acknowledge a delivery. Unknown ids are ignored.
    pub async fn ack(
        &self,
        name: &str,
        delivery_id: Uuid,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        require_name(name)?;
        ensure_not_cancelled(cancel)?;

        if self.dispatcher.ack(name, delivery_id, log_event)? {
            self.metrics.record_ack(name);
            debug!(queue = %name, %delivery_id, "acked event");
        } else {
            debug!(queue = %name, %delivery_id, "ack for unknown delivery ignored");
        }

        self.replicate(
            log_event,
            ReplicatedOperation::Ack {
                queue_name: name.to_string(),
                delivery_id,
            },
        )
        .await;
        Ok(())
    }

    /// Move an outstanding delivery to the queue's DLQ.
    ///
    /// The pending entry is removed before the push so two concurrent calls
    /// cannot both dead-letter it; once removed, the push runs to completion
    /// regardless of `cancel`.
    #[tracing::instrument(skip_all, fields(queue = %name, %delivery_id))]
    pub async fn ack_and_move_to_dead_letter_queue(
        &self,
        name: &str,
        delivery_id: Uuid,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        require_name(name)?;
        let (_, queue_type) = self.dispatcher.get_event_handler(name)?;
        if queue_type != QueueType::Queue {
            return Err(BusError::InvalidOperation(format!(
                "only live queues have a dead-letter queue, {name} is a {queue_type:?}"
            )));
        }
        ensure_not_cancelled(cancel)?;

        let event = self.dispatcher.get_nack_event(name, delivery_id)?;
        if !self.dispatcher.ack(name, delivery_id, log_event)? {
            return Err(BusError::EventNotFound(delivery_id.to_string()));
        }
        let dlq = dead_letter_queue_name(name);
        self.dispatcher
            .push(&dlq, event, log_event, &CancellationToken::new())
            .await?;
        self.metrics.record_dead_letter(name);
        info!(%dlq, "moved event to dead-letter queue");

        self.replicate(
            log_event,
            ReplicatedOperation::AckAndMoveToDeadLetter {
                queue_name: name.to_string(),
                delivery_id,
            },
        )
        .await;
        Ok(())
    }

    /// Empties the buffer of `name`. Its DLQ and outstanding deliveries are
    /// left alone.
    #[tracing::instrument(skip_all, fields(queue = %name))]
    pub async fn clear(
        &self,
        name: &str,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<()> {
        require_name(name)?;
        self.dispatcher.clear(name, cancel).await?;
        if log_event {
            append_or_log(
                self.journal.as_ref(),
                &JournalRecord::ClearQueue {
                    queue_name: name.to_string(),
                },
            );
        }
        info!("cleared queue");

        self.replicate(
            log_event,
            ReplicatedOperation::ClearQueue {
                queue_name: name.to_string(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn queue_info(&self, name: &str, cancel: &CancellationToken) -> BusResult<QueueInfo> {
        require_name(name)?;
        self.dispatcher.queue_info(name, cancel).await
    }

    pub async fn list_queues(&self, cancel: &CancellationToken) -> BusResult<Vec<QueueInfo>> {
        self.dispatcher.list_queues(cancel).await
    }

    pub async fn count(&self, name: &str, cancel: &CancellationToken) -> BusResult<usize> {
        require_name(name)?;
        self.dispatcher.count(name, cancel).await
    }

    pub fn unacked_poll_events(&self, name: &str) -> BusResult<usize> {
        require_name(name)?;
        self.dispatcher.unacked_poll_events(name)
    }

    /// Run one ack-timeout sweep over every queue.
    ///
    /// Requeues and drops happen inside the handlers. Dead letters are pushed
    /// here and journaled together with an ack of the source delivery, so a
    /// replayed poll does not escalate the same event twice. Sweeps are not
    /// replicated; every node runs its own.
    pub async fn trigger_timeout_checks(&self, now: DateTime<Utc>) -> BusResult<SweepReport> {
        let report = self.dispatcher.trigger_timeout_checks(now).await?;

        let uncancellable = CancellationToken::new();
        for outcome in &report.outcomes {
            match &outcome.disposition {
                Disposition::Requeued => self.metrics.record_requeue(&outcome.queue_name),
                Disposition::Dropped => {
                    self.metrics.record_drop(&outcome.queue_name);
                    warn!(
                        queue = %outcome.queue_name,
                        delivery_id = %outcome.delivery_id,
                        "dropped event after exhausting its ack timeouts"
                    );
                }
                Disposition::DeadLettered {
                    dead_letter_queue,
                    event,
                } => {
                    match self
                        .dispatcher
                        .push(dead_letter_queue, event.clone(), true, &uncancellable)
                        .await
                    {
                        Ok(_) => {
                            append_or_log(
                                self.journal.as_ref(),
                                &JournalRecord::Ack {
                                    queue_name: outcome.queue_name.clone(),
                                    delivery_id: outcome.delivery_id,
                                },
                            );
                            self.metrics.record_dead_letter(&outcome.queue_name);
                        }
                        Err(e) => error!(
                            queue = %outcome.queue_name,
                            dlq = %dead_letter_queue,
                            delivery_id = %outcome.delivery_id,
                            error = %e,
                            "failed to dead-letter timed out event"
                        ),
                    }
                }
            }
        }

        self.record_queue_gauges(&uncancellable).await;
        Ok(report)
    }

    async fn record_queue_gauges(&self, cancel: &CancellationToken) {
        match self.dispatcher.list_queues(cancel).await {
            Ok(infos) => {
                for info in infos {
                    self.metrics
                        .set_queue_depth(&info.queue_name, info.number_of_elements() as u64);
                    self.metrics
                        .set_unacked_events(&info.queue_name, info.un_acked_poll_events() as u64);
                }
            }
            Err(e) => debug!(error = %e, "skipped queue gauges"),
        }
    }

    fn validate_event(&self, event: &Event) -> BusResult<()> {
        if event.key.len() > self.limits.max_key_size {
            return Err(BusError::InvalidEvent(format!(
                "key is {} bytes, limit is {}",
                event.key.len(),
                self.limits.max_key_size
            )));
        }
        if event.body.len() > self.limits.max_body_size {
            return Err(BusError::InvalidEvent(format!(
                "body is {} bytes, limit is {}",
                event.body.len(),
                self.limits.max_body_size
            )));
        }
        Ok(())
    }

    fn should_replicate(&self, log_event: bool) -> bool {
        log_event && self.leadership.is_leader()
    }

    async fn replicate(&self, log_event: bool, operation: ReplicatedOperation) {
        if self.should_replicate(log_event) {
            report_replication(self.replicator.as_ref(), &self.metrics, &operation).await;
        }
    }
}

async fn report_replication(
    replicator: &dyn Replicator,
    metrics: &Metrics,
    operation: &ReplicatedOperation,
) {
    if let Err(e) = replicator.replicate(operation).await {
        metrics.record_replication_failure(operation.kind());
        warn!(
            operation = operation.kind(),
            queue = operation.queue_name(),
            error = %e,
            "replication to followers failed"
        );
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> BusResult<()> {
    if cancel.is_cancelled() {
        return Err(BusError::Cancelled);
    }
    Ok(())
}

fn require_name(name: &str) -> BusResult<()> {
    if name.trim().is_empty() {
        return Err(BusError::InvalidArgument(
            "queue name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_queue_name(name: &str) -> BusResult<()> {
    require_name(name)?;
    if name.chars().count() > MAX_QUEUE_NAME_LENGTH {
        return Err(BusError::InvalidArgument(format!(
            "queue name must be at most {MAX_QUEUE_NAME_LENGTH} characters"
        )));
    }
    if name.contains(':') {
        return Err(BusError::InvalidArgument(
            "queue name must not contain ':'".to_string(),
        ));
    }
    Ok(())
}

fn validate_ack_timeout(ack_timeout: u32) -> BusResult<()> {
    if !(1..=MAX_ACK_TIMEOUT_MINUTES).contains(&ack_timeout) {
        return Err(BusError::InvalidArgument(format!(
            "ack timeout must be between 1 and {MAX_ACK_TIMEOUT_MINUTES} minutes"
        )));
    }
    Ok(())
}

fn validate_partitions(number_of_partitions: usize) -> BusResult<()> {
    if !(1..=MAX_PARTITIONS).contains(&number_of_partitions) {
        return Err(BusError::InvalidArgument(format!(
            "number of partitions must be between 1 and {MAX_PARTITIONS}"
        )));
    }
    Ok(())
}
