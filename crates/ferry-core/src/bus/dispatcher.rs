use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::handler::{Delivery, PartitionedEventHandler, QueueHandler, SweepReport};
use crate::error::{BusError, BusResult};
use crate::event::Event;
use crate::queue::{partition_name, QueueInfo, QueueType};

#[derive(Clone)]
struct Registration {
    handler: QueueHandler,
    queue_type: QueueType,
}

/// Name-keyed routing table. Structural changes take the write lock and
/// apply a whole queue family (queue, DLQ, partitions) at once, so lookups
/// never see a half-registered queue. Handlers are cloned out before any
/// await; the lock is never held across one.
#[derive(Default)]
pub struct Dispatcher {
    registry: RwLock<HashMap<String, Registration>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_handler(
        &self,
        handler: QueueHandler,
        queue_type: QueueType,
    ) -> BusResult<()> {
        self.add_event_handlers(vec![(handler, queue_type)])
    }

    /// Register every entry or none of them.
    pub fn add_event_handlers(&self, entries: Vec<(QueueHandler, QueueType)>) -> BusResult<()> {
        let mut registry = self.registry.write();
        for (i, (handler, _)) in entries.iter().enumerate() {
            let name = handler.name();
            if registry.contains_key(name) || entries[..i].iter().any(|(h, _)| h.name() == name) {
                return Err(BusError::QueueAlreadyExists(name.to_string()));
            }
        }
        for (handler, queue_type) in entries {
            registry.insert(
                handler.name().to_string(),
                Registration {
                    handler,
                    queue_type,
                },
            );
        }
        Ok(())
    }

    pub fn remove_event_handler(&self, name: &str) -> BusResult<()> {
        self.registry
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BusError::QueueNotFound(name.to_string()))
    }

    pub fn get_event_handler(&self, name: &str) -> BusResult<(QueueHandler, QueueType)> {
        self.registry
            .read()
            .get(name)
            .map(|r| (r.handler.clone(), r.queue_type))
            .ok_or_else(|| BusError::QueueNotFound(name.to_string()))
    }

    pub fn contains_queue(&self, name: &str) -> bool {
        self.registry.read().contains_key(name)
    }

    /// Remove a live queue, its partitions, its DLQ and the DLQ's partitions.
    pub fn remove_queue(&self, name: &str, dead_letter_queue: &str) -> BusResult<()> {
        let mut registry = self.registry.write();
        let registration = registry
            .get(name)
            .ok_or_else(|| BusError::QueueNotFound(name.to_string()))?;
        if registration.queue_type != QueueType::Queue {
            return Err(BusError::InvalidOperation(format!(
                "{name} is a {:?} and cannot be deleted directly",
                registration.queue_type
            )));
        }

        let mut names = family_names(&registration.handler);
        if let Some(dlq) = registry.get(dead_letter_queue) {
            names.extend(family_names(&dlq.handler));
        }
        for name in names {
            registry.remove(&name);
        }
        Ok(())
    }

    /// Grow a live queue and its DLQ to `number_of_partitions`, registering
    /// the new partitions in the same critical section.
    pub fn scale_queue(
        &self,
        name: &str,
        dead_letter_queue: &str,
        number_of_partitions: usize,
    ) -> BusResult<()> {
        let mut registry = self.registry.write();
        let queue = registry
            .get(name)
            .ok_or_else(|| BusError::QueueNotFound(name.to_string()))?
            .clone();
        if queue.queue_type != QueueType::Queue {
            return Err(BusError::InvalidOperation(format!(
                "only live queues can be scaled, {name} is a {:?}",
                queue.queue_type
            )));
        }
        let dlq = registry.get(dead_letter_queue).cloned();

        let mut targets = vec![queue.handler];
        targets.extend(dlq.map(|r| r.handler));

        for handler in &targets {
            let current = handler.number_of_partitions();
            if number_of_partitions <= current {
                return Err(BusError::InvalidOperation(format!(
                    "queue {} has {current} partitions; partitions can only be increased",
                    handler.name()
                )));
            }
            // an unpartitioned handler also needs a name for partition 0
            let first_new = match handler {
                QueueHandler::Single(_) => 0,
                QueueHandler::Partitioned(_) => current,
            };
            if let Some(taken) = (first_new..number_of_partitions)
                .map(|i| partition_name(handler.name(), i))
                .find(|n| registry.contains_key(n))
            {
                return Err(BusError::QueueAlreadyExists(taken));
            }
        }

        for handler in targets {
            let mut added = Vec::new();
            let partitioned = match handler {
                QueueHandler::Partitioned(p) => p,
                QueueHandler::Single(single) => {
                    let adopted = Arc::new(PartitionedEventHandler::adopt(&single));
                    if let Some(entry) = registry.get_mut(adopted.name()) {
                        entry.handler = QueueHandler::Partitioned(Arc::clone(&adopted));
                    }
                    added.extend(adopted.partitions());
                    adopted
                }
            };
            added.extend(partitioned.scale_number_of_partitions(number_of_partitions)?);
            for partition in added {
                registry.insert(
                    partition.name().to_string(),
                    Registration {
                        handler: QueueHandler::Single(partition),
                        queue_type: QueueType::Partition,
                    },
                );
            }
        }
        Ok(())
    }

    pub async fn push(
        &self,
        name: &str,
        event: Event,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<String> {
        let (handler, _) = self.get_event_handler(name)?;
        handler.push(event, log_event, cancel).await
    }

    pub async fn poll(
        &self,
        name: &str,
        delivery_id: Option<Uuid>,
        log_event: bool,
        cancel: &CancellationToken,
    ) -> BusResult<Delivery> {
        let (handler, _) = self.get_event_handler(name)?;
        handler.poll(delivery_id, log_event, cancel).await
    }

    pub async fn peek(&self, name: &str, cancel: &CancellationToken) -> BusResult<Event> {
        let (handler, _) = self.get_event_handler(name)?;
        handler.peek(cancel).await
    }

    pub fn ack(&self, name: &str, delivery_id: Uuid, log_event: bool) -> BusResult<bool> {
        let (handler, _) = self.get_event_handler(name)?;
        Ok(handler.ack(delivery_id, log_event))
    }

    /// The pending event for `delivery_id`, searching every partition.
    pub fn get_nack_event(&self, name: &str, delivery_id: Uuid) -> BusResult<Event> {
        let (handler, _) = self.get_event_handler(name)?;
        handler
            .pending_event(delivery_id)
            .ok_or_else(|| BusError::EventNotFound(delivery_id.to_string()))
    }

    pub async fn clear(&self, name: &str, cancel: &CancellationToken) -> BusResult<()> {
        let (handler, _) = self.get_event_handler(name)?;
        handler.clear(cancel).await
    }

    pub async fn count(&self, name: &str, cancel: &CancellationToken) -> BusResult<usize> {
        let (handler, _) = self.get_event_handler(name)?;
        handler.count(cancel).await
    }

    pub fn unacked_poll_events(&self, name: &str) -> BusResult<usize> {
        let (handler, _) = self.get_event_handler(name)?;
        Ok(handler.unacked_count())
    }

    pub async fn queue_info(&self, name: &str, cancel: &CancellationToken) -> BusResult<QueueInfo> {
        let (handler, queue_type) = self.get_event_handler(name)?;
        let mut info = handler.queue_info(cancel).await?;
        info.queue_type = queue_type;
        Ok(info)
    }

    /// Live queues and DLQs, sorted by name. Partitions are folded into
    /// their parent's info.
    pub async fn list_queues(&self, cancel: &CancellationToken) -> BusResult<Vec<QueueInfo>> {
        let mut handlers: Vec<(QueueHandler, QueueType)> = self
            .registry
            .read()
            .values()
            .filter(|r| r.queue_type != QueueType::Partition)
            .map(|r| (r.handler.clone(), r.queue_type))
            .collect();
        handlers.sort_by(|a, b| a.0.name().cmp(b.0.name()));

        let mut infos = Vec::with_capacity(handlers.len());
        for (handler, queue_type) in handlers {
            let mut info = handler.queue_info(cancel).await?;
            info.queue_type = queue_type;
            infos.push(info);
        }
        Ok(infos)
    }

    /// Sweep every registered handler. Partitions are reached both through
    /// their parent and through their own entry; the second visit finds
    /// nothing left to evict.
    pub async fn trigger_timeout_checks(&self, now: DateTime<Utc>) -> BusResult<SweepReport> {
        let handlers: Vec<QueueHandler> = self
            .registry
            .read()
            .values()
            .map(|r| r.handler.clone())
            .collect();

        let mut report = SweepReport::default();
        for handler in handlers {
            report.merge(handler.requeue_timed_out(now).await?);
        }
        Ok(report)
    }
}

/// Registry names owned by one handler: itself plus its partitions.
fn family_names(handler: &QueueHandler) -> Vec<String> {
    let mut names = vec![handler.name().to_string()];
    if let QueueHandler::Partitioned(p) = handler {
        names.extend(p.partitions().iter().map(|child| child.name().to_string()));
    }
    names
}
