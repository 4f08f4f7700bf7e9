use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::error::{BusResult, JournalResult};
use crate::journal::record::JournalRecord;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Rebuild in-memory state from the bus's journal.
///
/// Records are applied in file order with `log_event = false`. A record that
/// cannot be parsed, or whose operation fails (a queue that already exists,
/// a poll against an empty queue), is logged and skipped.
pub async fn replay_journal(bus: &EventBus) -> JournalResult<ReplayReport> {
    let records = bus.journal().load()?;
    let cancel = CancellationToken::new();
    let mut report = ReplayReport::default();

    for raw in records {
        let record = match raw.parse::<JournalRecord>() {
            Ok(record) => record,
            Err(e) => {
                warn!(record = %raw, error = %e, "skipping unreadable journal record");
                report.skipped += 1;
                continue;
            }
        };

        let tag = record.tag();
        let queue = record.queue_name().to_string();
        match apply(bus, record, &cancel).await {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!(operation = tag, %queue, error = %e, "journal record did not apply");
                report.skipped += 1;
            }
        }
    }

    info!(
        applied = report.applied,
        skipped = report.skipped,
        "journal replay finished"
    );
    Ok(report)
}

async fn apply(bus: &EventBus, record: JournalRecord, cancel: &CancellationToken) -> BusResult<()> {
    match record {
        JournalRecord::Push { queue_name, event } => {
            bus.push_event(&queue_name, event, false, cancel).await
        }
        JournalRecord::Poll {
            queue_name,
            delivery_id,
        } => bus
            .poll_with_delivery_id(&queue_name, Some(delivery_id), false, cancel)
            .await
            .map(|_| ()),
        JournalRecord::Ack {
            queue_name,
            delivery_id,
        } => bus.ack(&queue_name, delivery_id, false, cancel).await,
        JournalRecord::CreateQueue {
            queue_name,
            number_of_partitions,
            ack_timeout,
        } => {
            bus.create_queue(&queue_name, ack_timeout, number_of_partitions, false, cancel)
                .await
        }
        JournalRecord::ScalePartitions {
            queue_name,
            number_of_partitions,
        } => {
            bus.scale_partitions(&queue_name, number_of_partitions, false, cancel)
                .await
        }
        JournalRecord::DeleteQueue { queue_name } => {
            bus.delete_queue(&queue_name, false, cancel).await
        }
        JournalRecord::ClearQueue { queue_name } => bus.clear(&queue_name, false, cancel).await,
    }
}
