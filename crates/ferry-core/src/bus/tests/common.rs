use super::*;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ReplicationError, ReplicationResult};

pub(super) fn test_bus() -> EventBus {
    EventBus::new(EventLimits::default())
}

pub(super) fn token() -> CancellationToken {
    CancellationToken::new()
}

/// An event with the headers a client push would receive.
pub(super) fn test_event(key: &str) -> Event {
    let mut event = Event::new(key, format!("payload-{key}"));
    headers::add_default_headers(&mut event, Utc::now());
    event
}

/// A moment safely past any ack timeout used in these tests.
pub(super) fn after_minutes(minutes: i64) -> DateTime<Utc> {
    Utc::now() + Duration::minutes(minutes) + Duration::seconds(1)
}

pub(super) async fn create_queue(bus: &EventBus, name: &str, partitions: usize) {
    bus.create_queue(name, 1, partitions, true, &token())
        .await
        .unwrap();
}

pub(super) async fn push(bus: &EventBus, name: &str, event: Event) {
    bus.push_event(name, event, true, &token()).await.unwrap();
}

pub(super) async fn poll(bus: &EventBus, name: &str) -> PolledEvent {
    bus.poll(name, true, &token()).await.unwrap()
}

pub(super) async fn count(bus: &EventBus, name: &str) -> usize {
    bus.count(name, &token()).await.unwrap()
}

pub(super) fn journaled_bus(dir: &std::path::Path) -> EventBus {
    let journal = FileJournal::open(dir, 1024 * 1024).unwrap();
    test_bus().with_journal(Arc::new(journal))
}

/// Captures replicated operations instead of sending them.
#[derive(Default)]
pub(super) struct RecordingReplicator {
    pub operations: Mutex<Vec<ReplicatedOperation>>,
    pub fail: bool,
}

impl RecordingReplicator {
    pub fn failing() -> Self {
        Self {
            operations: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.operations.lock().iter().map(|op| op.kind()).collect()
    }
}

#[async_trait]
impl Replicator for RecordingReplicator {
    async fn replicate(&self, operation: &ReplicatedOperation) -> ReplicationResult<()> {
        self.operations.lock().push(operation.clone());
        if self.fail {
            return Err(ReplicationError::UnexpectedStatus {
                follower: "node-2".to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}

/// Wait for detached replication tasks to record something.
pub(super) async fn wait_for_operations(replicator: &RecordingReplicator, expected: usize) {
    for _ in 0..100 {
        if replicator.operations.lock().len() >= expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} replicated operations, saw {:?}",
        replicator.kinds()
    );
}
