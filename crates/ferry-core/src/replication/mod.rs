//! Leader-to-follower propagation of mutating operations.
//!
//! Replication is best effort: one request per operation per follower, no
//! retries and no quorum. The leader's local state is authoritative and a
//! failed fan-out never undoes it.

pub mod http;
pub mod registry;

pub use http::HttpReplicator;
pub use registry::{FollowerInstance, FollowerRegistry, StaticFollowerRegistry};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ReplicationResult;
use crate::event::Event;

/// A mutation applied on the leader that followers must repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicatedOperation {
    CreateQueue {
        queue_name: String,
        number_of_partitions: usize,
        ack_timeout: u32,
    },
    ScalePartitions {
        queue_name: String,
        number_of_partitions: usize,
    },
    /// Addressed to the exact buffer that accepted the event on the leader.
    Push { queue_name: String, event: Event },
    /// Addressed to the exact buffer that served the poll, carrying the
    /// leader's delivery id.
    Poll {
        queue_name: String,
        delivery_id: Uuid,
    },
    Ack {
        queue_name: String,
        delivery_id: Uuid,
    },
    AckAndMoveToDeadLetter {
        queue_name: String,
        delivery_id: Uuid,
    },
    DeleteQueue { queue_name: String },
    ClearQueue { queue_name: String },
}

impl ReplicatedOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            ReplicatedOperation::CreateQueue { .. } => "CreateQueue",
            ReplicatedOperation::ScalePartitions { .. } => "ScalePartitions",
            ReplicatedOperation::Push { .. } => "Push",
            ReplicatedOperation::Poll { .. } => "Poll",
            ReplicatedOperation::Ack { .. } => "Ack",
            ReplicatedOperation::AckAndMoveToDeadLetter { .. } => "AckAndMoveToDeadLetter",
            ReplicatedOperation::DeleteQueue { .. } => "DeleteQueue",
            ReplicatedOperation::ClearQueue { .. } => "ClearQueue",
        }
    }

    pub fn queue_name(&self) -> &str {
        match self {
            ReplicatedOperation::CreateQueue { queue_name, .. }
            | ReplicatedOperation::ScalePartitions { queue_name, .. }
            | ReplicatedOperation::Push { queue_name, .. }
            | ReplicatedOperation::Poll { queue_name, .. }
            | ReplicatedOperation::Ack { queue_name, .. }
            | ReplicatedOperation::AckAndMoveToDeadLetter { queue_name, .. }
            | ReplicatedOperation::DeleteQueue { queue_name }
            | ReplicatedOperation::ClearQueue { queue_name } => queue_name,
        }
    }
}

#[async_trait]
pub trait Replicator: Send + Sync {
    /// Send `operation` to every follower. Errors describe the followers
    /// that did not confirm; the caller logs them.
    async fn replicate(&self, operation: &ReplicatedOperation) -> ReplicationResult<()>;
}

/// Replicator for single-node deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReplicator;

#[async_trait]
impl Replicator for NoopReplicator {
    async fn replicate(&self, _operation: &ReplicatedOperation) -> ReplicationResult<()> {
        Ok(())
    }
}
