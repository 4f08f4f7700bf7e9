use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use super::registry::{FollowerInstance, FollowerRegistry};
use super::{ReplicatedOperation, Replicator};
use crate::error::{ReplicationError, ReplicationResult};
use crate::headers::{DATA_SYNC, DATA_SYNC_VALUE};

/// Replays each operation against every follower's HTTP API, flagged with
/// `x-data-sync` so the follower accepts it without being leader.
pub struct HttpReplicator {
    client: Client,
    node_id: String,
    registry: Arc<dyn FollowerRegistry>,
}

impl HttpReplicator {
    pub fn new(
        node_id: impl Into<String>,
        registry: Arc<dyn FollowerRegistry>,
        timeout: Duration,
    ) -> ReplicationResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReplicationError::Client(e.to_string()))?;
        Ok(Self {
            client,
            node_id: node_id.into(),
            registry,
        })
    }

    async fn send(
        &self,
        follower: &FollowerInstance,
        operation: &ReplicatedOperation,
    ) -> ReplicationResult<()> {
        let url = endpoint(&follower.base_url, operation).map_err(|message| {
            ReplicationError::Transport {
                follower: follower.id.clone(),
                message,
            }
        })?;

        let request = match operation {
            ReplicatedOperation::DeleteQueue { .. } => self.client.delete(url),
            _ => self.client.post(url),
        }
        .header(DATA_SYNC, DATA_SYNC_VALUE);
        let request = match operation {
            ReplicatedOperation::Push { event, .. } => request.json(event),
            _ => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ReplicationError::Transport {
                follower: follower.id.clone(),
                message: e.to_string(),
            })?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(ReplicationError::UnexpectedStatus {
                follower: follower.id.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Replicator for HttpReplicator {
    async fn replicate(&self, operation: &ReplicatedOperation) -> ReplicationResult<()> {
        let followers = self.registry.instances().await?;

        let mut failures = Vec::new();
        for follower in followers.iter().filter(|f| f.id != self.node_id) {
            match self.send(follower, operation).await {
                Ok(()) => debug!(
                    follower = %follower.id,
                    operation = operation.kind(),
                    queue = operation.queue_name(),
                    "replicated operation"
                ),
                Err(e) => {
                    warn!(
                        follower = %follower.id,
                        operation = operation.kind(),
                        queue = operation.queue_name(),
                        error = %e,
                        "failed to replicate operation"
                    );
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReplicationError::Partial(failures))
        }
    }
}

/// Follower URL for an operation, e.g.
/// `{base}/api/bus/queue/ack?queueName=q&deliveryId=...`.
pub fn endpoint(base_url: &str, operation: &ReplicatedOperation) -> Result<Url, String> {
    let mut url = Url::parse(base_url).map_err(|e| format!("invalid follower url: {e}"))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| format!("follower url cannot carry a path: {base_url}"))?;
        segments.pop_if_empty().extend(["api", "bus", "queue"]);
        match operation {
            ReplicatedOperation::CreateQueue { .. } => {}
            ReplicatedOperation::ScalePartitions { .. } => {
                segments.push("scale");
            }
            ReplicatedOperation::Push { .. } => {
                segments.push("event");
            }
            ReplicatedOperation::Poll { .. } => {
                segments.push("poll");
            }
            ReplicatedOperation::Ack { .. } => {
                segments.push("ack");
            }
            ReplicatedOperation::AckAndMoveToDeadLetter { .. } => {
                segments.push("deadletter");
            }
            ReplicatedOperation::DeleteQueue { queue_name } => {
                segments.push(queue_name);
            }
            ReplicatedOperation::ClearQueue { .. } => {
                segments.push("clear");
            }
        }
    }

    if matches!(operation, ReplicatedOperation::DeleteQueue { .. }) {
        return Ok(url);
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("queueName", operation.queue_name());
        match operation {
            ReplicatedOperation::CreateQueue {
                number_of_partitions,
                ack_timeout,
                ..
            } => {
                query.append_pair("numberOfPartitions", &number_of_partitions.to_string());
                query.append_pair("maxAckTimeout", &ack_timeout.to_string());
            }
            ReplicatedOperation::ScalePartitions {
                number_of_partitions,
                ..
            } => {
                query.append_pair("numberOfPartitions", &number_of_partitions.to_string());
            }
            ReplicatedOperation::Poll { delivery_id, .. }
            | ReplicatedOperation::Ack { delivery_id, .. }
            | ReplicatedOperation::AckAndMoveToDeadLetter { delivery_id, .. } => {
                query.append_pair("deliveryId", &delivery_id.to_string());
            }
            _ => {}
        }
    }
    Ok(url)
}
