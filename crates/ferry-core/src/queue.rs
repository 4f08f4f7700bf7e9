use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MAX_ACK_TIMEOUT_MINUTES: u32 = 1440;
pub const MAX_QUEUE_NAME_LENGTH: usize = 100;
pub const MAX_PARTITIONS: usize = 100;
/// Ack timeout used when a request or journal record does not give one.
pub const DEFAULT_ACK_TIMEOUT_MINUTES: u32 = 30;

const DEAD_LETTER_SUFFIX: &str = "-DLQ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueType {
    Queue,
    DeadLetterQueue,
    Partition,
}

/// Occupancy of one partition (or of an unpartitioned queue).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStats {
    pub number_of_elements: usize,
    pub un_acked_poll_events: usize,
}

/// Point-in-time view of a queue. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueInfo {
    pub queue_name: String,
    pub ack_timeout: u32,
    pub number_of_partitions: usize,
    #[serde(rename = "type")]
    pub queue_type: QueueType,
    pub partitions: BTreeMap<String, PartitionStats>,
}

impl QueueInfo {
    pub fn number_of_elements(&self) -> usize {
        self.partitions.values().map(|p| p.number_of_elements).sum()
    }

    pub fn un_acked_poll_events(&self) -> usize {
        self.partitions.values().map(|p| p.un_acked_poll_events).sum()
    }
}

pub fn dead_letter_queue_name(queue_name: &str) -> String {
    format!("{queue_name}{DEAD_LETTER_SUFFIX}")
}

pub fn partition_name(queue_name: &str, index: usize) -> String {
    format!("{queue_name}-partition{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        assert_eq!(dead_letter_queue_name("orders"), "orders-DLQ");
        assert_eq!(partition_name("orders", 2), "orders-partition2");
        assert_eq!(
            partition_name(&dead_letter_queue_name("orders"), 0),
            "orders-DLQ-partition0"
        );
    }

    #[test]
    fn info_serializes_in_camel_case() {
        let mut partitions = BTreeMap::new();
        partitions.insert(
            "q".to_string(),
            PartitionStats {
                number_of_elements: 2,
                un_acked_poll_events: 1,
            },
        );
        let info = QueueInfo {
            queue_name: "q".to_string(),
            ack_timeout: 5,
            number_of_partitions: 1,
            queue_type: QueueType::DeadLetterQueue,
            partitions,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["queueName"], "q");
        assert_eq!(json["ackTimeout"], 5);
        assert_eq!(json["type"], "DeadLetterQueue");
        assert_eq!(json["partitions"]["q"]["unAckedPollEvents"], 1);
        assert_eq!(info.number_of_elements(), 2);
    }
}
