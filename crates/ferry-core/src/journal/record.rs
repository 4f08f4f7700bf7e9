use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::JournalError;
use crate::event::Event;
use crate::queue::DEFAULT_ACK_TIMEOUT_MINUTES;

/// Terminates every record in a journal file.
pub const RECORD_SEPARATOR: &str = "::";
const FIELD_SEPARATOR: char = ':';

/// One operation in the durable journal, replayed in order on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    Push {
        queue_name: String,
        event: Event,
    },
    Poll {
        queue_name: String,
        delivery_id: Uuid,
    },
    Ack {
        queue_name: String,
        delivery_id: Uuid,
    },
    CreateQueue {
        queue_name: String,
        number_of_partitions: usize,
        ack_timeout: u32,
    },
    ScalePartitions {
        queue_name: String,
        number_of_partitions: usize,
    },
    DeleteQueue {
        queue_name: String,
    },
    ClearQueue {
        queue_name: String,
    },
}

impl JournalRecord {
    pub fn tag(&self) -> &'static str {
        match self {
            JournalRecord::Push { .. } => "Push",
            JournalRecord::Poll { .. } => "Poll",
            JournalRecord::Ack { .. } => "Ack",
            JournalRecord::CreateQueue { .. } => "CreateQueue",
            JournalRecord::ScalePartitions { .. } => "ScalePartitions",
            JournalRecord::DeleteQueue { .. } => "DeleteQueue",
            JournalRecord::ClearQueue { .. } => "ClearQueue",
        }
    }

    pub fn queue_name(&self) -> &str {
        match self {
            JournalRecord::Push { queue_name, .. }
            | JournalRecord::Poll { queue_name, .. }
            | JournalRecord::Ack { queue_name, .. }
            | JournalRecord::CreateQueue { queue_name, .. }
            | JournalRecord::ScalePartitions { queue_name, .. }
            | JournalRecord::DeleteQueue { queue_name }
            | JournalRecord::ClearQueue { queue_name } => queue_name,
        }
    }
}

impl fmt::Display for JournalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        match self {
            JournalRecord::Push { queue_name, event } => {
                write!(f, "{tag}:{queue_name}:{}", event.to_log_string())
            }
            JournalRecord::Poll {
                queue_name,
                delivery_id,
            }
            | JournalRecord::Ack {
                queue_name,
                delivery_id,
            } => write!(f, "{tag}:{queue_name}:{delivery_id}"),
            JournalRecord::CreateQueue {
                queue_name,
                number_of_partitions,
                ack_timeout,
            } => write!(
                f,
                "{tag}:{queue_name}:{number_of_partitions}:{ack_timeout}"
            ),
            JournalRecord::ScalePartitions {
                queue_name,
                number_of_partitions,
            } => write!(f, "{tag}:{queue_name}:{number_of_partitions}"),
            JournalRecord::DeleteQueue { queue_name } | JournalRecord::ClearQueue { queue_name } => {
                write!(f, "{tag}:{queue_name}")
            }
        }
    }
}

impl FromStr for JournalRecord {
    type Err = JournalError;

    /// Numeric fields are parsed leniently: a CreateQueue with garbage counts
    /// falls back to one partition and the default ack timeout, and a Poll
    /// with a garbage id replays under a fresh id. An Ack or ScalePartitions
    /// that cannot be understood is rejected, since guessing would corrupt
    /// state.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = raw.trim().split(FIELD_SEPARATOR).collect();
        let malformed = || JournalError::Malformed(raw.to_string());

        let record = match fields.as_slice() {
            ["Push", queue, event] => JournalRecord::Push {
                queue_name: name(queue).ok_or_else(malformed)?,
                event: Event::from_log_string(event)?,
            },
            ["Poll", queue, id] => JournalRecord::Poll {
                queue_name: name(queue).ok_or_else(malformed)?,
                delivery_id: id.parse().unwrap_or_else(|_| Uuid::new_v4()),
            },
            ["Ack", queue, id] => JournalRecord::Ack {
                queue_name: name(queue).ok_or_else(malformed)?,
                delivery_id: id.parse().map_err(|_| malformed())?,
            },
            ["CreateQueue", queue, partitions, ack_timeout] => JournalRecord::CreateQueue {
                queue_name: name(queue).ok_or_else(malformed)?,
                number_of_partitions: partitions.parse().unwrap_or(1),
                ack_timeout: ack_timeout.parse().unwrap_or(DEFAULT_ACK_TIMEOUT_MINUTES),
            },
            ["ScalePartitions", queue, partitions] => JournalRecord::ScalePartitions {
                queue_name: name(queue).ok_or_else(malformed)?,
                number_of_partitions: partitions.parse().map_err(|_| malformed())?,
            },
            ["DeleteQueue", queue] => JournalRecord::DeleteQueue {
                queue_name: name(queue).ok_or_else(malformed)?,
            },
            ["ClearQueue", queue] => JournalRecord::ClearQueue {
                queue_name: name(queue).ok_or_else(malformed)?,
            },
            [tag, ..] if !is_known_tag(tag) => {
                return Err(JournalError::UnknownOperation(tag.to_string()))
            }
            _ => return Err(malformed()),
        };
        Ok(record)
    }
}

fn name(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

fn is_known_tag(tag: &str) -> bool {
    matches!(
        tag,
        "Push" | "Poll" | "Ack" | "CreateQueue" | "ScalePartitions" | "DeleteQueue" | "ClearQueue"
    )
}
