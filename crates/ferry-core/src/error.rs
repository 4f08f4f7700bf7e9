/// Errors raised by the queue engine and surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue already exists: {0}")]
    QueueAlreadyExists(String),

    #[error("no event found in queue: {0}")]
    NoEventFound(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Durable journal errors (file I/O and record decoding).
/// Journal failures never roll back in-memory state; callers log them.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown journal operation: {0}")]
    UnknownOperation(String),

    #[error("malformed journal record: {0}")]
    Malformed(String),
}

/// Leader-to-follower replication errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("follower {follower} unreachable: {message}")]
    Transport { follower: String, message: String },

    #[error("follower {follower} answered with status {status}")]
    UnexpectedStatus { follower: String, status: u16 },

    #[error("follower registry error: {0}")]
    Registry(String),

    #[error("replication client error: {0}")]
    Client(String),

    #[error("replication failed for {} follower(s): {}", .0.len(), join_errors(.0))]
    Partial(Vec<ReplicationError>),
}

fn join_errors(errors: &[ReplicationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type BusResult<T> = std::result::Result<T, BusError>;
pub type JournalResult<T> = std::result::Result<T, JournalError>;
pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;
