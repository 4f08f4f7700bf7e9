//! Delivery metadata carried in an event's header map.

use chrono::{DateTime, Utc};

use crate::event::Event;

pub const START_PROCESSING_TIMESTAMP: &str = "start-processing-timestamp";
pub const LAST_PROCESSING_TIMESTAMP: &str = "last-processing-timestamp";
pub const MAX_NUMBER_OF_ACK_TIMEOUTS: &str = "max-number-of-ack-timeouts";
pub const CURRENT_NUMBER_OF_ACK_TIMEOUTS: &str = "current-number-of-ack-timeouts";
pub const SEND_TO_DLQ_AFTER_ACK_TIMEOUT: &str = "send-to-dlq-after-ack-timeout";

/// Marks leader-originated replication traffic.
pub const DATA_SYNC: &str = "x-data-sync";
pub const DATA_SYNC_VALUE: &str = "true";

/// `-1` in [`MAX_NUMBER_OF_ACK_TIMEOUTS`] means unlimited retries.
pub const UNLIMITED_ACK_TIMEOUTS: i64 = -1;

/// Populate the delivery headers a freshly pushed event needs. Values the
/// producer supplied are kept, except the processing timestamp and the
/// timeout counter which always start fresh.
pub fn add_default_headers(event: &mut Event, now: DateTime<Utc>) {
    let ts = now.timestamp().to_string();
    event
        .header
        .entry(START_PROCESSING_TIMESTAMP.to_string())
        .or_insert_with(|| ts.clone());
    event
        .header
        .insert(LAST_PROCESSING_TIMESTAMP.to_string(), ts);
    event
        .header
        .entry(MAX_NUMBER_OF_ACK_TIMEOUTS.to_string())
        .or_insert_with(|| UNLIMITED_ACK_TIMEOUTS.to_string());
    event
        .header
        .insert(CURRENT_NUMBER_OF_ACK_TIMEOUTS.to_string(), "0".to_string());
    event
        .header
        .entry(SEND_TO_DLQ_AFTER_ACK_TIMEOUT.to_string())
        .or_insert_with(|| "false".to_string());
}

pub fn max_ack_timeouts(event: &Event) -> i64 {
    event
        .header
        .get(MAX_NUMBER_OF_ACK_TIMEOUTS)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(UNLIMITED_ACK_TIMEOUTS)
}

pub fn current_ack_timeouts(event: &Event) -> i64 {
    event
        .header
        .get(CURRENT_NUMBER_OF_ACK_TIMEOUTS)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Whether a timed-out delivery may go back on its queue.
pub fn should_be_requeued(event: &Event) -> bool {
    let max = max_ack_timeouts(event);
    max == UNLIMITED_ACK_TIMEOUTS || current_ack_timeouts(event) < max
}

/// Record one more ack timeout and refresh the processing timestamp.
pub fn record_ack_timeout(event: &mut Event, now: DateTime<Utc>) {
    let next = current_ack_timeouts(event) + 1;
    event
        .header
        .insert(CURRENT_NUMBER_OF_ACK_TIMEOUTS.to_string(), next.to_string());
    event.header.insert(
        LAST_PROCESSING_TIMESTAMP.to_string(),
        now.timestamp().to_string(),
    );
}

pub fn send_to_dlq_after_ack_timeout(event: &Event) -> bool {
    event
        .header
        .get(SEND_TO_DLQ_AFTER_ACK_TIMEOUT)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

pub fn clear_send_to_dlq(event: &mut Event) {
    event
        .header
        .insert(SEND_TO_DLQ_AFTER_ACK_TIMEOUT.to_string(), "false".to_string());
}
