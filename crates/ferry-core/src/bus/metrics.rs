use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

/// OTel instruments for the bus. Created once when the bus is built.
pub struct Metrics {
    pub events_pushed: Counter<u64>,
    pub events_polled: Counter<u64>,
    pub events_acked: Counter<u64>,
    pub events_requeued: Counter<u64>,
    pub events_dead_lettered: Counter<u64>,
    pub events_dropped: Counter<u64>,
    pub replication_failures: Counter<u64>,
    pub queue_depth: Gauge<u64>,
    pub unacked_events: Gauge<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Instruments from the global meter provider; no-ops when none is set.
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("ferry");
        Self::from_meter(&meter)
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            events_pushed: meter
                .u64_counter("ferry.events.pushed")
                .with_description("Events accepted by a queue")
                .build(),
            events_polled: meter
                .u64_counter("ferry.events.polled")
                .with_description("Events delivered to consumers")
                .build(),
            events_acked: meter
                .u64_counter("ferry.events.acked")
                .with_description("Deliveries acknowledged")
                .build(),
            events_requeued: meter
                .u64_counter("ferry.events.requeued")
                .with_description("Deliveries requeued after their ack timeout")
                .build(),
            events_dead_lettered: meter
                .u64_counter("ferry.events.dead_lettered")
                .with_description("Deliveries moved to a dead-letter queue")
                .build(),
            events_dropped: meter
                .u64_counter("ferry.events.dropped")
                .with_description("Deliveries dropped after exhausting their retries")
                .build(),
            replication_failures: meter
                .u64_counter("ferry.replication.failures")
                .with_description("Operations that failed to reach every follower")
                .build(),
            queue_depth: meter
                .u64_gauge("ferry.queue.depth")
                .with_description("Buffered events per queue")
                .build(),
            unacked_events: meter
                .u64_gauge("ferry.queue.unacked")
                .with_description("Delivered but unacknowledged events per queue")
                .build(),
        }
    }

    fn queue(queue_name: &str) -> [KeyValue; 1] {
        [KeyValue::new("queue_name", queue_name.to_string())]
    }

    pub fn record_push(&self, queue_name: &str) {
        self.events_pushed.add(1, &Self::queue(queue_name));
    }

    pub fn record_poll(&self, queue_name: &str) {
        self.events_polled.add(1, &Self::queue(queue_name));
    }

    pub fn record_ack(&self, queue_name: &str) {
        self.events_acked.add(1, &Self::queue(queue_name));
    }

    pub fn record_requeue(&self, queue_name: &str) {
        self.events_requeued.add(1, &Self::queue(queue_name));
    }

    pub fn record_dead_letter(&self, queue_name: &str) {
        self.events_dead_lettered.add(1, &Self::queue(queue_name));
    }

    pub fn record_drop(&self, queue_name: &str) {
        self.events_dropped.add(1, &Self::queue(queue_name));
    }

    pub fn record_replication_failure(&self, operation: &'static str) {
        self.replication_failures
            .add(1, &[KeyValue::new("operation", operation)]);
    }

    pub fn set_queue_depth(&self, queue_name: &str, depth: u64) {
        self.queue_depth.record(depth, &Self::queue(queue_name));
    }

    pub fn set_unacked_events(&self, queue_name: &str, count: u64) {
        self.unacked_events.record(count, &Self::queue(queue_name));
    }
}
