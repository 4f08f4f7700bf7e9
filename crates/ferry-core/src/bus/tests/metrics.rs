use super::*;
use crate::bus::metrics::test_harness::MetricTestHarness;
use opentelemetry::KeyValue;

#[tokio::test]
async fn delivery_lifecycle_is_counted() {
    let harness = MetricTestHarness::new();
    let bus = test_bus().with_metrics(harness.metrics());
    create_queue(&bus, "q", 1).await;

    push(&bus, "q", test_event("a")).await;
    push(&bus, "q", test_event("b")).await;
    let polled = poll(&bus, "q").await;
    bus.ack("q", polled.id, true, &token()).await.unwrap();
    // unknown ids are not counted
    bus.ack("q", Uuid::new_v4(), true, &token()).await.unwrap();

    harness.assert_counter("ferry.events.pushed", "q", 2);
    harness.assert_counter("ferry.events.polled", "q", 1);
    harness.assert_counter("ferry.events.acked", "q", 1);
}

#[tokio::test]
async fn sweep_outcomes_and_gauges_are_recorded() {
    let harness = MetricTestHarness::new();
    let bus = test_bus().with_metrics(harness.metrics());
    create_queue(&bus, "q", 1).await;
    push(&bus, "q", test_event("a")).await;
    push(
        &bus,
        "q",
        test_event("b").with_header(headers::SEND_TO_DLQ_AFTER_ACK_TIMEOUT, "true"),
    )
    .await;
    push(&bus, "q", test_event("c")).await;
    poll(&bus, "q").await;
    poll(&bus, "q").await;

    bus.trigger_timeout_checks(after_minutes(1)).await.unwrap();

    harness.assert_counter("ferry.events.requeued", "q", 1);
    harness.assert_counter("ferry.events.dead_lettered", "q", 1);
    harness.assert_gauge("ferry.queue.depth", "q", 2);
    harness.assert_gauge("ferry.queue.depth", "q-DLQ", 1);
    harness.assert_gauge("ferry.queue.unacked", "q", 0);
}

#[tokio::test]
async fn replication_failures_are_counted_per_operation() {
    let harness = MetricTestHarness::new();
    let bus = test_bus()
        .with_metrics(harness.metrics())
        .with_replicator(Arc::new(RecordingReplicator::failing()));

    create_queue(&bus, "q", 1).await;
    push(&bus, "q", test_event("a")).await;
    push(&bus, "q", test_event("b")).await;

    assert_eq!(
        harness.counter(
            "ferry.replication.failures",
            KeyValue::new("operation", "Push")
        ),
        Some(2)
    );
    assert_eq!(
        harness.counter(
            "ferry.replication.failures",
            KeyValue::new("operation", "CreateQueue")
        ),
        Some(1)
    );
}
