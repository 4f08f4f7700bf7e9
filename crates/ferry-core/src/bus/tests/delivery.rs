use super::*;

#[tokio::test]
async fn polls_follow_push_order() {
    let bus = test_bus();
    create_queue(&bus, "fifo", 1).await;
    let keys = ["e1", "e2", "e3", "e4", "e5"];
    for key in keys {
        push(&bus, "fifo", test_event(key)).await;
    }

    for key in keys {
        let polled = poll(&bus, "fifo").await;
        assert_eq!(polled.event.key, key.as_bytes());
        assert!(!polled.id.is_nil());
    }
    assert!(matches!(
        bus.poll("fifo", true, &token()).await,
        Err(BusError::NoEventFound(_))
    ));
}

#[tokio::test]
async fn each_poll_mints_a_distinct_delivery_id() {
    let bus = test_bus();
    create_queue(&bus, "q", 1).await;
    push(&bus, "q", test_event("a")).await;
    push(&bus, "q", test_event("b")).await;

    let first = poll(&bus, "q").await;
    let second = poll(&bus, "q").await;
    assert_ne!(first.id, second.id);
    assert_eq!(bus.unacked_poll_events("q").unwrap(), 2);
}

#[tokio::test]
async fn peek_never_creates_a_delivery() {
    let bus = test_bus();
    create_queue(&bus, "q", 1).await;
    push(&bus, "q", test_event("head")).await;

    let peeked = bus.peek("q", &token()).await.unwrap();
    assert!(peeked.id.is_nil());
    assert_eq!(peeked.event.key, b"head");
    assert_eq!(bus.unacked_poll_events("q").unwrap(), 0);
    assert_eq!(count(&bus, "q").await, 1);
}

#[tokio::test]
async fn peek_and_poll_on_empty_queue_fail() {
    let bus = test_bus();
    create_queue(&bus, "q", 1).await;
    assert!(matches!(
        bus.peek("q", &token()).await,
        Err(BusError::NoEventFound(_))
    ));
    assert!(matches!(
        bus.poll("q", true, &token()).await,
        Err(BusError::NoEventFound(_))
    ));
    assert_eq!(bus.unacked_poll_events("q").unwrap(), 0);
}

#[tokio::test]
async fn unknown_queue_is_reported() {
    let bus = test_bus();
    assert!(matches!(
        bus.push_event("nope", test_event("a"), true, &token()).await,
        Err(BusError::QueueNotFound(_))
    ));
    assert!(matches!(
        bus.poll("nope", true, &token()).await,
        Err(BusError::QueueNotFound(_))
    ));
    assert!(matches!(
        bus.peek("nope", &token()).await,
        Err(BusError::QueueNotFound(_))
    ));
}

#[tokio::test]
async fn supplied_delivery_id_is_kept() {
    let bus = test_bus();
    create_queue(&bus, "q", 1).await;
    push(&bus, "q", test_event("a")).await;

    let id = Uuid::new_v4();
    let polled = bus
        .poll_with_delivery_id("q", Some(id), true, &token())
        .await
        .unwrap();
    assert_eq!(polled.id, id);

    bus.ack("q", id, true, &token()).await.unwrap();
    assert_eq!(bus.unacked_poll_events("q").unwrap(), 0);
}

#[tokio::test]
async fn cancelled_poll_leaves_event_queued() {
    let bus = test_bus();
    create_queue(&bus, "q", 1).await;
    push(&bus, "q", test_event("a")).await;

    let cancelled = token();
    cancelled.cancel();
    assert!(matches!(
        bus.poll("q", true, &cancelled).await,
        Err(BusError::Cancelled)
    ));
    assert_eq!(count(&bus, "q").await, 1);
    assert_eq!(bus.unacked_poll_events("q").unwrap(), 0);
}
