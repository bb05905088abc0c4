mod common;

use common::{Collector, FirstPick, pool_of, record_field, test_settings};
use std::sync::Arc;
use std::time::Duration;
use tail_forwarder::app::FlagLiveness;
use tail_forwarder::forwarder::{Forwarder, ForwarderError};
use tokio::sync::mpsc;

const DEADLINE: Duration = Duration::from_secs(10);

/// Scenario: healthy single primary, two lines in, both delivered in order.
#[tokio::test]
async fn delivers_events_in_order_to_healthy_primary() {
    let collector = Collector::spawn().await;
    let (tx, rx) = mpsc::channel(64);
    let liveness = Arc::new(FlagLiveness::new());

    let forwarder = Forwarder::new(
        test_settings(),
        pool_of(vec![collector.endpoint()], vec![]),
        rx,
        liveness.clone(),
    );
    let stats = forwarder.stats();
    let handle = tokio::spawn(forwarder.run());

    tx.send("x".to_string()).await.unwrap();
    tx.send("y".to_string()).await.unwrap();

    let events = collector.wait_for(2, DEADLINE).await;
    assert_eq!(events[0][0], "test.tail");
    assert_eq!(record_field(&events[0], "message"), "x");
    assert_eq!(record_field(&events[1], "message"), "y");

    liveness.request_terminate();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.sender.records_sent, 2);
    assert_eq!(summary.dropped_records, 0);
    assert_eq!(summary.unsent_records, 0);
    assert_eq!(stats.snapshot().records_sent, 2);
}

#[tokio::test]
async fn preserves_fifo_order_across_many_batches() {
    let collector = Collector::spawn().await;
    let (tx, rx) = mpsc::channel(256);
    let liveness = Arc::new(FlagLiveness::new());

    let forwarder = Forwarder::new(
        test_settings(),
        pool_of(vec![collector.endpoint()], vec![]),
        rx,
        liveness.clone(),
    );
    let handle = tokio::spawn(forwarder.run());

    for i in 0..100 {
        tx.send(format!("line-{i:03}")).await.unwrap();
    }

    let events = collector.wait_for(100, DEADLINE).await;
    for (i, event) in events.iter().enumerate() {
        assert_eq!(record_field(event, "message"), format!("line-{i:03}"));
    }

    liveness.request_terminate();
    handle.await.unwrap().unwrap();
}

/// Scenario: terminate lands while events are still buffered and the
/// destination is reachable; the final flush delivers all of them.
#[tokio::test]
async fn final_flush_delivers_buffered_events_on_terminate() {
    let collector = Collector::spawn().await;
    let (tx, rx) = mpsc::channel(64);
    let liveness = Arc::new(FlagLiveness::new());

    // Terminate is already requested before the loop ever runs.
    tx.send("a".to_string()).await.unwrap();
    tx.send("b".to_string()).await.unwrap();
    tx.send("c".to_string()).await.unwrap();
    liveness.request_terminate();

    let forwarder = Forwarder::new(
        test_settings(),
        pool_of(vec![collector.endpoint()], vec![]),
        rx,
        liveness.clone(),
    );
    let summary = forwarder.run().await.unwrap();

    assert_eq!(summary.sender.records_sent, 3);
    assert_eq!(summary.unsent_records, 0);
    let events = collector.wait_for(3, DEADLINE).await;
    assert_eq!(record_field(&events[2], "message"), "c");
}

/// Terminate with the destination down makes exactly one final attempt and
/// exits anyway; it never retries forever at shutdown.
#[tokio::test]
async fn terminate_with_unreachable_destination_still_exits() {
    let port = common::refused_port().await;
    let (tx, rx) = mpsc::channel(64);
    let liveness = Arc::new(FlagLiveness::new());

    tx.send("doomed".to_string()).await.unwrap();
    liveness.request_terminate();

    let forwarder = Forwarder::new(
        test_settings(),
        pool_of(
            vec![tail_forwarder::sender::Endpoint::new("127.0.0.1", port)],
            vec![],
        ),
        rx,
        liveness.clone(),
    );
    let summary = tokio::time::timeout(Duration::from_secs(5), forwarder.run())
        .await
        .expect("loop must exit promptly after terminate")
        .unwrap();

    assert_eq!(summary.sender.records_sent, 0);
    assert_eq!(summary.unsent_records, 1);
}

/// Input closure is fatal: final flush, then an error.
#[tokio::test]
async fn input_closure_flushes_then_errors() {
    let collector = Collector::spawn().await;
    let (tx, rx) = mpsc::channel(64);
    let liveness = Arc::new(FlagLiveness::new());

    tx.send("last words".to_string()).await.unwrap();
    drop(tx);

    let forwarder = Forwarder::new(
        test_settings(),
        pool_of(vec![collector.endpoint()], vec![]),
        rx,
        liveness,
    );
    let err = forwarder.run().await.unwrap_err();
    assert!(matches!(err, ForwarderError::InputClosed));

    let events = collector.wait_for(1, DEADLINE).await;
    assert_eq!(record_field(&events[0], "message"), "last words");
}

/// Destination down, then up: everything buffered at recovery is delivered
/// in order, exactly once.
#[tokio::test]
async fn buffered_events_are_delivered_after_recovery() {
    let port = common::refused_port().await;
    let endpoint = tail_forwarder::sender::Endpoint::new("127.0.0.1", port);
    let (tx, rx) = mpsc::channel(64);
    let liveness = Arc::new(FlagLiveness::new());

    let forwarder = Forwarder::with_strategy(
        test_settings(),
        pool_of(vec![endpoint], vec![]),
        rx,
        liveness.clone(),
        Box::new(FirstPick),
    );
    let stats = forwarder.stats();
    let handle = tokio::spawn(forwarder.run());

    for i in 0..5 {
        tx.send(format!("queued-{i}")).await.unwrap();
    }

    // Let several connect attempts fail first.
    let start = std::time::Instant::now();
    while stats.snapshot().connect_failures < 3 {
        assert!(start.elapsed() < DEADLINE, "expected repeated connect failures");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Destination comes back on the same port.
    let collector = Collector::spawn_on(port).await;
    let events = collector.wait_for(5, DEADLINE).await;
    assert_eq!(events.len(), 5);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(record_field(event, "message"), format!("queued-{i}"));
    }

    liveness.request_terminate();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.sender.records_sent, 5);
    assert_eq!(summary.dropped_records, 0);
}

/// Drain telemetry rides the same wire, tagged with the drain tag and
/// carrying the forwarded counts.
#[tokio::test]
async fn drain_events_report_forwarded_counts() {
    let collector = Collector::spawn().await;
    let (tx, rx) = mpsc::channel(64);
    let liveness = Arc::new(FlagLiveness::new());

    let mut settings = test_settings();
    settings.drain_tag = Some("test.drain".to_string());
    settings.drain_interval = 1;

    let forwarder = Forwarder::new(
        settings,
        pool_of(vec![collector.endpoint()], vec![]),
        rx,
        liveness.clone(),
    );
    let handle = tokio::spawn(forwarder.run());

    tx.send("x".to_string()).await.unwrap();
    tx.send("y".to_string()).await.unwrap();

    // Zero-count drain events may precede the interesting one; poll until a
    // drain event accounting for both forwarded lines shows up.
    let start = std::time::Instant::now();
    loop {
        let events = collector.events().await;
        let accounted: u64 = events
            .iter()
            .filter(|e| e[0] == "test.drain")
            .map(|e| record_field(e, "messages").parse::<u64>().unwrap_or(0))
            .sum();
        // Drain events are themselves forwarded traffic and get counted by
        // later drains, so the total only grows past the two input lines.
        if accounted >= 2 {
            break;
        }
        assert!(start.elapsed() < DEADLINE, "drain never reported the lines");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    liveness.request_terminate();
    handle.await.unwrap().unwrap();
}
