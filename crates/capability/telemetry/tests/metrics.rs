use aircare_telemetry::{
    TelemetryMetrics, init_tracing, metrics, new_subscription_id, record_queue_depth,
    record_records_accepted, record_records_rejected, record_snapshot_received,
};

#[test]
fn subscription_ids_are_unique() {
    let first = new_subscription_id();
    let second = new_subscription_id();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[test]
fn counters_only_grow() {
    let before = metrics().snapshot();
    record_snapshot_received();
    record_records_accepted(3);
    record_records_rejected(2);
    let after = metrics().snapshot();
    // 其他测试线程可能并发累加，这里只断言下界
    assert!(after.snapshots_received >= before.snapshots_received + 1);
    assert!(after.records_accepted >= before.records_accepted + 3);
    assert!(after.records_rejected >= before.records_rejected + 2);
}

#[test]
fn queue_depth_keeps_high_water_mark() {
    record_queue_depth(7);
    record_queue_depth(2);
    assert!(metrics().snapshot().max_queue_depth >= 7);
}

#[test]
fn fresh_metrics_start_at_zero() {
    let metrics = TelemetryMetrics::new();
    assert_eq!(metrics.snapshot(), Default::default());
}

#[test]
fn init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
