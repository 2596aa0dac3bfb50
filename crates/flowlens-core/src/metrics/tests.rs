use super::*;

#[test]
fn test_counter() {
    let counter = Counter::new();
    assert_eq!(counter.get(), 0);

    counter.inc();
    counter.inc();
    assert_eq!(counter.get(), 2);

    // clones share the value
    let shared = counter.clone();
    shared.inc();
    assert_eq!(counter.get(), 3);
}

#[test]
fn test_histogram() {
    let histogram = Histogram::with_buckets(vec![1.0, 10.0, 100.0]);

    histogram.observe(0.5);
    histogram.observe(5.0);
    histogram.observe(50.0);
    histogram.observe(500.0);

    assert_eq!(histogram.count(), 4);

    let buckets = histogram.bucket_counts();
    assert_eq!(buckets[0], (1.0, 1)); // 0.5
    assert_eq!(buckets[1], (10.0, 2)); // 0.5, 5
    assert_eq!(buckets[2], (100.0, 3)); // 0.5, 5, 50
}

#[test]
fn test_histogram_mean() {
    let histogram = Histogram::new();
    assert_eq!(histogram.mean(), 0.0);

    histogram.observe(2.0);
    histogram.observe(4.0);
    assert!((histogram.mean() - 3.0).abs() < 1e-9);
}

#[test]
fn test_clones_share_values() {
    let metrics = StatusMetrics::new();
    let clone = metrics.clone();

    clone.errors.inc();
    metrics.messages.inc();

    let report = metrics.report();
    assert_eq!(report.errors, 1);
    assert_eq!(report.messages_received, 1);
    assert_eq!(clone.report(), report);
}

#[test]
fn test_export_prometheus() {
    let metrics = StatusMetrics::new();
    metrics.unroutable.inc();
    metrics.handler_latency.observe(0.3);

    let text = metrics.export_prometheus();
    assert!(text.contains("flowlens_unroutable_total 1"));
    assert!(text.contains("# TYPE flowlens_handler_latency_ms histogram"));
    assert!(text.contains("flowlens_handler_latency_ms_count 1"));
}
