//! 追踪初始化与订阅链路指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub snapshots_received: u64,
    pub empty_batches: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub series_published: u64,
    pub subscription_errors: u64,
    pub subscriptions_cancelled: u64,
    pub payloads_undecodable: u64,
    /// 单通道待处理通知数的历史最大值。
    pub max_queue_depth: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    snapshots_received: AtomicU64,
    empty_batches: AtomicU64,
    records_accepted: AtomicU64,
    records_rejected: AtomicU64,
    series_published: AtomicU64,
    subscription_errors: AtomicU64,
    subscriptions_cancelled: AtomicU64,
    payloads_undecodable: AtomicU64,
    max_queue_depth: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            snapshots_received: AtomicU64::new(0),
            empty_batches: AtomicU64::new(0),
            records_accepted: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            series_published: AtomicU64::new(0),
            subscription_errors: AtomicU64::new(0),
            subscriptions_cancelled: AtomicU64::new(0),
            payloads_undecodable: AtomicU64::new(0),
            max_queue_depth: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            snapshots_received: self.snapshots_received.load(Ordering::Relaxed),
            empty_batches: self.empty_batches.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            series_published: self.series_published.load(Ordering::Relaxed),
            subscription_errors: self.subscription_errors.load(Ordering::Relaxed),
            subscriptions_cancelled: self.subscriptions_cancelled.load(Ordering::Relaxed),
            payloads_undecodable: self.payloads_undecodable.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的订阅 ID。
pub fn new_subscription_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录快照通知接收次数。
pub fn record_snapshot_received() {
    metrics().snapshots_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录空快照次数。
pub fn record_empty_batch() {
    metrics().empty_batches.fetch_add(1, Ordering::Relaxed);
}

/// 记录解析成功的记录数。
pub fn record_records_accepted(count: u64) {
    metrics()
        .records_accepted
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录被拒绝的记录数。
pub fn record_records_rejected(count: u64) {
    metrics()
        .records_rejected
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录曲线推送次数。
pub fn record_series_published() {
    metrics().series_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅错误次数。
pub fn record_subscription_error() {
    metrics()
        .subscription_errors
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅取消次数。
pub fn record_subscription_cancelled() {
    metrics()
        .subscriptions_cancelled
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录无法解码的快照报文次数。
pub fn record_payload_undecodable() {
    metrics()
        .payloads_undecodable
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录通道队列深度，只保留最大值。
pub fn record_queue_depth(depth: u64) {
    metrics().max_queue_depth.fetch_max(depth, Ordering::Relaxed);
}
