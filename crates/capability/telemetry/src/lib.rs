//! 日志初始化与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub fields_matched: u64,
    pub field_misses: u64,
    pub slot_write_success: u64,
    pub slot_write_failure: u64,
    pub unmatched_messages: u64,
    pub client_loop_failures: u64,
    pub reconnect_attempts: u64,
    pub reconnect_failures: u64,
    pub notifications_sent: u64,
}

/// 桥接服务计数器。
pub struct TelemetryMetrics {
    messages_received: AtomicU64,
    fields_matched: AtomicU64,
    field_misses: AtomicU64,
    slot_write_success: AtomicU64,
    slot_write_failure: AtomicU64,
    unmatched_messages: AtomicU64,
    client_loop_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnect_failures: AtomicU64,
    notifications_sent: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            fields_matched: AtomicU64::new(0),
            field_misses: AtomicU64::new(0),
            slot_write_success: AtomicU64::new(0),
            slot_write_failure: AtomicU64::new(0),
            unmatched_messages: AtomicU64::new(0),
            client_loop_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_failures: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            fields_matched: self.fields_matched.load(Ordering::Relaxed),
            field_misses: self.field_misses.load(Ordering::Relaxed),
            slot_write_success: self.slot_write_success.load(Ordering::Relaxed),
            slot_write_failure: self.slot_write_failure.load(Ordering::Relaxed),
            unmatched_messages: self.unmatched_messages.load(Ordering::Relaxed),
            client_loop_failures: self.client_loop_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnect_failures: self.reconnect_failures.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
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

/// 初始化 tracing（默认 info，`RUST_LOG` 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 以 info 级别输出当前计数器。
pub fn log_snapshot(reason: &'static str) {
    let snapshot = metrics().snapshot();
    info!(
        target: "bridge.telemetry",
        reason,
        messages_received = snapshot.messages_received,
        fields_matched = snapshot.fields_matched,
        field_misses = snapshot.field_misses,
        slot_write_success = snapshot.slot_write_success,
        slot_write_failure = snapshot.slot_write_failure,
        unmatched_messages = snapshot.unmatched_messages,
        client_loop_failures = snapshot.client_loop_failures,
        reconnect_attempts = snapshot.reconnect_attempts,
        reconnect_failures = snapshot.reconnect_failures,
        notifications_sent = snapshot.notifications_sent,
        "metrics_snapshot"
    );
}

/// 记录收到的消息次数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录解析成功的字段数。
pub fn record_field_matched() {
    metrics().fields_matched.fetch_add(1, Ordering::Relaxed);
}

/// 记录未找到或解析失败的字段数。
pub fn record_field_miss() {
    metrics().field_misses.fetch_add(1, Ordering::Relaxed);
}

/// 记录槽位写入成功次数。
pub fn record_slot_write_success() {
    metrics().slot_write_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录槽位写入失败次数。
pub fn record_slot_write_failure() {
    metrics().slot_write_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录零字段命中的消息次数。
pub fn record_unmatched_message() {
    metrics().unmatched_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录客户端网络循环失败次数。
pub fn record_client_loop_failure() {
    metrics().client_loop_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连尝试次数。
pub fn record_reconnect_attempt() {
    metrics().reconnect_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连失败次数。
pub fn record_reconnect_failure() {
    metrics().reconnect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录投递的变化通知数。
pub fn record_notifications_sent(count: u64) {
    metrics()
        .notifications_sent
        .fetch_add(count, Ordering::Relaxed);
}
