//! 日志初始化与进程级指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub samples_collected: u64,
    pub driver_errors: u64,
    pub history_writes: u64,
    pub storage_errors: u64,
    pub alarms_emitted: u64,
    pub alarms_suppressed: u64,
    pub publish_success: u64,
    pub publish_failure: u64,
    pub queue_dropped: u64,
    pub commands_enqueued: u64,
    pub commands_executed: u64,
    pub reconnect_attempts: u64,
    pub lock_timeouts: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    samples_collected: AtomicU64,
    driver_errors: AtomicU64,
    history_writes: AtomicU64,
    storage_errors: AtomicU64,
    alarms_emitted: AtomicU64,
    alarms_suppressed: AtomicU64,
    publish_success: AtomicU64,
    publish_failure: AtomicU64,
    queue_dropped: AtomicU64,
    commands_enqueued: AtomicU64,
    commands_executed: AtomicU64,
    reconnect_attempts: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            samples_collected: AtomicU64::new(0),
            driver_errors: AtomicU64::new(0),
            history_writes: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            alarms_emitted: AtomicU64::new(0),
            alarms_suppressed: AtomicU64::new(0),
            publish_success: AtomicU64::new(0),
            publish_failure: AtomicU64::new(0),
            queue_dropped: AtomicU64::new(0),
            commands_enqueued: AtomicU64::new(0),
            commands_executed: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_collected: self.samples_collected.load(Ordering::Relaxed),
            driver_errors: self.driver_errors.load(Ordering::Relaxed),
            history_writes: self.history_writes.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            alarms_emitted: self.alarms_emitted.load(Ordering::Relaxed),
            alarms_suppressed: self.alarms_suppressed.load(Ordering::Relaxed),
            publish_success: self.publish_success.load(Ordering::Relaxed),
            publish_failure: self.publish_failure.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            commands_enqueued: self.commands_enqueued.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
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

/// 初始化 tracing（默认 info，可用 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录一次成功采集。
pub fn record_sample_collected() {
    metrics().samples_collected.fetch_add(1, Ordering::Relaxed);
}

/// 记录驱动采集失败。
pub fn record_driver_error() {
    metrics().driver_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录历史数据写入。
pub fn record_history_write() {
    metrics().history_writes.fetch_add(1, Ordering::Relaxed);
}

/// 记录持久化失败。
pub fn record_storage_error() {
    metrics().storage_errors.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_emitted() {
    metrics().alarms_emitted.fetch_add(1, Ordering::Relaxed);
}

/// 记录被重复抑制的告警。
pub fn record_alarm_suppressed() {
    metrics().alarms_suppressed.fetch_add(1, Ordering::Relaxed);
}

pub fn record_publish_success() {
    metrics().publish_success.fetch_add(1, Ordering::Relaxed);
}

pub fn record_publish_failure() {
    metrics().publish_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录队列溢出丢弃的条目数。
pub fn record_queue_dropped(count: u64) {
    if count > 0 {
        metrics().queue_dropped.fetch_add(count, Ordering::Relaxed);
    }
}

/// 记录下行命令入队数量。
pub fn record_commands_enqueued(count: u64) {
    metrics()
        .commands_enqueued
        .fetch_add(count, Ordering::Relaxed);
}

pub fn record_command_executed() {
    metrics().commands_executed.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连尝试。
pub fn record_reconnect_attempt() {
    metrics()
        .reconnect_attempts
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录资源锁等待超时。
pub fn record_lock_timeout() {
    metrics().lock_timeouts.fetch_add(1, Ordering::Relaxed);
}
