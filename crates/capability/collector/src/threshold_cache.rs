//! 阈值缓存
//!
//! 按设备缓存启用的阈值规则：
//! - `get` 在条目缺失或全量刷新时间超过 2 倍刷新周期时回源
//! - 后台任务按刷新周期（默认 1 分钟）全量重建
//! - 并发的回源共享同一次刷新（写锁内二次检查）

use crate::error::CollectorError;
use domain::Threshold;
use fsu_storage::{DeviceStore, ThresholdStore};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct CacheState {
    by_device: HashMap<i64, Vec<Threshold>>,
    last_refresh: Option<Instant>,
}

struct RefreshTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// 阈值缓存。
pub struct ThresholdCache {
    devices: Arc<dyn DeviceStore>,
    thresholds: Arc<dyn ThresholdStore>,
    interval: Duration,
    state: RwLock<CacheState>,
    refill: tokio::sync::Mutex<()>,
    task: Mutex<Option<RefreshTask>>,
}

impl ThresholdCache {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        thresholds: Arc<dyn ThresholdStore>,
        interval: Duration,
    ) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            interval
        };
        Self {
            devices,
            thresholds,
            interval,
            state: RwLock::new(CacheState::default()),
            refill: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn is_stale(&self, state: &CacheState) -> bool {
        match state.last_refresh {
            Some(at) => at.elapsed() > self.interval * 2,
            None => true,
        }
    }

    /// 命中且未过期时返回缓存副本。
    fn lookup(&self, device_id: i64) -> Option<Vec<Threshold>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if self.is_stale(&state) {
            return None;
        }
        state.by_device.get(&device_id).cloned()
    }

    /// 设备的阈值列表（含屏蔽规则，由评估方跳过）。
    pub async fn get(&self, device_id: i64) -> Result<Vec<Threshold>, CollectorError> {
        if let Some(rules) = self.lookup(device_id) {
            return Ok(rules);
        }

        let _refill = self.refill.lock().await;
        if let Some(rules) = self.lookup(device_id) {
            return Ok(rules);
        }

        let stale = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            self.is_stale(&state)
        };
        if stale {
            if let Err(err) = self.rebuild().await {
                warn!(target: "fsu.collector", error = %err, "threshold_cache_refresh_failed");
            }
            if let Some(rules) = self.lookup(device_id) {
                return Ok(rules);
            }
        }

        let loaded = self
            .thresholds
            .get_enabled_thresholds_by_device_id(device_id)
            .await?;
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_device
            .insert(device_id, loaded.clone());
        Ok(loaded)
    }

    /// 全量刷新，返回有阈值的设备数。
    pub async fn refresh(&self) -> Result<usize, CollectorError> {
        let _refill = self.refill.lock().await;
        self.rebuild().await
    }

    async fn rebuild(&self) -> Result<usize, CollectorError> {
        let devices = self.devices.get_all_devices().await?;
        let rules = self.thresholds.get_all_enabled_thresholds().await?;

        let known: HashSet<i64> = devices
            .iter()
            .filter(|device| device.id != 0)
            .map(|device| device.id)
            .collect();
        let total = rules.len();
        let mut next: HashMap<i64, Vec<Threshold>> = HashMap::with_capacity(known.len());
        for rule in rules {
            if rule.device_id == 0 || !known.contains(&rule.device_id) {
                continue;
            }
            next.entry(rule.device_id).or_default().push(rule);
        }
        let device_count = next.len();

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.by_device = next;
        state.last_refresh = Some(Instant::now());
        drop(state);

        debug!(
            target: "fsu.collector",
            devices = device_count,
            thresholds = total,
            "threshold_cache_refreshed"
        );
        Ok(device_count)
    }

    /// 使指定设备的缓存失效。
    pub fn invalidate_device(&self, device_id: i64) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_device
            .remove(&device_id);
    }

    /// 清空缓存并标记为需要全量刷新。
    pub fn invalidate_all(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.by_device.clear();
        state.last_refresh = None;
    }

    /// 覆盖最近一次全量刷新时间。
    pub fn set_last_refresh(&self, at: Option<Instant>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_refresh = at;
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_refresh
    }

    /// 缓存中的设备条目数。
    pub fn cached_devices(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_device
            .len()
    }

    /// 启动后台刷新（立即刷新一次）；已启动时忽略。
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(cache.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = cache.refresh().await {
                            warn!(target: "fsu.collector", error = %err, "threshold_cache_refresh_failed");
                        }
                    }
                }
            }
        });
        *task = Some(RefreshTask { stop_tx, handle });
        info!(
            target: "fsu.collector",
            interval_ms = self.interval.as_millis() as u64,
            "threshold_cache_started"
        );
    }

    /// 停止后台刷新；未启动时忽略。
    pub async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };
        task.stop_tx.send_replace(true);
        let _ = task.handle.await;
        info!(target: "fsu.collector", "threshold_cache_stopped");
    }
}
