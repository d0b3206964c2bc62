//! 告警状态表
//!
//! 记录每个 `(设备, 阈值)` 最近一次触发时间，用于重复告警抑制：
//! - 首次命中立即触发
//! - 持续命中时按重复间隔限频
//! - 未命中时删除状态，下次命中重新视为首次
//!
//! 每 512 次判定顺带清理一次过期条目。

use domain::Threshold;
use fsu_storage::GatewayStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_STATE_TTL: Duration = Duration::from_secs(24 * 3600);
const MAX_STATE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
const PRUNE_EVERY_CALLS: u64 = 512;
const REPEAT_INTERVAL_CACHE_WINDOW: Duration = Duration::from_secs(5);

/// 状态键。阈值有 ID 时只用 ID 区分，否则退化为 (字段, 运算符, 阈值)。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AlarmStateKey {
    device_id: i64,
    threshold_id: i64,
    field_name: String,
    operator: String,
    threshold_bits: u64,
}

impl AlarmStateKey {
    fn new(device_id: i64, rule: &Threshold) -> Self {
        if rule.id > 0 {
            return Self {
                device_id,
                threshold_id: rule.id,
                field_name: String::new(),
                operator: String::new(),
                threshold_bits: 0,
            };
        }
        Self {
            device_id,
            threshold_id: 0,
            field_name: rule.field_name.trim().to_lowercase(),
            operator: rule.operator.trim().to_string(),
            threshold_bits: rule.value.to_bits(),
        }
    }
}

/// 过期时间：`max(24h, 120 × 重复间隔)`，上限 7 天。
pub fn state_ttl(repeat_interval: Duration) -> Duration {
    DEFAULT_STATE_TTL
        .max(repeat_interval.saturating_mul(120))
        .min(MAX_STATE_TTL)
}

/// 告警状态表。
#[derive(Default)]
pub struct AlarmStateTable {
    states: Mutex<HashMap<AlarmStateKey, i64>>,
    calls: AtomicU64,
}

impl AlarmStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<AlarmStateKey, i64>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 更新状态并返回是否应发出新告警。`now_ms` 为毫秒时间戳。
    pub fn should_emit(
        &self,
        device_id: i64,
        rule: &Threshold,
        matched: bool,
        now_ms: i64,
        repeat_interval: Duration,
    ) -> bool {
        let repeat_interval = if repeat_interval.is_zero() {
            DEFAULT_REPEAT_INTERVAL
        } else {
            repeat_interval
        };
        self.maybe_prune(now_ms, repeat_interval);

        let key = AlarmStateKey::new(device_id, rule);
        let mut states = self.states();
        if !matched {
            states.remove(&key);
            return false;
        }
        match states.get_mut(&key) {
            None => {
                states.insert(key, now_ms);
                true
            }
            Some(last) if now_ms.saturating_sub(*last) >= repeat_interval.as_millis() as i64 => {
                *last = now_ms;
                true
            }
            Some(_) => false,
        }
    }

    fn maybe_prune(&self, now_ms: i64, repeat_interval: Duration) {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % PRUNE_EVERY_CALLS != 0 {
            return;
        }
        let removed = self.prune(now_ms, state_ttl(repeat_interval));
        if removed > 0 {
            debug!(target: "fsu.collector", removed = removed, "alarm_states_pruned");
        }
    }

    /// 删除最后触发时间早于 `now_ms - ttl` 的条目，返回删除数。
    pub fn prune(&self, now_ms: i64, ttl: Duration) -> usize {
        let ttl_ms = ttl.as_millis() as i64;
        let mut states = self.states();
        let before = states.len();
        states.retain(|_, last| now_ms.saturating_sub(*last) <= ttl_ms);
        before - states.len()
    }

    /// 设备移除时清空其所有状态。
    pub fn clear_for_device(&self, device_id: i64) {
        self.states().retain(|key, _| key.device_id != device_id);
    }

    pub fn reset(&self) {
        self.states().clear();
        self.calls.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.states().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states().is_empty()
    }

    /// 该设备下某条规则是否处于告警锁存。
    pub fn is_latched(&self, device_id: i64, rule: &Threshold) -> bool {
        self.states().contains_key(&AlarmStateKey::new(device_id, rule))
    }
}

/// 告警重复间隔：从网关配置读取，缓存 5 秒。
pub struct RepeatInterval {
    store: Arc<dyn GatewayStore>,
    fallback: Duration,
    cached: Mutex<Option<(Duration, Instant)>>,
}

impl RepeatInterval {
    /// `fallback` 在读取失败或配置非正时使用。
    pub fn new(store: Arc<dyn GatewayStore>, fallback: Duration) -> Self {
        let fallback = if fallback.is_zero() {
            DEFAULT_REPEAT_INTERVAL
        } else {
            fallback
        };
        Self {
            store,
            fallback,
            cached: Mutex::new(None),
        }
    }

    pub async fn resolve(&self) -> Duration {
        if let Some((value, expires_at)) = *self.cached.lock().unwrap_or_else(PoisonError::into_inner) {
            if Instant::now() < expires_at {
                return value;
            }
        }

        let resolved = match self.store.get_alarm_repeat_interval_seconds().await {
            Ok(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            Ok(_) => self.fallback,
            Err(err) => {
                warn!(target: "fsu.collector", error = %err, "alarm_repeat_interval_load_failed");
                self.fallback
            }
        };
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((resolved, Instant::now() + REPEAT_INTERVAL_CACHE_WINDOW));
        resolved
    }

    /// 配置变更后立即生效。
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
