//! 网关运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 未设置时使用内存存储
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub redis_cache_ttl_seconds: Option<u64>,
    pub tick_ms: u64,
    pub device_sync_seconds: u64,
    pub threshold_refresh_seconds: u64,
    pub alarm_repeat_seconds: u64,
    pub system_stats_enabled: bool,
    pub system_stats_interval_seconds: u64,
    pub lock_max_wait_ms: u64,
    pub lock_idle_seconds: u64,
    pub command_poll_ms: u64,
    pub command_batch: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            redis_cache_ttl_seconds: None,
            tick_ms: 1000,
            device_sync_seconds: 10,
            threshold_refresh_seconds: 60,
            alarm_repeat_seconds: 60,
            system_stats_enabled: true,
            system_stats_interval_seconds: 60,
            lock_max_wait_ms: 5000,
            lock_idle_seconds: 600,
            command_poll_ms: 500,
            command_batch: 20,
        }
    }
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let database_url = read_optional("FSU_DATABASE_URL");
        let redis_url = read_optional("FSU_REDIS_URL");
        let redis_cache_ttl_seconds =
            read_optional_u64("FSU_REDIS_CACHE_TTL_SECONDS")?.filter(|value| *value > 0);
        let tick_ms = read_positive_u64("FSU_TICK_MS", defaults.tick_ms)?;
        let device_sync_seconds =
            read_positive_u64("FSU_DEVICE_SYNC_SECONDS", defaults.device_sync_seconds)?;
        let threshold_refresh_seconds = read_positive_u64(
            "FSU_THRESHOLD_REFRESH_SECONDS",
            defaults.threshold_refresh_seconds,
        )?;
        let alarm_repeat_seconds =
            read_u64_with_default("FSU_ALARM_REPEAT_SECONDS", defaults.alarm_repeat_seconds)?;
        let system_stats_enabled =
            read_bool_with_default("FSU_SYSTEM_STATS", defaults.system_stats_enabled);
        let system_stats_interval_seconds = read_positive_u64(
            "FSU_SYSTEM_STATS_INTERVAL_SECONDS",
            defaults.system_stats_interval_seconds,
        )?;
        let lock_max_wait_ms =
            read_u64_with_default("FSU_LOCK_MAX_WAIT_MS", defaults.lock_max_wait_ms)?;
        let lock_idle_seconds =
            read_positive_u64("FSU_LOCK_IDLE_SECONDS", defaults.lock_idle_seconds)?;
        let command_poll_ms = read_positive_u64("FSU_COMMAND_POLL_MS", defaults.command_poll_ms)?;
        let command_batch =
            read_positive_u64("FSU_COMMAND_BATCH", defaults.command_batch as u64)? as usize;

        Ok(Self {
            database_url,
            redis_url,
            redis_cache_ttl_seconds,
            tick_ms,
            device_sync_seconds,
            threshold_refresh_seconds,
            alarm_repeat_seconds,
            system_stats_enabled,
            system_stats_interval_seconds,
            lock_max_wait_ms,
            lock_idle_seconds,
            command_poll_ms,
            command_batch,
        })
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn device_sync_interval(&self) -> Duration {
        Duration::from_secs(self.device_sync_seconds)
    }

    pub fn threshold_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.threshold_refresh_seconds)
    }

    pub fn system_stats_interval(&self) -> Duration {
        Duration::from_secs(self.system_stats_interval_seconds)
    }

    pub fn lock_max_wait(&self) -> Duration {
        Duration::from_millis(self.lock_max_wait_ms)
    }

    pub fn lock_idle(&self) -> Duration {
        Duration::from_secs(self.lock_idle_seconds)
    }

    pub fn command_poll_interval(&self) -> Duration {
        Duration::from_millis(self.command_poll_ms)
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 读取正整数，0 视为非法。
fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        ),
        Err(_) => default,
    }
}
