//! 网关配置内存存储实现

use crate::error::StorageError;
use crate::traits::GatewayStore;
use std::sync::RwLock;

/// 告警重复间隔默认值（秒）。
pub const DEFAULT_ALARM_REPEAT_INTERVAL_SECONDS: i64 = 60;

struct GatewayState {
    product_key: String,
    device_key: String,
    alarm_repeat_interval_seconds: i64,
}

pub struct InMemoryGatewayStore {
    state: RwLock<GatewayState>,
}

impl InMemoryGatewayStore {
    pub fn new() -> Self {
        Self::with_identity("", "")
    }

    pub fn with_identity(product_key: impl Into<String>, device_key: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(GatewayState {
                product_key: product_key.into(),
                device_key: device_key.into(),
                alarm_repeat_interval_seconds: DEFAULT_ALARM_REPEAT_INTERVAL_SECONDS,
            }),
        }
    }
}

impl Default for InMemoryGatewayStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GatewayStore for InMemoryGatewayStore {
    async fn get_gateway_identity(&self) -> Result<(String, String), StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok((
            state.product_key.trim().to_string(),
            state.device_key.trim().to_string(),
        ))
    }

    async fn get_alarm_repeat_interval_seconds(&self) -> Result<i64, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state.alarm_repeat_interval_seconds)
    }

    async fn update_alarm_repeat_interval_seconds(
        &self,
        seconds: i64,
    ) -> Result<(), StorageError> {
        if seconds <= 0 {
            return Err(StorageError::new("alarm repeat interval must be positive"));
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        state.alarm_repeat_interval_seconds = seconds;
        Ok(())
    }
}
