//! 北向配置内存存储实现

use crate::error::StorageError;
use crate::traits::NorthboundConfigStore;
use domain::NorthboundConfig;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryNorthboundConfigStore {
    configs: RwLock<Vec<NorthboundConfig>>,
}

impl InMemoryNorthboundConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl NorthboundConfigStore for InMemoryNorthboundConfigStore {
    async fn list_northbound_configs(&self) -> Result<Vec<NorthboundConfig>, StorageError> {
        let items = self
            .configs
            .read()
            .map(|items| items.clone())
            .unwrap_or_default();
        Ok(items)
    }

    async fn save_northbound_config(
        &self,
        mut config: NorthboundConfig,
    ) -> Result<NorthboundConfig, StorageError> {
        let mut configs = self
            .configs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(existing) = configs.iter_mut().find(|item| item.name == config.name) {
            config.id = existing.id;
            *existing = config.clone();
            return Ok(config);
        }
        config.id = configs.len() as i64 + 1;
        configs.push(config.clone());
        Ok(config)
    }

    async fn update_connection_state(
        &self,
        name: &str,
        connected: bool,
        ts_ms: i64,
    ) -> Result<(), StorageError> {
        let mut configs = self
            .configs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(config) = configs.iter_mut().find(|item| item.name == name) else {
            return Err(StorageError::new(format!("northbound config {} not found", name)));
        };
        config.connected = connected;
        if connected {
            config.last_connected_at_ms = Some(ts_ms);
        }
        Ok(())
    }
}
