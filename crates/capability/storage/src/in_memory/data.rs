//! 最新值缓存与历史数据内存实现

use crate::error::StorageError;
use crate::traits::{DataCacheStore, HistoryStore};
use domain::{DataCacheEntry, DataPoint};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 数据内存存储：最新值按 (设备, 字段) 覆盖，历史追加。
#[derive(Default)]
pub struct InMemoryDataStore {
    latest: RwLock<BTreeMap<(i64, String), DataCacheEntry>>,
    history: RwLock<Vec<DataPoint>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 历史数据条数（用于测试）
    pub fn history_len(&self) -> usize {
        self.history.read().map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl DataCacheStore for InMemoryDataStore {
    async fn save_data_cache(&self, entry: &DataCacheEntry) -> Result<(), StorageError> {
        let mut map = self
            .latest
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert((entry.device_id, entry.field_name.clone()), entry.clone());
        Ok(())
    }

    async fn get_all_devices_latest_data(&self) -> Result<Vec<DataCacheEntry>, StorageError> {
        let items = self
            .latest
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        Ok(items)
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryDataStore {
    async fn save_data_point(&self, point: &DataPoint) -> Result<(), StorageError> {
        let mut history = self
            .history
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        history.push(point.clone());
        Ok(())
    }

    async fn list_data_points(
        &self,
        device_id: i64,
        field_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let history = self
            .history
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DataPoint> = history
            .iter()
            .filter(|item| item.device_id == device_id)
            .filter(|item| field_name.is_none_or(|name| item.field_name == name))
            .cloned()
            .collect();
        items.sort_by_key(|item| item.collected_at_ms);
        if limit > 0 && items.len() > limit {
            items.drain(..items.len() - limit);
        }
        Ok(items)
    }
}
