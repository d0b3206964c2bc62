//! 阈值内存存储实现

use crate::error::StorageError;
use crate::traits::ThresholdStore;
use domain::Threshold;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryThresholdStore {
    thresholds: RwLock<BTreeMap<i64, Threshold>>,
}

impl InMemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn enabled_where(&self, filter: impl Fn(&Threshold) -> bool) -> Vec<Threshold> {
        self.thresholds
            .read()
            .map(|map| {
                map.values()
                    .filter(|item| item.enabled && filter(item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ThresholdStore for InMemoryThresholdStore {
    async fn get_enabled_thresholds_by_device_id(
        &self,
        device_id: i64,
    ) -> Result<Vec<Threshold>, StorageError> {
        Ok(self.enabled_where(|item| item.device_id == device_id))
    }

    async fn get_all_enabled_thresholds(&self) -> Result<Vec<Threshold>, StorageError> {
        Ok(self.enabled_where(|_| true))
    }

    async fn save_threshold(&self, threshold: Threshold) -> Result<Threshold, StorageError> {
        let mut map = self
            .thresholds
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(threshold.id, threshold.clone());
        Ok(threshold)
    }

    async fn delete_threshold(&self, id: i64) -> Result<bool, StorageError> {
        let mut map = self
            .thresholds
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(&id).is_some())
    }
}
