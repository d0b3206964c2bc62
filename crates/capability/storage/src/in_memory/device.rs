//! 设备内存存储实现

use crate::error::StorageError;
use crate::traits::DeviceStore;
use domain::Device;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 设备内存存储
///
/// 使用 RwLock + BTreeMap，列表按设备 ID 有序。
#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<BTreeMap<i64, Device>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn get_all_devices(&self) -> Result<Vec<Device>, StorageError> {
        let items = self
            .devices
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        Ok(items)
    }

    async fn get_device(&self, id: i64) -> Result<Option<Device>, StorageError> {
        let item = self
            .devices
            .read()
            .ok()
            .and_then(|map| map.get(&id).cloned());
        Ok(item)
    }

    async fn save_device(&self, device: Device) -> Result<Device, StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(device.id, device.clone());
        Ok(device)
    }

    async fn delete_device(&self, id: i64) -> Result<bool, StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(&id).is_some())
    }
}
