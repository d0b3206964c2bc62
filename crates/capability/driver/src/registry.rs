//! 驱动注册表：按 `driver_type` 分发

use crate::error::DriverError;
use crate::modbus_tcp::ModbusTcpDriver;
use crate::{Driver, Fields};
use async_trait::async_trait;
use domain::Device;
use std::collections::HashMap;
use std::sync::Arc;

/// 驱动注册表
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置驱动
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let modbus: Arc<dyn Driver> = Arc::new(ModbusTcpDriver::new());
        registry.register("modbus_tcp", modbus.clone());
        registry.register("modbus-tcp", modbus);
        registry
    }

    pub fn register(&mut self, driver_type: &str, driver: Arc<dyn Driver>) {
        self.drivers.insert(normalize(driver_type), driver);
    }

    pub fn get(&self, driver_type: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(&normalize(driver_type)).cloned()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    fn resolve(&self, device: &Device) -> Result<Arc<dyn Driver>, DriverError> {
        self.get(&device.driver_type)
            .ok_or_else(|| DriverError::UnsupportedType(device.driver_type.clone()))
    }
}

fn normalize(driver_type: &str) -> String {
    driver_type.trim().to_ascii_lowercase()
}

#[async_trait]
impl Driver for DriverRegistry {
    async fn collect(&self, device: &Device) -> Result<Fields, DriverError> {
        self.resolve(device)?.collect(device).await
    }

    async fn write(&self, device: &Device, field: &str, value: &str) -> Result<(), DriverError> {
        self.resolve(device)?.write(device, field, value).await
    }
}
