//! # 设备驱动能力模块
//!
//! 采集调度器只依赖 [`Driver`] 接口：
//! - `collect(device)` 返回 `字段名 → 文本值`
//! - `write(device, field, value)` 执行一次下行写入
//!
//! [`DriverRegistry`] 按 `device.driver_type` 分发到具体驱动，
//! 自身也实现 [`Driver`]，调度器持有它即可。
//!
//! ## Modbus TCP 地址配置
//!
//! ```json
//! // device.device_address
//! {
//!   "slave_id": 1,
//!   "points": [
//!     { "name": "temperature", "function_code": 3, "register_address": 100,
//!       "register_count": 2, "data_type": "float32", "scale": 0.1 }
//!   ]
//! }
//! ```

mod error;
mod modbus_tcp;
mod registry;
mod types;

pub use error::DriverError;
pub use modbus_tcp::ModbusTcpDriver;
pub use registry::DriverRegistry;
pub use types::*;

use async_trait::async_trait;
use domain::Device;
use std::collections::BTreeMap;

/// 一次采集的字段集合（有序，便于稳定输出）
pub type Fields = BTreeMap<String, String>;

/// 设备驱动接口
#[async_trait]
pub trait Driver: Send + Sync {
    /// 采集设备全部点位
    async fn collect(&self, device: &Device) -> Result<Fields, DriverError>;

    /// 写入单个字段
    async fn write(&self, device: &Device, field: &str, value: &str) -> Result<(), DriverError>;
}

/// 驱动输出的数值统一格式化为六位小数
pub fn format_value(value: f64) -> String {
    format!("{:.6}", value)
}
