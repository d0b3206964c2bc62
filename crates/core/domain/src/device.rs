//! 设备模型。

use serde::{Deserialize, Serialize};

/// 采集周期默认值（毫秒）。
pub const DEFAULT_COLLECT_INTERVAL_MS: i64 = 5_000;
/// 存储周期默认值（秒）。
pub const DEFAULT_STORAGE_INTERVAL_S: i64 = 300;

/// 南向设备。
///
/// 由配置存储持有，调度器每个任务保存一份只读快照。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub product_key: String,
    #[serde(default)]
    pub device_key: String,
    /// 驱动类型（如 `modbus_tcp`）
    #[serde(default)]
    pub driver_type: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub port_num: u16,
    /// 驱动相关的地址配置（JSON 文本）
    #[serde(default)]
    pub device_address: String,
    #[serde(default)]
    pub collect_interval_ms: i64,
    #[serde(default)]
    pub storage_interval_s: i64,
    #[serde(default)]
    pub upload_interval_ms: i64,
    #[serde(default)]
    pub timeout_ms: i64,
    #[serde(default)]
    pub driver_id: Option<i64>,
    /// 绑定的物理资源（串口 / TCP 端口）
    #[serde(default)]
    pub resource_id: Option<i64>,
    #[serde(default)]
    pub enabled: bool,
}

impl Device {
    /// 采集周期，非正值取默认 5 秒。
    pub fn resolved_collect_interval_ms(&self) -> i64 {
        if self.collect_interval_ms > 0 {
            self.collect_interval_ms
        } else {
            DEFAULT_COLLECT_INTERVAL_MS
        }
    }

    /// 存储周期，非正值取默认 300 秒。
    pub fn resolved_storage_interval_s(&self) -> i64 {
        resolve_storage_interval(self.storage_interval_s)
    }
}

/// 存储周期归一化：非正值回落到 300 秒。
pub fn resolve_storage_interval(seconds: i64) -> i64 {
    if seconds > 0 {
        seconds
    } else {
        DEFAULT_STORAGE_INTERVAL_S
    }
}
