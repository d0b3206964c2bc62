//! FSU 自身系统属性。

use crate::data::CollectData;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 系统属性的保留设备 ID。
pub const SYSTEM_STATS_DEVICE_ID: i64 = -1;
/// 系统属性的保留设备名称。
pub const SYSTEM_STATS_DEVICE_NAME: &str = "__system__";

/// 系统属性快照。内存单位 MB，硬盘单位 GB，运行时间单位秒。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_usage: f64,
    pub mem_total: f64,
    pub mem_used: f64,
    pub mem_usage: f64,
    pub mem_available: f64,
    pub disk_total: f64,
    pub disk_used: f64,
    pub disk_usage: f64,
    pub disk_free: f64,
    pub uptime: i64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub timestamp_ms: i64,
}

impl SystemStats {
    /// 转换为 13 个文本字段（两位小数，运行时间为整数）。
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        let mut put = |key: &str, value: f64| {
            fields.insert(key.to_string(), format!("{:.2}", value));
        };
        put("cpu_usage", self.cpu_usage);
        put("mem_total", self.mem_total);
        put("mem_used", self.mem_used);
        put("mem_usage", self.mem_usage);
        put("mem_available", self.mem_available);
        put("disk_total", self.disk_total);
        put("disk_used", self.disk_used);
        put("disk_usage", self.disk_usage);
        put("disk_free", self.disk_free);
        put("load_1", self.load_1);
        put("load_5", self.load_5);
        put("load_15", self.load_15);
        fields.insert("uptime".to_string(), self.uptime.to_string());
        fields
    }

    /// 打包为保留设备身份下的采集样本。
    pub fn to_collect_data(&self, product_key: &str, device_key: &str) -> CollectData {
        CollectData {
            device_id: SYSTEM_STATS_DEVICE_ID,
            device_name: SYSTEM_STATS_DEVICE_NAME.to_string(),
            product_key: product_key.to_string(),
            device_key: device_key.to_string(),
            timestamp_ms: self.timestamp_ms,
            fields: self.to_fields(),
        }
    }
}
