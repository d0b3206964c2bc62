use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一次采集样本：字段值统一以文本表示。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectData {
    pub device_id: i64,
    pub device_name: String,
    pub product_key: String,
    pub device_key: String,
    pub timestamp_ms: i64,
    pub fields: BTreeMap<String, String>,
}

/// 最新值缓存条目。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataCacheEntry {
    pub device_id: i64,
    pub field_name: String,
    pub value: String,
    pub value_type: String,
    pub collected_at_ms: i64,
}

/// 历史数据点（追加写入）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub device_id: i64,
    pub device_name: String,
    pub field_name: String,
    pub value: String,
    pub value_type: String,
    pub collected_at_ms: i64,
}
