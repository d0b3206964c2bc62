//! 存储接口 Trait 定义
//!
//! 采集调度与北向管理消费的持久化接口：
//! - DeviceStore：设备配置
//! - ThresholdStore：阈值规则
//! - DataCacheStore：最新值缓存
//! - HistoryStore：历史数据（追加写入）
//! - AlarmLogStore：告警日志
//! - GatewayStore：网关身份与告警重复间隔
//! - NorthboundConfigStore：北向配置
//!
//! 所有接口返回 StorageError，调用方记录日志后继续。

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{AlarmLog, DataCacheEntry, DataPoint, Device, NorthboundConfig, Threshold};

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 列出所有设备（含禁用）
    async fn get_all_devices(&self) -> Result<Vec<Device>, StorageError>;

    async fn get_device(&self, id: i64) -> Result<Option<Device>, StorageError>;

    /// 新增或覆盖设备
    async fn save_device(&self, device: Device) -> Result<Device, StorageError>;

    async fn delete_device(&self, id: i64) -> Result<bool, StorageError>;
}

/// 阈值存储接口
#[async_trait]
pub trait ThresholdStore: Send + Sync {
    /// 查询设备的启用阈值（屏蔽标记由评估方判断）
    async fn get_enabled_thresholds_by_device_id(
        &self,
        device_id: i64,
    ) -> Result<Vec<Threshold>, StorageError>;

    /// 查询所有启用阈值，用于全量刷新缓存
    async fn get_all_enabled_thresholds(&self) -> Result<Vec<Threshold>, StorageError>;

    async fn save_threshold(&self, threshold: Threshold) -> Result<Threshold, StorageError>;

    async fn delete_threshold(&self, id: i64) -> Result<bool, StorageError>;
}

/// 最新值缓存接口
#[async_trait]
pub trait DataCacheStore: Send + Sync {
    async fn save_data_cache(&self, entry: &DataCacheEntry) -> Result<(), StorageError>;

    /// 所有设备的最新值
    async fn get_all_devices_latest_data(&self) -> Result<Vec<DataCacheEntry>, StorageError>;
}

/// 历史数据接口
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save_data_point(&self, point: &DataPoint) -> Result<(), StorageError>;

    /// 按设备（可选字段）查询历史，按时间升序
    async fn list_data_points(
        &self,
        device_id: i64,
        field_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError>;
}

/// 告警日志接口
#[async_trait]
pub trait AlarmLogStore: Send + Sync {
    /// 写入告警日志，返回分配 ID 后的记录
    async fn create_alarm_log(&self, log: AlarmLog) -> Result<AlarmLog, StorageError>;

    /// 最新在前
    async fn list_alarm_logs(
        &self,
        device_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<AlarmLog>, StorageError>;
}

/// 网关配置接口
#[async_trait]
pub trait GatewayStore: Send + Sync {
    /// 网关身份 `(product_key, device_key)`，已去除首尾空白
    async fn get_gateway_identity(&self) -> Result<(String, String), StorageError>;

    async fn get_alarm_repeat_interval_seconds(&self) -> Result<i64, StorageError>;

    async fn update_alarm_repeat_interval_seconds(&self, seconds: i64)
    -> Result<(), StorageError>;
}

/// 北向配置接口
#[async_trait]
pub trait NorthboundConfigStore: Send + Sync {
    async fn list_northbound_configs(&self) -> Result<Vec<NorthboundConfig>, StorageError>;

    async fn save_northbound_config(
        &self,
        config: NorthboundConfig,
    ) -> Result<NorthboundConfig, StorageError>;

    /// 更新连接状态；连接成功时刷新 last_connected_at
    async fn update_connection_state(
        &self,
        name: &str,
        connected: bool,
        ts_ms: i64,
    ) -> Result<(), StorageError>;
}
