//! 采集调度错误类型定义

use fsu_driver::DriverError;
use fsu_northbound::NorthboundError;
use fsu_resource::LockError;
use fsu_storage::StorageError;

/// 采集调度错误
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("collector is already running")]
    AlreadyRunning,

    #[error("collector is not running")]
    NotRunning,

    /// 设备不在采集任务中
    #[error("device {0} not in collector")]
    NotFound(i64),

    #[error("device {0} already in collector")]
    AlreadyExists(i64),

    /// 按 `(product_key, device_key)` 找不到设备
    #[error("device not found by identity: {0}/{1}")]
    IdentityNotFound(String, String),

    /// 下行命令缺少必要字段
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Northbound(#[from] NorthboundError),
}
