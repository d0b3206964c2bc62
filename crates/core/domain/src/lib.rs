//! FSU 领域模型：所有能力模块共享的数据结构。

pub mod command;
pub mod data;
pub mod device;
pub mod northbound;
pub mod system;
pub mod threshold;

pub use command::{CommandResult, NorthboundCommand};
pub use data::{CollectData, DataCacheEntry, DataPoint};
pub use device::Device;
pub use northbound::NorthboundConfig;
pub use system::{SYSTEM_STATS_DEVICE_ID, SYSTEM_STATS_DEVICE_NAME, SystemStats};
pub use threshold::{AlarmLog, AlarmPayload, Threshold, ThresholdOperator};

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// 获取当前时间戳（纳秒），用于生成客户端 ID 与消息 ID。
pub fn now_epoch_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
