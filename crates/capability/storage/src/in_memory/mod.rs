//! 内存存储实现模块
//!
//! 未配置数据库时使用，也用于测试。
//!
//! 包含以下实现：
//! - DeviceStore: InMemoryDeviceStore
//! - ThresholdStore: InMemoryThresholdStore
//! - DataCacheStore + HistoryStore: InMemoryDataStore
//! - AlarmLogStore: InMemoryAlarmLogStore
//! - GatewayStore: InMemoryGatewayStore
//! - NorthboundConfigStore: InMemoryNorthboundConfigStore

pub mod alarm;
pub mod data;
pub mod device;
pub mod gateway;
pub mod northbound;
pub mod threshold;

pub use alarm::*;
pub use data::*;
pub use device::*;
pub use gateway::*;
pub use northbound::*;
pub use threshold::*;
