//! # 采集调度能力模块
//!
//! - [`scheduler`]：按设备周期采集、入库、阈值评估、上传，并执行下行命令
//! - [`threshold_cache`]：按设备缓存启用的阈值规则
//! - [`alarm_state`]：重复告警抑制状态表
//! - [`system_stats`]：网关自身系统属性采集
//! - [`uplink`]：样本与告警的上行出口（北向管理器实现）

pub mod alarm_state;
mod error;
pub mod scheduler;
pub mod system_stats;
pub mod threshold_cache;
pub mod uplink;

pub use alarm_state::{AlarmStateTable, RepeatInterval};
pub use error::CollectorError;
pub use scheduler::{Collector, CollectorSettings, SyncReport};
pub use system_stats::SystemStatsCollector;
pub use threshold_cache::ThresholdCache;
pub use uplink::Uplink;
