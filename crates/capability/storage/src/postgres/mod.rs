//! # PostgreSQL 存储实现模块
//!
//! 配置 `FSU_DATABASE_URL` 时使用。所有查询使用参数绑定。
//!
//! ## 数据库模式要求
//!
//! - `devices`：设备表（id, name, product_key, device_key, driver_type, ip_address,
//!   port_num, device_address, collect_interval_ms, storage_interval_s,
//!   upload_interval_ms, timeout_ms, driver_id, resource_id, enabled, description）
//! - `thresholds`：阈值表（id, device_id, field_name, operator, value, severity,
//!   enabled, shielded, message）
//! - `data_cache`：最新值表，主键 (device_id, field_name)
//! - `data_points`：历史数据表（追加写入）
//! - `alarm_logs`：告警日志表（id 自增）
//! - `gateway_config`：单行网关配置（id = 1）
//! - `northbound_configs`：北向配置表，name 唯一
//!
//! 时间列均为 timestamptz，读写时与毫秒时间戳互转。

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
