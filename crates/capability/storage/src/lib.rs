//! # FSU Storage 模块
//!
//! 采集调度与北向管理消费的持久化抽象层，支持多种后端实现。
//!
//! ## 模块说明
//!
//! - [`traits`]：存储接口定义
//! - [`error`]：存储错误类型定义
//! - [`connection`]：PostgreSQL 连接池管理
//! - [`in_memory`]：内存实现（`RwLock` + 有序 map），未配置数据库时使用
//! - [`postgres`]：PostgreSQL 实现（sqlx 参数化查询）
//! - [`redis`]：Redis 最新值缓存
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let stores = StoreSet::in_memory();
//! let devices = stores.devices.get_all_devices().await?;
//! ```

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod redis;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use redis::RedisDataCacheStore;
pub use traits::*;

pub use in_memory::{
    InMemoryAlarmLogStore, InMemoryDataStore, InMemoryDeviceStore, InMemoryGatewayStore,
    InMemoryNorthboundConfigStore, InMemoryThresholdStore,
};

pub use postgres::{
    PgAlarmLogStore, PgDataStore, PgDeviceStore, PgGatewayStore, PgNorthboundConfigStore,
    PgThresholdStore,
};

use sqlx::PgPool;
use std::sync::Arc;

/// 网关使用的全部存储句柄。
#[derive(Clone)]
pub struct StoreSet {
    pub devices: Arc<dyn DeviceStore>,
    pub thresholds: Arc<dyn ThresholdStore>,
    pub cache: Arc<dyn DataCacheStore>,
    pub history: Arc<dyn HistoryStore>,
    pub alarms: Arc<dyn AlarmLogStore>,
    pub gateway: Arc<dyn GatewayStore>,
    pub northbound: Arc<dyn NorthboundConfigStore>,
}

impl StoreSet {
    /// 全内存存储。
    pub fn in_memory() -> Self {
        let data = Arc::new(InMemoryDataStore::new());
        Self {
            devices: Arc::new(InMemoryDeviceStore::new()),
            thresholds: Arc::new(InMemoryThresholdStore::new()),
            cache: data.clone(),
            history: data,
            alarms: Arc::new(InMemoryAlarmLogStore::new()),
            gateway: Arc::new(InMemoryGatewayStore::new()),
            northbound: Arc::new(InMemoryNorthboundConfigStore::new()),
        }
    }

    /// 全 PostgreSQL 存储。
    pub fn postgres(pool: PgPool) -> Self {
        let data = Arc::new(PgDataStore::new(pool.clone()));
        Self {
            devices: Arc::new(PgDeviceStore::new(pool.clone())),
            thresholds: Arc::new(PgThresholdStore::new(pool.clone())),
            cache: data.clone(),
            history: data,
            alarms: Arc::new(PgAlarmLogStore::new(pool.clone())),
            gateway: Arc::new(PgGatewayStore::new(pool.clone())),
            northbound: Arc::new(PgNorthboundConfigStore::new(pool)),
        }
    }

    /// 用 Redis 替换最新值缓存。
    pub fn with_cache(mut self, cache: Arc<dyn DataCacheStore>) -> Self {
        self.cache = cache;
        self
    }
}
