//! FSU 边缘网关进程：装配存储、驱动、北向与采集调度，Ctrl-C 后有序退出。

use fsu_collector::{Collector, CollectorSettings, SystemStatsCollector};
use fsu_config::AppConfig;
use fsu_driver::DriverRegistry;
use fsu_northbound::{MqttConnector, NorthboundManager};
use fsu_resource::ResourceLocker;
use fsu_storage::{RedisDataCacheStore, StoreSet, connect_pool};
use fsu_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let stores = build_stores(&config).await?;

    // 北向：按存储中的配置创建适配器
    let northbound = Arc::new(NorthboundManager::new(Arc::new(MqttConnector::new())));
    if let Err(err) = northbound.load_from_store(stores.northbound.as_ref()).await {
        warn!(target: "fsu.gateway", error = %err, "northbound_config_load_failed");
    }

    let settings = CollectorSettings {
        tick: config.tick(),
        device_sync_interval: config.device_sync_interval(),
        command_poll_interval: config.command_poll_interval(),
        command_batch: config.command_batch,
        threshold_refresh_interval: config.threshold_refresh_interval(),
        alarm_repeat_interval: Duration::from_secs(config.alarm_repeat_seconds),
        lock_idle: config.lock_idle(),
    };
    let collector = Collector::new(
        stores.clone(),
        Arc::new(DriverRegistry::with_builtin()),
        ResourceLocker::with_max_wait(config.lock_max_wait()),
        northbound.clone(),
        settings,
    );
    collector.start().await?;

    let system_stats = if config.system_stats_enabled {
        let sampler = SystemStatsCollector::new(
            stores.clone(),
            northbound.clone(),
            config.system_stats_interval(),
        );
        sampler.start().await?;
        Some(sampler)
    } else {
        None
    };

    info!(
        target: "fsu.gateway",
        devices = collector.task_count(),
        adapters = northbound.adapter_count(),
        system_stats = config.system_stats_enabled,
        "gateway_started"
    );

    tokio::signal::ctrl_c().await?;
    info!(target: "fsu.gateway", "shutdown_requested");

    if let Err(err) = collector.stop().await {
        warn!(target: "fsu.gateway", error = %err, "collector_stop_failed");
    }
    if let Some(sampler) = system_stats
        && let Err(err) = sampler.stop().await
    {
        warn!(target: "fsu.gateway", error = %err, "system_stats_stop_failed");
    }
    northbound
        .persist_connection_states(stores.northbound.as_ref())
        .await;
    northbound.shutdown().await;

    let snapshot = metrics().snapshot();
    info!(
        target: "fsu.gateway",
        samples = snapshot.samples_collected,
        alarms = snapshot.alarms_emitted,
        publish_failures = snapshot.publish_failure,
        "gateway_stopped"
    );
    Ok(())
}

/// 配置了数据库时使用 PostgreSQL，否则全内存；Redis 可选替换最新值缓存。
async fn build_stores(config: &AppConfig) -> Result<StoreSet, Box<dyn std::error::Error>> {
    let stores = match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_pool(url).await?;
            info!(target: "fsu.gateway", backend = "postgres", "storage_ready");
            StoreSet::postgres(pool)
        }
        None => {
            info!(target: "fsu.gateway", backend = "memory", "storage_ready");
            StoreSet::in_memory()
        }
    };
    let Some(redis_url) = config.redis_url.as_deref() else {
        return Ok(stores);
    };
    let cache = RedisDataCacheStore::connect(redis_url, config.redis_cache_ttl_seconds)?;
    info!(target: "fsu.gateway", "redis_cache_ready");
    Ok(stores.with_cache(Arc::new(cache)))
}
