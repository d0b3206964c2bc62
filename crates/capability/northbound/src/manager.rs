//! 北向适配器管理器。
//!
//! 按名称持有适配器；遍历走读锁，增删走写锁。涉及 await 的操作先克隆出
//! `Arc` 再释放锁。

use crate::config_builder::resolve_config_text;
use crate::error::NorthboundError;
use crate::registry::new_adapter;
use crate::runtime::NorthboundAdapter;
use crate::transport::Connector;
use domain::{AlarmPayload, CollectData, CommandResult, NorthboundCommand, NorthboundConfig, now_epoch_ms};
use fsu_storage::{NorthboundConfigStore, StorageError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{info, warn};

type AdapterMap = BTreeMap<String, Arc<dyn NorthboundAdapter>>;

pub struct NorthboundManager {
    adapters: RwLock<AdapterMap>,
    connector: Arc<dyn Connector>,
}

impl NorthboundManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            adapters: RwLock::new(BTreeMap::new()),
            connector,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AdapterMap> {
        self.adapters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AdapterMap> {
        self.adapters.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<Arc<dyn NorthboundAdapter>> {
        self.read().values().cloned().collect()
    }

    /// 注册已初始化的适配器；同名旧实例被关闭。
    pub async fn register_adapter(&self, adapter: Arc<dyn NorthboundAdapter>) {
        let name = adapter.name().to_string();
        let previous = self.write().insert(name.clone(), adapter);
        if let Some(previous) = previous {
            if let Err(err) = previous.close().await {
                warn!(target: "fsu.northbound", adapter = %name, error = %err, "adapter_close_failed");
            }
        }
        info!(target: "fsu.northbound", adapter = %name, "adapter_registered");
    }

    /// 构建配置 → 校验 → 创建 → 初始化 → 设置周期 → 启用时启动。
    pub async fn add_adapter(&self, config: &NorthboundConfig) -> Result<(), NorthboundError> {
        let text = resolve_config_text(config)?;
        let adapter = new_adapter(&config.kind, &config.name, self.connector.clone())
            .ok_or_else(|| NorthboundError::UnknownType(config.kind.clone()))?;
        adapter.initialize(&text).await?;
        if config.upload_interval > 0 {
            adapter.set_interval(Duration::from_millis(config.upload_interval as u64));
        }
        if config.enabled {
            adapter.start().await?;
        }
        self.register_adapter(adapter).await;
        Ok(())
    }

    /// 停止并关闭后移除。
    pub async fn remove_adapter(&self, name: &str) -> Result<(), NorthboundError> {
        let adapter = self
            .write()
            .remove(name)
            .ok_or_else(|| NorthboundError::NotFound(name.to_string()))?;
        adapter.close().await?;
        info!(target: "fsu.northbound", adapter = %name, "adapter_removed");
        Ok(())
    }

    /// 以新配置重建适配器。
    pub async fn update_adapter(&self, config: &NorthboundConfig) -> Result<(), NorthboundError> {
        match self.remove_adapter(&config.name).await {
            Ok(()) | Err(NorthboundError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        self.add_adapter(config).await
    }

    pub fn get_adapter(&self, name: &str) -> Result<Arc<dyn NorthboundAdapter>, NorthboundError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| NorthboundError::NotFound(name.to_string()))
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), NorthboundError> {
        let adapter = self.get_adapter(name)?;
        if enabled {
            adapter.start().await
        } else {
            adapter.stop().await;
            Ok(())
        }
    }

    pub fn set_interval(&self, name: &str, interval: Duration) -> Result<(), NorthboundError> {
        self.get_adapter(name)?.set_interval(interval);
        Ok(())
    }

    pub fn adapter_count(&self) -> usize {
        self.read().len()
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// 广播实时数据到所有启用的适配器。
    pub fn send_data(&self, data: &CollectData) {
        for adapter in self.snapshot() {
            if !adapter.is_enabled() {
                continue;
            }
            if let Err(err) = adapter.send(data) {
                warn!(
                    target: "fsu.northbound",
                    adapter = %adapter.name(),
                    device_id = data.device_id,
                    error = %err,
                    "adapter_send_failed"
                );
            }
        }
    }

    pub fn send_alarm(&self, alarm: &AlarmPayload) {
        for adapter in self.snapshot() {
            if !adapter.is_enabled() {
                continue;
            }
            if let Err(err) = adapter.send_alarm(alarm) {
                warn!(
                    target: "fsu.northbound",
                    adapter = %adapter.name(),
                    device_id = alarm.device_id,
                    error = %err,
                    "adapter_send_alarm_failed"
                );
            }
        }
    }

    /// 按名称排序的统计文档。
    pub fn all_stats(&self) -> Vec<Value> {
        self.snapshot().iter().map(|adapter| adapter.stats()).collect()
    }

    /// 从每个适配器拉取至多 `limit` 条命令，附带来源适配器名。
    pub fn pull_all_commands(&self, limit: usize) -> Vec<(String, NorthboundCommand)> {
        let mut out = Vec::new();
        for adapter in self.snapshot() {
            if adapter.pending_command_count() == 0 {
                continue;
            }
            match adapter.pull_commands(limit) {
                Ok(commands) => out.extend(
                    commands
                        .into_iter()
                        .map(|command| (adapter.name().to_string(), command)),
                ),
                Err(err) => warn!(
                    target: "fsu.northbound",
                    adapter = %adapter.name(),
                    error = %err,
                    "pull_commands_failed"
                ),
            }
        }
        out
    }

    pub async fn report_command_result(
        &self,
        name: &str,
        result: &CommandResult,
    ) -> Result<(), NorthboundError> {
        self.get_adapter(name)?.report_command_result(result).await
    }

    /// 按存储中的配置创建适配器；单个失败只记日志。返回成功数。
    pub async fn load_from_store(
        &self,
        store: &dyn NorthboundConfigStore,
    ) -> Result<usize, StorageError> {
        let configs = store.list_northbound_configs().await?;
        let mut loaded = 0;
        for config in configs {
            match self.add_adapter(&config).await {
                Ok(()) => loaded += 1,
                Err(err) => warn!(
                    target: "fsu.northbound",
                    adapter = %config.name,
                    kind = %config.kind,
                    error = %err,
                    "adapter_load_failed"
                ),
            }
        }
        info!(target: "fsu.northbound", loaded = loaded, "adapters_loaded");
        Ok(loaded)
    }

    /// 把每个适配器的连接状态写回存储。
    pub async fn persist_connection_states(&self, store: &dyn NorthboundConfigStore) {
        let now = now_epoch_ms();
        for adapter in self.snapshot() {
            if let Err(err) = store
                .update_connection_state(adapter.name(), adapter.is_connected(), now)
                .await
            {
                warn!(
                    target: "fsu.northbound",
                    adapter = %adapter.name(),
                    error = %err,
                    "connection_state_persist_failed"
                );
            }
        }
    }

    /// 停止并关闭全部适配器。
    pub async fn shutdown(&self) {
        let adapters: Vec<_> = std::mem::take(&mut *self.write()).into_values().collect();
        for adapter in adapters {
            if let Err(err) = adapter.close().await {
                warn!(
                    target: "fsu.northbound",
                    adapter = %adapter.name(),
                    error = %err,
                    "adapter_close_failed"
                );
            }
        }
        info!(target: "fsu.northbound", "northbound_shutdown");
    }
}
