//! 采集结果的上行出口。
//!
//! 调度器只依赖 [`Uplink`]：广播样本与告警、拉取下行命令、回写执行结果。
//! 网关中由 [`NorthboundManager`] 实现。

use crate::error::CollectorError;
use async_trait::async_trait;
use domain::{AlarmPayload, CollectData, CommandResult, NorthboundCommand};
use fsu_northbound::NorthboundManager;

#[async_trait]
pub trait Uplink: Send + Sync {
    /// 非阻塞广播实时数据。
    fn send_data(&self, data: &CollectData);

    /// 非阻塞广播告警。
    fn send_alarm(&self, alarm: &AlarmPayload);

    /// 每个来源至多 `limit` 条，附带来源名。
    fn pull_commands(&self, limit: usize) -> Vec<(String, NorthboundCommand)>;

    async fn report_command_result(
        &self,
        source: &str,
        result: &CommandResult,
    ) -> Result<(), CollectorError>;
}

#[async_trait]
impl Uplink for NorthboundManager {
    fn send_data(&self, data: &CollectData) {
        NorthboundManager::send_data(self, data);
    }

    fn send_alarm(&self, alarm: &AlarmPayload) {
        NorthboundManager::send_alarm(self, alarm);
    }

    fn pull_commands(&self, limit: usize) -> Vec<(String, NorthboundCommand)> {
        self.pull_all_commands(limit)
    }

    async fn report_command_result(
        &self,
        source: &str,
        result: &CommandResult,
    ) -> Result<(), CollectorError> {
        NorthboundManager::report_command_result(self, source, result).await?;
        Ok(())
    }
}
