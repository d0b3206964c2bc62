//! 告警日志内存存储实现

use crate::error::StorageError;
use crate::traits::AlarmLogStore;
use domain::AlarmLog;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryAlarmLogStore {
    logs: RwLock<Vec<AlarmLog>>,
}

impl InMemoryAlarmLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 告警日志条数（用于测试）
    pub fn len(&self) -> usize {
        self.logs.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AlarmLogStore for InMemoryAlarmLogStore {
    async fn create_alarm_log(&self, mut log: AlarmLog) -> Result<AlarmLog, StorageError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        log.id = logs.len() as i64 + 1;
        logs.push(log.clone());
        Ok(log)
    }

    async fn list_alarm_logs(
        &self,
        device_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<AlarmLog>, StorageError> {
        let logs = self
            .logs
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let items = logs
            .iter()
            .rev()
            .filter(|item| device_id.is_none_or(|id| item.device_id == id))
            .take(if limit == 0 { usize::MAX } else { limit })
            .cloned()
            .collect();
        Ok(items)
    }
}
