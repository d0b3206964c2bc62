//! Postgres 告警日志实现

use crate::error::StorageError;
use crate::traits::AlarmLogStore;
use domain::AlarmLog;
use sqlx::{PgPool, Row};

pub struct PgAlarmLogStore {
    pub pool: PgPool,
}

impl PgAlarmLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AlarmLogStore for PgAlarmLogStore {
    async fn create_alarm_log(&self, mut log: AlarmLog) -> Result<AlarmLog, StorageError> {
        let row = sqlx::query(
            "insert into alarm_logs \
             (device_id, threshold_id, field_name, actual_value, threshold_value, operator, \
              severity, message, triggered_at, acknowledged) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, to_timestamp($9 / 1000.0), $10) \
             returning id",
        )
        .bind(log.device_id)
        .bind(log.threshold_id)
        .bind(&log.field_name)
        .bind(log.actual_value)
        .bind(log.threshold_value)
        .bind(&log.operator)
        .bind(&log.severity)
        .bind(&log.message)
        .bind(log.triggered_at_ms as f64)
        .bind(log.acknowledged)
        .fetch_one(&self.pool)
        .await?;
        log.id = row.try_get("id")?;
        Ok(log)
    }

    async fn list_alarm_logs(
        &self,
        device_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<AlarmLog>, StorageError> {
        let limit = if limit == 0 { i64::MAX } else { limit as i64 };
        let rows = sqlx::query(
            "select id, device_id, threshold_id, field_name, actual_value, threshold_value, \
             operator, severity, message, acknowledged, \
             (extract(epoch from triggered_at) * 1000)::bigint as triggered_at_ms \
             from alarm_logs where ($1::bigint is null or device_id = $1) \
             order by triggered_at desc, id desc limit $2",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(AlarmLog {
                id: row.try_get("id")?,
                device_id: row.try_get("device_id")?,
                threshold_id: row.try_get("threshold_id")?,
                field_name: row.try_get("field_name")?,
                actual_value: row.try_get("actual_value")?,
                threshold_value: row.try_get("threshold_value")?,
                operator: row.try_get("operator")?,
                severity: row.try_get("severity")?,
                message: row.try_get("message")?,
                triggered_at_ms: row.try_get("triggered_at_ms")?,
                acknowledged: row.try_get("acknowledged")?,
            });
        }
        Ok(items)
    }
}
