//! Postgres 阈值存储实现

use crate::error::StorageError;
use crate::traits::ThresholdStore;
use domain::Threshold;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgThresholdStore {
    pub pool: PgPool,
}

impl PgThresholdStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn threshold_from_row(row: &PgRow) -> Result<Threshold, StorageError> {
    Ok(Threshold {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        field_name: row.try_get("field_name")?,
        operator: row.try_get("operator")?,
        value: row.try_get("value")?,
        severity: row.try_get("severity")?,
        enabled: row.try_get("enabled")?,
        shielded: row.try_get("shielded")?,
        message: row.try_get("message")?,
    })
}

#[async_trait::async_trait]
impl ThresholdStore for PgThresholdStore {
    async fn get_enabled_thresholds_by_device_id(
        &self,
        device_id: i64,
    ) -> Result<Vec<Threshold>, StorageError> {
        let rows = sqlx::query(
            "select id, device_id, field_name, operator, value, severity, enabled, shielded, message \
             from thresholds where device_id = $1 and enabled = true order by id",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(threshold_from_row).collect()
    }

    async fn get_all_enabled_thresholds(&self) -> Result<Vec<Threshold>, StorageError> {
        let rows = sqlx::query(
            "select id, device_id, field_name, operator, value, severity, enabled, shielded, message \
             from thresholds where enabled = true order by device_id, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(threshold_from_row).collect()
    }

    async fn save_threshold(&self, threshold: Threshold) -> Result<Threshold, StorageError> {
        sqlx::query(
            "insert into thresholds \
             (id, device_id, field_name, operator, value, severity, enabled, shielded, message) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             on conflict (id) do update set \
              device_id = excluded.device_id, field_name = excluded.field_name, \
              operator = excluded.operator, value = excluded.value, \
              severity = excluded.severity, enabled = excluded.enabled, \
              shielded = excluded.shielded, message = excluded.message",
        )
        .bind(threshold.id)
        .bind(threshold.device_id)
        .bind(&threshold.field_name)
        .bind(&threshold.operator)
        .bind(threshold.value)
        .bind(&threshold.severity)
        .bind(threshold.enabled)
        .bind(threshold.shielded)
        .bind(&threshold.message)
        .execute(&self.pool)
        .await?;
        Ok(threshold)
    }

    async fn delete_threshold(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from thresholds where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
