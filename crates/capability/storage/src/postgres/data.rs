//! Postgres 最新值与历史数据实现

use crate::error::StorageError;
use crate::traits::{DataCacheStore, HistoryStore};
use domain::{DataCacheEntry, DataPoint};
use sqlx::{PgPool, Row};

pub struct PgDataStore {
    pub pool: PgPool,
}

impl PgDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DataCacheStore for PgDataStore {
    async fn save_data_cache(&self, entry: &DataCacheEntry) -> Result<(), StorageError> {
        sqlx::query(
            "insert into data_cache (device_id, field_name, value, value_type, collected_at) \
             values ($1, $2, $3, $4, to_timestamp($5 / 1000.0)) \
             on conflict (device_id, field_name) do update set \
              value = excluded.value, value_type = excluded.value_type, \
              collected_at = excluded.collected_at",
        )
        .bind(entry.device_id)
        .bind(&entry.field_name)
        .bind(&entry.value)
        .bind(&entry.value_type)
        .bind(entry.collected_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_all_devices_latest_data(&self) -> Result<Vec<DataCacheEntry>, StorageError> {
        let rows = sqlx::query(
            "select device_id, field_name, value, value_type, \
             (extract(epoch from collected_at) * 1000)::bigint as collected_at_ms \
             from data_cache order by device_id, field_name",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(DataCacheEntry {
                device_id: row.try_get("device_id")?,
                field_name: row.try_get("field_name")?,
                value: row.try_get("value")?,
                value_type: row.try_get("value_type")?,
                collected_at_ms: row.try_get("collected_at_ms")?,
            });
        }
        Ok(items)
    }
}

#[async_trait::async_trait]
impl HistoryStore for PgDataStore {
    async fn save_data_point(&self, point: &DataPoint) -> Result<(), StorageError> {
        sqlx::query(
            "insert into data_points \
             (device_id, device_name, field_name, value, value_type, collected_at) \
             values ($1, $2, $3, $4, $5, to_timestamp($6 / 1000.0))",
        )
        .bind(point.device_id)
        .bind(&point.device_name)
        .bind(&point.field_name)
        .bind(&point.value)
        .bind(&point.value_type)
        .bind(point.collected_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_data_points(
        &self,
        device_id: i64,
        field_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let limit = if limit == 0 { i64::MAX } else { limit as i64 };
        let rows = sqlx::query(
            "select * from (\
               select device_id, device_name, field_name, value, value_type, \
               (extract(epoch from collected_at) * 1000)::bigint as collected_at_ms \
               from data_points \
               where device_id = $1 and ($2::text is null or field_name = $2) \
               order by collected_at desc limit $3\
             ) recent order by collected_at_ms asc",
        )
        .bind(device_id)
        .bind(field_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(DataPoint {
                device_id: row.try_get("device_id")?,
                device_name: row.try_get("device_name")?,
                field_name: row.try_get("field_name")?,
                value: row.try_get("value")?,
                value_type: row.try_get("value_type")?,
                collected_at_ms: row.try_get("collected_at_ms")?,
            });
        }
        Ok(items)
    }
}
