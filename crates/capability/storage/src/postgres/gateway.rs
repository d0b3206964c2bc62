//! Postgres 网关配置实现（单行表 gateway_config）

use crate::error::StorageError;
use crate::in_memory::DEFAULT_ALARM_REPEAT_INTERVAL_SECONDS;
use crate::traits::GatewayStore;
use sqlx::{PgPool, Row};

pub struct PgGatewayStore {
    pub pool: PgPool,
}

impl PgGatewayStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl GatewayStore for PgGatewayStore {
    async fn get_gateway_identity(&self) -> Result<(String, String), StorageError> {
        let row = sqlx::query("select product_key, device_key from gateway_config where id = 1")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok((String::new(), String::new()));
        };
        let product_key: String = row.try_get("product_key")?;
        let device_key: String = row.try_get("device_key")?;
        Ok((product_key.trim().to_string(), device_key.trim().to_string()))
    }

    async fn get_alarm_repeat_interval_seconds(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("select alarm_repeat_interval_seconds from gateway_config where id = 1")
            .fetch_optional(&self.pool)
            .await?;
        let seconds: i64 = match row {
            Some(row) => row.try_get("alarm_repeat_interval_seconds")?,
            None => DEFAULT_ALARM_REPEAT_INTERVAL_SECONDS,
        };
        if seconds <= 0 {
            return Ok(DEFAULT_ALARM_REPEAT_INTERVAL_SECONDS);
        }
        Ok(seconds)
    }

    async fn update_alarm_repeat_interval_seconds(
        &self,
        seconds: i64,
    ) -> Result<(), StorageError> {
        if seconds <= 0 {
            return Err(StorageError::new("alarm repeat interval must be positive"));
        }
        sqlx::query(
            "insert into gateway_config (id, product_key, device_key, alarm_repeat_interval_seconds) \
             values (1, '', '', $1) \
             on conflict (id) do update set \
              alarm_repeat_interval_seconds = excluded.alarm_repeat_interval_seconds",
        )
        .bind(seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
