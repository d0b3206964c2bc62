//! Postgres 北向配置实现

use crate::error::StorageError;
use crate::traits::NorthboundConfigStore;
use domain::NorthboundConfig;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgNorthboundConfigStore {
    pub pool: PgPool,
}

impl PgNorthboundConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn config_from_row(row: &PgRow) -> Result<NorthboundConfig, StorageError> {
    Ok(NorthboundConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: row.try_get("type")?,
        enabled: row.try_get("enabled")?,
        upload_interval: row.try_get("upload_interval")?,
        server_url: row.try_get("server_url")?,
        port: row.try_get("port")?,
        path: row.try_get("path")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        client_id: row.try_get("client_id")?,
        topic: row.try_get("topic")?,
        alarm_topic: row.try_get("alarm_topic")?,
        qos: row.try_get("qos")?,
        retain: row.try_get("retain")?,
        keep_alive: row.try_get("keep_alive")?,
        timeout: row.try_get("timeout")?,
        product_key: row.try_get("product_key")?,
        device_key: row.try_get("device_key")?,
        ext_config: row.try_get("ext_config")?,
        config: row.try_get("config")?,
        connected: row.try_get("connected")?,
        last_connected_at_ms: row.try_get("last_connected_at_ms")?,
    })
}

#[async_trait::async_trait]
impl NorthboundConfigStore for PgNorthboundConfigStore {
    async fn list_northbound_configs(&self) -> Result<Vec<NorthboundConfig>, StorageError> {
        let rows = sqlx::query(
            "select id, name, type, enabled, upload_interval, server_url, port, path, username, \
             password, client_id, topic, alarm_topic, qos, retain, keep_alive, timeout, \
             product_key, device_key, ext_config, config, connected, \
             (extract(epoch from last_connected_at) * 1000)::bigint as last_connected_at_ms \
             from northbound_configs order by id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(config_from_row).collect()
    }

    async fn save_northbound_config(
        &self,
        mut config: NorthboundConfig,
    ) -> Result<NorthboundConfig, StorageError> {
        let row = sqlx::query(
            "insert into northbound_configs \
             (name, type, enabled, upload_interval, server_url, port, path, username, password, \
              client_id, topic, alarm_topic, qos, retain, keep_alive, timeout, product_key, \
              device_key, ext_config, config) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
              $17, $18, $19, $20) \
             on conflict (name) do update set \
              type = excluded.type, enabled = excluded.enabled, \
              upload_interval = excluded.upload_interval, server_url = excluded.server_url, \
              port = excluded.port, path = excluded.path, username = excluded.username, \
              password = excluded.password, client_id = excluded.client_id, \
              topic = excluded.topic, alarm_topic = excluded.alarm_topic, qos = excluded.qos, \
              retain = excluded.retain, keep_alive = excluded.keep_alive, \
              timeout = excluded.timeout, product_key = excluded.product_key, \
              device_key = excluded.device_key, ext_config = excluded.ext_config, \
              config = excluded.config \
             returning id",
        )
        .bind(&config.name)
        .bind(&config.kind)
        .bind(config.enabled)
        .bind(config.upload_interval)
        .bind(&config.server_url)
        .bind(config.port)
        .bind(&config.path)
        .bind(&config.username)
        .bind(&config.password)
        .bind(&config.client_id)
        .bind(&config.topic)
        .bind(&config.alarm_topic)
        .bind(config.qos)
        .bind(config.retain)
        .bind(config.keep_alive)
        .bind(config.timeout)
        .bind(&config.product_key)
        .bind(&config.device_key)
        .bind(&config.ext_config)
        .bind(&config.config)
        .fetch_one(&self.pool)
        .await?;
        config.id = row.try_get("id")?;
        Ok(config)
    }

    async fn update_connection_state(
        &self,
        name: &str,
        connected: bool,
        ts_ms: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "update northbound_configs set connected = $1, \
             last_connected_at = case when $1 then to_timestamp($2 / 1000.0) \
               else last_connected_at end \
             where name = $3",
        )
        .bind(connected)
        .bind(ts_ms as f64)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
