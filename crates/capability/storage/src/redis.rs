//! Redis 最新值缓存实现
//!
//! 每个设备一个 hash：`fsu:device:{id}:latest`，field 为字段名，value 为 JSON。

use crate::error::StorageError;
use crate::traits::DataCacheStore;
use domain::DataCacheEntry;
use redis::AsyncCommands;
use tracing::warn;

#[derive(serde::Serialize, serde::Deserialize)]
struct LatestPayload {
    value: String,
    value_type: String,
    ts_ms: i64,
}

fn latest_key(device_id: i64) -> String {
    format!("fsu:device:{}:latest", device_id)
}

fn parse_device_id_from_key(key: &str) -> Option<i64> {
    key.strip_prefix("fsu:device:")
        .and_then(|rest| rest.strip_suffix(":latest"))
        .and_then(|id| id.parse().ok())
}

/// Redis 最新值缓存
pub struct RedisDataCacheStore {
    client: redis::Client,
    ttl_seconds: Option<u64>,
}

impl RedisDataCacheStore {
    pub fn new(client: redis::Client, ttl_seconds: Option<u64>) -> Self {
        Self {
            client,
            ttl_seconds: ttl_seconds.filter(|ttl| *ttl > 0),
        }
    }

    pub fn connect(redis_url: &str, ttl_seconds: Option<u64>) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client, ttl_seconds))
    }
}

#[async_trait::async_trait]
impl DataCacheStore for RedisDataCacheStore {
    async fn save_data_cache(&self, entry: &DataCacheEntry) -> Result<(), StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let payload = LatestPayload {
            value: entry.value.clone(),
            value_type: entry.value_type.clone(),
            ts_ms: entry.collected_at_ms,
        };
        let data = serde_json::to_string(&payload)?;
        let key = latest_key(entry.device_id);
        connection
            .hset::<_, _, _, ()>(&key, &entry.field_name, data)
            .await?;
        if let Some(ttl) = self.ttl_seconds {
            connection.expire::<_, ()>(&key, ttl as i64).await?;
        }
        Ok(())
    }

    async fn get_all_devices_latest_data(&self) -> Result<Vec<DataCacheEntry>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let mut cursor: u64 = 0;
        let mut items = Vec::new();
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("fsu:device:*:latest")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await?;
            for key in keys {
                let Some(device_id) = parse_device_id_from_key(&key) else {
                    continue;
                };
                let fields: Vec<(String, String)> = connection.hgetall(&key).await?;
                for (field_name, data) in fields {
                    let payload: LatestPayload = match serde_json::from_str(&data) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(
                                target: "fsu.storage",
                                key = %key,
                                field = %field_name,
                                error = %err,
                                "latest_value_decode_failed"
                            );
                            continue;
                        }
                    };
                    items.push(DataCacheEntry {
                        device_id,
                        field_name,
                        value: payload.value,
                        value_type: payload.value_type,
                        collected_at_ms: payload.ts_ms,
                    });
                }
            }
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        items.sort_by(|a, b| (a.device_id, &a.field_name).cmp(&(b.device_id, &b.field_name)));
        Ok(items)
    }
}
