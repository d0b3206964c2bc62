//! Postgres 设备存储实现

use crate::error::StorageError;
use crate::traits::DeviceStore;
use domain::Device;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str = "id, name, description, product_key, device_key, driver_type, \
     ip_address, port_num, device_address, collect_interval_ms, storage_interval_s, \
     upload_interval_ms, timeout_ms, driver_id, resource_id, enabled";

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Result<Device, StorageError> {
    let port_num: i32 = row.try_get("port_num")?;
    Ok(Device {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        product_key: row.try_get("product_key")?,
        device_key: row.try_get("device_key")?,
        driver_type: row.try_get("driver_type")?,
        ip_address: row.try_get("ip_address")?,
        port_num: u16::try_from(port_num).unwrap_or_default(),
        device_address: row.try_get("device_address")?,
        collect_interval_ms: row.try_get("collect_interval_ms")?,
        storage_interval_s: row.try_get("storage_interval_s")?,
        upload_interval_ms: row.try_get("upload_interval_ms")?,
        timeout_ms: row.try_get("timeout_ms")?,
        driver_id: row.try_get("driver_id")?,
        resource_id: row.try_get("resource_id")?,
        enabled: row.try_get("enabled")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn get_all_devices(&self) -> Result<Vec<Device>, StorageError> {
        let rows = sqlx::query(&format!("select {} from devices order by id", DEVICE_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn get_device(&self, id: i64) -> Result<Option<Device>, StorageError> {
        let row = sqlx::query(&format!("select {} from devices where id = $1", DEVICE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn save_device(&self, device: Device) -> Result<Device, StorageError> {
        sqlx::query(
            "insert into devices \
             (id, name, description, product_key, device_key, driver_type, ip_address, port_num, \
              device_address, collect_interval_ms, storage_interval_s, upload_interval_ms, \
              timeout_ms, driver_id, resource_id, enabled) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             on conflict (id) do update set \
              name = excluded.name, description = excluded.description, \
              product_key = excluded.product_key, device_key = excluded.device_key, \
              driver_type = excluded.driver_type, ip_address = excluded.ip_address, \
              port_num = excluded.port_num, device_address = excluded.device_address, \
              collect_interval_ms = excluded.collect_interval_ms, \
              storage_interval_s = excluded.storage_interval_s, \
              upload_interval_ms = excluded.upload_interval_ms, timeout_ms = excluded.timeout_ms, \
              driver_id = excluded.driver_id, resource_id = excluded.resource_id, \
              enabled = excluded.enabled",
        )
        .bind(device.id)
        .bind(&device.name)
        .bind(&device.description)
        .bind(&device.product_key)
        .bind(&device.device_key)
        .bind(&device.driver_type)
        .bind(&device.ip_address)
        .bind(i32::from(device.port_num))
        .bind(&device.device_address)
        .bind(device.collect_interval_ms)
        .bind(device.storage_interval_s)
        .bind(device.upload_interval_ms)
        .bind(device.timeout_ms)
        .bind(device.driver_id)
        .bind(device.resource_id)
        .bind(device.enabled)
        .execute(&self.pool)
        .await?;
        Ok(device)
    }

    async fn delete_device(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from devices where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
