use domain::{AlarmLog, DataCacheEntry, DataPoint, Device, NorthboundConfig, Threshold};
use fsu_storage::{
    AlarmLogStore, DataCacheStore, DeviceStore, GatewayStore, HistoryStore,
    InMemoryGatewayStore, NorthboundConfigStore, StoreSet, ThresholdStore,
};

fn threshold(id: i64, device_id: i64, enabled: bool) -> Threshold {
    Threshold {
        id,
        device_id,
        field_name: "temperature".to_string(),
        operator: ">".to_string(),
        value: 30.0,
        severity: "warning".to_string(),
        enabled,
        shielded: false,
        message: "too hot".to_string(),
    }
}

#[tokio::test]
async fn device_save_list_delete() {
    let stores = StoreSet::in_memory();
    for id in [2, 1] {
        stores
            .devices
            .save_device(Device {
                id,
                name: format!("dev-{}", id),
                enabled: true,
                ..Default::default()
            })
            .await
            .expect("save");
    }
    let devices = stores.devices.get_all_devices().await.expect("list");
    assert_eq!(devices.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(stores.devices.delete_device(1).await.expect("delete"));
    assert!(!stores.devices.delete_device(1).await.expect("delete again"));
    assert!(stores.devices.get_device(1).await.expect("get").is_none());
}

#[tokio::test]
async fn only_enabled_thresholds_are_returned() {
    let stores = StoreSet::in_memory();
    stores.thresholds.save_threshold(threshold(1, 7, true)).await.expect("save");
    stores.thresholds.save_threshold(threshold(2, 7, false)).await.expect("save");
    stores.thresholds.save_threshold(threshold(3, 8, true)).await.expect("save");

    let rules = stores
        .thresholds
        .get_enabled_thresholds_by_device_id(7)
        .await
        .expect("query");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, 1);
    let all = stores.thresholds.get_all_enabled_thresholds().await.expect("all");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn cache_overwrites_and_history_appends() {
    let stores = StoreSet::in_memory();
    for (ts, value) in [(1000, "1"), (2000, "2")] {
        stores
            .cache
            .save_data_cache(&DataCacheEntry {
                device_id: 1,
                field_name: "t".to_string(),
                value: value.to_string(),
                value_type: "string".to_string(),
                collected_at_ms: ts,
            })
            .await
            .expect("cache");
        stores
            .history
            .save_data_point(&DataPoint {
                device_id: 1,
                device_name: "d".to_string(),
                field_name: "t".to_string(),
                value: value.to_string(),
                value_type: "string".to_string(),
                collected_at_ms: ts,
            })
            .await
            .expect("history");
    }
    let latest = stores.cache.get_all_devices_latest_data().await.expect("latest");
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].value, "2");
    let history = stores
        .history
        .list_data_points(1, Some("t"), 0)
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    let last = stores.history.list_data_points(1, None, 1).await.expect("last");
    assert_eq!(last[0].value, "2");
}

#[tokio::test]
async fn alarm_logs_get_ids_newest_first() {
    let stores = StoreSet::in_memory();
    for device_id in [1, 2, 1] {
        stores
            .alarms
            .create_alarm_log(AlarmLog {
                device_id,
                field_name: "t".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");
    }
    let logs = stores.alarms.list_alarm_logs(Some(1), 0).await.expect("list");
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].id, 3);
    assert_eq!(logs[1].id, 1);
}

#[tokio::test]
async fn gateway_identity_is_trimmed() {
    let store = InMemoryGatewayStore::with_identity(" pk ", "dk\n");
    let (pk, dk) = store.get_gateway_identity().await.expect("identity");
    assert_eq!((pk.as_str(), dk.as_str()), ("pk", "dk"));
    assert_eq!(store.get_alarm_repeat_interval_seconds().await.expect("get"), 60);
    store
        .update_alarm_repeat_interval_seconds(3600)
        .await
        .expect("update");
    assert_eq!(store.get_alarm_repeat_interval_seconds().await.expect("get"), 3600);
    assert!(store.update_alarm_repeat_interval_seconds(0).await.is_err());
}

#[tokio::test]
async fn northbound_config_upsert_by_name() {
    let stores = StoreSet::in_memory();
    let saved = stores
        .northbound
        .save_northbound_config(NorthboundConfig {
            name: "cloud".to_string(),
            kind: "sagoo".to_string(),
            ..Default::default()
        })
        .await
        .expect("save");
    assert_eq!(saved.id, 1);
    let again = stores
        .northbound
        .save_northbound_config(NorthboundConfig {
            name: "cloud".to_string(),
            kind: "pandax".to_string(),
            ..Default::default()
        })
        .await
        .expect("save");
    assert_eq!(again.id, 1);
    stores
        .northbound
        .update_connection_state("cloud", true, 1234)
        .await
        .expect("state");
    let configs = stores.northbound.list_northbound_configs().await.expect("list");
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].kind, "pandax");
    assert_eq!(configs[0].last_connected_at_ms, Some(1234));
    assert!(
        stores
            .northbound
            .update_connection_state("missing", true, 1)
            .await
            .is_err()
    );
}
