mod common;

use async_trait::async_trait;
use common::{FakeDriver, Harness, RecordingUplink, device, wait_until};
use domain::{NorthboundCommand, Threshold};
use fsu_collector::{Collector, CollectorError, CollectorSettings};
use fsu_resource::ResourceLocker;
use fsu_storage::{InMemoryThresholdStore, StorageError, StoreSet, ThresholdStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn fast_settings() -> CollectorSettings {
    CollectorSettings {
        tick: Duration::from_millis(50),
        device_sync_interval: Duration::from_millis(100),
        command_poll_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

fn command(device_key: &str, field: &str, value: &str) -> NorthboundCommand {
    NorthboundCommand {
        request_id: "req-1".to_string(),
        product_key: "pk".to_string(),
        device_key: device_key.to_string(),
        field_name: field.to_string(),
        value: value.to_string(),
        source: "sagoo.property.set".to_string(),
    }
}

#[tokio::test]
async fn collect_now_persists_cache_history_and_uploads() {
    let harness = Harness::new();
    harness.collector.add_device(device(1)).unwrap();
    harness.driver.set_field(1, "temp", "21.5");

    let data = harness.collector.collect_now(1).await.unwrap();
    assert_eq!(data.device_id, 1);
    assert_eq!(data.fields["temp"], "21.5");

    let latest = harness.stores.cache.get_all_devices_latest_data().await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].value, "21.5");
    let history = harness
        .stores
        .history
        .list_data_points(1, Some("temp"), 0)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(harness.uplink.data().len(), 1);
}

#[tokio::test]
async fn history_is_gated_by_storage_interval() {
    let harness = Harness::new();
    harness.collector.add_device(device(1)).unwrap();
    harness.driver.set_field(1, "temp", "20");

    harness.collector.collect_now(1).await.unwrap();
    harness.collector.collect_now(1).await.unwrap();
    harness.collector.collect_now(1).await.unwrap();

    let history = harness
        .stores
        .history
        .list_data_points(1, None, 0)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(harness.uplink.data().len(), 3);
}

#[tokio::test]
async fn zero_storage_interval_falls_back_to_default() {
    let harness = Harness::new();
    let mut dev = device(1);
    dev.storage_interval_s = 0;
    assert_eq!(dev.resolved_storage_interval_s(), 300);
    harness.collector.add_device(dev).unwrap();
    harness.driver.set_field(1, "temp", "20");

    harness.collector.collect_now(1).await.unwrap();
    harness.collector.collect_now(1).await.unwrap();
    let history = harness
        .stores
        .history
        .list_data_points(1, None, 0)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn upload_is_gated_by_upload_interval() {
    let harness = Harness::new();
    let mut dev = device(1);
    dev.upload_interval_ms = 60_000;
    harness.collector.add_device(dev).unwrap();
    harness.driver.set_field(1, "temp", "20");

    harness.collector.collect_now(1).await.unwrap();
    harness.collector.collect_now(1).await.unwrap();
    assert_eq!(harness.uplink.data().len(), 1);
}

#[tokio::test]
async fn timestamps_never_decrease() {
    let harness = Harness::new();
    harness.collector.add_device(device(1)).unwrap();
    harness.driver.set_field(1, "temp", "20");

    let mut last = 0;
    for _ in 0..5 {
        let data = harness.collector.collect_now(1).await.unwrap();
        assert!(data.timestamp_ms >= last);
        last = data.timestamp_ms;
    }
}

#[tokio::test]
async fn missing_identity_falls_back_to_gateway() {
    let mut harness = Harness::new();
    harness.stores.gateway = Arc::new(
        fsu_storage::InMemoryGatewayStore::with_identity("gw-pk", "gw-dk"),
    );
    harness.collector = Collector::new(
        harness.stores.clone(),
        Arc::new(harness.driver.clone()),
        harness.locker.clone(),
        Arc::new(harness.uplink.clone()),
        CollectorSettings::default(),
    );
    let mut dev = device(1);
    dev.product_key.clear();
    dev.device_key.clear();
    harness.collector.add_device(dev).unwrap();

    let data = harness.collector.collect_now(1).await.unwrap();
    assert_eq!(data.product_key, "gw-pk");
    assert_eq!(data.device_key, "gw-dk");
}

#[tokio::test]
async fn driver_failure_is_reported_and_nothing_persisted() {
    let harness = Harness::new();
    harness.collector.add_device(device(1)).unwrap();
    harness.driver.set_failing(1, true);

    let err = harness.collector.collect_now(1).await.unwrap_err();
    assert!(matches!(err, CollectorError::Driver(_)));
    assert!(harness.uplink.data().is_empty());
    let latest = harness.stores.cache.get_all_devices_latest_data().await.unwrap();
    assert!(latest.is_empty());
}

#[tokio::test]
async fn device_management_errors() {
    let harness = Harness::new();
    harness.collector.add_device(device(1)).unwrap();

    assert!(matches!(
        harness.collector.add_device(device(1)),
        Err(CollectorError::AlreadyExists(1))
    ));
    assert!(matches!(
        harness.collector.update_device(device(2)),
        Err(CollectorError::NotFound(2))
    ));
    assert!(matches!(
        harness.collector.collect_now(2).await,
        Err(CollectorError::NotFound(2))
    ));
    assert!(harness.collector.remove_device(1));
    assert!(!harness.collector.remove_device(1));
    assert_eq!(harness.collector.task_count(), 0);
}

#[tokio::test]
async fn remove_device_clears_alarm_state() {
    let harness = Harness::new();
    harness
        .stores
        .thresholds
        .save_threshold(Threshold {
            id: 5,
            device_id: 1,
            field_name: "temp".to_string(),
            operator: ">".to_string(),
            value: 10.0,
            enabled: true,
            ..Default::default()
        })
        .await
        .unwrap();
    harness.stores.devices.save_device(device(1)).await.unwrap();
    harness.collector.add_device(device(1)).unwrap();
    harness.driver.set_field(1, "temp", "50");

    harness.collector.collect_now(1).await.unwrap();
    assert_eq!(harness.collector.alarm_states().len(), 1);

    harness.collector.remove_device(1);
    assert!(harness.collector.alarm_states().is_empty());
}

#[tokio::test]
async fn sync_reconciles_with_device_store() {
    let harness = Harness::new();
    harness.stores.devices.save_device(device(1)).await.unwrap();
    harness.stores.devices.save_device(device(2)).await.unwrap();
    let mut disabled = device(3);
    disabled.enabled = false;
    harness.stores.devices.save_device(disabled).await.unwrap();

    let report = harness.collector.sync_devices().await.unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(harness.collector.device_ids(), vec![1, 2]);

    let report = harness.collector.sync_devices().await.unwrap();
    assert!(report.is_empty());

    let mut changed = device(1);
    changed.collect_interval_ms = 3000;
    harness.stores.devices.save_device(changed).await.unwrap();
    let mut off = device(2);
    off.enabled = false;
    harness.stores.devices.save_device(off).await.unwrap();

    let report = harness.collector.sync_devices().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(harness.collector.device_ids(), vec![1]);

    harness.stores.devices.delete_device(1).await.unwrap();
    let report = harness.collector.sync_devices().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(harness.collector.task_count(), 0);
}

#[tokio::test]
async fn commands_are_written_and_reported() {
    let harness = Harness::new();
    harness.stores.devices.save_device(device(1)).await.unwrap();
    harness.uplink.push_command("sagoo", command("dk-1", "switch", "1"));
    harness.uplink.push_command("sagoo", command("dk-9", "switch", "1"));
    harness.uplink.push_command("sagoo", command("dk-1", " ", "1"));

    assert_eq!(harness.collector.process_commands().await, 3);
    assert_eq!(
        harness.driver.writes(),
        vec![(1, "switch".to_string(), "1".to_string())]
    );

    let results = harness.uplink.results();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, "sagoo");
    assert!(results[0].1.success);
    assert_eq!(results[0].1.request_id, "req-1");
    assert!(!results[1].1.success);
    assert!(results[1].1.message.contains("dk-9"));
    assert!(!results[2].1.success);
    assert!(results[2].1.message.contains("missing field_name"));
}

#[tokio::test]
async fn driver_write_failure_is_reported() {
    let harness = Harness::new();
    harness.stores.devices.save_device(device(1)).await.unwrap();
    harness.driver.set_failing(1, true);
    harness.uplink.push_command("ithings", command("dk-1", "switch", "0"));

    harness.collector.process_commands().await;
    let results = harness.uplink.results();
    assert_eq!(results.len(), 1);
    assert!(!results[0].1.success);
    assert!(!results[0].1.message.is_empty());
}

#[tokio::test]
async fn start_stop_lifecycle() {
    let harness = Harness::with_settings(fast_settings());
    assert!(matches!(
        harness.collector.stop().await,
        Err(CollectorError::NotRunning)
    ));

    harness.collector.start().await.unwrap();
    assert!(harness.collector.is_running());
    assert!(matches!(
        harness.collector.start().await,
        Err(CollectorError::AlreadyRunning)
    ));

    harness.collector.stop().await.unwrap();
    assert!(!harness.collector.is_running());
}

#[tokio::test]
async fn running_collector_samples_and_picks_up_new_devices() {
    let harness = Harness::with_settings(fast_settings());
    harness.stores.devices.save_device(device(1)).await.unwrap();
    harness.driver.set_field(1, "temp", "20");
    harness.driver.set_field(2, "temp", "30");

    harness.collector.start().await.unwrap();
    let uplink = harness.uplink.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            uplink.data().iter().any(|d| d.device_id == 1)
        })
        .await
    );

    harness.stores.devices.save_device(device(2)).await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || {
            uplink.data().iter().any(|d| d.device_id == 2)
        })
        .await
    );

    harness.uplink.push_command("sagoo", command("dk-2", "switch", "1"));
    assert!(wait_until(Duration::from_secs(2), || uplink.results().len() == 1).await);

    harness.collector.stop().await.unwrap();
}

#[tokio::test]
async fn shared_resource_serializes_driver_access() {
    let harness = Harness::with_settings(fast_settings());
    harness.driver.set_delay(Duration::from_millis(100));
    for id in 1..=3 {
        let mut dev = device(id);
        dev.resource_id = Some(42);
        dev.collect_interval_ms = 200;
        harness.stores.devices.save_device(dev).await.unwrap();
        harness.driver.set_field(id, "temp", "20");
    }

    harness.collector.start().await.unwrap();
    let driver = harness.driver.clone();
    assert!(wait_until(Duration::from_secs(3), || driver.collect_calls() >= 6).await);
    harness.collector.stop().await.unwrap();

    assert_eq!(harness.driver.max_concurrency(), 1);
}

#[tokio::test]
async fn independent_devices_collect_concurrently() {
    let harness = Harness::with_settings(fast_settings());
    harness.driver.set_delay(Duration::from_millis(200));
    for id in 1..=3 {
        harness.stores.devices.save_device(device(id)).await.unwrap();
    }

    harness.collector.start().await.unwrap();
    let driver = harness.driver.clone();
    assert!(wait_until(Duration::from_secs(2), || driver.collect_calls() >= 3).await);
    harness.collector.stop().await.unwrap();

    assert!(harness.driver.max_concurrency() >= 2);
}

#[tokio::test]
async fn disabled_device_is_never_collected() {
    let harness = Harness::with_settings(CollectorSettings {
        device_sync_interval: Duration::from_secs(60),
        ..fast_settings()
    });
    let mut dev = device(3);
    dev.enabled = false;
    dev.collect_interval_ms = 100;
    harness.driver.set_field(3, "temp", "20");

    harness.collector.start().await.unwrap();
    harness.collector.add_device(dev).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.collector.stop().await.unwrap();

    assert_eq!(harness.collector.device_ids(), vec![3]);
    assert_eq!(harness.driver.collect_calls(), 0);
    assert!(harness.uplink.data().is_empty());
}

/// 全量阈值查询在放行前挂起，用于在评估途中移除设备。
struct GatedThresholdStore {
    inner: InMemoryThresholdStore,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ThresholdStore for GatedThresholdStore {
    async fn get_enabled_thresholds_by_device_id(
        &self,
        device_id: i64,
    ) -> Result<Vec<Threshold>, StorageError> {
        self.inner.get_enabled_thresholds_by_device_id(device_id).await
    }

    async fn get_all_enabled_thresholds(&self) -> Result<Vec<Threshold>, StorageError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.get_all_enabled_thresholds().await
    }

    async fn save_threshold(&self, threshold: Threshold) -> Result<Threshold, StorageError> {
        self.inner.save_threshold(threshold).await
    }

    async fn delete_threshold(&self, id: i64) -> Result<bool, StorageError> {
        self.inner.delete_threshold(id).await
    }
}

#[tokio::test]
async fn removal_during_evaluation_leaves_no_alarm_state() {
    let gated = Arc::new(GatedThresholdStore {
        inner: InMemoryThresholdStore::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    gated
        .save_threshold(Threshold {
            id: 5,
            device_id: 1,
            field_name: "temp".to_string(),
            operator: ">".to_string(),
            value: 10.0,
            enabled: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let mut stores = StoreSet::in_memory();
    stores.thresholds = gated.clone();
    stores.devices.save_device(device(1)).await.unwrap();

    let driver = FakeDriver::new();
    driver.set_field(1, "temp", "50");
    let collector = Arc::new(Collector::new(
        stores,
        Arc::new(driver),
        ResourceLocker::new(),
        Arc::new(RecordingUplink::new()),
        CollectorSettings::default(),
    ));
    collector.add_device(device(1)).unwrap();

    let running = collector.clone();
    let job = tokio::spawn(async move { running.collect_now(1).await });
    gated.entered.notified().await;
    assert!(collector.remove_device(1));
    gated.release.notify_one();

    job.await.unwrap().unwrap();
    assert!(collector.alarm_states().is_empty());
}
