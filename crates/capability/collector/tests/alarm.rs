mod common;

use common::{Harness, device};
use domain::Threshold;
use fsu_collector::AlarmStateTable;
use std::time::Duration;

fn rule(id: i64, device_id: i64, operator: &str, value: f64) -> Threshold {
    Threshold {
        id,
        device_id,
        field_name: "temp".to_string(),
        operator: operator.to_string(),
        value,
        severity: "critical".to_string(),
        enabled: true,
        shielded: false,
        message: "温度过高".to_string(),
    }
}

#[test]
fn repeat_suppression_timeline() {
    let table = AlarmStateTable::new();
    let rule = rule(9, 1, ">", 30.0);
    let repeat = Duration::from_secs(60);
    let t = 1_700_000_000_000_i64;

    assert!(table.should_emit(1, &rule, true, t, repeat));
    assert!(!table.should_emit(1, &rule, true, t + 10_000, repeat));
    assert!(table.should_emit(1, &rule, true, t + 61_000, repeat));
    assert!(!table.should_emit(1, &rule, false, t + 70_000, repeat));
    assert!(table.should_emit(1, &rule, true, t + 71_000, repeat));
}

#[test]
fn states_are_isolated_per_device() {
    let table = AlarmStateTable::new();
    let rule = rule(3, 1, ">", 30.0);
    let repeat = Duration::from_secs(60);

    assert!(table.should_emit(1, &rule, true, 1_000, repeat));
    assert!(table.should_emit(2, &rule, true, 1_000, repeat));
    assert!(!table.should_emit(1, &rule, true, 2_000, repeat));
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn collect_raises_alarm_once_within_repeat_window() {
    let harness = Harness::new();
    let dev = device(1);
    harness.stores.devices.save_device(dev.clone()).await.unwrap();
    harness
        .stores
        .thresholds
        .save_threshold(rule(7, 1, ">", 30.0))
        .await
        .unwrap();
    harness.collector.add_device(dev).unwrap();
    harness.driver.set_field(1, "temp", "35.5");

    harness.collector.collect_now(1).await.unwrap();
    harness.collector.collect_now(1).await.unwrap();

    let logs = harness.stores.alarms.list_alarm_logs(None, 0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].threshold_id, Some(7));
    assert_eq!(logs[0].actual_value, 35.5);
    assert_eq!(logs[0].threshold_value, 30.0);

    let alarms = harness.uplink.alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].device_key, "dk-1");
    assert_eq!(alarms[0].operator, ">");
    assert_eq!(alarms[0].severity, "critical");
}

#[tokio::test]
async fn recovery_clears_latch_so_next_breach_alarms() {
    let harness = Harness::new();
    let dev = device(1);
    harness.stores.devices.save_device(dev.clone()).await.unwrap();
    let threshold = rule(7, 1, ">", 30.0);
    harness
        .stores
        .thresholds
        .save_threshold(threshold.clone())
        .await
        .unwrap();
    harness.collector.add_device(dev).unwrap();

    harness.driver.set_field(1, "temp", "35");
    harness.collector.collect_now(1).await.unwrap();
    assert!(harness.collector.alarm_states().is_latched(1, &threshold));

    harness.driver.set_field(1, "temp", "20");
    harness.collector.collect_now(1).await.unwrap();
    assert!(!harness.collector.alarm_states().is_latched(1, &threshold));

    harness.driver.set_field(1, "temp", "36");
    harness.collector.collect_now(1).await.unwrap();
    assert_eq!(harness.uplink.alarms().len(), 2);
}

#[tokio::test]
async fn shielded_rule_is_silent_until_unshielded() {
    let harness = Harness::new();
    let dev = device(1);
    harness.stores.devices.save_device(dev.clone()).await.unwrap();
    let mut threshold = rule(11, 1, ">", 30.0);
    threshold.shielded = true;
    harness
        .stores
        .thresholds
        .save_threshold(threshold.clone())
        .await
        .unwrap();
    harness.collector.add_device(dev).unwrap();
    harness.driver.set_field(1, "temp", "35");

    harness.collector.collect_now(1).await.unwrap();
    let logs = harness.stores.alarms.list_alarm_logs(None, 0).await.unwrap();
    assert!(logs.is_empty());

    threshold.shielded = false;
    harness
        .stores
        .thresholds
        .save_threshold(threshold)
        .await
        .unwrap();
    harness
        .stores
        .gateway
        .update_alarm_repeat_interval_seconds(3600)
        .await
        .unwrap();
    harness.collector.thresholds().invalidate_device(1);
    harness.collector.repeat_interval().invalidate();

    harness.collector.collect_now(1).await.unwrap();
    harness.collector.collect_now(1).await.unwrap();
    let logs = harness.stores.alarms.list_alarm_logs(None, 0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].threshold_id, Some(11));
}

#[tokio::test]
async fn non_numeric_values_and_bad_operators_are_skipped() {
    let harness = Harness::new();
    let dev = device(1);
    harness.stores.devices.save_device(dev.clone()).await.unwrap();
    harness
        .stores
        .thresholds
        .save_threshold(rule(1, 1, "=>", 1.0))
        .await
        .unwrap();
    let mut status = rule(2, 1, "==", 1.0);
    status.field_name = "status".to_string();
    harness.stores.thresholds.save_threshold(status).await.unwrap();
    harness.collector.add_device(dev).unwrap();
    harness.driver.set_field(1, "temp", "99");
    harness.driver.set_field(1, "status", "on");

    harness.collector.collect_now(1).await.unwrap();
    assert!(harness.uplink.alarms().is_empty());
    assert!(harness.collector.alarm_states().is_empty());
}

#[tokio::test]
async fn repeat_interval_defaults_and_tracks_store() {
    let harness = Harness::new();
    let repeat = harness.collector.repeat_interval();
    assert_eq!(repeat.resolve().await, Duration::from_secs(60));

    harness
        .stores
        .gateway
        .update_alarm_repeat_interval_seconds(120)
        .await
        .unwrap();
    repeat.invalidate();
    assert_eq!(repeat.resolve().await, Duration::from_secs(120));
}
