mod common;

use common::{FakeBroker, wait_until};
use domain::{AlarmPayload, CollectData, CommandResult};
use fsu_northbound::dialect::{MqttDialect, SagooDialect};
use fsu_northbound::{Adapter, LoopState, NorthboundAdapter, NorthboundError};
use std::time::Duration;

const MQTT_CONFIG: &str = r#"{"broker":"tcp://127.0.0.1:1883","topic":"fsu/up","realtimeQueueSize":5,"uploadIntervalMs":60000,"alarmFlushIntervalMs":60000,"reconnectIntervalMs":200}"#;
const SAGOO_CONFIG: &str = r#"{"serverUrl":"127.0.0.1","port":1883,"productKey":"pk","deviceKey":"dk","uploadIntervalMs":60000}"#;

fn sample(device_id: i64, value: &str) -> CollectData {
    let mut data = CollectData {
        device_id,
        device_name: format!("dev-{device_id}"),
        timestamp_ms: 1_700_000_000_000,
        ..Default::default()
    };
    data.fields.insert("v".to_string(), value.to_string());
    data
}

fn alarm(field: &str) -> AlarmPayload {
    AlarmPayload {
        device_id: 1,
        device_name: "dev-1".to_string(),
        field_name: field.to_string(),
        actual_value: 61.0,
        threshold: 50.0,
        operator: ">".to_string(),
        severity: "warning".to_string(),
        message: "too high".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn lifecycle_is_idempotent() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    assert!(matches!(adapter.send(&sample(1, "1")), Err(NorthboundError::NotInitialized)));

    adapter.initialize(MQTT_CONFIG).await.expect("initialize");
    assert!(adapter.is_connected());
    assert!(!adapter.is_enabled());
    assert_eq!(adapter.loop_state(), LoopState::Stopped);

    adapter.start().await.expect("start");
    adapter.start().await.expect("start again");
    assert_eq!(adapter.loop_state(), LoopState::Running);
    assert!(adapter.is_enabled());

    adapter.stop().await;
    adapter.stop().await;
    assert_eq!(adapter.loop_state(), LoopState::Stopped);

    adapter.close().await.expect("close");
    adapter.close().await.expect("close again");
    assert!(!adapter.is_connected());
    assert_eq!(adapter.stats()["initialized"], false);
    assert!(matches!(adapter.send(&sample(1, "1")), Err(NorthboundError::NotInitialized)));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    let err = adapter
        .initialize(r#"{"topic":"t"}"#)
        .await
        .expect_err("broker missing");
    assert!(matches!(err, NorthboundError::Config(_)));
    assert_eq!(broker.connect_count(), 0);
    assert!(adapter.start().await.is_err());
}

#[tokio::test]
async fn realtime_queue_is_bounded() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    adapter.initialize(MQTT_CONFIG).await.expect("initialize");
    for i in 0..8 {
        adapter.send(&sample(i, "1")).expect("send");
    }
    assert_eq!(adapter.pending_data(), 5);

    adapter.flush_now().await.expect("flush");
    let ids: Vec<i64> = broker
        .published_on("fsu/up")
        .iter()
        .map(|body| body["device_id"].as_i64().unwrap_or_default())
        .collect();
    assert_eq!(ids, vec![3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn publish_failure_requeues_and_reconnects() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    adapter.initialize(MQTT_CONFIG).await.expect("initialize");
    for i in 0..3 {
        adapter.send(&sample(i, "1")).expect("send");
    }

    broker.set_fail_publish(true);
    assert!(adapter.flush_now().await.is_err());
    assert_eq!(adapter.pending_data(), 3);
    assert!(!adapter.is_connected());

    broker.set_fail_publish(false);
    adapter.start().await.expect("start");
    assert!(wait_until(Duration::from_secs(3), || adapter.is_connected()).await);
    adapter.flush_now().await.expect("flush");
    assert_eq!(broker.published_on("fsu/up").len(), 3);
    assert_eq!(adapter.pending_data(), 0);
    assert!(adapter.last_send_ms().is_some());
    adapter.close().await.expect("close");
}

#[tokio::test]
async fn initialize_tolerates_unreachable_broker() {
    let broker = FakeBroker::new();
    broker.set_fail_connect(true);
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    adapter.initialize(MQTT_CONFIG).await.expect("initialize");
    assert!(!adapter.is_connected());
    adapter.send(&sample(1, "1")).expect("queued while offline");

    broker.set_fail_connect(false);
    adapter.start().await.expect("start");
    assert!(wait_until(Duration::from_secs(3), || adapter.is_connected()).await);
    assert!(adapter.stats()["reconnect_attempts"].as_u64().unwrap_or_default() >= 1);
    adapter.close().await.expect("close");
}

#[tokio::test]
async fn lost_connection_resubscribes() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<SagooDialect>::new("sg", broker.connector());
    adapter.initialize(&SAGOO_CONFIG.replace("}", r#","reconnectIntervalMs":200}"#))
        .await
        .expect("initialize");
    adapter.start().await.expect("start");
    assert_eq!(broker.subscriptions().len(), 3);

    broker.drop_connection().await;
    assert!(wait_until(Duration::from_secs(3), || broker.connect_count() == 2).await);
    assert!(wait_until(Duration::from_secs(3), || adapter.is_connected()).await);
    assert_eq!(broker.subscriptions().len(), 6);
    adapter.close().await.expect("close");
}

#[tokio::test]
async fn report_loop_publishes_on_interval() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    adapter.initialize(MQTT_CONFIG).await.expect("initialize");
    adapter.set_interval(Duration::from_millis(50));
    assert_eq!(adapter.stats()["interval_ms"], 200);

    adapter.start().await.expect("start");
    adapter.send(&sample(1, "42")).expect("send");
    assert!(wait_until(Duration::from_secs(2), || !broker.published_on("fsu/up").is_empty()).await);
    let body = &broker.published_on("fsu/up")[0];
    assert_eq!(body["fields"]["v"], "42");
    adapter.close().await.expect("close");
}

#[tokio::test]
async fn full_alarm_batch_flushes_immediately() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    adapter
        .initialize(&MQTT_CONFIG.replace("}", r#","alarmBatchSize":2}"#))
        .await
        .expect("initialize");
    adapter.start().await.expect("start");

    adapter.send_alarm(&alarm("a")).expect("alarm");
    adapter.send_alarm(&alarm("b")).expect("alarm");
    assert!(wait_until(Duration::from_secs(2), || broker.published_on("fsu/up/alarm").len() == 2).await);
    let fields: Vec<_> = broker
        .published_on("fsu/up/alarm")
        .iter()
        .map(|body| body["field_name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(fields, vec!["a", "b"]);
    adapter.close().await.expect("close");
}

#[tokio::test]
async fn stop_drains_pending_alarms() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    adapter.initialize(MQTT_CONFIG).await.expect("initialize");
    adapter.start().await.expect("start");
    adapter.send_alarm(&alarm("humidity")).expect("alarm");
    assert_eq!(adapter.pending_alarms(), 1);

    adapter.stop().await;
    assert_eq!(adapter.pending_alarms(), 0);
    assert_eq!(broker.published_on("fsu/up/alarm").len(), 1);
}

#[tokio::test]
async fn downlink_commands_round_trip() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<SagooDialect>::new("sg", broker.connector());
    assert!(matches!(adapter.pull_commands(10), Err(NorthboundError::NotInitialized)));
    adapter.initialize(SAGOO_CONFIG).await.expect("initialize");

    broker
        .inject(
            "/sys/pk/dk/thing/service/property/set",
            r#"{"id":"100","params":{"properties":{"sw":"on","level":3}}}"#,
        )
        .await;
    assert!(wait_until(Duration::from_secs(2), || adapter.pending_command_count() == 2).await);
    assert_eq!(
        broker
            .published_on("/sys/pk/dk/thing/service/property/set_reply")
            .len(),
        1
    );

    let commands = adapter.pull_commands(0).expect("pull");
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].field_name, "level");
    assert_eq!(commands[1].field_name, "sw");
    assert_eq!(adapter.pending_command_count(), 0);

    let result = CommandResult::for_command(&commands[0], true, "");
    adapter.report_command_result(&result).await.expect("report");
    let replies = broker.published_on("/sys/pk/dk/thing/service/property/set_reply");
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[1]["code"], 200);
    assert_eq!(replies[1]["id"], "100");
    assert_eq!(replies[1]["data"]["level"], 3);
    adapter.close().await.expect("close");
}

#[tokio::test]
async fn generic_mqtt_ignores_downlink() {
    let broker = FakeBroker::new();
    let adapter = Adapter::<MqttDialect>::new("up", broker.connector());
    adapter.initialize(MQTT_CONFIG).await.expect("initialize");
    assert!(broker.subscriptions().is_empty());
    assert_eq!(adapter.pending_command_count(), 0);
    assert!(adapter.pull_commands(5).expect("pull").is_empty());
    let stats = adapter.stats();
    assert_eq!(stats["type"], "mqtt");
    assert_eq!(stats["topic"], "fsu/up");
    assert_eq!(stats["pending_cmd"], 0);
}
