mod common;

use common::{FakeBroker, wait_until};
use domain::{CollectData, CommandResult, NorthboundConfig};
use fsu_northbound::{NorthboundError, NorthboundManager, new_adapter};
use fsu_storage::{InMemoryNorthboundConfigStore, NorthboundConfigStore};
use std::time::Duration;

fn mqtt_config(name: &str, enabled: bool) -> NorthboundConfig {
    NorthboundConfig {
        name: name.to_string(),
        kind: "mqtt".to_string(),
        enabled,
        server_url: "127.0.0.1".to_string(),
        port: 1883,
        topic: format!("{name}/up"),
        upload_interval: 60_000,
        ..Default::default()
    }
}

fn sagoo_config(name: &str) -> NorthboundConfig {
    NorthboundConfig {
        name: name.to_string(),
        kind: "XunJi".to_string(),
        enabled: true,
        server_url: "127.0.0.1".to_string(),
        port: 1883,
        product_key: "pk".to_string(),
        device_key: "dk".to_string(),
        ..Default::default()
    }
}

#[test]
fn registry_normalizes_types() {
    let broker = FakeBroker::new();
    let adapter = new_adapter(" XUNJI ", "a", broker.connector()).expect("sagoo");
    assert_eq!(adapter.kind(), "sagoo");
    assert_eq!(adapter.name(), "a");
    assert!(new_adapter("PandaX", "b", broker.connector()).is_some());
    assert!(new_adapter("http", "c", broker.connector()).is_none());
}

#[tokio::test]
async fn add_send_and_remove() {
    let broker = FakeBroker::new();
    let manager = NorthboundManager::new(broker.connector());
    manager.add_adapter(&mqtt_config("on", true)).await.expect("add on");
    manager.add_adapter(&mqtt_config("off", false)).await.expect("add off");
    assert_eq!(manager.adapter_count(), 2);
    assert_eq!(manager.adapter_names(), vec!["off".to_string(), "on".to_string()]);
    assert_eq!(
        broker.last_link().expect("link").server_url,
        "tcp://127.0.0.1:1883"
    );

    let mut data = CollectData {
        device_id: 1,
        device_name: "meter".to_string(),
        ..Default::default()
    };
    data.fields.insert("v".to_string(), "1".to_string());
    manager.send_data(&data);

    let on = manager.get_adapter("on").expect("on");
    let off = manager.get_adapter("off").expect("off");
    assert_eq!(on.stats()["pending_data"], 1);
    assert_eq!(off.stats()["pending_data"], 0);
    assert_eq!(on.stats()["interval_ms"], 60_000);

    let stats = manager.all_stats();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0]["name"], "off");
    assert_eq!(stats[1]["enabled"], true);

    manager.remove_adapter("on").await.expect("remove");
    assert!(matches!(
        manager.get_adapter("on"),
        Err(NorthboundError::NotFound(_))
    ));
    assert!(matches!(
        manager.remove_adapter("on").await,
        Err(NorthboundError::NotFound(_))
    ));
    manager.shutdown().await;
    assert_eq!(manager.adapter_count(), 0);
}

#[tokio::test]
async fn rejects_invalid_and_unknown_configs() {
    let broker = FakeBroker::new();
    let manager = NorthboundManager::new(broker.connector());

    let mut missing_topic = mqtt_config("m", true);
    missing_topic.topic.clear();
    let err = manager.add_adapter(&missing_topic).await.expect_err("topic");
    assert!(err.to_string().contains("topic is required for MQTT adapter"));

    let mut unknown = mqtt_config("u", true);
    unknown.kind = "http".to_string();
    let err = manager.add_adapter(&unknown).await.expect_err("unknown");
    assert!(matches!(err, NorthboundError::UnknownType(_)));
    assert_eq!(manager.adapter_count(), 0);
    assert_eq!(broker.connect_count(), 0);
}

#[tokio::test]
async fn set_enabled_and_interval() {
    let broker = FakeBroker::new();
    let manager = NorthboundManager::new(broker.connector());
    manager.add_adapter(&mqtt_config("a", false)).await.expect("add");

    manager.set_enabled("a", true).await.expect("enable");
    assert!(manager.get_adapter("a").expect("a").is_enabled());
    manager.set_interval("a", Duration::from_secs(2)).expect("interval");
    assert_eq!(manager.get_adapter("a").expect("a").stats()["interval_ms"], 2000);

    manager.set_enabled("a", false).await.expect("disable");
    assert!(!manager.get_adapter("a").expect("a").is_enabled());
    assert!(manager.set_interval("missing", Duration::from_secs(1)).is_err());
    manager.shutdown().await;
}

#[tokio::test]
async fn update_replaces_adapter() {
    let broker = FakeBroker::new();
    let manager = NorthboundManager::new(broker.connector());
    manager.add_adapter(&mqtt_config("a", true)).await.expect("add");

    let mut changed = mqtt_config("a", true);
    changed.topic = "changed/up".to_string();
    manager.update_adapter(&changed).await.expect("update");
    assert_eq!(manager.adapter_count(), 1);
    assert_eq!(manager.get_adapter("a").expect("a").stats()["topic"], "changed/up");
    assert_eq!(broker.connect_count(), 2);
    manager.shutdown().await;
}

#[tokio::test]
async fn commands_flow_through_manager() {
    let broker = FakeBroker::new();
    let manager = NorthboundManager::new(broker.connector());
    manager.add_adapter(&sagoo_config("sg")).await.expect("add");
    assert_eq!(manager.get_adapter("sg").expect("sg").kind(), "sagoo");

    broker
        .inject(
            "/sys/pk/dk/thing/service/property/set",
            r#"{"id":"7","params":{"subDevices":[{"identity":{"productKey":"p1","deviceKey":"d1"},"properties":{"sp":"21.5"}}]}}"#,
        )
        .await;
    let adapter = manager.get_adapter("sg").expect("sg");
    assert!(wait_until(Duration::from_secs(2), || adapter.pending_command_count() == 1).await);

    let commands = manager.pull_all_commands(20);
    assert_eq!(commands.len(), 1);
    let (name, command) = &commands[0];
    assert_eq!(name, "sg");
    assert_eq!(command.device_key, "d1");
    assert_eq!(command.value, "21.5");

    let result = CommandResult::for_command(command, false, "device offline");
    manager
        .report_command_result(name, &result)
        .await
        .expect("report");
    let replies = broker.published_on("/sys/pk/dk/thing/service/property/set_reply");
    let last = replies.last().expect("reply");
    assert_eq!(last["code"], 500);
    assert_eq!(last["message"], "device offline");
    manager.shutdown().await;
}

#[tokio::test]
async fn loads_from_store_and_persists_state() {
    let broker = FakeBroker::new();
    let store = InMemoryNorthboundConfigStore::new();
    store
        .save_northbound_config(mqtt_config("good", true))
        .await
        .expect("save");
    let mut bad = mqtt_config("bad", true);
    bad.server_url.clear();
    store.save_northbound_config(bad).await.expect("save");

    let manager = NorthboundManager::new(broker.connector());
    let loaded = manager.load_from_store(&store).await.expect("load");
    assert_eq!(loaded, 1);
    assert_eq!(manager.adapter_names(), vec!["good".to_string()]);

    manager.persist_connection_states(&store).await;
    let configs = store.list_northbound_configs().await.expect("list");
    let good = configs.iter().find(|c| c.name == "good").expect("good");
    assert!(good.connected);
    assert!(good.last_connected_at_ms.is_some());
    manager.shutdown().await;
}
