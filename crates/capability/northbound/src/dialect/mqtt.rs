//! 通用 MQTT 方言：原样上报采集值与告警，不接收下行命令。

use super::{read_link, read_qos};
use crate::config_reader::ConfigReader;
use crate::error::NorthboundError;
use crate::nbtype;
use crate::runtime::{Dialect, Outbound, RuntimeSettings};
use crate::url::normalize_broker;
use domain::{AlarmPayload, CollectData, now_epoch_ms, now_epoch_nanos};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone)]
pub struct MqttDialect {
    settings: RuntimeSettings,
    topic: String,
    alarm_topic: String,
}

impl MqttDialect {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn alarm_topic(&self) -> &str {
        &self.alarm_topic
    }
}

impl Dialect for MqttDialect {
    const KIND: &'static str = nbtype::MQTT;

    fn parse(_name: &str, config: &str) -> Result<Self, NorthboundError> {
        let reader = ConfigReader::parse(config)?;
        let broker = normalize_broker(&reader.string(&["broker"]));
        if broker.is_empty() {
            return Err(NorthboundError::Config("broker is required".to_string()));
        }
        let topic = reader.string(&["topic"]);
        if topic.is_empty() {
            return Err(NorthboundError::Config("topic is required".to_string()));
        }
        let alarm_topic = match reader.string(&["alarm_topic"]) {
            configured if configured.is_empty() => format!("{}/alarm", topic),
            configured => configured,
        };
        let client_id = match reader.string(&["client_id"]) {
            configured if configured.is_empty() => format!("fsu-mqtt-{}", now_epoch_nanos()),
            configured => configured,
        };
        let qos = read_qos(&reader)?;
        let retain = reader.bool(&["retain"], false);

        let mut link = read_link(&reader, broker, client_id, reader.string(&["username"]));
        link.clean_session = reader.bool(&["clean_session"], false);
        Ok(Self {
            settings: RuntimeSettings::read(&reader, link, qos, retain),
            topic,
            alarm_topic,
        })
    }

    fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    fn encode_sample(&self, data: &CollectData) -> Result<Outbound, NorthboundError> {
        let body = json!({
            "device_name": data.device_name,
            "device_id": data.device_id,
            "timestamp": data.timestamp_ms.div_euclid(1000),
            "fields": data.fields,
        });
        Outbound::json(self.topic.clone(), &body)
    }

    fn encode_alarm(&self, alarm: &AlarmPayload) -> Result<Outbound, NorthboundError> {
        let body = json!({
            "device_id": alarm.device_id,
            "device_name": alarm.device_name,
            "field_name": alarm.field_name,
            "actual_value": alarm.actual_value,
            "threshold": alarm.threshold,
            "operator": alarm.operator,
            "severity": alarm.severity,
            "message": alarm.message,
            "timestamp": now_epoch_ms() / 1000,
        });
        Outbound::json(self.alarm_topic.clone(), &body)
    }

    fn accepts_commands(&self) -> bool {
        false
    }

    fn extend_stats(&self, stats: &mut Map<String, Value>) {
        let settings = &self.settings;
        stats.insert("broker".into(), Value::from(settings.link.server_url.clone()));
        stats.insert("topic".into(), Value::from(self.topic.clone()));
        stats.insert("alarm_topic".into(), Value::from(self.alarm_topic.clone()));
        stats.insert("client_id".into(), Value::from(settings.link.client_id.clone()));
        stats.insert("qos".into(), Value::from(settings.qos));
        stats.insert("retain".into(), Value::from(settings.retain));
    }
}
