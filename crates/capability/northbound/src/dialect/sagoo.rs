//! Sagoo 方言（兼容别名 xunji）。
//!
//! 网关以 `/sys/{pk}/{dk}/thing/event/property/pack/post` 打包上报子设备属性；
//! 下行订阅属性设置、通用服务调用与配置推送，并按 `_reply` / `/reply` 主题应答。

use super::{read_client_id, read_link, read_qos};
use crate::config_reader::ConfigReader;
use crate::downlink::{
    Identity, build_property_commands, convert_field_value, convert_fields,
    extract_command_properties, first_non_empty, parse_identity, split_topic, stringify_any,
};
use crate::error::NorthboundError;
use crate::ids::next_prefixed_id;
use crate::nbtype;
use crate::runtime::{Dialect, Downlink, Outbound, RuntimeSettings};
use crate::transport::InboundMessage;
use crate::url::normalize_server_url;
use domain::{AlarmPayload, CollectData, CommandResult, now_epoch_ms};
use serde_json::{Map, Value, json};

const PROPERTY_SET_SOURCE: &str = "sagoo.property.set";
const SERVICE_CALL_SOURCE: &str = "sagoo.service.call";

#[derive(Debug, Clone)]
pub struct SagooDialect {
    settings: RuntimeSettings,
    product_key: String,
    device_key: String,
    topic: String,
    alarm_topic: String,
}

impl SagooDialect {
    pub fn product_key(&self) -> &str {
        &self.product_key
    }

    pub fn device_key(&self) -> &str {
        &self.device_key
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn alarm_topic(&self) -> &str {
        &self.alarm_topic
    }

    fn sys_prefix(product_key: &str, device_key: &str) -> String {
        format!("/sys/{}/{}", product_key, device_key)
    }

    fn gateway_identity(&self) -> Identity {
        Identity::new(self.product_key.clone(), self.device_key.clone())
    }

    fn sub_device_identity(&self, product_key: &str, device_key: &str) -> Value {
        json!({
            "productKey": first_non_empty(product_key, &self.product_key),
            "deviceKey": first_non_empty(device_key, &self.device_key),
        })
    }

    fn reply(topic: String, id: &str, data: Value) -> Result<Outbound, NorthboundError> {
        Outbound::json(
            topic,
            &json!({
                "code": 200,
                "data": data,
                "id": id,
                "message": "success",
                "version": "1.0.0",
            }),
        )
    }
}

impl Dialect for SagooDialect {
    const KIND: &'static str = nbtype::SAGOO;

    fn parse(name: &str, config: &str) -> Result<Self, NorthboundError> {
        let reader = ConfigReader::parse(config)?;
        let product_key =
            reader.string(&["productKey", "product_key", "productID", "product_id"]);
        if product_key.is_empty() {
            return Err(NorthboundError::Config("productKey is required".to_string()));
        }
        let device_key = reader.string(&["deviceKey", "device_key", "deviceName", "device_name"]);
        if device_key.is_empty() {
            return Err(NorthboundError::Config("deviceKey is required".to_string()));
        }
        let server_url = normalize_server_url(
            &reader.string(&["serverUrl", "server_url", "broker"]),
            &reader.string(&["protocol"]),
            reader.int(&["port"], 0),
        );
        if server_url.is_empty() {
            return Err(NorthboundError::Config("serverUrl is required".to_string()));
        }
        let qos = read_qos(&reader)?;
        let retain = reader.bool(&["retain"], false);

        let prefix = Self::sys_prefix(&product_key, &device_key);
        let configured_topic = reader.string(&["topic"]);
        let topic = if configured_topic.starts_with("/sys/") {
            configured_topic
        } else {
            format!("{}/thing/event/property/pack/post", prefix)
        };
        let configured_alarm = reader.string(&["alarmTopic", "alarm_topic"]);
        let alarm_topic = if configured_alarm.starts_with("/sys/") {
            configured_alarm
        } else {
            topic.clone()
        };

        let client_id = read_client_id(&reader, Self::KIND, name);
        let link = read_link(&reader, server_url, client_id, reader.string(&["username"]));
        Ok(Self {
            settings: RuntimeSettings::read(&reader, link, qos, retain),
            product_key,
            device_key,
            topic,
            alarm_topic,
        })
    }

    fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    fn subscriptions(&self) -> Vec<String> {
        let prefix = Self::sys_prefix(&self.product_key, &self.device_key);
        vec![
            format!("{}/thing/service/property/set", prefix),
            format!("{}/thing/service/+", prefix),
            format!("{}/thing/config/push", prefix),
        ]
    }

    fn encode_sample(&self, data: &CollectData) -> Result<Outbound, NorthboundError> {
        let body = json!({
            "id": next_prefixed_id("msg"),
            "version": "1.0",
            "sys": {"ack": 0},
            "method": "thing.event.property.pack.post",
            "params": {
                "properties": {},
                "events": {},
                "subDevices": [{
                    "identity": self.sub_device_identity(&data.product_key, &data.device_key),
                    "properties": Value::Object(convert_fields(&data.fields)),
                    "events": {},
                }],
            },
        });
        Outbound::json(self.topic.clone(), &body)
    }

    fn encode_alarm(&self, alarm: &AlarmPayload) -> Result<Outbound, NorthboundError> {
        let body = json!({
            "id": next_prefixed_id("alarm"),
            "version": "1.0",
            "sys": {"ack": 0},
            "method": "thing.event.property.pack.post",
            "params": {
                "properties": {},
                "events": {},
                "subDevices": [{
                    "identity": self.sub_device_identity(&alarm.product_key, &alarm.device_key),
                    "properties": {},
                    "events": {
                        "alarm": {
                            "value": {
                                "field_name": alarm.field_name,
                                "actual_value": alarm.actual_value,
                                "threshold": alarm.threshold,
                                "operator": alarm.operator,
                                "message": alarm.message,
                            },
                            "time": now_epoch_ms(),
                        },
                    },
                }],
            },
        });
        Outbound::json(self.alarm_topic.clone(), &body)
    }

    fn handle_downlink(&self, message: &InboundMessage) -> Result<Downlink, NorthboundError> {
        let parts = split_topic(&message.topic);
        if parts.len() < 6 || parts[0] != "sys" {
            return Err(NorthboundError::Payload(format!(
                "unsupported topic: {}",
                message.topic
            )));
        }
        let topic_identity = Identity::new(parts[1], parts[2]);
        let prefix = Self::sys_prefix(parts[1], parts[2]);
        let request: Value = serde_json::from_slice(&message.payload)?;
        let Value::Object(request) = request else {
            return Err(NorthboundError::Payload(
                "request must be a JSON object".to_string(),
            ));
        };
        let id = request.get("id").map(stringify_any).unwrap_or_default();
        let params = match request.get("params") {
            Some(Value::Object(params)) => params.clone(),
            _ => Map::new(),
        };

        let mut downlink = Downlink::default();
        match &parts[3..] {
            ["thing", "service", "property", "set"] => {
                let extracted = extract_command_properties(&params);
                let identity = parse_identity(request.get("identity"))
                    .or(&extracted.identity)
                    .or(&topic_identity);
                let request_id = if id.is_empty() {
                    next_prefixed_id("req")
                } else {
                    id.clone()
                };
                downlink.commands = build_property_commands(
                    &request_id,
                    &identity,
                    &extracted.properties,
                    PROPERTY_SET_SOURCE,
                );
                downlink.replies.push(Self::reply(
                    format!("{}/thing/service/property/set_reply", prefix),
                    &id,
                    Value::Object(params),
                )?);
            }
            ["thing", "config", "push"] => {
                downlink.replies.push(Outbound::json(
                    format!("{}/thing/config/push/reply", prefix),
                    &json!({"code": 200, "data": {}, "id": id}),
                )?);
            }
            ["thing", "service", service] if !service.ends_with("reply") && *service != "property" => {
                if !params.is_empty() {
                    let extracted = extract_command_properties(&params);
                    let identity = extracted.identity.or(&topic_identity);
                    let request_id = if id.is_empty() {
                        next_prefixed_id("req")
                    } else {
                        id.clone()
                    };
                    downlink.commands = build_property_commands(
                        &request_id,
                        &identity,
                        &extracted.properties,
                        SERVICE_CALL_SOURCE,
                    );
                }
                downlink.replies.push(Self::reply(
                    format!("{}/thing/service/{}_reply", prefix, service),
                    &id,
                    Value::Object(params),
                )?);
            }
            _ => {}
        }
        Ok(downlink)
    }

    fn encode_result(&self, result: &CommandResult) -> Result<Option<Outbound>, NorthboundError> {
        let identity = self
            .gateway_identity()
            .or(&Identity::new(result.product_key.clone(), result.device_key.clone()));
        let code = match result.code {
            0 if result.success => 200,
            0 => 500,
            code => code,
        };
        let message = match result.message.trim() {
            "" if result.success => "success".to_string(),
            "" => "failed".to_string(),
            message => message.to_string(),
        };
        let mut data = Map::new();
        if !result.field_name.is_empty() {
            data.insert(result.field_name.clone(), convert_field_value(&result.value));
        }
        let body = json!({
            "code": code,
            "id": result.request_id,
            "message": message,
            "version": "1.0.0",
            "data": Value::Object(data),
        });
        let topic = format!(
            "{}/thing/service/property/set_reply",
            Self::sys_prefix(&identity.product_key, &identity.device_key)
        );
        Outbound::json(topic, &body).map(Some)
    }

    fn extend_stats(&self, stats: &mut Map<String, Value>) {
        stats.insert("product_key".into(), Value::from(self.product_key.clone()));
        stats.insert("device_key".into(), Value::from(self.device_key.clone()));
        stats.insert("topic".into(), Value::from(self.topic.clone()));
        stats.insert("alarm_topic".into(), Value::from(self.alarm_topic.clone()));
    }
}
