//! PandaX 方言（网关模式）。
//!
//! 实时数据按子设备令牌打包发到 `v1/gateway/telemetry`，告警发到事件主题；
//! 下行经 RPC 请求主题，执行结果回写到 RPC 响应主题。

use super::{DEFAULT_CONNECT_TIMEOUT_SECONDS, read_client_id, read_link, read_qos, timestamp_or_now};
use crate::config_reader::ConfigReader;
use crate::downlink::{
    Identity, build_property_commands, convert_field_value, convert_fields, first_non_empty,
    lookup_any, map_string, parse_identity, split_topic, stringify_any,
};
use crate::error::NorthboundError;
use crate::nbtype;
use crate::runtime::{Dialect, Downlink, Outbound, RuntimeSettings};
use crate::transport::InboundMessage;
use crate::url::normalize_server_url;
use domain::{AlarmPayload, CollectData, CommandResult, NorthboundCommand, now_epoch_ms};
use serde_json::{Map, Value, json};
use std::time::Duration;

pub const GATEWAY_TELEMETRY_TOPIC: &str = "v1/gateway/telemetry";
pub const GATEWAY_ATTRIBUTES_TOPIC: &str = "v1/gateway/attributes";
pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
pub const ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";
pub const ROW_TOPIC: &str = "v1/devices/me/row";
pub const RPC_REQUEST_TOPIC: &str = "v1/devices/me/rpc/request";
pub const RPC_RESPONSE_TOPIC: &str = "v1/devices/me/rpc/response";
pub const EVENT_TOPIC_PREFIX: &str = "v1/devices/event";
const DEFAULT_ALARM_IDENTIFIER: &str = "alarm";

const RPC_SOURCE: &str = "pandax.rpc.request";

/// PandaX 保留参数键，不作为通用属性下发。
const RESERVED_PARAM_KEYS: [&str; 12] = [
    "productKey",
    "product_key",
    "deviceKey",
    "device_key",
    "properties",
    "sub_device",
    "subDevice",
    "sub_devices",
    "subDevices",
    "fieldName",
    "field_name",
    "value",
];

/// 子设备令牌的生成方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMode {
    DeviceKey,
    ProductDeviceKey,
    ProductDeviceName,
    #[default]
    DeviceName,
}

impl TokenMode {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "devicekey" | "device_key" => Self::DeviceKey,
            "product_devicekey" | "product_device_key" => Self::ProductDeviceKey,
            "product_devicename" | "product_device_name" => Self::ProductDeviceName,
            _ => Self::DeviceName,
        }
    }
}

fn topic_or(reader: &ConfigReader, keys: &[&str], fallback: &str) -> String {
    let configured = reader.string(keys);
    if configured.is_empty() {
        fallback.to_string()
    } else {
        configured
    }
}

#[derive(Debug, Clone)]
pub struct PandaXDialect {
    settings: RuntimeSettings,
    product_key: String,
    device_key: String,
    token_mode: TokenMode,
    telemetry_topic: String,
    attributes_topic: String,
    row_topic: String,
    gateway_telemetry_topic: String,
    gateway_attributes_topic: String,
    alarm_topic: String,
    rpc_request_topic: String,
    rpc_response_topic: String,
}

impl PandaXDialect {
    pub fn gateway_telemetry_topic(&self) -> &str {
        &self.gateway_telemetry_topic
    }

    pub fn alarm_topic(&self) -> &str {
        &self.alarm_topic
    }

    pub fn rpc_request_topic(&self) -> &str {
        &self.rpc_request_topic
    }

    pub fn rpc_response_topic(&self) -> &str {
        &self.rpc_response_topic
    }

    pub fn token_mode(&self) -> TokenMode {
        self.token_mode
    }

    /// 子设备令牌；首选方式缺字段时退回 dk、名称、`device_<id>`。
    pub fn sub_device_token(&self, data: &CollectData) -> String {
        let product_key = first_non_empty(&data.product_key, &self.product_key);
        let name = first_non_empty(&data.device_name, &data.device_key);
        let device_key = first_non_empty(&data.device_key, &data.device_name);

        let preferred = match self.token_mode {
            TokenMode::DeviceKey => device_key.clone(),
            TokenMode::ProductDeviceKey if !product_key.is_empty() && !device_key.is_empty() => {
                format!("{}_{}", product_key, device_key)
            }
            TokenMode::ProductDeviceName if !product_key.is_empty() && !name.is_empty() => {
                format!("{}_{}", product_key, name)
            }
            TokenMode::DeviceName => name.clone(),
            _ => String::new(),
        };
        if !preferred.is_empty() {
            return preferred;
        }
        if !device_key.is_empty() {
            return device_key;
        }
        if !name.is_empty() {
            return name;
        }
        format!("device_{}", data.device_id)
    }

    fn default_identity(&self) -> Identity {
        Identity::new(self.product_key.clone(), self.device_key.clone())
    }
}

/// 从 `v1/devices/me/rpc/request/{requestId}` 取请求号。
pub fn request_id_from_topic(topic: &str) -> String {
    match split_topic(topic).as_slice() {
        ["v1", "devices", "me", "rpc", "request", request_id, ..] => request_id.trim().to_string(),
        _ => String::new(),
    }
}

/// RPC 参数到命令的级联：
/// 1. `properties`；
/// 2. `sub_device` / `subDevice`；
/// 3. `sub_devices` / `subDevices` 的每一项；
/// 4. `fieldName` + `value`；
/// 5. 以上都没有产出时，其余非保留键；
/// 6. 仍为空且 method 非空时，以 method 为字段名、整个 params 为值。
///
/// 身份缺 pk 或 dk 的命令丢弃。
pub fn build_rpc_commands(
    request_id: &str,
    method: &str,
    params: &Value,
    defaults: &Identity,
) -> Vec<NorthboundCommand> {
    let mut out = Vec::new();
    let append = |out: &mut Vec<NorthboundCommand>, identity: &Identity, properties: &Map<String, Value>| {
        if identity.is_complete() {
            out.extend(build_property_commands(
                request_id, identity, properties, RPC_SOURCE,
            ));
        }
    };

    if let Value::Object(params) = params {
        let base = Identity::new(
            map_string(params, &["productKey", "product_key"]),
            map_string(params, &["deviceKey", "device_key"]),
        )
        .or(defaults);

        if let Some(Value::Object(properties)) = params.get("properties") {
            append(&mut out, &base, properties);
        }

        let nested_identity = |sub: &Map<String, Value>| parse_identity(sub.get("identity")).or(&base);

        for key in ["sub_device", "subDevice"] {
            if let Some(Value::Object(sub)) = params.get(key) {
                if let Some(Value::Object(properties)) = sub.get("properties") {
                    append(&mut out, &nested_identity(sub), properties);
                }
            }
        }

        for key in ["sub_devices", "subDevices"] {
            let Some(Value::Array(items)) = params.get(key) else {
                continue;
            };
            for item in items {
                let Value::Object(sub) = item else { continue };
                if let Some(Value::Object(properties)) = sub.get("properties") {
                    append(&mut out, &nested_identity(sub), properties);
                }
            }
        }

        let field_name = map_string(params, &["fieldName", "field_name"]);
        if !field_name.is_empty() {
            if let Some(value) = params.get("value") {
                let mut single = Map::new();
                single.insert(field_name, value.clone());
                append(&mut out, &base, &single);
            }
        }

        if out.is_empty() {
            let generic: Map<String, Value> = params
                .iter()
                .filter(|(key, _)| !RESERVED_PARAM_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            append(&mut out, &base, &generic);
        }
    }

    let method = method.trim();
    if out.is_empty() && !method.is_empty() && defaults.is_complete() {
        out.push(NorthboundCommand {
            request_id: request_id.to_string(),
            product_key: defaults.product_key.clone(),
            device_key: defaults.device_key.clone(),
            field_name: method.to_string(),
            value: stringify_any(params),
            source: RPC_SOURCE.to_string(),
        });
    }
    out
}

impl Dialect for PandaXDialect {
    const KIND: &'static str = nbtype::PANDAX;

    fn parse(name: &str, config: &str) -> Result<Self, NorthboundError> {
        let reader = ConfigReader::parse(config)?;
        let server_url = normalize_server_url(
            &reader.string(&["serverUrl", "broker", "server_url"]),
            &reader.string(&["protocol"]),
            reader.int(&["port"], 0),
        );
        let username = reader.string(&["username", "token", "deviceToken"]);
        if server_url.is_empty() {
            return Err(NorthboundError::Config("serverUrl is required".to_string()));
        }
        if username.is_empty() {
            return Err(NorthboundError::Config("username is required".to_string()));
        }
        if !reader.bool(&["gatewayMode"], true) {
            return Err(NorthboundError::Config(
                "PandaX adapter only supports gatewayMode=true".to_string(),
            ));
        }
        let qos = read_qos(&reader)?;
        let retain = reader.bool(&["retain"], false);

        let client_id = read_client_id(&reader, Self::KIND, name);
        let mut link = read_link(&reader, server_url, client_id, username);
        link.connect_timeout = link
            .connect_timeout
            .max(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS as u64));

        let event_prefix = topic_or(&reader, &["eventTopicPrefix"], EVENT_TOPIC_PREFIX);
        let alarm_identifier = topic_or(&reader, &["alarmIdentifier"], DEFAULT_ALARM_IDENTIFIER);
        let alarm_topic = topic_or(
            &reader,
            &["alarmTopic"],
            &format!("{}/{}", event_prefix.trim_end_matches('/'), alarm_identifier),
        );

        Ok(Self {
            settings: RuntimeSettings::read(&reader, link, qos, retain),
            product_key: reader.string(&["productKey", "product_key"]),
            device_key: reader.string(&["deviceKey", "device_key"]),
            token_mode: TokenMode::parse(&reader.string(&["subDeviceTokenMode"])),
            telemetry_topic: topic_or(&reader, &["telemetryTopic", "topic"], TELEMETRY_TOPIC),
            attributes_topic: topic_or(&reader, &["attributesTopic"], ATTRIBUTES_TOPIC),
            row_topic: topic_or(&reader, &["rowTopic"], ROW_TOPIC),
            gateway_telemetry_topic: topic_or(
                &reader,
                &["gatewayTelemetryTopic"],
                GATEWAY_TELEMETRY_TOPIC,
            ),
            gateway_attributes_topic: topic_or(
                &reader,
                &["gatewayAttributesTopic"],
                GATEWAY_ATTRIBUTES_TOPIC,
            ),
            alarm_topic,
            rpc_request_topic: topic_or(&reader, &["rpcRequestTopic"], RPC_REQUEST_TOPIC),
            rpc_response_topic: topic_or(&reader, &["rpcResponseTopic"], RPC_RESPONSE_TOPIC),
        })
    }

    fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    fn subscriptions(&self) -> Vec<String> {
        let topic = self.rpc_request_topic.trim();
        if topic.is_empty() {
            return Vec::new();
        }
        let mut topics = vec![topic.to_string()];
        if !topic.ends_with("/+") {
            topics.push(format!("{}/+", topic.trim_end_matches('/')));
        }
        topics
    }

    fn encode_sample(&self, data: &CollectData) -> Result<Outbound, NorthboundError> {
        let mut body = Map::new();
        body.insert(
            self.sub_device_token(data),
            json!({
                "ts": timestamp_or_now(data.timestamp_ms),
                "values": Value::Object(convert_fields(&data.fields)),
            }),
        );
        Outbound::json(self.gateway_telemetry_topic.clone(), &Value::Object(body))
    }

    fn encode_alarm(&self, alarm: &AlarmPayload) -> Result<Outbound, NorthboundError> {
        let body = json!({
            "device_name": alarm.device_name,
            "product_key": alarm.product_key,
            "device_key": alarm.device_key,
            "field_name": alarm.field_name,
            "actual_value": alarm.actual_value,
            "threshold": alarm.threshold,
            "operator": alarm.operator,
            "severity": alarm.severity,
            "message": alarm.message,
            "ts": now_epoch_ms(),
        });
        Outbound::json(self.alarm_topic.clone(), &body)
    }

    fn handle_downlink(&self, message: &InboundMessage) -> Result<Downlink, NorthboundError> {
        let request: Value = serde_json::from_slice(&message.payload)?;
        let Value::Object(request) = request else {
            return Err(NorthboundError::Payload(
                "rpc request must be a JSON object".to_string(),
            ));
        };
        let mut request_id = lookup_any(&request, &["requestId"])
            .map(stringify_any)
            .unwrap_or_default()
            .trim()
            .to_string();
        if request_id.is_empty() {
            request_id = request_id_from_topic(&message.topic);
        }
        let method = request.get("method").map(stringify_any).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(Value::Null);
        Ok(Downlink {
            commands: build_rpc_commands(&request_id, &method, &params, &self.default_identity()),
            replies: Vec::new(),
        })
    }

    fn encode_result(&self, result: &CommandResult) -> Result<Option<Outbound>, NorthboundError> {
        if result.request_id.trim().is_empty() {
            return Ok(None);
        }
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
        let body = json!({
            "requestId": result.request_id,
            "method": "write",
            "params": {
                "success": result.success,
                "code": code,
                "message": message,
                "productKey": result.product_key,
                "deviceKey": result.device_key,
                "fieldName": result.field_name,
                "value": convert_field_value(&result.value),
            },
        });
        Outbound::json(self.rpc_response_topic.clone(), &body).map(Some)
    }

    fn extend_stats(&self, stats: &mut Map<String, Value>) {
        stats.insert("telemetry_topic".into(), Value::from(self.telemetry_topic.clone()));
        stats.insert("attributes_topic".into(), Value::from(self.attributes_topic.clone()));
        stats.insert("row_topic".into(), Value::from(self.row_topic.clone()));
        stats.insert(
            "gateway_telemetry_topic".into(),
            Value::from(self.gateway_telemetry_topic.clone()),
        );
        stats.insert(
            "gateway_attributes_topic".into(),
            Value::from(self.gateway_attributes_topic.clone()),
        );
        stats.insert("alarm_topic".into(), Value::from(self.alarm_topic.clone()));
        stats.insert("rpc_request_topic".into(), Value::from(self.rpc_request_topic.clone()));
        stats.insert("rpc_response_topic".into(), Value::from(self.rpc_response_topic.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"{"serverUrl":"broker.local","port":1883,"username":"tok","productKey":"pk","deviceKey":"dk"}"#;

    fn dialect() -> PandaXDialect {
        PandaXDialect::parse("px", BASE).expect("parse")
    }

    fn decode(outbound: &Outbound) -> Value {
        serde_json::from_slice(&outbound.payload).expect("json")
    }

    #[test]
    fn parse_defaults() {
        let dialect = dialect();
        assert_eq!(dialect.settings().link.server_url, "tcp://broker.local:1883");
        assert_eq!(dialect.settings().link.username, "tok");
        assert!(dialect.settings().link.client_id.starts_with("pandax-px-"));
        assert_eq!(dialect.gateway_telemetry_topic(), GATEWAY_TELEMETRY_TOPIC);
        assert_eq!(dialect.alarm_topic(), "v1/devices/event/alarm");
        assert_eq!(dialect.token_mode(), TokenMode::DeviceName);
    }

    #[test]
    fn connect_timeout_has_floor() {
        let dialect = PandaXDialect::parse(
            "px",
            r#"{"serverUrl":"b","token":"t","connectTimeout":3}"#,
        )
        .expect("parse");
        assert_eq!(dialect.settings().link.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn alarm_topic_from_prefix_and_identifier() {
        let dialect = PandaXDialect::parse(
            "px",
            r#"{"serverUrl":"b","username":"t","eventTopicPrefix":"v1/custom/","alarmIdentifier":"warn"}"#,
        )
        .expect("parse");
        assert_eq!(dialect.alarm_topic(), "v1/custom/warn");
    }

    #[test]
    fn parse_errors() {
        let cases = [
            (r#"{"username":"t"}"#, "serverUrl is required"),
            (r#"{"serverUrl":"b"}"#, "username is required"),
            (
                r#"{"serverUrl":"b","username":"t","gatewayMode":false}"#,
                "gatewayMode=true",
            ),
            (
                r#"{"serverUrl":"b","username":"t","qos":3}"#,
                "qos must be between 0 and 2",
            ),
        ];
        for (config, expected) in cases {
            let err = PandaXDialect::parse("px", config).expect_err("must fail");
            assert!(err.to_string().contains(expected), "{config}: {err}");
        }
    }

    #[test]
    fn sample_keyed_by_sub_device_token() {
        let dialect = dialect();
        let mut data = CollectData {
            device_id: 9,
            device_name: "meter-1".to_string(),
            device_key: "m1".to_string(),
            timestamp_ms: 1_700_000_000_000,
            ..Default::default()
        };
        data.fields.insert("p".to_string(), "12".to_string());
        let outbound = dialect.encode_sample(&data).expect("encode");
        assert_eq!(outbound.topic, GATEWAY_TELEMETRY_TOPIC);
        let body = decode(&outbound);
        assert_eq!(body["meter-1"]["ts"], 1_700_000_000_000i64);
        assert_eq!(body["meter-1"]["values"]["p"], 12);
    }

    #[test]
    fn token_modes_and_fallbacks() {
        let data = CollectData {
            device_id: 4,
            device_name: "name".to_string(),
            device_key: "key".to_string(),
            ..Default::default()
        };
        let with_mode = |mode: &str| {
            let config = format!(
                r#"{{"serverUrl":"b","username":"t","productKey":"pk","subDeviceTokenMode":"{mode}"}}"#
            );
            PandaXDialect::parse("px", &config).expect("parse")
        };
        assert_eq!(with_mode("deviceKey").sub_device_token(&data), "key");
        assert_eq!(with_mode("product_device_key").sub_device_token(&data), "pk_key");
        assert_eq!(with_mode("product_devicename").sub_device_token(&data), "pk_name");
        assert_eq!(with_mode("").sub_device_token(&data), "name");

        let bare = CollectData {
            device_id: 4,
            ..Default::default()
        };
        assert_eq!(with_mode("devicekey").sub_device_token(&bare), "device_4");
    }

    #[test]
    fn subscriptions_include_wildcard() {
        assert_eq!(
            dialect().subscriptions(),
            vec![RPC_REQUEST_TOPIC.to_string(), format!("{}/+", RPC_REQUEST_TOPIC)]
        );
        let dialect = PandaXDialect::parse(
            "px",
            r#"{"serverUrl":"b","username":"t","rpcRequestTopic":"rpc/in/+"}"#,
        )
        .expect("parse");
        assert_eq!(dialect.subscriptions(), vec!["rpc/in/+".to_string()]);
    }

    #[test]
    fn rpc_request_id_from_topic() {
        let dialect = dialect();
        let message = InboundMessage {
            topic: "v1/devices/me/rpc/request/77".to_string(),
            payload: br#"{"method":"write","params":{"properties":{"sw":1}}}"#.to_vec(),
        };
        let downlink = dialect.handle_downlink(&message).expect("handle");
        assert_eq!(downlink.commands.len(), 1);
        assert_eq!(downlink.commands[0].request_id, "77");
        assert_eq!(downlink.commands[0].product_key, "pk");
        assert_eq!(downlink.commands[0].source, "pandax.rpc.request");
        assert!(downlink.replies.is_empty());
    }

    #[test]
    fn rpc_cascade_covers_every_sub_device() {
        let defaults = Identity::new("pk", "dk");
        let params = json!({
            "subDevices": [
                {"identity": {"productKey": "p1", "deviceKey": "d1"}, "properties": {"a": 1}},
                {"identity": {"deviceKey": "d2"}, "properties": {"b": true}},
            ],
        });
        let commands = build_rpc_commands("r", "write", &params, &defaults);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].device_key, "d1");
        assert_eq!(commands[1].product_key, "pk");
        assert_eq!(commands[1].device_key, "d2");
        assert_eq!(commands[1].value, "true");
    }

    #[test]
    fn rpc_field_value_and_generic_keys() {
        let defaults = Identity::new("pk", "dk");
        let single = json!({"fieldName": "sp", "value": 21.5, "deviceKey": "d9"});
        let commands = build_rpc_commands("r", "", &single, &defaults);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].device_key, "d9");
        assert_eq!(commands[0].value, "21.5");

        let generic = json!({"b": "x", "a": 2, "productKey": "pk2"});
        let commands = build_rpc_commands("r", "", &generic, &defaults);
        let names: Vec<_> = commands.iter().map(|c| c.field_name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(commands[0].product_key, "pk2");
    }

    #[test]
    fn rpc_method_fallback() {
        let defaults = Identity::new("pk", "dk");
        let commands = build_rpc_commands("r", "reboot", &json!("now"), &defaults);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].field_name, "reboot");
        assert_eq!(commands[0].value, "now");

        assert!(build_rpc_commands("r", "reboot", &Value::Null, &Identity::default()).is_empty());
    }

    #[test]
    fn result_is_written_to_rpc_response() {
        let dialect = dialect();
        let result = CommandResult {
            request_id: "77".to_string(),
            product_key: "pk".to_string(),
            device_key: "dk".to_string(),
            field_name: "sw".to_string(),
            value: "1".to_string(),
            success: false,
            ..Default::default()
        };
        let outbound = dialect.encode_result(&result).expect("encode").expect("reply");
        assert_eq!(outbound.topic, RPC_RESPONSE_TOPIC);
        let body = decode(&outbound);
        assert_eq!(body["requestId"], "77");
        assert_eq!(body["method"], "write");
        assert_eq!(body["params"]["code"], 500);
        assert_eq!(body["params"]["message"], "failed");
        assert_eq!(body["params"]["value"], true);

        let anonymous = CommandResult::default();
        assert!(dialect.encode_result(&anonymous).expect("encode").is_none());
    }
}
