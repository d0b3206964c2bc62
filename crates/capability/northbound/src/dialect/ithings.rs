//! iThings 方言（仅网关模式）。

use super::{read_client_id, read_link, read_qos, timestamp_or_now};
use crate::config_reader::ConfigReader;
use crate::downlink::{
    convert_field_value, convert_fields, first_non_empty, split_topic, stringify_any,
};
use crate::error::NorthboundError;
use crate::ids::next_prefixed_id;
use crate::nbtype;
use crate::runtime::{Dialect, Downlink, Outbound, RuntimeSettings};
use crate::transport::InboundMessage;
use crate::url::normalize_server_url;
use domain::{AlarmPayload, CollectData, CommandResult, NorthboundCommand, now_epoch_ms};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub const UP_PROPERTY_TOPIC_TEMPLATE: &str = "$thing/up/property/{productID}/{deviceName}";
pub const UP_EVENT_TOPIC_TEMPLATE: &str = "$thing/up/event/{productID}/{deviceName}";
pub const UP_ACTION_TOPIC_TEMPLATE: &str = "$thing/up/action/{productID}/{deviceName}";
pub const DOWN_PROPERTY_TOPIC: &str = "$thing/down/property/+/+";
pub const DOWN_ACTION_TOPIC: &str = "$thing/down/action/+/+";
const ALARM_EVENT_ID: &str = "alarm";
const ALARM_EVENT_TYPE: &str = "alert";

const PROPERTY_SOURCE: &str = "ithings.down.property";
const ACTION_SOURCE: &str = "ithings.down.action";

/// 替换 `{productID}` / `{deviceName}` 占位符。
pub fn render_topic(template: &str, product_id: &str, device_name: &str) -> String {
    template
        .trim()
        .replace("{productID}", product_id.trim())
        .replace("{deviceName}", device_name.trim())
}

/// 解析下行主题 `$thing/down/<type>/[custom/]<productID>/<deviceName>`。
pub fn parse_down_topic(topic: &str) -> Option<(String, String, String)> {
    let parts = split_topic(topic);
    if parts.len() < 5 || parts[0] != "$thing" || parts[1] != "down" {
        return None;
    }
    let topic_type = parts[2].trim();
    if topic_type.is_empty() {
        return None;
    }
    let (product_id, device_name) = if parts.len() >= 6 && parts[3] == "custom" {
        (parts[4].trim(), parts[5].trim())
    } else {
        (parts[3].trim(), parts[4].trim())
    };
    if product_id.is_empty() || device_name.is_empty() {
        return None;
    }
    Some((
        topic_type.to_string(),
        product_id.to_string(),
        device_name.to_string(),
    ))
}

/// `deviceName` 模式优先设备名，其余模式优先 device_key。
fn resolve_device_name(device_name: &str, device_key: &str, mode: &str) -> String {
    match mode.trim().to_ascii_lowercase().as_str() {
        "devicename" | "device_name" => first_non_empty(device_name, device_key),
        _ => first_non_empty(device_key, device_name),
    }
}

/// property + control 每个键一条命令；action + action 以 actionID 为字段名。
fn build_commands(
    request_id: &str,
    topic_type: &str,
    method: &str,
    action_id: &str,
    params: Option<&Value>,
    product_id: &str,
    device_name: &str,
) -> Vec<NorthboundCommand> {
    let command = |field_name: String, value: String, source: &str| NorthboundCommand {
        request_id: request_id.to_string(),
        product_key: product_id.to_string(),
        device_key: device_name.to_string(),
        field_name,
        value,
        source: source.to_string(),
    };
    match topic_type.to_ascii_lowercase().as_str() {
        "property" if method.eq_ignore_ascii_case("control") => {
            let Some(Value::Object(values)) = params else {
                return Vec::new();
            };
            let mut fields: Vec<(String, String)> = values
                .iter()
                .map(|(key, value)| (key.trim().to_string(), stringify_any(value)))
                .filter(|(key, _)| !key.is_empty())
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            fields
                .into_iter()
                .map(|(key, value)| command(key, value, PROPERTY_SOURCE))
                .collect()
        }
        "action" if method.eq_ignore_ascii_case("action") && !action_id.is_empty() => {
            let value = params.map(stringify_any).unwrap_or_default();
            vec![command(action_id.to_string(), value, ACTION_SOURCE)]
        }
        _ => Vec::new(),
    }
}

/// 一次下行请求的汇总状态。
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestState {
    request_id: String,
    product_id: String,
    device_name: String,
    topic_type: String,
    action_id: String,
    pending: usize,
    success: bool,
    code: i64,
    message: String,
    field_name: String,
    value: String,
}

#[derive(Debug)]
pub struct IThingsDialect {
    settings: RuntimeSettings,
    product_key: String,
    device_key: String,
    device_name_mode: String,
    sub_device_name_mode: String,
    up_property_template: String,
    up_event_template: String,
    up_action_template: String,
    down_property_topic: String,
    down_action_topic: String,
    alarm_event_id: String,
    alarm_event_type: String,
    requests: Mutex<HashMap<String, RequestState>>,
}

impl IThingsDialect {
    pub fn up_property_topic(&self) -> String {
        render_topic(&self.up_property_template, &self.product_key, &self.device_key)
    }

    pub fn pending_requests(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 合并一条执行结果；请求全部完成时返回汇总状态。
    fn apply_result(&self, result: &CommandResult) -> Option<RequestState> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = requests.get_mut(&result.request_id) else {
            return Some(RequestState {
                request_id: result.request_id.clone(),
                product_id: result.product_key.trim().to_string(),
                device_name: result.device_key.trim().to_string(),
                topic_type: "property".to_string(),
                action_id: String::new(),
                pending: 0,
                success: result.success,
                code: result.code,
                message: result.message.trim().to_string(),
                field_name: result.field_name.trim().to_string(),
                value: result.value.clone(),
            });
        };
        state.pending = state.pending.saturating_sub(1);
        if !result.success {
            state.success = false;
        }
        if result.code != 0 {
            state.code = result.code;
        }
        if !result.message.trim().is_empty() {
            state.message = result.message.trim().to_string();
        }
        if !result.field_name.trim().is_empty() {
            state.field_name = result.field_name.trim().to_string();
        }
        if !result.value.trim().is_empty() {
            state.value = result.value.clone();
        }
        if !result.product_key.trim().is_empty() {
            state.product_id = result.product_key.trim().to_string();
        }
        if !result.device_key.trim().is_empty() {
            state.device_name = result.device_key.trim().to_string();
        }
        if state.pending > 0 {
            return None;
        }
        requests.remove(&result.request_id)
    }
}

impl Dialect for IThingsDialect {
    const KIND: &'static str = nbtype::ITHINGS;

    fn parse(name: &str, config: &str) -> Result<Self, NorthboundError> {
        let reader = ConfigReader::parse(config)?;
        let server_url = normalize_server_url(
            &reader.string(&["serverUrl", "broker", "server_url"]),
            &reader.string(&["protocol"]),
            reader.int(&["port"], 0),
        );
        if server_url.is_empty() {
            return Err(NorthboundError::Config("serverUrl is required".to_string()));
        }
        let username = reader.string(&["username"]);
        if username.is_empty() {
            return Err(NorthboundError::Config("username is required".to_string()));
        }
        let product_key = reader.string(&["productKey", "productID", "product_id"]);
        if product_key.is_empty() {
            return Err(NorthboundError::Config("productKey is required".to_string()));
        }
        let device_key = reader.string(&["deviceKey", "deviceName", "device_name"]);
        if device_key.is_empty() {
            return Err(NorthboundError::Config("deviceKey is required".to_string()));
        }
        if !reader.bool(&["gatewayMode"], true) {
            return Err(NorthboundError::Config(
                "iThings adapter only supports gatewayMode=true".to_string(),
            ));
        }
        let qos = read_qos(&reader)?;
        let retain = reader.bool(&["retain"], false);

        let or_default = |keys: &[&str], fallback: &str| {
            let value = reader.string(keys);
            if value.is_empty() {
                fallback.to_string()
            } else {
                value
            }
        };
        let device_name_mode = or_default(&["deviceNameMode"], "deviceKey");
        let sub_device_name_mode = or_default(&["subDeviceNameMode"], &device_name_mode);
        let up_property_template =
            or_default(&["upPropertyTopicTemplate"], UP_PROPERTY_TOPIC_TEMPLATE);
        let up_event_template = or_default(&["upEventTopicTemplate"], UP_EVENT_TOPIC_TEMPLATE);
        let up_action_template = or_default(&["upActionTopicTemplate"], UP_ACTION_TOPIC_TEMPLATE);
        let down_property_topic = or_default(&["downPropertyTopic"], DOWN_PROPERTY_TOPIC);
        let down_action_topic = or_default(&["downActionTopic"], DOWN_ACTION_TOPIC);
        let alarm_event_id = or_default(&["alarmEventID", "alarmEventId"], ALARM_EVENT_ID);
        let alarm_event_type = or_default(&["alarmEventType"], ALARM_EVENT_TYPE);

        let client_id = read_client_id(&reader, Self::KIND, name);
        let link = read_link(&reader, server_url, client_id, username);
        Ok(Self {
            settings: RuntimeSettings::read(&reader, link, qos, retain),
            product_key,
            device_key,
            device_name_mode,
            sub_device_name_mode,
            up_property_template,
            up_event_template,
            up_action_template,
            down_property_topic,
            down_action_topic,
            alarm_event_id,
            alarm_event_type,
            requests: Mutex::new(HashMap::new()),
        })
    }

    fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut topics = vec![self.down_property_topic.clone()];
        if self.down_action_topic != self.down_property_topic {
            topics.push(self.down_action_topic.clone());
        }
        topics
    }

    fn encode_sample(&self, data: &CollectData) -> Result<Outbound, NorthboundError> {
        let ts = timestamp_or_now(data.timestamp_ms);
        let product_id = first_non_empty(&data.product_key, &self.product_key);
        let mut device_name = first_non_empty(
            &resolve_device_name(&data.device_name, &data.device_key, &self.sub_device_name_mode),
            &resolve_device_name(&data.device_name, &data.device_key, &self.device_name_mode),
        );
        if device_name.is_empty() {
            device_name = format!("device_{}", data.device_id);
        }
        let body = json!({
            "method": "packReport",
            "msgToken": next_prefixed_id("pack"),
            "timestamp": ts,
            "properties": [],
            "events": [],
            "subDevices": [{
                "productID": product_id,
                "deviceName": device_name,
                "properties": [{
                    "timestamp": ts,
                    "params": Value::Object(convert_fields(&data.fields)),
                }],
                "events": [],
            }],
        });
        Outbound::json(self.up_property_topic(), &body)
    }

    fn encode_alarm(&self, alarm: &AlarmPayload) -> Result<Outbound, NorthboundError> {
        let product_id = first_non_empty(&alarm.product_key, &self.product_key);
        let mut device_name =
            resolve_device_name(&alarm.device_name, &alarm.device_key, &self.device_name_mode);
        if device_name.is_empty() {
            device_name = format!("device_{}", alarm.device_id);
        }
        let body = json!({
            "method": "eventPost",
            "msgToken": next_prefixed_id("alarm"),
            "timestamp": now_epoch_ms(),
            "eventID": self.alarm_event_id,
            "type": self.alarm_event_type,
            "params": {
                "device_name": alarm.device_name,
                "product_key": product_id,
                "device_key": device_name,
                "field_name": alarm.field_name,
                "actual_value": alarm.actual_value,
                "threshold": alarm.threshold,
                "operator": alarm.operator,
                "severity": alarm.severity,
                "message": alarm.message,
            },
        });
        let topic = render_topic(&self.up_event_template, &self.product_key, &self.device_key);
        Outbound::json(topic, &body)
    }

    fn handle_downlink(&self, message: &InboundMessage) -> Result<Downlink, NorthboundError> {
        let Some((topic_type, product_id, device_name)) = parse_down_topic(&message.topic) else {
            return Err(NorthboundError::Payload(format!(
                "unsupported topic: {}",
                message.topic
            )));
        };
        let request: Value = serde_json::from_slice(&message.payload)?;
        let text = |key: &str| {
            request
                .get(key)
                .map(stringify_any)
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        let method = text("method");
        let action_id = text("actionID");
        let request_id = match text("msgToken") {
            token if token.is_empty() => next_prefixed_id("req"),
            token => token,
        };
        let commands = build_commands(
            &request_id,
            &topic_type,
            &method,
            &action_id,
            request.get("params"),
            &product_id,
            &device_name,
        );
        if commands.is_empty() {
            return Ok(Downlink::default());
        }
        let state = RequestState {
            request_id: request_id.clone(),
            product_id,
            device_name,
            topic_type: topic_type.to_ascii_lowercase(),
            action_id,
            pending: commands.len(),
            success: true,
            code: 0,
            message: String::new(),
            field_name: String::new(),
            value: String::new(),
        };
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id, state);
        Ok(Downlink {
            commands,
            replies: Vec::new(),
        })
    }

    fn encode_result(&self, result: &CommandResult) -> Result<Option<Outbound>, NorthboundError> {
        if result.request_id.trim().is_empty() {
            return Ok(None);
        }
        let Some(state) = self.apply_result(result) else {
            return Ok(None);
        };
        let code = match state.code {
            0 if state.success => 0,
            0 => 500,
            code => code,
        };
        let message = match state.message.as_str() {
            "" if state.success => "success".to_string(),
            "" => "failed".to_string(),
            message => message.to_string(),
        };
        let mut body = Map::new();
        body.insert("msgToken".into(), Value::from(state.request_id.clone()));
        body.insert("code".into(), Value::from(code));
        body.insert("msg".into(), Value::from(message));
        body.insert("timestamp".into(), Value::from(now_epoch_ms()));

        if state.topic_type == "action" {
            body.insert("method".into(), Value::from("actionReply"));
            let action_id = first_non_empty(&state.action_id, &state.field_name);
            if !action_id.is_empty() {
                body.insert("actionID".into(), Value::from(action_id));
            }
            if !state.field_name.is_empty() {
                let mut data = Map::new();
                data.insert(state.field_name.clone(), convert_field_value(&state.value));
                body.insert("data".into(), Value::Object(data));
            }
            let topic = render_topic(&self.up_action_template, &state.product_id, &state.device_name);
            return Outbound::json(topic, &Value::Object(body)).map(Some);
        }

        body.insert("method".into(), Value::from("controlReply"));
        let topic = render_topic(&self.up_property_template, &state.product_id, &state.device_name);
        Outbound::json(topic, &Value::Object(body)).map(Some)
    }

    fn extend_stats(&self, stats: &mut Map<String, Value>) {
        stats.insert("product_key".into(), Value::from(self.product_key.clone()));
        stats.insert("device_key".into(), Value::from(self.device_key.clone()));
        stats.insert(
            "up_property_topic_template".into(),
            Value::from(self.up_property_template.clone()),
        );
        stats.insert(
            "down_property_topic".into(),
            Value::from(self.down_property_topic.clone()),
        );
        stats.insert(
            "down_action_topic".into(),
            Value::from(self.down_action_topic.clone()),
        );
    }
}
