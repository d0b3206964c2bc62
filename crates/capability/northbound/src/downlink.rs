//! 下行报文的通用解析：属性提取级联、值类型转换、主题切分。

use domain::NorthboundCommand;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 信封元数据键，不当作属性。
const RESERVED_KEYS: [&str; 11] = [
    "id",
    "method",
    "version",
    "params",
    "identity",
    "properties",
    "events",
    "sub_device",
    "subdevice",
    "sub_devices",
    "subdevices",
];

pub fn is_reserved_key(key: &str) -> bool {
    let key = key.trim().to_ascii_lowercase();
    RESERVED_KEYS.contains(&key.as_str())
}

/// 按 `/` 切分并丢弃空段。
pub fn split_topic(topic: &str) -> Vec<&str> {
    topic.split('/').filter(|part| !part.is_empty()).collect()
}

/// 子设备身份。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub product_key: String,
    pub device_key: String,
}

impl Identity {
    pub fn new(product_key: impl Into<String>, device_key: impl Into<String>) -> Self {
        Self {
            product_key: product_key.into(),
            device_key: device_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.product_key.is_empty() && !self.device_key.is_empty()
    }

    /// 逐项用 `other` 补齐空字段。
    pub fn or(&self, other: &Identity) -> Identity {
        Identity {
            product_key: first_non_empty(&self.product_key, &other.product_key),
            device_key: first_non_empty(&self.device_key, &other.device_key),
        }
    }
}

pub fn first_non_empty(primary: &str, fallback: &str) -> String {
    if primary.trim().is_empty() {
        fallback.trim().to_string()
    } else {
        primary.trim().to_string()
    }
}

/// 读取 `{productKey, deviceKey}`。
pub fn parse_identity(value: Option<&Value>) -> Identity {
    let Some(Value::Object(map)) = value else {
        return Identity::default();
    };
    Identity {
        product_key: map_string(map, &["productKey", "product_key"]),
        device_key: map_string(map, &["deviceKey", "device_key"]),
    }
}

pub fn map_string(map: &Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        if let Some(Value::String(text)) = map.get(*key) {
            let text = text.trim();
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }
    String::new()
}

pub fn lookup_any<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

/// 属性提取结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedProperties {
    pub identity: Identity,
    pub properties: Map<String, Value>,
}

/// 属性提取级联：
/// 1. `properties` 对象；
/// 2. `sub_device` / `subDevice` 对象（带 identity）；
/// 3. `sub_devices` / `subDevices` 数组的第一项；
/// 4. 其余非保留的标量键。
pub fn extract_command_properties(params: &Map<String, Value>) -> ExtractedProperties {
    let identity = parse_identity(params.get("identity"));

    if let Some(Value::Object(properties)) = params.get("properties") {
        return ExtractedProperties {
            identity,
            properties: properties.clone(),
        };
    }

    if let Some(Value::Object(sub)) = lookup_any(params, &["sub_device", "subDevice"]) {
        if let Some(extracted) = extract_sub_device(sub) {
            return ExtractedProperties {
                identity: extracted.identity.or(&identity),
                properties: extracted.properties,
            };
        }
    }

    if let Some(Value::Array(items)) = lookup_any(params, &["sub_devices", "subDevices"]) {
        if let Some(Value::Object(sub)) = items.first() {
            if let Some(extracted) = extract_sub_device(sub) {
                return ExtractedProperties {
                    identity: extracted.identity.or(&identity),
                    properties: extracted.properties,
                };
            }
        }
    }

    ExtractedProperties {
        identity,
        properties: scalar_properties(params),
    }
}

fn extract_sub_device(sub: &Map<String, Value>) -> Option<ExtractedProperties> {
    let Some(Value::Object(properties)) = sub.get("properties") else {
        return None;
    };
    Some(ExtractedProperties {
        identity: parse_identity(sub.get("identity")),
        properties: properties.clone(),
    })
}

/// 非保留键且值不是对象或数组。
pub fn scalar_properties(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .filter(|(key, value)| !is_reserved_key(key) && !value.is_object() && !value.is_array())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// 每个属性一条命令；键去空白后按字典序。
pub fn build_property_commands(
    request_id: &str,
    identity: &Identity,
    properties: &Map<String, Value>,
    source: &str,
) -> Vec<NorthboundCommand> {
    let mut fields: Vec<(String, String)> = properties
        .iter()
        .map(|(key, value)| (key.trim().to_string(), stringify_any(value)))
        .filter(|(key, _)| !key.is_empty())
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .map(|(field_name, value)| NorthboundCommand {
            request_id: request_id.to_string(),
            product_key: identity.product_key.clone(),
            device_key: identity.device_key.clone(),
            field_name,
            value,
            source: source.to_string(),
        })
        .collect()
}

/// 任意 JSON 值转文本：字符串原样，数字取最短形式，其余为 JSON 文本。
pub fn stringify_any(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                int.to_string()
            } else if let Some(uint) = number.as_u64() {
                uint.to_string()
            } else {
                number.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        other => other.to_string(),
    }
}

/// 字段值类型转换：依次尝试布尔、i64、f64，否则保留字符串。
pub fn convert_field_value(raw: &str) -> Value {
    let text = raw.trim();
    if text.is_empty() {
        return Value::String(String::new());
    }
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => return Value::Bool(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = text.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::String(text.to_string())
}

pub fn convert_fields(fields: &BTreeMap<String, String>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), convert_field_value(value)))
        .collect()
}
