//! 宽容的配置读取器。
//!
//! 适配器配置是自由 JSON 文本：未知键忽略，驼峰与下划线两种写法都接受，
//! 数值可以是字符串，布尔值接受 `true/false`、`1/0`、`yes/no`（不区分大小写）。
//! 每个方言只在 Initialize 时解析一次，随后转成强类型结构。

use crate::error::NorthboundError;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct ConfigReader {
    map: Map<String, Value>,
}

impl ConfigReader {
    /// 解析配置文本；空文本视为空对象。
    pub fn parse(text: &str) -> Result<Self, NorthboundError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|err| NorthboundError::Config(format!("failed to parse config: {}", err)))?;
        match value {
            Value::Object(map) => Ok(Self { map }),
            other => Err(NorthboundError::Config(format!(
                "failed to parse config: expected object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.map
    }

    /// 按原键、再按另一种命名风格查找。
    fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.map.get(key) {
            return Some(value);
        }
        let alternate = alternate_key(key);
        if alternate != key {
            return self.map.get(&alternate);
        }
        None
    }

    /// 第一个非空值（去首尾空白）；非字符串值取其文本形式。
    pub fn string(&self, keys: &[&str]) -> String {
        for key in keys {
            let Some(value) = self.lookup(key) else {
                continue;
            };
            let text = match value {
                Value::Null => continue,
                Value::String(text) => text.trim().to_string(),
                other => other.to_string(),
            };
            if !text.is_empty() {
                return text;
            }
        }
        String::new()
    }

    /// 第一个可解析的整数；浮点数截断。
    pub fn int(&self, keys: &[&str], fallback: i64) -> i64 {
        for key in keys {
            let Some(value) = self.lookup(key) else {
                continue;
            };
            match value {
                Value::Number(number) => {
                    if let Some(parsed) = number.as_i64() {
                        return parsed;
                    }
                    if let Some(parsed) = number.as_f64() {
                        return parsed as i64;
                    }
                }
                Value::String(text) => {
                    let text = text.trim();
                    if let Ok(parsed) = text.parse::<i64>() {
                        return parsed;
                    }
                    if let Ok(parsed) = text.parse::<f64>() {
                        return parsed as i64;
                    }
                }
                _ => {}
            }
        }
        fallback
    }

    pub fn bool(&self, keys: &[&str], fallback: bool) -> bool {
        for key in keys {
            let Some(value) = self.lookup(key) else {
                continue;
            };
            match value {
                Value::Bool(flag) => return *flag,
                Value::Number(number) => return number.as_f64().is_some_and(|v| v != 0.0),
                Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => return true,
                    "false" | "0" | "no" => return false,
                    _ => {}
                },
                _ => {}
            }
        }
        fallback
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `serverUrl` <-> `server_url`。
pub fn alternate_key(key: &str) -> String {
    if key.contains('_') {
        snake_to_camel(key)
    } else {
        camel_to_snake(key)
    }
}

pub fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (index, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = !out.is_empty();
            continue;
        }
        if upper {
            out.push(ch.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}
