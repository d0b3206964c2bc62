//! 北向配置构建：把配置行的结构化字段转成方言的 Initialize 文本。
//!
//! 字段缺省时补方言默认值，`ext_config` 最后合并以便覆盖默认值。

use crate::config_reader::ConfigReader;
use crate::error::NorthboundError;
use crate::nbtype;
use crate::url::build_broker_url;
use domain::NorthboundConfig;
use serde_json::{Map, Value};

fn set_string(config: &mut Map<String, Value>, key: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        config.insert(key.to_string(), Value::from(value));
    }
}

fn set_positive(config: &mut Map<String, Value>, key: &str, value: i64) {
    if value > 0 {
        config.insert(key.to_string(), Value::from(value));
    }
}

fn set_default(config: &mut Map<String, Value>, key: &str, value: Value) {
    config.entry(key.to_string()).or_insert(value);
}

/// 合并 `ext_config`；非对象或解析失败时忽略。
fn merge_ext_config(config: &mut Map<String, Value>, ext_config: &str) {
    if ext_config.trim().is_empty() {
        return;
    }
    if let Ok(Value::Object(ext)) = serde_json::from_str::<Value>(ext_config) {
        config.extend(ext);
    }
}

fn apply_defaults(kind: &str, config: &mut Map<String, Value>) {
    match kind {
        nbtype::MQTT => {
            set_default(config, "broker", Value::from(""));
            set_default(config, "topic", Value::from(""));
            set_default(config, "qos", Value::from(0));
            set_default(config, "keepAlive", Value::from(60));
            set_default(config, "connectTimeout", Value::from(30));
        }
        nbtype::SAGOO | nbtype::ITHINGS => {
            set_default(config, "serverUrl", Value::from(""));
            set_default(config, "productKey", Value::from(""));
            set_default(config, "deviceKey", Value::from(""));
            set_default(config, "qos", Value::from(0));
            set_default(config, "keepAlive", Value::from(60));
            set_default(config, "connectTimeout", Value::from(30));
            set_default(config, "uploadIntervalMs", Value::from(5000));
            if kind == nbtype::ITHINGS {
                set_default(config, "gatewayMode", Value::from(true));
            }
        }
        nbtype::PANDAX => {
            if !config.contains_key("serverUrl") {
                let broker = config.get("broker").cloned().unwrap_or(Value::from(""));
                config.insert("serverUrl".to_string(), broker);
            }
            set_default(config, "username", Value::from(""));
            set_default(config, "qos", Value::from(0));
            set_default(config, "keepAlive", Value::from(60));
            set_default(config, "connectTimeout", Value::from(10));
            set_default(config, "uploadIntervalMs", Value::from(5000));
            set_default(config, "gatewayMode", Value::from(true));
        }
        _ => {}
    }
}

/// 由配置行生成配置对象。
pub fn build_config_map(model: &NorthboundConfig) -> Map<String, Value> {
    let kind = nbtype::normalize(&model.kind);
    let mut config = Map::new();
    let server = build_broker_url(&model.server_url, model.port);
    if kind == nbtype::MQTT {
        set_string(&mut config, "broker", &server);
        set_string(&mut config, "client_id", &model.client_id);
        set_string(&mut config, "topic", &model.topic);
        set_string(&mut config, "alarm_topic", &model.alarm_topic);
    } else {
        set_string(&mut config, "serverUrl", &server);
        set_string(&mut config, "clientId", &model.client_id);
        if kind != nbtype::PANDAX {
            set_string(&mut config, "productKey", &model.product_key);
            set_string(&mut config, "deviceKey", &model.device_key);
            set_string(&mut config, "topic", &model.topic);
            set_string(&mut config, "alarmTopic", &model.alarm_topic);
        }
        set_positive(&mut config, "uploadIntervalMs", model.upload_interval);
    }
    set_string(&mut config, "username", &model.username);
    set_string(&mut config, "password", &model.password);
    if (0..=2).contains(&model.qos) {
        config.insert("qos".to_string(), Value::from(model.qos));
    }
    config.insert("retain".to_string(), Value::from(model.retain));
    set_positive(&mut config, "keepAlive", model.keep_alive);
    set_positive(&mut config, "connectTimeout", model.timeout);
    merge_ext_config(&mut config, &model.ext_config);
    apply_defaults(&kind, &mut config);
    config
}

/// 由配置行生成 Initialize 文本。
pub fn build_config_from_model(model: &NorthboundConfig) -> String {
    Value::Object(build_config_map(model)).to_string()
}

fn require(reader: &ConfigReader, keys: &[&str], message: String) -> Result<(), NorthboundError> {
    if reader.string(keys).is_empty() {
        return Err(NorthboundError::Config(message));
    }
    Ok(())
}

/// 按方言检查必填字段。
pub fn validate_config(kind: &str, config: &Map<String, Value>) -> Result<(), NorthboundError> {
    let kind = nbtype::normalize(kind);
    let display = nbtype::display_name(&kind);
    let reader = ConfigReader::from_map(config.clone());
    match kind.as_str() {
        nbtype::MQTT => {
            require(&reader, &["broker"], "broker is required for MQTT adapter".to_string())?;
            require(&reader, &["topic"], "topic is required for MQTT adapter".to_string())?;
        }
        nbtype::SAGOO | nbtype::ITHINGS => {
            require(
                &reader,
                &["serverUrl", "broker"],
                format!("serverUrl is required for {} adapter", display),
            )?;
            require(
                &reader,
                &["productKey"],
                format!("productKey is required for {} adapter", display),
            )?;
            require(
                &reader,
                &["deviceKey"],
                format!("deviceKey is required for {} adapter", display),
            )?;
            if kind == nbtype::ITHINGS {
                require(
                    &reader,
                    &["username"],
                    format!("username is required for {} adapter", display),
                )?;
            }
        }
        nbtype::PANDAX => {
            require(
                &reader,
                &["serverUrl", "broker"],
                format!("serverUrl is required for {} adapter", display),
            )?;
            require(
                &reader,
                &["username", "token", "deviceToken"],
                format!("username is required for {} adapter", display),
            )?;
        }
        _ => return Err(NorthboundError::UnknownType(kind)),
    }
    Ok(())
}

/// 适配器最终使用的配置文本：优先用行内已有的 `config`，否则由字段构建；
/// 两种来源都先校验。
pub fn resolve_config_text(model: &NorthboundConfig) -> Result<String, NorthboundError> {
    if model.config.trim().is_empty() {
        let config = build_config_map(model);
        validate_config(&model.kind, &config)?;
        return Ok(Value::Object(config).to_string());
    }
    let reader = ConfigReader::parse(&model.config)?;
    let config = reader.into_map();
    validate_config(&model.kind, &config)?;
    Ok(model.config.clone())
}
