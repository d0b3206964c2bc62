//! 四种北向方言。

pub mod ithings;
pub mod mqtt;
pub mod pandax;
pub mod sagoo;

use crate::config_reader::ConfigReader;
use crate::error::NorthboundError;
use crate::transport::LinkOptions;
use domain::now_epoch_nanos;
use std::time::Duration;

pub use ithings::IThingsDialect;
pub use mqtt::MqttDialect;
pub use pandax::PandaXDialect;
pub use sagoo::SagooDialect;

pub(crate) const DEFAULT_KEEP_ALIVE_SECONDS: i64 = 60;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECONDS: i64 = 10;

/// QoS 必须在 0..=2。
pub(crate) fn read_qos(reader: &ConfigReader) -> Result<u8, NorthboundError> {
    let qos = reader.int(&["qos"], 0);
    if !(0..=2).contains(&qos) {
        return Err(NorthboundError::Config(
            "qos must be between 0 and 2".to_string(),
        ));
    }
    Ok(qos as u8)
}

/// 未配置时生成 `<prefix>-<name>-<unix_nanos>`。
pub(crate) fn read_client_id(reader: &ConfigReader, prefix: &str, name: &str) -> String {
    let configured = reader.string(&["clientId", "client_id"]);
    if !configured.is_empty() {
        return configured;
    }
    let name = name.trim();
    if name.is_empty() {
        format!("{}-{}", prefix, now_epoch_nanos())
    } else {
        format!("{}-{}-{}", prefix, name, now_epoch_nanos())
    }
}

pub(crate) fn read_link(
    reader: &ConfigReader,
    server_url: String,
    client_id: String,
    username: String,
) -> LinkOptions {
    let keep_alive = reader.int(&["keepAlive", "keep_alive"], DEFAULT_KEEP_ALIVE_SECONDS);
    let keep_alive = if keep_alive > 0 {
        keep_alive
    } else {
        DEFAULT_KEEP_ALIVE_SECONDS
    };
    let connect_timeout = reader.int(
        &["connectTimeout", "connect_timeout", "timeout"],
        DEFAULT_CONNECT_TIMEOUT_SECONDS,
    );
    let connect_timeout = if connect_timeout > 0 {
        connect_timeout
    } else {
        DEFAULT_CONNECT_TIMEOUT_SECONDS
    };
    LinkOptions {
        server_url,
        client_id,
        username,
        password: reader.string(&["password"]),
        keep_alive: Duration::from_secs(keep_alive as u64),
        connect_timeout: Duration::from_secs(connect_timeout as u64),
        clean_session: reader.bool(&["cleanSession", "clean_session"], true),
    }
}

/// 时间戳非正时取当前时间。
pub(crate) fn timestamp_or_now(timestamp_ms: i64) -> i64 {
    if timestamp_ms > 0 {
        timestamp_ms
    } else {
        domain::now_epoch_ms()
    }
}
