//! Broker 地址归一化。

use crate::error::NorthboundError;

const KNOWN_SCHEMES: [&str; 5] = ["tcp://", "mqtt://", "ssl://", "ws://", "wss://"];

/// 没有 scheme 时补 `tcp://`。
pub fn normalize_broker(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.contains("://") {
        return url.to_string();
    }
    format!("tcp://{}", url)
}

/// 补全 scheme（默认 `tcp`），`port > 0` 且地址未带端口时拼接端口。
pub fn normalize_server_url(url: &str, protocol: &str, port: i64) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    let url = if url.contains("://") {
        url.to_string()
    } else {
        let protocol = protocol.trim();
        let protocol = if protocol.is_empty() { "tcp" } else { protocol };
        format!("{}://{}", protocol.to_ascii_lowercase(), url)
    };
    if port <= 0 {
        return url;
    }
    let Some((scheme, rest)) = url.split_once("://") else {
        return url;
    };
    let split_at = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(split_at);
    let (userinfo, host) = match authority.rsplit_once('@') {
        Some((userinfo, host)) => (Some(userinfo), host),
        None => (None, authority),
    };
    if host.is_empty() || host_has_port(host) {
        return url;
    }
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    match userinfo {
        Some(userinfo) => format!("{}://{}@{}:{}{}", scheme, userinfo, host, port, tail),
        None => format!("{}://{}:{}{}", scheme, host, port, tail),
    }
}

/// 配置构建器使用：保留显式的 `tcp|mqtt|ssl|ws|wss` scheme，否则补 `tcp://` 与端口。
pub fn build_broker_url(url: &str, port: i64) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    let lower = url.to_ascii_lowercase();
    if KNOWN_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return url.to_string();
    }
    if port > 0 && !host_has_port(url) {
        format!("tcp://{}:{}", url, port)
    } else {
        format!("tcp://{}", url)
    }
}

fn host_has_port(host: &str) -> bool {
    if let Some(rest) = host.strip_prefix('[') {
        return rest
            .split_once(']')
            .is_some_and(|(_, after)| after.starts_with(':') && after.len() > 1);
    }
    match host.rsplit_once(':') {
        Some((head, port)) => {
            !head.contains(':') && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// 解析后的 broker 地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// 仅支持明文 TCP（`tcp://` / `mqtt://`），默认端口 1883。
    pub fn parse(url: &str) -> Result<Self, NorthboundError> {
        let url = normalize_broker(url);
        if url.is_empty() {
            return Err(NorthboundError::Config("broker address is empty".to_string()));
        }
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| NorthboundError::Config(format!("invalid broker address: {}", url)))?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "tcp" && scheme != "mqtt" {
            return Err(NorthboundError::Config(format!(
                "unsupported broker scheme: {}",
                scheme
            )));
        }
        let authority = rest.split(['/', '?']).next().unwrap_or_default();
        let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        let (host, port) = if host_has_port(authority) {
            let (host, port) = authority.rsplit_once(':').unwrap_or((authority, "1883"));
            let port = port
                .parse::<u16>()
                .map_err(|_| NorthboundError::Config(format!("invalid broker port: {}", port)))?;
            (host, port)
        } else {
            (authority, 1883)
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(NorthboundError::Config(format!("invalid broker address: {}", url)));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }
}
