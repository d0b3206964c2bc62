use serde::{Deserialize, Serialize};

/// 北向配置行。
///
/// `ext_config` 为自由 JSON 文本，由配置构建器最后合并；
/// `config` 为构建结果（适配器 Initialize 的输入）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NorthboundConfig {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub enabled: bool,
    /// 上传周期（毫秒）
    #[serde(default)]
    pub upload_interval: i64,
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub alarm_topic: String,
    #[serde(default)]
    pub qos: i64,
    #[serde(default)]
    pub retain: bool,
    #[serde(default)]
    pub keep_alive: i64,
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub product_key: String,
    #[serde(default)]
    pub device_key: String,
    #[serde(default)]
    pub ext_config: String,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub last_connected_at_ms: Option<i64>,
}
