//! 北向下行命令与执行结果。

use serde::{Deserialize, Serialize};

/// 北向下行命令（写属性 / 调用动作）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NorthboundCommand {
    pub request_id: String,
    pub product_key: String,
    pub device_key: String,
    pub field_name: String,
    pub value: String,
    /// 命令来源（如 `sagoo.property.set`）
    pub source: String,
}

/// 命令执行结果，由消费方回写给适配器。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub request_id: String,
    pub product_key: String,
    pub device_key: String,
    pub field_name: String,
    pub value: String,
    pub success: bool,
    pub code: i64,
    pub message: String,
}

impl CommandResult {
    /// 按命令构造结果。
    pub fn for_command(command: &NorthboundCommand, success: bool, message: impl Into<String>) -> Self {
        Self {
            request_id: command.request_id.clone(),
            product_key: command.product_key.clone(),
            device_key: command.device_key.clone(),
            field_name: command.field_name.clone(),
            value: command.value.clone(),
            success,
            code: if success { 200 } else { 500 },
            message: message.into(),
        }
    }
}
