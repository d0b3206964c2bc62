//! 驱动错误类型定义

/// 设备驱动错误
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// Modbus 错误
    #[error("modbus error: {0}")]
    Modbus(String),

    /// 设备地址配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// 数据解析错误
    #[error("data parse error: {0}")]
    DataParse(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 未注册的驱动类型
    #[error("unsupported driver type: {0}")]
    UnsupportedType(String),

    /// 设备没有该字段
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// 字段只读
    #[error("field is read only: {0}")]
    ReadOnly(String),
}
