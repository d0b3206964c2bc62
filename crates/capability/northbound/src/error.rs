/// 北向适配器错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NorthboundError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("adapter not initialized")]
    NotInitialized,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("payload error: {0}")]
    Payload(String),
    #[error("adapter {0} not found")]
    NotFound(String),
    #[error("unknown northbound type: {0}")]
    UnknownType(String),
}

impl From<serde_json::Error> for NorthboundError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}
