//! # 北向适配器能力模块
//!
//! 把采集数据与告警转发到云端 broker，并接收下行命令：
//! - [`runtime`]：通用运行时（有界队列、上报/告警/重连循环、生命周期）
//! - [`dialect`]：MQTT、Sagoo（兼容 xunji）、iThings、PandaX 四种方言
//! - [`manager`]：按名称管理适配器，广播数据、汇总命令
//! - [`config_builder`]：配置行到 Initialize 文本的转换与校验
//! - [`transport`]：broker 连接抽象，默认实现基于 rumqttc

pub mod config_builder;
pub mod config_reader;
pub mod dialect;
pub mod downlink;
mod error;
pub mod ids;
pub mod manager;
pub mod nbtype;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod transport;
pub mod url;

pub use config_builder::{build_config_from_model, resolve_config_text, validate_config};
pub use error::NorthboundError;
pub use manager::NorthboundManager;
pub use registry::new_adapter;
pub use runtime::{Adapter, Dialect, LoopState, NorthboundAdapter};
pub use transport::{Connector, InboundMessage, LinkEvent, LinkOptions, MqttConnector, Transport};
