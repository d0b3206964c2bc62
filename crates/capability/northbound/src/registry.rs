//! 按类型构造适配器

use crate::dialect::{IThingsDialect, MqttDialect, PandaXDialect, SagooDialect};
use crate::nbtype;
use crate::runtime::{Adapter, NorthboundAdapter};
use crate::transport::Connector;
use std::sync::Arc;

/// 类型先归一化（`xunji` 映射到 `sagoo`）；未知类型返回 None。
pub fn new_adapter(
    kind: &str,
    name: &str,
    connector: Arc<dyn Connector>,
) -> Option<Arc<dyn NorthboundAdapter>> {
    let adapter: Arc<dyn NorthboundAdapter> = match nbtype::normalize(kind).as_str() {
        nbtype::MQTT => Arc::new(Adapter::<MqttDialect>::new(name, connector)),
        nbtype::SAGOO => Arc::new(Adapter::<SagooDialect>::new(name, connector)),
        nbtype::ITHINGS => Arc::new(Adapter::<IThingsDialect>::new(name, connector)),
        nbtype::PANDAX => Arc::new(Adapter::<PandaXDialect>::new(name, connector)),
        _ => return None,
    };
    Some(adapter)
}
