//! Broker 传输层。
//!
//! 运行时只依赖 [`Connector`] / [`Transport`] 两个接口；
//! [`MqttConnector`] 基于 rumqttc，测试可替换为内存实现。
//! 连接断开后事件循环退出，重连统一由运行时的退避循环负责。

use crate::error::NorthboundError;
use crate::url::BrokerAddress;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 建连参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    pub server_url: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub clean_session: bool,
}

/// 下行消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// 连接事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Message(InboundMessage),
    /// 连接丢失，之后不会再有事件
    Disconnected(String),
}

/// 已建立的连接。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), NorthboundError>;

    async fn subscribe(&self, topic: &str, qos: u8) -> Result<(), NorthboundError>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self);
}

/// 建连器。
#[async_trait]
pub trait Connector: Send + Sync {
    /// 建连成功时返回连接与其事件流。
    async fn connect(
        &self,
        options: &LinkOptions,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<LinkEvent>), NorthboundError>;
}

pub fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// rumqttc 建连器。
#[derive(Debug, Default, Clone)]
pub struct MqttConnector;

impl MqttConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(
        &self,
        options: &LinkOptions,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<LinkEvent>), NorthboundError> {
        let address = BrokerAddress::parse(&options.server_url)?;
        let mut mqtt = MqttOptions::new(options.client_id.clone(), address.host, address.port);
        mqtt.set_keep_alive(options.keep_alive.max(Duration::from_secs(5)));
        mqtt.set_clean_session(options.clean_session);
        if !options.username.is_empty() {
            mqtt.set_credentials(options.username.clone(), options.password.clone());
        }
        let (client, mut eventloop) = AsyncClient::new(mqtt, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        let loop_connected = connected.clone();
        let client_id = options.client_id.clone();
        let handle = tokio::spawn(async move {
            let mut ready = Some(ready_tx);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        loop_connected.store(true, Ordering::SeqCst);
                        if let Some(ready) = ready.take() {
                            let _ = ready.send(Ok(()));
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        if events_tx.send(LinkEvent::Message(message)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        loop_connected.store(false, Ordering::SeqCst);
                        warn!(
                            target: "fsu.northbound",
                            client_id = %client_id,
                            error = %err,
                            "mqtt_eventloop_error"
                        );
                        match ready.take() {
                            Some(ready) => {
                                let _ = ready.send(Err(err.to_string()));
                            }
                            None => {
                                let _ = events_tx.send(LinkEvent::Disconnected(err.to_string())).await;
                            }
                        }
                        break;
                    }
                }
            }
            debug!(target: "fsu.northbound", client_id = %client_id, "mqtt_eventloop_exit");
        });

        let timeout = options.connect_timeout.max(Duration::from_secs(1));
        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => {
                handle.abort();
                return Err(NorthboundError::Transport(format!("failed to connect: {}", err)));
            }
            Ok(Err(_)) => {
                handle.abort();
                return Err(NorthboundError::Transport("mqtt eventloop exited".to_string()));
            }
            Err(_) => {
                handle.abort();
                return Err(NorthboundError::Transport("mqtt connect timeout".to_string()));
            }
        }

        let transport = MqttTransport {
            client,
            connected,
            handle,
            timeout,
        };
        Ok((Arc::new(transport), events_rx))
    }
}

/// rumqttc 连接。
struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    timeout: Duration,
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), NorthboundError> {
        if !self.is_connected() {
            return Err(NorthboundError::Transport("mqtt client not connected".to_string()));
        }
        tokio::time::timeout(
            self.timeout,
            self.client.publish(topic, qos_from_u8(qos), retain, payload),
        )
        .await
        .map_err(|_| NorthboundError::Transport("mqtt publish timeout".to_string()))?
        .map_err(|err| NorthboundError::Transport(err.to_string()))
    }

    async fn subscribe(&self, topic: &str, qos: u8) -> Result<(), NorthboundError> {
        tokio::time::timeout(self.timeout, self.client.subscribe(topic, qos_from_u8(qos)))
            .await
            .map_err(|_| NorthboundError::Transport("mqtt subscribe timeout".to_string()))?
            .map_err(|err| NorthboundError::Transport(err.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.handle.is_finished()
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = tokio::time::timeout(Duration::from_millis(250), self.client.disconnect()).await;
        self.handle.abort();
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
