#![allow(dead_code)]

use async_trait::async_trait;
use fsu_northbound::{Connector, InboundMessage, LinkEvent, LinkOptions, NorthboundError, Transport};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct BrokerState {
    published: Vec<(String, Vec<u8>)>,
    subscriptions: Vec<String>,
    links: Vec<LinkOptions>,
    fail_connect: bool,
    fail_publish: bool,
    events: Option<mpsc::Sender<LinkEvent>>,
    alive: Option<Arc<AtomicBool>>,
}

/// 内存 broker：记录发布与订阅，可注入下行消息或模拟断线。
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().unwrap().fail_publish = fail;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    pub fn last_link(&self) -> Option<LinkOptions> {
        self.state.lock().unwrap().links.last().cloned()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|(topic, payload)| {
                (
                    topic.clone(),
                    serde_json::from_slice(payload).unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, body)| body)
            .collect()
    }

    /// 模拟 broker 下发一条消息。
    pub async fn inject(&self, topic: &str, payload: &str) {
        let sender = self.state.lock().unwrap().events.clone();
        if let Some(sender) = sender {
            let _ = sender
                .send(LinkEvent::Message(InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.as_bytes().to_vec(),
                }))
                .await;
        }
    }

    /// 模拟连接丢失。
    pub async fn drop_connection(&self) {
        let (sender, alive) = {
            let mut state = self.state.lock().unwrap();
            (state.events.take(), state.alive.take())
        };
        if let Some(alive) = alive {
            alive.store(false, Ordering::SeqCst);
        }
        if let Some(sender) = sender {
            let _ = sender
                .send(LinkEvent::Disconnected("connection lost".to_string()))
                .await;
        }
    }
}

struct FakeTransport {
    state: Arc<Mutex<BrokerState>>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn publish(
        &self,
        topic: &str,
        _qos: u8,
        _retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), NorthboundError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_publish {
            return Err(NorthboundError::Transport("publish rejected".to_string()));
        }
        state.published.push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: u8) -> Result<(), NorthboundError> {
        self.state.lock().unwrap().subscriptions.push(topic.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeBroker {
    async fn connect(
        &self,
        options: &LinkOptions,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<LinkEvent>), NorthboundError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            return Err(NorthboundError::Transport("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));
        state.links.push(options.clone());
        state.events = Some(tx);
        state.alive = Some(alive.clone());
        let transport = FakeTransport {
            state: self.state.clone(),
            alive,
        };
        Ok((Arc::new(transport), rx))
    }
}

/// 轮询等待条件成立，超时返回 false。
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
