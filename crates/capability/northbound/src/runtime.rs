//! 适配器运行时。
//!
//! 每个适配器实例由一个方言 [`Dialect`] 与通用的 [`Adapter`] 组成：
//! - 方言负责配置解析、主题渲染、报文序列化与下行解析；
//! - 运行时负责三个有界队列（实时 / 告警 / 命令）、上报循环、告警循环、
//!   断线重连（5 秒起步指数退避，上限 5 分钟）以及生命周期状态机。
//!
//! 发布失败时未发出的批次放回队首，整体语义为至多一次。

use crate::config_reader::ConfigReader;
use crate::error::NorthboundError;
use crate::queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
use crate::transport::{Connector, InboundMessage, LinkEvent, LinkOptions, Transport};
use async_trait::async_trait;
use domain::{AlarmPayload, CollectData, CommandResult, NorthboundCommand, now_epoch_ms};
use fsu_telemetry::{
    record_commands_enqueued, record_publish_failure, record_publish_success,
    record_queue_dropped, record_reconnect_attempt,
};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_ALARM_FLUSH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_ALARM_BATCH_SIZE: usize = 20;
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(300);
/// 所有周期的下限
pub const MIN_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_COMMAND_PULL_LIMIT: usize = 20;

const ALARM_DRAIN_RETRIES: usize = 3;
const ALARM_DRAIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 毫秒配置转周期：非正值取默认，低于 200ms 取 200ms。
pub fn resolve_interval(ms: i64, fallback: Duration) -> Duration {
    if ms <= 0 {
        return fallback;
    }
    Duration::from_millis(ms as u64).max(MIN_INTERVAL)
}

fn resolve_positive(value: i64, fallback: usize) -> usize {
    if value > 0 { value as usize } else { fallback }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 方言共享的运行参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub link: LinkOptions,
    pub qos: u8,
    pub retain: bool,
    pub report_interval: Duration,
    pub alarm_flush_interval: Duration,
    pub alarm_batch_size: usize,
    pub alarm_queue_size: usize,
    pub realtime_queue_size: usize,
    pub command_queue_size: usize,
    pub reconnect_interval: Duration,
}

impl RuntimeSettings {
    /// 读取队列与周期参数；命令队列容量默认跟随实时队列。
    pub fn read(reader: &ConfigReader, link: LinkOptions, qos: u8, retain: bool) -> Self {
        let report_interval = resolve_interval(
            reader.int(
                &[
                    "uploadIntervalMs",
                    "upload_interval_ms",
                    "reportIntervalMs",
                    "upload_interval",
                ],
                0,
            ),
            DEFAULT_REPORT_INTERVAL,
        );
        let alarm_flush_interval = resolve_interval(
            reader.int(&["alarmFlushIntervalMs"], 0),
            DEFAULT_ALARM_FLUSH_INTERVAL,
        );
        let alarm_batch_size =
            resolve_positive(reader.int(&["alarmBatchSize"], 0), DEFAULT_ALARM_BATCH_SIZE);
        let alarm_queue_size =
            resolve_positive(reader.int(&["alarmQueueSize"], 0), DEFAULT_QUEUE_CAPACITY);
        let realtime_queue_size =
            resolve_positive(reader.int(&["realtimeQueueSize"], 0), DEFAULT_QUEUE_CAPACITY);
        let command_queue_size =
            resolve_positive(reader.int(&["commandQueueSize"], 0), realtime_queue_size);
        let reconnect_interval = resolve_interval(
            reader.int(&["reconnectIntervalMs"], 0),
            DEFAULT_RECONNECT_INTERVAL,
        );
        Self {
            link,
            qos,
            retain,
            report_interval,
            alarm_flush_interval,
            alarm_batch_size,
            alarm_queue_size,
            realtime_queue_size,
            command_queue_size,
            reconnect_interval,
        }
    }
}

/// 待发布的报文。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Outbound {
    pub fn json(topic: impl Into<String>, body: &Value) -> Result<Self, NorthboundError> {
        Ok(Self {
            topic: topic.into(),
            payload: serde_json::to_vec(body)?,
        })
    }
}

/// 一条下行消息的处理结果：命令整批入队，应答立即发布。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Downlink {
    pub commands: Vec<NorthboundCommand>,
    pub replies: Vec<Outbound>,
}

/// 方言：配置解析、主题与报文格式、下行解析。
pub trait Dialect: Send + Sync + Sized + 'static {
    /// 规范类型名
    const KIND: &'static str;

    fn parse(name: &str, config: &str) -> Result<Self, NorthboundError>;

    fn settings(&self) -> &RuntimeSettings;

    /// 建连（含重连）后订阅的主题
    fn subscriptions(&self) -> Vec<String> {
        Vec::new()
    }

    fn encode_sample(&self, data: &CollectData) -> Result<Outbound, NorthboundError>;

    fn encode_alarm(&self, alarm: &AlarmPayload) -> Result<Outbound, NorthboundError>;

    fn handle_downlink(&self, _message: &InboundMessage) -> Result<Downlink, NorthboundError> {
        Ok(Downlink::default())
    }

    /// 命令执行结果的应答报文，`None` 表示无需应答。
    fn encode_result(&self, _result: &CommandResult) -> Result<Option<Outbound>, NorthboundError> {
        Ok(None)
    }

    fn accepts_commands(&self) -> bool {
        true
    }

    /// 追加方言特有的统计字段。
    fn extend_stats(&self, _stats: &mut Map<String, Value>) {}
}

/// 管理器面向的适配器接口。
#[async_trait]
pub trait NorthboundAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// 解析配置并建连；建连失败不算初始化失败，交给重连循环。
    async fn initialize(&self, config: &str) -> Result<(), NorthboundError>;

    /// 启动上报、告警与重连循环；重复调用无副作用。
    async fn start(&self) -> Result<(), NorthboundError>;

    /// 停止循环并等待退出，退出前尽力清空告警队列。
    async fn stop(&self);

    /// 停止、断开 broker 并释放队列。
    async fn close(&self) -> Result<(), NorthboundError>;

    /// 非阻塞入队。
    fn send(&self, data: &CollectData) -> Result<(), NorthboundError>;

    fn send_alarm(&self, alarm: &AlarmPayload) -> Result<(), NorthboundError>;

    fn set_interval(&self, interval: Duration);

    fn is_enabled(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn stats(&self) -> Value;

    fn last_send_ms(&self) -> Option<i64>;

    fn pending_command_count(&self) -> usize;

    fn pull_commands(&self, limit: usize) -> Result<Vec<NorthboundCommand>, NorthboundError>;

    async fn report_command_result(&self, result: &CommandResult) -> Result<(), NorthboundError>;
}

/// 循环状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    Stopping,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

#[derive(Debug)]
struct Status {
    initialized: bool,
    enabled: bool,
    connected: bool,
    loop_state: LoopState,
    report_interval: Duration,
    last_send_ms: Option<i64>,
    reconnect_attempts: u64,
}

struct Shared<D: Dialect> {
    name: String,
    connector: Arc<dyn Connector>,
    dialect: RwLock<Option<Arc<D>>>,
    status: Mutex<Status>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    realtime: Mutex<BoundedQueue<CollectData>>,
    alarms: Mutex<BoundedQueue<AlarmPayload>>,
    commands: Mutex<BoundedQueue<NorthboundCommand>>,
    flush_alarms: Notify,
    reconnect: Notify,
    interval_changed: Notify,
    stop_tx: watch::Sender<bool>,
}

/// 通用适配器。
pub struct Adapter<D: Dialect> {
    shared: Arc<Shared<D>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: Dialect> Adapter<D> {
    pub fn new(name: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        let (stop_tx, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                connector,
                dialect: RwLock::new(None),
                status: Mutex::new(Status {
                    initialized: false,
                    enabled: false,
                    connected: false,
                    loop_state: LoopState::Stopped,
                    report_interval: DEFAULT_REPORT_INTERVAL,
                    last_send_ms: None,
                    reconnect_attempts: 0,
                }),
                transport: RwLock::new(None),
                event_task: Mutex::new(None),
                realtime: Mutex::new(BoundedQueue::default()),
                alarms: Mutex::new(BoundedQueue::default()),
                commands: Mutex::new(BoundedQueue::default()),
                flush_alarms: Notify::new(),
                reconnect: Notify::new(),
                interval_changed: Notify::new(),
                stop_tx,
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// 当前方言（未初始化时为 None）。
    pub fn dialect(&self) -> Option<Arc<D>> {
        self.shared.current_dialect()
    }

    pub fn loop_state(&self) -> LoopState {
        lock(&self.shared.status).loop_state
    }

    pub fn pending_data(&self) -> usize {
        lock(&self.shared.realtime).len()
    }

    pub fn pending_alarms(&self) -> usize {
        lock(&self.shared.alarms).len()
    }

    /// 立即刷新实时队列（测试与关闭流程使用）。
    pub async fn flush_now(&self) -> Result<(), NorthboundError> {
        self.shared.flush_realtime().await?;
        self.shared.flush_alarms().await
    }
}

impl<D: Dialect> Drop for Adapter<D> {
    fn drop(&mut self) {
        for handle in lock(&self.tasks).drain(..) {
            handle.abort();
        }
        if let Some(handle) = lock(&self.shared.event_task).take() {
            handle.abort();
        }
    }
}

impl<D: Dialect> Shared<D> {
    fn current_dialect(&self) -> Option<Arc<D>> {
        self.dialect
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_dialect(&self) -> Result<Arc<D>, NorthboundError> {
        self.current_dialect().ok_or(NorthboundError::NotInitialized)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_connected(&self) -> bool {
        lock(&self.status).connected
            && self
                .current_transport()
                .is_some_and(|transport| transport.is_connected())
    }

    fn report_interval(&self) -> Duration {
        lock(&self.status).report_interval
    }

    fn transition(&self, status: &mut Status, to: LoopState) {
        if status.loop_state == to {
            return;
        }
        info!(
            target: "fsu.northbound",
            adapter = %self.name,
            "loop_state {} -> {}",
            status.loop_state.as_str(),
            to.as_str()
        );
        status.loop_state = to;
    }

    /// 标记断线并唤醒重连循环（信号合并）。
    fn mark_disconnected(&self, reason: &str) {
        let was_connected = {
            let mut status = lock(&self.status);
            std::mem::replace(&mut status.connected, false)
        };
        if was_connected {
            warn!(
                target: "fsu.northbound",
                adapter = %self.name,
                reason = %reason,
                "adapter_disconnected"
            );
        }
        self.reconnect.notify_one();
    }

    async fn connect(self: &Arc<Self>) -> Result<(), NorthboundError> {
        let dialect = self.require_dialect()?;
        let settings = dialect.settings();
        let (transport, events) = self.connector.connect(&settings.link).await?;
        for topic in dialect.subscriptions() {
            match transport.subscribe(&topic, settings.qos).await {
                Ok(()) => debug!(
                    target: "fsu.northbound",
                    adapter = %self.name,
                    topic = %topic,
                    "downlink_subscribed"
                ),
                Err(err) => warn!(
                    target: "fsu.northbound",
                    adapter = %self.name,
                    topic = %topic,
                    error = %err,
                    "downlink_subscribe_failed"
                ),
            }
        }

        let previous = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(transport);
        if let Some(previous) = previous {
            previous.disconnect().await;
        }
        let pump = tokio::spawn(Self::pump_events(self.clone(), events));
        if let Some(previous) = lock(&self.event_task).replace(pump) {
            previous.abort();
        }
        lock(&self.status).connected = true;
        info!(
            target: "fsu.northbound",
            adapter = %self.name,
            server_url = %settings.link.server_url,
            client_id = %settings.link.client_id,
            "adapter_connected"
        );
        Ok(())
    }

    async fn pump_events(shared: Arc<Self>, mut events: mpsc::Receiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::Message(message) => shared.handle_inbound(message).await,
                LinkEvent::Disconnected(reason) => {
                    shared.mark_disconnected(&reason);
                    break;
                }
            }
        }
    }

    async fn handle_inbound(&self, message: InboundMessage) {
        let Some(dialect) = self.current_dialect() else {
            return;
        };
        let downlink = match dialect.handle_downlink(&message) {
            Ok(downlink) => downlink,
            Err(err) => {
                warn!(
                    target: "fsu.northbound",
                    adapter = %self.name,
                    topic = %message.topic,
                    error = %err,
                    "downlink_rejected"
                );
                return;
            }
        };
        if !downlink.commands.is_empty() && dialect.accepts_commands() {
            let count = downlink.commands.len();
            let dropped = lock(&self.commands).append_batch(downlink.commands);
            record_commands_enqueued(count as u64);
            record_queue_dropped(dropped as u64);
            info!(
                target: "fsu.northbound",
                adapter = %self.name,
                topic = %message.topic,
                count = count,
                dropped = dropped,
                "downlink_commands_enqueued"
            );
        }
        for reply in downlink.replies {
            let topic = reply.topic.clone();
            if let Err(err) = self.publish(&dialect, reply).await {
                warn!(
                    target: "fsu.northbound",
                    adapter = %self.name,
                    topic = %topic,
                    error = %err,
                    "downlink_reply_failed"
                );
            }
        }
    }

    async fn publish(&self, dialect: &D, outbound: Outbound) -> Result<(), NorthboundError> {
        let transport = match self.current_transport() {
            Some(transport) if transport.is_connected() => transport,
            _ => {
                self.mark_disconnected("client not connected");
                return Err(NorthboundError::Transport(
                    "mqtt client not connected".to_string(),
                ));
            }
        };
        let settings = dialect.settings();
        let publish = transport.publish(&outbound.topic, settings.qos, settings.retain, outbound.payload);
        let result = match tokio::time::timeout(settings.link.connect_timeout, publish).await {
            Ok(result) => result,
            Err(_) => Err(NorthboundError::Transport("mqtt publish timeout".to_string())),
        };
        match result {
            Ok(()) => {
                record_publish_success();
                lock(&self.status).last_send_ms = Some(now_epoch_ms());
                Ok(())
            }
            Err(err) => {
                record_publish_failure();
                self.mark_disconnected(&err.to_string());
                Err(err)
            }
        }
    }

    /// 清空实时队列；失败时把未发出的部分放回队首。
    async fn flush_realtime(&self) -> Result<(), NorthboundError> {
        let Some(dialect) = self.current_dialect() else {
            return Ok(());
        };
        if lock(&self.realtime).is_empty() {
            return Ok(());
        }
        if !self.is_connected() {
            self.reconnect.notify_one();
            return Err(NorthboundError::Transport(
                "mqtt client not connected".to_string(),
            ));
        }
        let mut pending: VecDeque<CollectData> = lock(&self.realtime).drain_all().into();
        while let Some(item) = pending.pop_front() {
            let outbound = match dialect.encode_sample(&item) {
                Ok(outbound) => outbound,
                Err(err) => {
                    warn!(
                        target: "fsu.northbound",
                        adapter = %self.name,
                        device_id = item.device_id,
                        error = %err,
                        "realtime_encode_failed"
                    );
                    continue;
                }
            };
            if let Err(err) = self.publish(&dialect, outbound).await {
                pending.push_front(item);
                let requeued = pending.len();
                let dropped = lock(&self.realtime).prepend(Vec::from(pending));
                record_queue_dropped(dropped as u64);
                warn!(
                    target: "fsu.northbound",
                    adapter = %self.name,
                    requeued = requeued,
                    dropped = dropped,
                    error = %err,
                    "realtime_publish_failed"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// 发送至多一个批次的告警。
    async fn flush_alarms(&self) -> Result<(), NorthboundError> {
        let Some(dialect) = self.current_dialect() else {
            return Ok(());
        };
        let batch_size = dialect.settings().alarm_batch_size;
        if lock(&self.alarms).is_empty() {
            return Ok(());
        }
        if !self.is_connected() {
            self.reconnect.notify_one();
            return Err(NorthboundError::Transport(
                "mqtt client not connected".to_string(),
            ));
        }
        let mut pending: VecDeque<AlarmPayload> = lock(&self.alarms).drain_up_to(batch_size).into();
        while let Some(alarm) = pending.pop_front() {
            let outbound = match dialect.encode_alarm(&alarm) {
                Ok(outbound) => outbound,
                Err(err) => {
                    warn!(
                        target: "fsu.northbound",
                        adapter = %self.name,
                        device_id = alarm.device_id,
                        error = %err,
                        "alarm_encode_failed"
                    );
                    continue;
                }
            };
            if let Err(err) = self.publish(&dialect, outbound).await {
                pending.push_front(alarm);
                let requeued = pending.len();
                let dropped = lock(&self.alarms).prepend(Vec::from(pending));
                record_queue_dropped(dropped as u64);
                warn!(
                    target: "fsu.northbound",
                    adapter = %self.name,
                    requeued = requeued,
                    error = %err,
                    "alarm_publish_failed"
                );
                return Err(err);
            }
        }
        if lock(&self.alarms).len() >= batch_size {
            self.flush_alarms.notify_one();
        }
        Ok(())
    }

    async fn report_loop(shared: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut every = shared.report_interval();
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = shared.interval_changed.notified() => {
                    every = shared.report_interval();
                    ticker = interval_at(Instant::now() + every, every);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    debug!(
                        target: "fsu.northbound",
                        adapter = %shared.name,
                        interval_ms = every.as_millis() as u64,
                        "report_interval_changed"
                    );
                }
                _ = ticker.tick() => {
                    let _ = shared.flush_realtime().await;
                }
            }
        }
    }

    async fn alarm_loop(shared: Arc<Self>, mut stop: watch::Receiver<bool>, every: Duration) {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = shared.flush_alarms.notified() => {
                    let _ = shared.flush_alarms().await;
                }
                _ = ticker.tick() => {
                    let _ = shared.flush_alarms().await;
                }
            }
        }
        shared.drain_alarms().await;
    }

    /// 停止前尽力清空告警队列。
    async fn drain_alarms(&self) {
        let mut failures = 0;
        while !lock(&self.alarms).is_empty() {
            if self.flush_alarms().await.is_err() {
                failures += 1;
                if failures >= ALARM_DRAIN_RETRIES {
                    warn!(
                        target: "fsu.northbound",
                        adapter = %self.name,
                        remaining = lock(&self.alarms).len(),
                        "alarm_drain_incomplete"
                    );
                    break;
                }
                tokio::time::sleep(ALARM_DRAIN_RETRY_DELAY).await;
            }
        }
    }

    async fn reconnect_loop(shared: Arc<Self>, mut stop: watch::Receiver<bool>, base: Duration) {
        loop {
            tokio::select! {
                _ = stop.changed() => return,
                _ = shared.reconnect.notified() => {}
            }
            if shared.is_connected() {
                continue;
            }
            let mut delay = base;
            loop {
                let attempt = {
                    let mut status = lock(&shared.status);
                    status.reconnect_attempts += 1;
                    status.reconnect_attempts
                };
                record_reconnect_attempt();
                let result = tokio::select! {
                    _ = stop.changed() => return,
                    result = shared.connect() => result,
                };
                match result {
                    Ok(()) => {
                        info!(
                            target: "fsu.northbound",
                            adapter = %shared.name,
                            attempt = attempt,
                            "adapter_reconnected"
                        );
                        break;
                    }
                    Err(err) => warn!(
                        target: "fsu.northbound",
                        adapter = %shared.name,
                        attempt = attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "adapter_reconnect_failed"
                    ),
                }
                tokio::select! {
                    _ = stop.changed() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(MAX_RECONNECT_INTERVAL);
            }
        }
    }
}

#[async_trait]
impl<D: Dialect> NorthboundAdapter for Adapter<D> {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn kind(&self) -> &'static str {
        D::KIND
    }

    async fn initialize(&self, config: &str) -> Result<(), NorthboundError> {
        let dialect = Arc::new(D::parse(&self.shared.name, config)?);
        self.close().await?;

        let settings = dialect.settings().clone();
        lock(&self.shared.realtime).set_capacity(settings.realtime_queue_size);
        lock(&self.shared.alarms).set_capacity(settings.alarm_queue_size);
        lock(&self.shared.commands).set_capacity(settings.command_queue_size);
        *self
            .shared
            .dialect
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(dialect);
        {
            let mut status = lock(&self.shared.status);
            status.initialized = true;
            status.report_interval = settings.report_interval;
        }
        info!(
            target: "fsu.northbound",
            adapter = %self.shared.name,
            kind = D::KIND,
            server_url = %settings.link.server_url,
            interval_ms = settings.report_interval.as_millis() as u64,
            "adapter_initialized"
        );

        if let Err(err) = self.shared.connect().await {
            warn!(
                target: "fsu.northbound",
                adapter = %self.shared.name,
                error = %err,
                "adapter_connect_failed"
            );
            self.shared.mark_disconnected(&err.to_string());
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), NorthboundError> {
        let dialect = self.shared.require_dialect()?;
        {
            let mut status = lock(&self.shared.status);
            if status.loop_state != LoopState::Stopped {
                return Ok(());
            }
            status.enabled = true;
            self.shared.transition(&mut status, LoopState::Running);
        }
        self.shared.stop_tx.send_replace(false);

        let settings = dialect.settings();
        let shared = self.shared.clone();
        let handles = vec![
            tokio::spawn(Shared::report_loop(shared.clone(), shared.stop_tx.subscribe())),
            tokio::spawn(Shared::alarm_loop(
                shared.clone(),
                shared.stop_tx.subscribe(),
                settings.alarm_flush_interval,
            )),
            tokio::spawn(Shared::reconnect_loop(
                shared.clone(),
                shared.stop_tx.subscribe(),
                settings.reconnect_interval,
            )),
        ];
        lock(&self.tasks).extend(handles);
        if !self.shared.is_connected() {
            self.shared.reconnect.notify_one();
        }
        Ok(())
    }

    async fn stop(&self) {
        {
            let mut status = lock(&self.shared.status);
            status.enabled = false;
            if status.loop_state != LoopState::Running {
                return;
            }
            self.shared.transition(&mut status, LoopState::Stopping);
        }
        self.shared.stop_tx.send_replace(true);
        let handles: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        let mut status = lock(&self.shared.status);
        self.shared.transition(&mut status, LoopState::Stopped);
    }

    async fn close(&self) -> Result<(), NorthboundError> {
        self.stop().await;
        if self.shared.current_dialect().is_some() && self.shared.is_connected() {
            let _ = self.shared.flush_realtime().await;
            self.shared.drain_alarms().await;
        }

        let transport = self
            .shared
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(transport) = transport {
            transport.disconnect().await;
        }
        if let Some(handle) = lock(&self.shared.event_task).take() {
            handle.abort();
        }
        lock(&self.shared.realtime).clear();
        lock(&self.shared.alarms).clear();
        lock(&self.shared.commands).clear();
        let was_initialized = {
            let mut status = lock(&self.shared.status);
            status.connected = false;
            std::mem::replace(&mut status.initialized, false)
        };
        *self
            .shared
            .dialect
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        if was_initialized {
            info!(target: "fsu.northbound", adapter = %self.shared.name, "adapter_closed");
        }
        Ok(())
    }

    fn send(&self, data: &CollectData) -> Result<(), NorthboundError> {
        if !lock(&self.shared.status).initialized {
            return Err(NorthboundError::NotInitialized);
        }
        let dropped = lock(&self.shared.realtime).push(data.clone());
        record_queue_dropped(dropped as u64);
        Ok(())
    }

    fn send_alarm(&self, alarm: &AlarmPayload) -> Result<(), NorthboundError> {
        let dialect = self.shared.require_dialect()?;
        let (dropped, pending) = {
            let mut alarms = lock(&self.shared.alarms);
            let dropped = alarms.push(alarm.clone());
            (dropped, alarms.len())
        };
        record_queue_dropped(dropped as u64);
        if pending >= dialect.settings().alarm_batch_size {
            self.shared.flush_alarms.notify_one();
        }
        Ok(())
    }

    fn set_interval(&self, interval: Duration) {
        let resolved = if interval.is_zero() {
            DEFAULT_REPORT_INTERVAL
        } else {
            interval.max(MIN_INTERVAL)
        };
        lock(&self.shared.status).report_interval = resolved;
        self.shared.interval_changed.notify_one();
    }

    fn is_enabled(&self) -> bool {
        lock(&self.shared.status).enabled
    }

    fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    fn stats(&self) -> Value {
        let dialect = self.shared.current_dialect();
        let connected = self.shared.is_connected();
        let mut stats = Map::new();
        {
            let status = lock(&self.shared.status);
            stats.insert("name".into(), Value::from(self.shared.name.clone()));
            stats.insert("type".into(), Value::from(D::KIND));
            stats.insert("enabled".into(), Value::from(status.enabled));
            stats.insert("initialized".into(), Value::from(status.initialized));
            stats.insert("connected".into(), Value::from(connected));
            stats.insert("loop_state".into(), Value::from(status.loop_state.as_str()));
            stats.insert(
                "interval_ms".into(),
                Value::from(status.report_interval.as_millis() as u64),
            );
            stats.insert(
                "reconnect_attempts".into(),
                Value::from(status.reconnect_attempts),
            );
            stats.insert(
                "last_send_ms".into(),
                status.last_send_ms.map_or(Value::Null, Value::from),
            );
        }
        stats.insert("pending_data".into(), Value::from(self.pending_data()));
        stats.insert("pending_alarm".into(), Value::from(self.pending_alarms()));
        stats.insert(
            "pending_cmd".into(),
            Value::from(self.pending_command_count()),
        );
        if let Some(dialect) = dialect {
            dialect.extend_stats(&mut stats);
        }
        Value::Object(stats)
    }

    fn last_send_ms(&self) -> Option<i64> {
        lock(&self.shared.status).last_send_ms
    }

    fn pending_command_count(&self) -> usize {
        match self.shared.current_dialect() {
            Some(dialect) if dialect.accepts_commands() => lock(&self.shared.commands).len(),
            _ => 0,
        }
    }

    fn pull_commands(&self, limit: usize) -> Result<Vec<NorthboundCommand>, NorthboundError> {
        let dialect = self.shared.require_dialect()?;
        if !dialect.accepts_commands() {
            return Ok(Vec::new());
        }
        let limit = if limit == 0 {
            DEFAULT_COMMAND_PULL_LIMIT
        } else {
            limit
        };
        Ok(lock(&self.shared.commands).drain_up_to(limit))
    }

    async fn report_command_result(&self, result: &CommandResult) -> Result<(), NorthboundError> {
        let dialect = self.shared.require_dialect()?;
        match dialect.encode_result(result)? {
            Some(outbound) => self.shared.publish(&dialect, outbound).await,
            None => Ok(()),
        }
    }
}
