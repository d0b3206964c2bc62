//! 采集调度器
//!
//! 单个节拍（默认 1 秒）驱动所有设备任务。每个任务记录三个时钟：
//! 最近采集、最近入库、最近上传，分别对应采集周期、存储周期、上传周期。
//!
//! 到期的设备各自派发为独立任务执行，慢设备不阻塞其他设备；
//! 绑定同一资源的设备通过 [`ResourceLocker`] 串行访问。
//!
//! 单次采集的步骤（同一设备内严格有序）：
//! 1. 驱动读取字段，失败则记日志并跳过本次
//! 2. 写最新值缓存，存储周期到期时追加历史
//! 3. 评估阈值，需要告警时写告警日志并广播
//! 4. 上传周期到期时广播样本
//!
//! 另有两个后台循环：设备同步（默认 10 秒）与下行命令泵（默认 500 毫秒）。

use crate::alarm_state::{AlarmStateTable, DEFAULT_REPEAT_INTERVAL, RepeatInterval};
use crate::error::CollectorError;
use crate::threshold_cache::{DEFAULT_REFRESH_INTERVAL, ThresholdCache};
use crate::uplink::Uplink;
use domain::{
    AlarmLog, AlarmPayload, CollectData, CommandResult, DataCacheEntry, DataPoint, Device,
    NorthboundCommand, Threshold, ThresholdOperator, now_epoch_ms,
};
use fsu_driver::{Driver, Fields};
use fsu_resource::ResourceLocker;
use fsu_storage::StoreSet;
use fsu_telemetry::{
    record_alarm_emitted, record_alarm_suppressed, record_command_executed, record_driver_error,
    record_history_write, record_sample_collected, record_storage_error,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_DEVICE_SYNC_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_COMMAND_BATCH: usize = 20;
pub const DEFAULT_LOCK_IDLE: Duration = Duration::from_secs(600);

const VALUE_TYPE_STRING: &str = "string";

/// 调度参数。
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub tick: Duration,
    pub device_sync_interval: Duration,
    pub command_poll_interval: Duration,
    /// 每个北向每次拉取的命令数上限
    pub command_batch: usize,
    pub threshold_refresh_interval: Duration,
    /// 网关配置读取失败时使用的告警重复间隔
    pub alarm_repeat_interval: Duration,
    /// 空闲资源锁条目的清理年龄
    pub lock_idle: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            device_sync_interval: DEFAULT_DEVICE_SYNC_INTERVAL,
            command_poll_interval: DEFAULT_COMMAND_POLL_INTERVAL,
            command_batch: DEFAULT_COMMAND_BATCH,
            threshold_refresh_interval: DEFAULT_REFRESH_INTERVAL,
            alarm_repeat_interval: DEFAULT_REPEAT_INTERVAL,
            lock_idle: DEFAULT_LOCK_IDLE,
        }
    }
}

impl CollectorSettings {
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.tick.is_zero() {
            self.tick = defaults.tick;
        }
        if self.device_sync_interval.is_zero() {
            self.device_sync_interval = defaults.device_sync_interval;
        }
        if self.command_poll_interval.is_zero() {
            self.command_poll_interval = defaults.command_poll_interval;
        }
        if self.command_batch == 0 {
            self.command_batch = defaults.command_batch;
        }
        if self.lock_idle.is_zero() {
            self.lock_idle = defaults.lock_idle;
        }
        self
    }
}

/// 一次设备同步的变更统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

struct CollectTask {
    device: Device,
    /// 最近一次派发（成功与否），决定下次到期时间
    last_attempt_ms: Option<i64>,
    last_run_ms: Option<i64>,
    last_stored_ms: Option<i64>,
    last_upload_ms: Option<i64>,
    last_timestamp_ms: i64,
}

impl CollectTask {
    /// 配置更新时沿用旧任务的时钟。
    fn new(device: Device, previous: Option<CollectTask>) -> Self {
        match previous {
            Some(previous) => Self { device, ..previous },
            None => Self {
                device,
                last_attempt_ms: None,
                last_run_ms: None,
                last_stored_ms: None,
                last_upload_ms: None,
                last_timestamp_ms: 0,
            },
        }
    }

    fn is_due(&self, now_ms: i64) -> bool {
        self.last_attempt_ms
            .is_none_or(|last| now_ms - last >= self.device.resolved_collect_interval_ms())
    }
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<i64, CollectTask>,
    in_flight: HashSet<i64>,
}

/// 采集成功后的记账结果。
struct CollectMarks {
    timestamp_ms: i64,
    store: bool,
    upload: bool,
}

struct Inner {
    stores: StoreSet,
    driver: Arc<dyn Driver>,
    locker: ResourceLocker,
    uplink: Arc<dyn Uplink>,
    thresholds: Arc<ThresholdCache>,
    alarm_states: AlarmStateTable,
    repeat_interval: RepeatInterval,
    settings: CollectorSettings,
    state: RwLock<SchedulerState>,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// 采集调度器。
pub struct Collector {
    inner: Arc<Inner>,
    running: tokio::sync::Mutex<Option<Running>>,
    is_running: AtomicBool,
}

impl Collector {
    pub fn new(
        stores: StoreSet,
        driver: Arc<dyn Driver>,
        locker: ResourceLocker,
        uplink: Arc<dyn Uplink>,
        settings: CollectorSettings,
    ) -> Self {
        let settings = settings.sanitized();
        let thresholds = Arc::new(ThresholdCache::new(
            stores.devices.clone(),
            stores.thresholds.clone(),
            settings.threshold_refresh_interval,
        ));
        let repeat_interval =
            RepeatInterval::new(stores.gateway.clone(), settings.alarm_repeat_interval);
        Self {
            inner: Arc::new(Inner {
                stores,
                driver,
                locker,
                uplink,
                thresholds,
                alarm_states: AlarmStateTable::new(),
                repeat_interval,
                settings,
                state: RwLock::new(SchedulerState::default()),
            }),
            running: tokio::sync::Mutex::new(None),
            is_running: AtomicBool::new(false),
        }
    }

    /// 加载启用设备，启动阈值缓存与各循环。
    pub async fn start(&self) -> Result<(), CollectorError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(CollectorError::AlreadyRunning);
        }

        match self.inner.sync_devices().await {
            Ok(report) => info!(
                target: "fsu.collector",
                devices = report.added,
                "enabled_devices_loaded"
            ),
            Err(err) => warn!(target: "fsu.collector", error = %err, "enabled_devices_load_failed"),
        }
        self.inner.thresholds.start();

        let (stop_tx, _) = watch::channel(false);
        let inner = self.inner.clone();
        let handles = vec![
            tokio::spawn(Inner::tick_loop(inner.clone(), stop_tx.subscribe())),
            tokio::spawn(Inner::sync_loop(inner.clone(), stop_tx.subscribe())),
            tokio::spawn(Inner::command_loop(inner, stop_tx.subscribe())),
        ];
        *running = Some(Running { stop_tx, handles });
        self.is_running.store(true, Ordering::SeqCst);
        info!(
            target: "fsu.collector",
            tick_ms = self.inner.settings.tick.as_millis() as u64,
            "collector_started"
        );
        Ok(())
    }

    /// 停止各循环并等待在途采集结束。
    pub async fn stop(&self) -> Result<(), CollectorError> {
        let mut running = self.running.lock().await;
        let Some(current) = running.take() else {
            return Err(CollectorError::NotRunning);
        };
        self.is_running.store(false, Ordering::SeqCst);
        current.stop_tx.send_replace(true);
        for handle in current.handles {
            let _ = handle.await;
        }
        self.inner.thresholds.stop().await;
        info!(target: "fsu.collector", "collector_stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// 加入采集任务。
    pub fn add_device(&self, device: Device) -> Result<(), CollectorError> {
        let mut state = self.inner.write();
        if state.tasks.contains_key(&device.id) {
            return Err(CollectorError::AlreadyExists(device.id));
        }
        info!(target: "fsu.collector", device_id = device.id, device_name = %device.name, "device_added");
        state.tasks.insert(device.id, CollectTask::new(device, None));
        Ok(())
    }

    /// 更新采集配置，保留时钟。
    pub fn update_device(&self, device: Device) -> Result<(), CollectorError> {
        let mut state = self.inner.write();
        let previous = state
            .tasks
            .remove(&device.id)
            .ok_or(CollectorError::NotFound(device.id))?;
        info!(target: "fsu.collector", device_id = device.id, device_name = %device.name, "device_updated");
        state
            .tasks
            .insert(device.id, CollectTask::new(device, Some(previous)));
        Ok(())
    }

    /// 移除采集任务，同时清理阈值缓存与告警状态。返回任务是否存在。
    pub fn remove_device(&self, device_id: i64) -> bool {
        let existed = self.inner.write().tasks.remove(&device_id).is_some();
        self.inner.forget_device(device_id);
        if existed {
            info!(target: "fsu.collector", device_id = device_id, "device_removed");
        }
        existed
    }

    /// 立即采集一次，不影响周期。
    pub async fn collect_now(&self, device_id: i64) -> Result<CollectData, CollectorError> {
        let device = self
            .inner
            .read()
            .tasks
            .get(&device_id)
            .map(|task| task.device.clone())
            .ok_or(CollectorError::NotFound(device_id))?;
        self.inner.collect_device(&device).await
    }

    /// 与设备存储对账。
    pub async fn sync_devices(&self) -> Result<SyncReport, CollectorError> {
        self.inner.sync_devices().await
    }

    /// 拉取并执行一批下行命令，返回处理数。
    pub async fn process_commands(&self) -> usize {
        self.inner.process_commands().await
    }

    /// 已排序的设备 ID。
    pub fn device_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.read().tasks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn task_count(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn thresholds(&self) -> &Arc<ThresholdCache> {
        &self.inner.thresholds
    }

    pub fn alarm_states(&self) -> &AlarmStateTable {
        &self.inner.alarm_states
    }

    pub fn repeat_interval(&self) -> &RepeatInterval {
        &self.inner.repeat_interval
    }
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, SchedulerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SchedulerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_task(&self, device_id: i64) -> bool {
        self.read().tasks.contains_key(&device_id)
    }

    async fn tick_loop(inner: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(inner.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    while in_flight.try_join_next().is_some() {}
                    Self::dispatch_due(&inner, &mut in_flight);
                }
            }
        }
        while in_flight.join_next().await.is_some() {}
    }

    async fn sync_loop(inner: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let every = inner.settings.device_sync_interval;
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    if let Err(err) = inner.sync_devices().await {
                        warn!(target: "fsu.collector", error = %err, "device_sync_failed");
                    }
                    let cleaned = inner.locker.cleanup(inner.settings.lock_idle);
                    if cleaned > 0 {
                        debug!(target: "fsu.collector", cleaned = cleaned, "resource_locks_cleaned");
                    }
                }
            }
        }
    }

    async fn command_loop(inner: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let every = inner.settings.command_poll_interval;
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    inner.process_commands().await;
                }
            }
        }
    }

    /// 派发启用、到期且不在途的任务，返回派发数。
    fn dispatch_due(inner: &Arc<Self>, in_flight: &mut JoinSet<()>) -> usize {
        let now = now_epoch_ms();
        let mut due = Vec::new();
        {
            let mut state = inner.write();
            let SchedulerState {
                tasks,
                in_flight: busy,
            } = &mut *state;
            for task in tasks.values_mut() {
                if !task.device.enabled || busy.contains(&task.device.id) || !task.is_due(now) {
                    continue;
                }
                task.last_attempt_ms = Some(now);
                busy.insert(task.device.id);
                due.push(task.device.clone());
            }
        }

        let count = due.len();
        for device in due {
            let inner = inner.clone();
            in_flight.spawn(async move {
                let _ = inner.collect_device(&device).await;
                inner.write().in_flight.remove(&device.id);
            });
        }
        count
    }

    /// 单次完整采集。
    async fn collect_device(&self, device: &Device) -> Result<CollectData, CollectorError> {
        let fields = match self.read_fields(device).await {
            Ok(fields) => fields,
            Err(err) => {
                record_driver_error();
                warn!(
                    target: "fsu.collector",
                    device_id = device.id,
                    device_name = %device.name,
                    error = %err,
                    "device_collect_failed"
                );
                return Err(err);
            }
        };
        record_sample_collected();

        let now = now_epoch_ms();
        let Some(marks) = self.mark_collected(device.id, now) else {
            debug!(target: "fsu.collector", device_id = device.id, "collect_result_discarded");
            return Err(CollectorError::NotFound(device.id));
        };
        let data = self
            .build_collect_data(device, fields, marks.timestamp_ms)
            .await;
        debug!(
            target: "fsu.collector",
            device_id = device.id,
            fields = data.fields.len(),
            stored = marks.store,
            uploaded = marks.upload,
            "device_collected"
        );

        persist_sample(&self.stores, &data, marks.store).await;
        if self.has_task(device.id) {
            self.evaluate_thresholds(device, &data).await;
            // 评估期间设备被移除时，清掉本次写入的告警状态
            if !self.has_task(device.id) {
                self.alarm_states.clear_for_device(device.id);
            }
        }
        if marks.upload {
            self.uplink.send_data(&data);
        }
        Ok(data)
    }

    async fn read_fields(&self, device: &Device) -> Result<Fields, CollectorError> {
        let fields = match device.resource_id {
            Some(resource_id) => {
                self.locker
                    .execute_with_lock(resource_id, || self.driver.collect(device))
                    .await??
            }
            None => self.driver.collect(device).await?,
        };
        Ok(fields)
    }

    /// 更新任务时钟；任务已被移除时返回 None。时间戳保证单调不减。
    fn mark_collected(&self, device_id: i64, now_ms: i64) -> Option<CollectMarks> {
        let mut state = self.write();
        let task = state.tasks.get_mut(&device_id)?;

        let timestamp_ms = now_ms.max(task.last_timestamp_ms);
        task.last_timestamp_ms = timestamp_ms;
        task.last_run_ms = Some(now_ms);

        let storage_ms = task.device.resolved_storage_interval_s() * 1000;
        let store = task
            .last_stored_ms
            .is_none_or(|last| now_ms - last >= storage_ms);
        if store {
            task.last_stored_ms = Some(now_ms);
        }

        let upload_ms = task.device.upload_interval_ms;
        let upload =
            upload_ms <= 0 || task.last_upload_ms.is_none_or(|last| now_ms - last >= upload_ms);
        if upload {
            task.last_upload_ms = Some(now_ms);
        }

        Some(CollectMarks {
            timestamp_ms,
            store,
            upload,
        })
    }

    /// 设备未配置身份时回落到网关身份。
    async fn build_collect_data(
        &self,
        device: &Device,
        fields: Fields,
        timestamp_ms: i64,
    ) -> CollectData {
        let mut product_key = device.product_key.trim().to_string();
        let mut device_key = device.device_key.trim().to_string();
        if product_key.is_empty() || device_key.is_empty() {
            match self.stores.gateway.get_gateway_identity().await {
                Ok((gateway_pk, gateway_dk)) => {
                    if product_key.is_empty() {
                        product_key = gateway_pk;
                    }
                    if device_key.is_empty() {
                        device_key = gateway_dk;
                    }
                }
                Err(err) => {
                    warn!(target: "fsu.collector", error = %err, "gateway_identity_load_failed")
                }
            }
        }
        CollectData {
            device_id: device.id,
            device_name: device.name.clone(),
            product_key,
            device_key,
            timestamp_ms,
            fields,
        }
    }

    /// 评估设备的全部阈值，返回发出的告警数。
    async fn evaluate_thresholds(&self, device: &Device, data: &CollectData) -> usize {
        let rules = match self.thresholds.get(device.id).await {
            Ok(rules) => rules,
            Err(err) => {
                warn!(
                    target: "fsu.collector",
                    device_id = device.id,
                    error = %err,
                    "threshold_load_failed"
                );
                return 0;
            }
        };
        if rules.is_empty() {
            return 0;
        }

        let repeat_interval = self.repeat_interval.resolve().await;
        let mut emitted = 0;
        for rule in &rules {
            if !rule.is_active() {
                continue;
            }
            let Some(operator) = ThresholdOperator::parse(&rule.operator) else {
                continue;
            };
            let Some(actual) = parse_field_value(&data.fields, &rule.field_name) else {
                continue;
            };
            let matched = operator.matches(actual, rule.value);
            if !self.alarm_states.should_emit(
                device.id,
                rule,
                matched,
                data.timestamp_ms,
                repeat_interval,
            ) {
                if matched {
                    record_alarm_suppressed();
                }
                continue;
            }
            self.raise_alarm(device, data, rule, actual).await;
            emitted += 1;
        }
        emitted
    }

    async fn raise_alarm(&self, device: &Device, data: &CollectData, rule: &Threshold, actual: f64) {
        let log = AlarmLog {
            id: 0,
            device_id: device.id,
            threshold_id: Some(rule.id),
            field_name: rule.field_name.clone(),
            actual_value: actual,
            threshold_value: rule.value,
            operator: rule.operator.clone(),
            severity: rule.severity.clone(),
            message: rule.message.clone(),
            triggered_at_ms: data.timestamp_ms,
            acknowledged: false,
        };
        if let Err(err) = self.stores.alarms.create_alarm_log(log).await {
            record_storage_error();
            warn!(
                target: "fsu.collector",
                device_id = device.id,
                threshold_id = rule.id,
                error = %err,
                "alarm_log_write_failed"
            );
        }
        record_alarm_emitted();
        info!(
            target: "fsu.collector",
            device_id = device.id,
            threshold_id = rule.id,
            field = %rule.field_name,
            actual = actual,
            operator = %rule.operator,
            threshold = rule.value,
            severity = %rule.severity,
            "alarm_triggered"
        );

        self.uplink.send_alarm(&AlarmPayload {
            device_id: device.id,
            device_name: device.name.clone(),
            product_key: data.product_key.clone(),
            device_key: data.device_key.clone(),
            field_name: rule.field_name.clone(),
            actual_value: actual,
            threshold: rule.value,
            operator: rule.operator.clone(),
            severity: rule.severity.clone(),
            message: rule.message.clone(),
        });
    }

    async fn sync_devices(&self) -> Result<SyncReport, CollectorError> {
        let devices = self.stores.devices.get_all_devices().await?;
        let mut report = SyncReport::default();
        let mut removed = Vec::new();
        {
            let mut state = self.write();
            let seen: HashSet<i64> = devices.iter().map(|device| device.id).collect();
            for device in devices {
                let id = device.id;
                if !device.enabled {
                    if state.tasks.remove(&id).is_some() {
                        info!(target: "fsu.collector", device_id = id, device_name = %device.name, "device_disabled");
                        removed.push(id);
                    }
                    continue;
                }
                match state.tasks.remove(&id) {
                    None => {
                        info!(target: "fsu.collector", device_id = id, device_name = %device.name, "device_enabled");
                        state.tasks.insert(id, CollectTask::new(device, None));
                        report.added += 1;
                    }
                    Some(previous) if previous.device == device => {
                        state.tasks.insert(id, previous);
                    }
                    Some(previous) => {
                        info!(target: "fsu.collector", device_id = id, device_name = %device.name, "device_config_updated");
                        state.tasks.insert(id, CollectTask::new(device, Some(previous)));
                        report.updated += 1;
                    }
                }
            }
            let vanished: Vec<i64> = state
                .tasks
                .keys()
                .filter(|id| !seen.contains(id))
                .copied()
                .collect();
            for id in vanished {
                state.tasks.remove(&id);
                info!(target: "fsu.collector", device_id = id, "device_vanished");
                removed.push(id);
            }
        }
        for id in &removed {
            self.forget_device(*id);
        }
        report.removed = removed.len();
        Ok(report)
    }

    fn forget_device(&self, device_id: i64) {
        self.thresholds.invalidate_device(device_id);
        self.alarm_states.clear_for_device(device_id);
    }

    async fn process_commands(&self) -> usize {
        let commands = self.uplink.pull_commands(self.settings.command_batch);
        for (source, command) in &commands {
            let result = match self.execute_command(command).await {
                Ok(()) => {
                    record_command_executed();
                    CommandResult::for_command(command, true, "")
                }
                Err(err) => {
                    warn!(
                        target: "fsu.collector",
                        source = %command.source,
                        request_id = %command.request_id,
                        product_key = %command.product_key,
                        device_key = %command.device_key,
                        field = %command.field_name,
                        error = %err,
                        "command_execute_failed"
                    );
                    CommandResult::for_command(command, false, err.to_string())
                }
            };
            if let Err(err) = self.uplink.report_command_result(source, &result).await {
                warn!(
                    target: "fsu.collector",
                    adapter = %source,
                    request_id = %command.request_id,
                    error = %err,
                    "command_result_report_failed"
                );
            }
        }
        commands.len()
    }

    async fn execute_command(&self, command: &NorthboundCommand) -> Result<(), CollectorError> {
        let product_key = command.product_key.trim();
        let device_key = command.device_key.trim();
        let field = command.field_name.trim();
        let value = command.value.trim();
        if product_key.is_empty() || device_key.is_empty() {
            return Err(CollectorError::InvalidCommand(
                "missing product_key/device_key".to_string(),
            ));
        }
        if field.is_empty() {
            return Err(CollectorError::InvalidCommand("missing field_name".to_string()));
        }

        let device = self
            .stores
            .devices
            .get_all_devices()
            .await?
            .into_iter()
            .find(|device| {
                device.product_key.trim() == product_key && device.device_key.trim() == device_key
            })
            .ok_or_else(|| {
                CollectorError::IdentityNotFound(product_key.to_string(), device_key.to_string())
            })?;

        match device.resource_id {
            Some(resource_id) => {
                self.locker
                    .execute_with_lock(resource_id, || self.driver.write(&device, field, value))
                    .await??
            }
            None => self.driver.write(&device, field, value).await?,
        }
        info!(
            target: "fsu.collector",
            source = %command.source,
            request_id = %command.request_id,
            device_id = device.id,
            field = %field,
            value = %value,
            "command_executed"
        );
        Ok(())
    }
}

/// 字段值按浮点解析，缺失或非数值返回 None。
pub fn parse_field_value(fields: &BTreeMap<String, String>, field: &str) -> Option<f64> {
    fields.get(field.trim())?.trim().parse::<f64>().ok()
}

/// 写最新值缓存，`store_history` 为真时同时追加历史。存储失败只记日志。
pub(crate) async fn persist_sample(stores: &StoreSet, data: &CollectData, store_history: bool) {
    for (field, value) in &data.fields {
        let entry = DataCacheEntry {
            device_id: data.device_id,
            field_name: field.clone(),
            value: value.clone(),
            value_type: VALUE_TYPE_STRING.to_string(),
            collected_at_ms: data.timestamp_ms,
        };
        if let Err(err) = stores.cache.save_data_cache(&entry).await {
            record_storage_error();
            warn!(
                target: "fsu.collector",
                device_id = data.device_id,
                field = %field,
                error = %err,
                "data_cache_write_failed"
            );
        }

        if !store_history {
            continue;
        }
        let point = DataPoint {
            device_id: data.device_id,
            device_name: data.device_name.clone(),
            field_name: field.clone(),
            value: value.clone(),
            value_type: VALUE_TYPE_STRING.to_string(),
            collected_at_ms: data.timestamp_ms,
        };
        match stores.history.save_data_point(&point).await {
            Ok(()) => record_history_write(),
            Err(err) => {
                record_storage_error();
                warn!(
                    target: "fsu.collector",
                    device_id = data.device_id,
                    field = %field,
                    error = %err,
                    "history_write_failed"
                );
            }
        }
    }
}
