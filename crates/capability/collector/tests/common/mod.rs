#![allow(dead_code)]

use async_trait::async_trait;
use domain::{AlarmPayload, CollectData, CommandResult, Device, NorthboundCommand};
use fsu_collector::{Collector, CollectorError, CollectorSettings, Uplink};
use fsu_driver::{Driver, DriverError, Fields};
use fsu_resource::ResourceLocker;
use fsu_storage::StoreSet;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct DriverState {
    fields: HashMap<i64, Fields>,
    failing: HashSet<i64>,
    writes: Vec<(i64, String, String)>,
    delay: Duration,
    active: usize,
    max_active: usize,
    collect_calls: usize,
}

/// 可编排的驱动：按设备返回固定字段，记录写入与并发度。
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<DriverState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_field(&self, device_id: i64, field: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .fields
            .entry(device_id)
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub fn set_failing(&self, device_id: i64, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing.insert(device_id);
        } else {
            state.failing.remove(&device_id);
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn writes(&self) -> Vec<(i64, String, String)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    pub fn collect_calls(&self) -> usize {
        self.state.lock().unwrap().collect_calls
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn collect(&self, device: &Device) -> Result<Fields, DriverError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.collect_calls += 1;
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.active -= 1;
        if state.failing.contains(&device.id) {
            return Err(DriverError::Connection("device offline".to_string()));
        }
        Ok(state.fields.get(&device.id).cloned().unwrap_or_default())
    }

    async fn write(&self, device: &Device, field: &str, value: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&device.id) {
            return Err(DriverError::Connection("device offline".to_string()));
        }
        state
            .writes
            .push((device.id, field.to_string(), value.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct UplinkState {
    data: Vec<CollectData>,
    alarms: Vec<AlarmPayload>,
    commands: VecDeque<(String, NorthboundCommand)>,
    results: Vec<(String, CommandResult)>,
}

/// 记录广播内容的上行出口，可预置下行命令。
#[derive(Clone, Default)]
pub struct RecordingUplink {
    state: Arc<Mutex<UplinkState>>,
}

impl RecordingUplink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> Vec<CollectData> {
        self.state.lock().unwrap().data.clone()
    }

    pub fn alarms(&self) -> Vec<AlarmPayload> {
        self.state.lock().unwrap().alarms.clone()
    }

    pub fn results(&self) -> Vec<(String, CommandResult)> {
        self.state.lock().unwrap().results.clone()
    }

    pub fn push_command(&self, source: &str, command: NorthboundCommand) {
        self.state
            .lock()
            .unwrap()
            .commands
            .push_back((source.to_string(), command));
    }
}

#[async_trait]
impl Uplink for RecordingUplink {
    fn send_data(&self, data: &CollectData) {
        self.state.lock().unwrap().data.push(data.clone());
    }

    fn send_alarm(&self, alarm: &AlarmPayload) {
        self.state.lock().unwrap().alarms.push(alarm.clone());
    }

    fn pull_commands(&self, limit: usize) -> Vec<(String, NorthboundCommand)> {
        let mut state = self.state.lock().unwrap();
        let take = limit.min(state.commands.len());
        state.commands.drain(..take).collect()
    }

    async fn report_command_result(
        &self,
        source: &str,
        result: &CommandResult,
    ) -> Result<(), CollectorError> {
        self.state
            .lock()
            .unwrap()
            .results
            .push((source.to_string(), result.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub stores: StoreSet,
    pub driver: FakeDriver,
    pub uplink: RecordingUplink,
    pub locker: ResourceLocker,
    pub collector: Collector,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(CollectorSettings::default())
    }

    pub fn with_settings(settings: CollectorSettings) -> Self {
        let stores = StoreSet::in_memory();
        let driver = FakeDriver::new();
        let uplink = RecordingUplink::new();
        let locker = ResourceLocker::with_max_wait(Duration::from_secs(5));
        let collector = Collector::new(
            stores.clone(),
            Arc::new(driver.clone()),
            locker.clone(),
            Arc::new(uplink.clone()),
            settings,
        );
        Self {
            stores,
            driver,
            uplink,
            locker,
            collector,
        }
    }
}

pub fn device(id: i64) -> Device {
    Device {
        id,
        name: format!("dev-{id}"),
        product_key: "pk".to_string(),
        device_key: format!("dk-{id}"),
        driver_type: "fake".to_string(),
        collect_interval_ms: 1000,
        storage_interval_s: 300,
        enabled: true,
        ..Default::default()
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
