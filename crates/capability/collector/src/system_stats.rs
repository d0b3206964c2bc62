//! FSU 系统属性采集
//!
//! 按周期（默认 60 秒）采集 CPU、内存、硬盘、运行时间与负载，
//! 以保留设备身份写入历史并广播到北向。取不到的指标记为 0。

use crate::error::CollectorError;
use crate::scheduler::persist_sample;
use crate::uplink::Uplink;
use domain::{CollectData, SystemStats, now_epoch_ms};
use fsu_storage::StoreSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const DEFAULT_SYSTEM_STATS_INTERVAL: Duration = Duration::from_secs(60);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Sampler {
    stores: StoreSet,
    uplink: Arc<dyn Uplink>,
    system: Mutex<System>,
}

/// 系统属性采集器。
pub struct SystemStatsCollector {
    sampler: Arc<Sampler>,
    interval: Duration,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl SystemStatsCollector {
    pub fn new(stores: StoreSet, uplink: Arc<dyn Uplink>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_SYSTEM_STATS_INTERVAL
        } else {
            interval
        };
        Self {
            sampler: Arc::new(Sampler {
                stores,
                uplink,
                system: Mutex::new(System::new()),
            }),
            interval,
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 启动后立即采集一次，之后按周期采集。
    pub async fn start(&self) -> Result<(), CollectorError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(CollectorError::AlreadyRunning);
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let sampler = self.sampler.clone();
        let every = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        sampler.collect().await;
                    }
                }
            }
        });
        *running = Some(Running { stop_tx, handle });
        info!(
            target: "fsu.collector",
            interval_ms = every.as_millis() as u64,
            "system_stats_started"
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), CollectorError> {
        let Some(current) = self.running.lock().await.take() else {
            return Err(CollectorError::NotRunning);
        };
        current.stop_tx.send_replace(true);
        let _ = current.handle.await;
        info!(target: "fsu.collector", "system_stats_stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// 只采样，不写库不广播。
    pub fn sample_once(&self) -> SystemStats {
        self.sampler.sample()
    }

    /// 采样、写库并广播一次。
    pub async fn collect_once(&self) -> CollectData {
        self.sampler.collect().await
    }
}

impl Sampler {
    async fn collect(&self) -> CollectData {
        let stats = self.sample();
        let (product_key, device_key) = match self.stores.gateway.get_gateway_identity().await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(target: "fsu.collector", error = %err, "gateway_identity_load_failed");
                (String::new(), String::new())
            }
        };
        let data = stats.to_collect_data(&product_key, &device_key);
        persist_sample(&self.stores, &data, true).await;
        self.uplink.send_data(&data);
        debug!(
            target: "fsu.collector",
            cpu_usage = stats.cpu_usage,
            mem_usage = stats.mem_usage,
            disk_usage = stats.disk_usage,
            "system_stats_collected"
        );
        data
    }

    fn sample(&self) -> SystemStats {
        let mut stats = SystemStats {
            timestamp_ms: now_epoch_ms(),
            ..Default::default()
        };
        {
            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_cpu_usage();
            system.refresh_memory();
            stats.cpu_usage = f64::from(system.global_cpu_usage());

            let total = system.total_memory() as f64;
            let available = system.available_memory() as f64;
            if total > 0.0 {
                let used = (total - available).max(0.0);
                stats.mem_total = total / BYTES_PER_MB;
                stats.mem_available = available / BYTES_PER_MB;
                stats.mem_used = used / BYTES_PER_MB;
                stats.mem_usage = used / total * 100.0;
            }
        }

        fill_disk(&mut stats);
        stats.uptime = System::uptime() as i64;
        let load = System::load_average();
        stats.load_1 = load.one;
        stats.load_5 = load.five;
        stats.load_15 = load.fifteen;
        stats
    }
}

/// 取工作目录所在分区；找不到时退回根分区。
fn fill_disk(stats: &mut SystemStats) {
    let disks = Disks::new_with_refreshed_list();
    let cwd = std::env::current_dir().unwrap_or_else(|_| Path::new("/").to_path_buf());
    let disk = disks
        .list()
        .iter()
        .filter(|disk| cwd.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .or_else(|| {
            disks
                .list()
                .iter()
                .find(|disk| disk.mount_point() == Path::new("/"))
        });
    let Some(disk) = disk else {
        return;
    };
    let total = disk.total_space() as f64;
    if total <= 0.0 {
        return;
    }
    let free = disk.available_space() as f64;
    let used = (total - free).max(0.0);
    stats.disk_total = total / BYTES_PER_GB;
    stats.disk_free = free / BYTES_PER_GB;
    stats.disk_used = used / BYTES_PER_GB;
    stats.disk_usage = used / total * 100.0;
}
