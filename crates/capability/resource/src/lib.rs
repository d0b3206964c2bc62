//! 资源访问锁
//!
//! 同一个物理资源（串口 / 网口）同一时刻只允许一个读写在途，
//! 防止共享总线的设备互相串包。
//!
//! - 每个资源 ID 对应一个互斥锁与引用计数，引用计数归零时移除条目
//! - 持锁通过 [`ResourceGuard`] 表示，drop 时释放并递减引用计数
//! - [`ResourceLocker::execute_with_lock`] 在任意退出路径上都会释放锁

use fsu_telemetry::record_lock_timeout;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// 资源锁错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("resource not found")]
    ResourceNotFound,
    #[error("resource is busy, try again later")]
    ResourceBusy,
    #[error("resource is locked by another operation")]
    ResourceLocked,
    #[error("failed to lock resource {id}: {source}")]
    Acquire {
        id: i64,
        #[source]
        source: Box<LockError>,
    },
}

struct LockEntry {
    mutex: Arc<tokio::sync::Mutex<()>>,
    ref_count: usize,
    last_access: Instant,
}

#[derive(Default)]
struct LockerInner {
    entries: Mutex<HashMap<i64, LockEntry>>,
}

impl LockerInner {
    /// 取得（或创建）条目并递增引用计数。
    fn acquire_ref(self: &Arc<Self>, id: i64) -> RefToken {
        let mutex = match self.entries.lock() {
            Ok(mut entries) => {
                let entry = entries.entry(id).or_insert_with(|| LockEntry {
                    mutex: Arc::new(tokio::sync::Mutex::new(())),
                    ref_count: 0,
                    last_access: Instant::now(),
                });
                entry.ref_count += 1;
                entry.mutex.clone()
            }
            // 注册表锁中毒时退化为独立互斥锁，不再参与计数
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        };
        RefToken {
            inner: self.clone(),
            id,
            mutex,
        }
    }

    fn release_ref(&self, id: i64) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let remove = match entries.get_mut(&id) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.last_access = Instant::now();
                entry.ref_count == 0
            }
            None => false,
        };
        if remove {
            entries.remove(&id);
        }
    }

    fn touch(&self, id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get_mut(&id) {
                entry.last_access = Instant::now();
            }
        }
    }
}

/// 引用计数令牌：等待锁期间持有，失败或释放时递减。
struct RefToken {
    inner: Arc<LockerInner>,
    id: i64,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for RefToken {
    fn drop(&mut self) {
        self.inner.release_ref(self.id);
    }
}

/// 持锁凭证，drop 即释放。
pub struct ResourceGuard {
    // 字段顺序保证先释放互斥锁再递减引用计数
    _permit: OwnedMutexGuard<()>,
    token: RefToken,
}

impl ResourceGuard {
    pub fn resource_id(&self) -> i64 {
        self.token.id
    }

    /// 显式释放。
    pub fn unlock(self) {}
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("resource_id", &self.token.id)
            .finish()
    }
}

/// 资源访问锁管理器。
#[derive(Clone)]
pub struct ResourceLocker {
    inner: Arc<LockerInner>,
    max_wait: Duration,
}

impl Default for ResourceLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLocker {
    /// 默认最大等待 30 秒。
    pub fn new() -> Self {
        Self::with_max_wait(Duration::from_secs(30))
    }

    /// `max_wait` 为零表示 execute_with_lock 无限等待。
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            inner: Arc::new(LockerInner::default()),
            max_wait,
        }
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// 阻塞直到获得锁。
    pub async fn lock(&self, id: i64) -> ResourceGuard {
        let token = self.inner.acquire_ref(id);
        let permit = token.mutex.clone().lock_owned().await;
        self.inner.touch(id);
        ResourceGuard {
            _permit: permit,
            token,
        }
    }

    /// 非阻塞获取，已被持有时返回 `ResourceLocked`。
    pub fn try_lock(&self, id: i64) -> Result<ResourceGuard, LockError> {
        let token = self.inner.acquire_ref(id);
        let permit = token
            .mutex
            .clone()
            .try_lock_owned()
            .map_err(|_| LockError::ResourceLocked)?;
        self.inner.touch(id);
        Ok(ResourceGuard {
            _permit: permit,
            token,
        })
    }

    /// 限时获取，超时返回 `ResourceBusy`。
    pub async fn lock_with_timeout(
        &self,
        id: i64,
        timeout: Duration,
    ) -> Result<ResourceGuard, LockError> {
        let token = self.inner.acquire_ref(id);
        let permit = match tokio::time::timeout(timeout, token.mutex.clone().lock_owned()).await {
            Ok(permit) => permit,
            Err(_) => {
                record_lock_timeout();
                debug!(target: "fsu.resource", resource_id = id, "resource_lock_timeout");
                return Err(LockError::ResourceBusy);
            }
        };
        self.inner.touch(id);
        Ok(ResourceGuard {
            _permit: permit,
            token,
        })
    }

    /// 资源当前是否被持有。
    pub fn is_locked(&self, id: i64) -> bool {
        let mutex = match self.inner.entries.lock() {
            Ok(entries) => match entries.get(&id) {
                Some(entry) => entry.mutex.clone(),
                None => return false,
            },
            Err(_) => return false,
        };
        mutex.try_lock().is_err()
    }

    /// 资源的引用计数（持有者 + 等待者）。
    pub fn lock_count(&self, id: i64) -> usize {
        self.inner
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&id).map(|entry| entry.ref_count))
            .unwrap_or(0)
    }

    /// 当前登记的资源条目数。
    pub fn entry_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// 清理空闲且超过 `max_age` 的条目，返回清理数量。
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let Ok(mut entries) = self.inner.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.ref_count > 0 || entry.last_access.elapsed() <= max_age);
        before - entries.len()
    }

    /// 持锁执行操作；无论操作成功与否都会释放锁。
    pub async fn execute_with_lock<F, Fut, T>(&self, id: i64, operation: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = if self.max_wait.is_zero() {
            self.lock(id).await
        } else {
            self.lock_with_timeout(id, self.max_wait)
                .await
                .map_err(|err| LockError::Acquire {
                    id,
                    source: Box::new(err),
                })?
        };
        let output = operation().await;
        drop(guard);
        Ok(output)
    }
}
