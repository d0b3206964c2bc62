use domain::now_epoch_ms;
use std::sync::atomic::{AtomicU64, Ordering};

/// 消息 ID 生成器：`<prefix>_<unix_millis>_<seq>`，序号单调递增。
#[derive(Debug, Default)]
pub struct IdGenerator {
    seq: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, prefix: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}_{}", prefix, now_epoch_ms(), seq)
    }
}

static GLOBAL_IDS: IdGenerator = IdGenerator {
    seq: AtomicU64::new(0),
};

/// 进程级 ID，跨适配器唯一。
pub fn next_prefixed_id(prefix: &str) -> String {
    GLOBAL_IDS.next(prefix)
}
