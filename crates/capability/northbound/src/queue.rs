//! 有界队列：溢出时丢弃最旧的条目。

use std::collections::VecDeque;

/// 容量非正时的默认值。
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 入队尾，返回被挤掉的条目数。
    pub fn push(&mut self, item: T) -> usize {
        let mut dropped = 0;
        while self.items.len() >= self.capacity {
            self.items.pop_front();
            dropped += 1;
        }
        self.items.push_back(item);
        if dropped > 0 {
            self.shrink();
        }
        dropped
    }

    /// 整批追加：结果长度为 `min(M + N, C)`。
    ///
    /// 先丢弃已有的最旧条目，仍超出时再丢弃这批里最早的条目，
    /// 保证整批在队列里连续。
    pub fn append_batch<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut batch: VecDeque<T> = batch.into_iter().collect();
        if batch.is_empty() {
            return 0;
        }
        let mut dropped = 0;
        let total = self.items.len() + batch.len();
        if total > self.capacity {
            let overflow = total - self.capacity;
            let from_existing = overflow.min(self.items.len());
            self.items.drain(..from_existing);
            dropped += from_existing;
            let from_batch = overflow - from_existing;
            batch.drain(..from_batch);
            dropped += from_batch;
        }
        self.items.extend(batch);
        if dropped > 0 {
            self.shrink();
        }
        dropped
    }

    /// 发布失败的批次放回队首；超出容量时从队尾裁剪。
    pub fn prepend(&mut self, batch: Vec<T>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let mut merged: VecDeque<T> = VecDeque::with_capacity(batch.len() + self.items.len());
        merged.extend(batch);
        merged.extend(self.items.drain(..));
        let dropped = merged.len().saturating_sub(self.capacity);
        merged.truncate(self.capacity);
        self.items = merged;
        if dropped > 0 {
            self.shrink();
        }
        dropped
    }

    /// 取出队首最多 `limit` 条。
    pub fn drain_up_to(&mut self, limit: usize) -> Vec<T> {
        let count = limit.min(self.items.len());
        self.items.drain(..count).collect()
    }

    pub fn drain_all(&mut self) -> Vec<T> {
        let items: Vec<T> = self.items.drain(..).collect();
        self.shrink();
        items
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.shrink();
    }

    /// 调整容量，超出部分从队首丢弃。
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        let dropped = self.items.len().saturating_sub(self.capacity);
        self.items.drain(..dropped);
        self.shrink();
        dropped
    }

    /// 底层缓冲不超过两倍容量。
    fn shrink(&mut self) {
        if self.items.capacity() > self.capacity.saturating_mul(2) {
            self.items.shrink_to(self.capacity);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
