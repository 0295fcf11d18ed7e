//! 读写锁保护的可增长有序缓冲。
//!
//! # 模块定位（Why）
//! - “可增长缓冲”策略需要支持不转移所有权的 peek，且永不因容量拒绝追加；
//!   内存是唯一上限，增长取代拒绝成为背压手段。
//! - 读写锁让并发 peek 彼此不互斥，只与追加、消费、清空串行化。
//!
//! # 契约说明（What）
//! - [`GuardedBuffer::append`]、[`GuardedBuffer::consume_prefix`]、[`GuardedBuffer::clear`] 持写锁；
//! - [`GuardedBuffer::peek_suffix`] 持读锁，返回获取锁瞬间的一致快照；
//! - 临界区内只做内存操作，不做 IO，也不回调外部代码。

use alloc::vec::Vec;
use core::fmt;

use parking_lot::RwLock;

/// 读写锁保护的 `Vec` 缓冲，插入顺序即到达顺序。
pub struct GuardedBuffer<T> {
    records: RwLock<Vec<T>>,
}

impl<T> GuardedBuffer<T> {
    /// 构造空缓冲并预留 `reserve` 条记录的空间。
    pub fn with_reserve(reserve: usize) -> Self {
        Self {
            records: RwLock::new(Vec::with_capacity(reserve)),
        }
    }

    /// 追加一条记录，摊还 O(1)。
    pub fn append(&self, record: T) {
        self.records.write().push(record);
    }

    /// 取走最早的 `count` 条记录。
    ///
    /// `count` 不小于当前长度（包括 [`crate::ALL`] 哨兵）时整体接管缓冲，原位置留下空 `Vec`；
    /// 否则只移除前 `count` 条，剩余记录保持原有顺序。
    pub fn consume_prefix(&self, count: usize) -> Vec<T> {
        let mut records = self.records.write();
        if count >= records.len() {
            return core::mem::take(&mut *records);
        }
        records.drain(..count).collect()
    }

    /// 清空缓冲，返回被丢弃的条数。
    pub fn clear(&self) -> usize {
        let mut records = self.records.write();
        let dropped = records.len();
        records.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<T: Clone> GuardedBuffer<T> {
    /// 复制最近的 `min(count, len)` 条记录，不移除任何内容。
    pub fn peek_suffix(&self, count: usize) -> Vec<T> {
        let records = self.records.read();
        let start = records.len().saturating_sub(count);
        records[start..].to_vec()
    }
}

impl<T> Default for GuardedBuffer<T> {
    fn default() -> Self {
        Self::with_reserve(0)
    }
}

impl<T> fmt::Debug for GuardedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedBuffer")
            .field("len", &self.len())
            .finish()
    }
}
