//! 会话每类别的存储对象：有界无锁队列或可增长保护缓冲。

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BufferError;
use crate::guarded::GuardedBuffer;
use crate::queue::{BoundedQueue, validate_capacity};
use crate::record::Record;

/// 可增长缓冲初始预留的上限（条）。
///
/// 默认样本容量按有界语义取值，直接预留会一次性提交数百 MB；可增长变体只把容量当作提示。
pub const RESERVE_CEILING: usize = 1 << 16;

/// 存储策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoragePolicy {
    /// 固定容量、满则拒新的无锁队列；不支持 peek。
    Bounded,
    /// 读写锁保护、按需增长的缓冲；支持 peek。
    #[default]
    Growable,
}

impl StoragePolicy {
    /// 在构造存储之前校验容量参数。
    pub fn validate_capacity(self, capacity: usize) -> Result<(), BufferError> {
        match self {
            StoragePolicy::Bounded => validate_capacity(capacity),
            StoragePolicy::Growable => Ok(()),
        }
    }
}

/// 单个类别的存储实体，由会话独占。
#[derive(Debug)]
pub(crate) enum Storage<T> {
    Bounded(BoundedQueue<T>),
    Growable(GuardedBuffer<T>),
}

impl<T: Record> Storage<T> {
    pub(crate) fn build(policy: StoragePolicy, capacity: usize) -> Result<Self, BufferError> {
        Ok(match policy {
            StoragePolicy::Bounded => Storage::Bounded(BoundedQueue::with_capacity(capacity)?),
            StoragePolicy::Growable => {
                Storage::Growable(GuardedBuffer::with_reserve(capacity.min(RESERVE_CEILING)))
            }
        })
    }

    /// 存入一条记录；仅当有界队列已满时返回 `false`。
    pub(crate) fn push(&self, record: T) -> bool {
        match self {
            Storage::Bounded(queue) => queue.try_push(record).is_ok(),
            Storage::Growable(buffer) => {
                buffer.append(record);
                true
            }
        }
    }

    pub(crate) fn consume(&self, count: usize) -> Vec<T> {
        match self {
            Storage::Bounded(queue) => {
                // 不按近似长度预分配，结果随实际取出的条数增长。
                let mut out = Vec::new();
                queue.pop_into(&mut out, count);
                out
            }
            Storage::Growable(buffer) => buffer.consume_prefix(count),
        }
    }

    pub(crate) fn peek(&self, count: usize) -> Vec<T> {
        match self {
            Storage::Bounded(_) => {
                debug!(kind = %T::KIND, "bounded storage cannot be inspected without consuming");
                Vec::new()
            }
            Storage::Growable(buffer) => buffer.peek_suffix(count),
        }
    }

    pub(crate) fn clear(&self) -> usize {
        match self {
            Storage::Bounded(queue) => queue.discard_all(),
            Storage::Growable(buffer) => buffer.clear(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Storage::Bounded(queue) => queue.len(),
            Storage::Growable(buffer) => buffer.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ALL;
    use crate::record::{Event, Sample};

    fn sample(timestamp: i64) -> Sample {
        Sample {
            timestamp,
            ..Sample::default()
        }
    }

    #[test]
    fn bounded_build_validates_capacity() {
        let err = Storage::<Sample>::build(StoragePolicy::Bounded, 3).expect_err("3 不是 2 的幂");
        assert!(matches!(err, BufferError::InvalidCapacity { requested: 3, .. }));
        assert!(Storage::<Sample>::build(StoragePolicy::Growable, 3).is_ok());
    }

    #[test]
    fn bounded_storage_rejects_when_full_and_never_peeks() {
        let storage = Storage::<Sample>::build(StoragePolicy::Bounded, 2).expect("合法容量");
        assert!(storage.push(sample(1)));
        assert!(storage.push(sample(2)));
        assert!(!storage.push(sample(3)));
        assert!(storage.peek(ALL).is_empty());
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.consume(1), vec![sample(1)]);
        assert_eq!(storage.clear(), 1);
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn bounded_consume_allocates_for_taken_records_only() {
        let storage = Storage::<Sample>::build(StoragePolicy::Bounded, 1 << 16).expect("合法容量");
        assert!(storage.push(sample(1)));
        let taken = storage.consume(ALL);
        assert_eq!(taken, vec![sample(1)]);
        assert!(taken.capacity() < 64);
        assert!(storage.consume(ALL).is_empty());
    }

    #[test]
    fn growable_storage_supports_peek() {
        let storage = Storage::<Event>::build(StoragePolicy::Growable, 1 << 22).expect("可增长");
        let event = Event::default();
        assert!(storage.push(event));
        assert_eq!(storage.peek(1), vec![event]);
        assert_eq!(storage.consume(ALL), vec![event]);
        assert!(storage.peek(1).is_empty());
    }
}
