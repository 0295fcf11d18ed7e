//! 固定容量的多生产者/多消费者无锁环形队列。
//!
//! # 模块定位（Why）
//! - 为“有界缓冲”策略提供存储：回调线程入队完全不加锁，消费线程出队同样只依赖原子操作，
//!   两侧互不阻塞；
//! - 队满时拒绝新记录而不是淘汰旧记录，背压语义为“拒新”，由调用方决定是否计为丢失。
//!
//! # 核心机制（How）
//! - 每个槽位携带一个原子序号，初始化为槽位下标；
//! - 生产者读取入队位置 `pos`，当目标槽位满足 `sequence == pos` 时以一次 CAS 认领该位置，
//!   写入记录后以 Release 语义发布 `sequence = pos + 1`；
//! - 消费者对称地在 `sequence == pos + 1` 时认领，取走记录后发布 `sequence = pos + capacity`，
//!   使该槽位在 `capacity` 个位置之后重新对生产者可见；
//! - 序号与位置之差按有符号数解释（`wrapping_sub` 后转 `isize`），在回绕后仍能区分“尚未发布”与“已满”。
//!
//! # 契约说明（What）
//! - [`BoundedQueue::try_push`] 仅在尝试瞬间队列已满时返回 `Err(value)`，原值完整交还调用方；
//! - [`BoundedQueue::try_pop`] 仅在尝试瞬间队列为空时返回 `None`；
//! - 除本地 CAS 竞争重试外不存在阻塞或自旋等待，已发布的记录不会丢失；
//! - 同一生产者/消费者对之间保持先进先出。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::error::BufferError;
use crate::sync::{AtomicUsize, Ordering, UnsafeCell};

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Vyukov 风格的有界 MPMC 队列。
///
/// # 教案式说明
/// - **意图 (Why)**：外部数据源的回调线程不受我们控制，任何阻塞都会拖慢设备驱动；
///   无锁入队保证回调路径只执行有限次原子操作。
/// - **契约 (What)**：容量在构造时固定，必须是不小于 [`Self::MIN_CAPACITY`] 的 2 的幂；
///   两个游标以 [`CachePadded`] 隔离，避免生产者与消费者之间的伪共享。
/// - **风险 (Trade-offs)**：无法在不出队的情况下查看内容，因此该变体不支持 peek。
pub struct BoundedQueue<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    enqueue_pos: CachePadded<AtomicUsize>,
    dequeue_pos: CachePadded<AtomicUsize>,
}

// SAFETY: 槽位内容只会被成功认领该位置的单个线程访问，序号的 Acquire/Release 建立了
// 写入与读取之间的先行关系；记录在线程间按值移动，因此只需要 `T: Send`。
unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// 最小容量。
    pub const MIN_CAPACITY: usize = 2;

    /// 构造指定容量的队列。
    ///
    /// # 错误
    /// 容量小于 [`Self::MIN_CAPACITY`] 或不是 2 的幂时返回 [`BufferError::InvalidCapacity`]。
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        validate_capacity(capacity)?;
        let slots = (0..capacity)
            .map(|index| Slot {
                sequence: AtomicUsize::new(index),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            slots,
            mask: capacity - 1,
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
        })
    }

    /// 队列容量。
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// 尝试入队；队满时原样交还记录。
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(pos) as isize;
            if diff == 0 {
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: CAS 成功意味着本线程独占了 `pos` 对应的槽位，
                        // 在发布新序号之前没有其他线程会读写它。
                        slot.value
                            .with_mut(|cell| unsafe { cell.write(MaybeUninit::new(value)) });
                        slot.sequence
                            .store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return Err(value);
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// 尝试出队；队空时返回 `None`。
    pub fn try_pop(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(pos.wrapping_add(1)) as isize;
            if diff == 0 {
                match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: 序号等于 `pos + 1` 说明生产者已完成写入并发布，
                        // CAS 成功后本线程是该记录唯一的读取者。
                        let value = slot
                            .value
                            .with_mut(|cell| unsafe { cell.read().assume_init() });
                        slot.sequence
                            .store(pos.wrapping_add(self.mask + 1), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// 最多取出 `max` 条记录追加到 `out`，返回实际取出的条数。
    pub fn pop_into(&self, out: &mut Vec<T>, max: usize) -> usize {
        let mut taken = 0;
        while taken < max {
            match self.try_pop() {
                Some(value) => {
                    out.push(value);
                    taken += 1;
                }
                None => break,
            }
        }
        taken
    }

    /// 丢弃当前可见的全部记录，返回丢弃条数。
    pub fn discard_all(&self) -> usize {
        let mut dropped = 0;
        while self.try_pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// 当前缓冲条数的瞬时近似值；无并发操作时精确。
    pub fn len(&self) -> usize {
        // 先读出队游标：出队游标永远不会越过入队游标，因此之后读到的入队游标不小于它。
        let head = self.dequeue_pos.load(Ordering::Acquire);
        let tail = self.enqueue_pos.load(Ordering::Acquire);
        occupancy(head, tail, self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        if core::mem::needs_drop::<T>() {
            while self.try_pop().is_some() {}
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// 由两个游标估算占用条数；差值为负（游标读取跨越了并发推进）时按空处理，结果不超过容量。
fn occupancy(head: usize, tail: usize, capacity: usize) -> usize {
    let diff = tail.wrapping_sub(head) as isize;
    if diff <= 0 {
        0
    } else {
        (diff as usize).min(capacity)
    }
}

/// 校验有界容量：不小于 [`BoundedQueue::MIN_CAPACITY`] 的 2 的幂。
pub(crate) fn validate_capacity(capacity: usize) -> Result<(), BufferError> {
    let minimum = BoundedQueue::<()>::MIN_CAPACITY;
    if capacity < minimum || !capacity.is_power_of_two() {
        return Err(BufferError::InvalidCapacity {
            requested: capacity,
            minimum,
        });
    }
    Ok(())
}
