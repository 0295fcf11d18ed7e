//! 缓冲会话：客户端启停缓冲与检索数据的公开对象。
//!
//! # 模块定位（Why）
//! - 一个会话代表数据流的一个逻辑消费者，每类记录至多持有一个存储对象；
//! - 样本与事件两条通道是同一泛型组件 [`Lane`] 的两个实例，类别差异只体现在类型参数上。
//!
//! # 核心机制（How）
//! - `start`：先在通道内创建（或复用）存储，再向路由器登记；登记写锁释放之前回调路径看不到本会话，
//!   因此回调永远只会观察到完整构造的存储；
//! - `stop`：先向路由器注销，返回后不再有新记录到达；随后按需销毁存储；
//! - 检索只短暂持有存储插槽的读锁以克隆 `Arc`，真正的数据操作在插槽锁之外进行；
//! - 会话从不在持有存储锁时调用路由器，路由器交付时也只触碰存储自身的锁，不存在重入死锁。
//!
//! # 契约说明（What）
//! - 所有操作都可从任意线程调用，包括正在交付回调的线程；
//! - 对从未启动的类别执行 `consume`/`peek`/`clear` 返回空结果而非错误；
//! - 摄取变换在记录进入存储前应用恰好一次，检索时不再重复应用。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::error::BufferError;
use crate::record::{Event, Record, RecordKind, Sample, Transform};
use crate::router::{SessionId, StreamRouter};
use crate::source::Hook;
use crate::storage::Storage;

/// 按记录类型选择会话内的通道。
pub(crate) trait Laned: Sized {
    fn lane(session: &BufferSession) -> &Lane<Self>;
}

impl Laned for Sample {
    fn lane(session: &BufferSession) -> &Lane<Self> {
        &session.samples
    }
}

impl Laned for Event {
    fn lane(session: &BufferSession) -> &Lane<Self> {
        &session.events
    }
}

#[derive(Default)]
struct LaneCounters {
    delivered: AtomicU64,
    overflowed: AtomicU64,
}

/// 单类别通道的统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneStats {
    /// 当前缓冲条数（有界存储为瞬时近似值）。
    pub buffered: usize,
    /// 累计成功入库的记录数。
    pub delivered: u64,
    /// 累计因有界队列已满而被拒绝的记录数。
    pub overflowed: u64,
}

pub(crate) struct Lane<T> {
    storage: RwLock<Option<Arc<Storage<T>>>>,
    lifecycle: Mutex<()>,
    counters: Arc<LaneCounters>,
}

impl<T> Lane<T> {
    fn new() -> Self {
        Self {
            storage: RwLock::new(None),
            lifecycle: Mutex::new(()),
            counters: Arc::new(LaneCounters::default()),
        }
    }

    fn snapshot(&self) -> Option<Arc<Storage<T>>> {
        self.storage.read().clone()
    }
}

/// 按类别标记的检索结果。
#[derive(Clone, Debug, PartialEq)]
pub enum RecordBatch {
    Samples(Vec<Sample>),
    Events(Vec<Event>),
}

impl RecordBatch {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBatch::Samples(_) => RecordKind::Sample,
            RecordBatch::Events(_) => RecordKind::Event,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Samples(samples) => samples.len(),
            RecordBatch::Events(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 缓冲会话。
///
/// # 教案式说明
/// - **意图 (Why)**：把“向外部数据源登记回调”“持有存储”“检索数据”三件事收敛到一个对象上，
///   客户端无需关心回调如何找到自己的存储。
/// - **逻辑 (How)**：会话持有路由器句柄与两条通道；启动时把一个闭包形式的入口交给路由器，
///   闭包持有存储的 `Arc`、共享的变换标记与统计计数。
/// - **契约 (What)**：
///   - `start_buffering` 对已启动的类别是幂等的，第二次传入的容量被忽略；
///   - `stop_buffering(kind, Some(false))` 保留存储与已缓冲数据，直到被消费或清空；
///   - 会话被释放时对两个类别执行带销毁的停止。
pub struct BufferSession {
    id: SessionId,
    router: StreamRouter,
    config: SessionConfig,
    transform: Arc<AtomicU8>,
    samples: Lane<Sample>,
    events: Lane<Event>,
}

impl BufferSession {
    /// 以默认配置创建空闲会话。
    pub fn new(router: StreamRouter) -> Self {
        Self::build(router, SessionConfig::default())
    }

    /// 以给定配置创建空闲会话，配置先经过校验。
    pub fn with_config(router: StreamRouter, config: SessionConfig) -> Result<Self, BufferError> {
        config.validate()?;
        Ok(Self::build(router, config))
    }

    fn build(router: StreamRouter, config: SessionConfig) -> Self {
        Self {
            id: SessionId::next(),
            router,
            transform: Arc::new(AtomicU8::new(config.transform.to_bits())),
            config,
            samples: Lane::new(),
            events: Lane::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn router(&self) -> &StreamRouter {
        &self.router
    }

    /// 当前摄取变换。
    pub fn transform(&self) -> Transform {
        Transform::from_bits(self.transform.load(Ordering::Acquire))
    }

    /// 替换摄取变换；只影响此后到达的记录，已入库的记录保持原样。
    pub fn set_transform(&self, transform: Transform) {
        self.transform.store(transform.to_bits(), Ordering::Release);
    }

    /// 开始缓冲某类记录。
    ///
    /// `capacity` 为 `None` 时使用配置中的默认容量；存储已存在时容量参数被忽略。
    pub fn start_buffering(
        &self,
        kind: RecordKind,
        capacity: Option<usize>,
    ) -> Result<(), BufferError> {
        match kind {
            RecordKind::Sample => self.start::<Sample>(capacity),
            RecordKind::Event => self.start::<Event>(capacity),
        }
    }

    /// 停止缓冲某类记录；`destroy` 为 `None` 时采用配置默认值。
    pub fn stop_buffering(&self, kind: RecordKind, destroy: Option<bool>) {
        match kind {
            RecordKind::Sample => self.stop::<Sample>(destroy),
            RecordKind::Event => self.stop::<Event>(destroy),
        }
    }

    /// 丢弃某类别当前全部未检索的记录，不改变登记状态；返回丢弃条数。
    pub fn clear(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Sample => self.clear_lane::<Sample>(),
            RecordKind::Event => self.clear_lane::<Event>(),
        }
    }

    /// 按类别消费记录。
    pub fn consume_records(&self, kind: RecordKind, count: Option<usize>) -> RecordBatch {
        match kind {
            RecordKind::Sample => RecordBatch::Samples(self.consume::<Sample>(count)),
            RecordKind::Event => RecordBatch::Events(self.consume::<Event>(count)),
        }
    }

    /// 按类别查看记录。
    pub fn peek_records(&self, kind: RecordKind, count: Option<usize>) -> RecordBatch {
        match kind {
            RecordKind::Sample => RecordBatch::Samples(self.peek::<Sample>(count)),
            RecordKind::Event => RecordBatch::Events(self.peek::<Event>(count)),
        }
    }

    /// 取走最早的 `count` 条记录（默认全部），按到达顺序返回。
    pub fn consume<T: Record>(&self, count: Option<usize>) -> Vec<T> {
        let count = count.unwrap_or(self.config.consume_default);
        match T::lane(self).snapshot() {
            Some(storage) => storage.consume(count),
            None => Vec::new(),
        }
    }

    /// 复制最近的 `count` 条记录（默认一条），不移除。
    pub fn peek<T: Record>(&self, count: Option<usize>) -> Vec<T> {
        let count = count.unwrap_or(self.config.peek_default);
        match T::lane(self).snapshot() {
            Some(storage) => storage.peek(count),
            None => Vec::new(),
        }
    }

    /// 该类别当前是否登记在路由器上。
    pub fn is_buffering(&self, kind: RecordKind) -> bool {
        self.router.registered_kinds(self.id).contains(kind)
    }

    /// 该类别当前是否持有存储。
    pub fn has_storage(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Sample => self.samples.storage.read().is_some(),
            RecordKind::Event => self.events.storage.read().is_some(),
        }
    }

    /// 该类别的统计快照。
    pub fn stats(&self, kind: RecordKind) -> LaneStats {
        match kind {
            RecordKind::Sample => self.lane_stats::<Sample>(),
            RecordKind::Event => self.lane_stats::<Event>(),
        }
    }

    /// 停止并销毁两个类别的存储，然后换上新的摄取变换。
    pub fn reset(&self, transform: Transform) {
        self.stop::<Event>(Some(true));
        self.stop::<Sample>(Some(true));
        self.set_transform(transform);
    }

    fn start<T: Record>(&self, capacity: Option<usize>) -> Result<(), BufferError> {
        let lane = T::lane(self);
        let _lifecycle = lane.lifecycle.lock();
        let (storage, created) = {
            let mut slot = lane.storage.write();
            match slot.as_ref() {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let capacity =
                        capacity.unwrap_or_else(|| self.config.default_capacity(T::KIND));
                    let fresh = Arc::new(Storage::build(self.config.storage, capacity)?);
                    *slot = Some(Arc::clone(&fresh));
                    (fresh, true)
                }
            }
        };

        let inlet = self.inlet::<T>(storage);
        if let Err(err) = self.router.attach::<T>(self.id, inlet) {
            if created {
                *lane.storage.write() = None;
            }
            return Err(err);
        }
        debug!(session = %self.id, kind = %T::KIND, created, "buffering started");
        Ok(())
    }

    fn stop<T: Record>(&self, destroy: Option<bool>) {
        let lane = T::lane(self);
        let _lifecycle = lane.lifecycle.lock();
        let was_registered = self.router.detach::<T>(self.id);
        let destroy = destroy.unwrap_or(self.config.stop_destroys);
        let released = if destroy {
            lane.storage.write().take()
        } else {
            None
        };
        if was_registered || released.is_some() {
            debug!(
                session = %self.id,
                kind = %T::KIND,
                destroyed = released.is_some(),
                "buffering stopped"
            );
        }
    }

    fn clear_lane<T: Record>(&self) -> usize {
        match T::lane(self).snapshot() {
            Some(storage) => storage.clear(),
            None => 0,
        }
    }

    fn lane_stats<T: Record>(&self) -> LaneStats {
        let lane = T::lane(self);
        LaneStats {
            buffered: lane.snapshot().map_or(0, |storage| storage.len()),
            delivered: lane.counters.delivered.load(Ordering::Relaxed),
            overflowed: lane.counters.overflowed.load(Ordering::Relaxed),
        }
    }

    fn inlet<T: Record>(&self, storage: Arc<Storage<T>>) -> Hook<T> {
        let transform = Arc::clone(&self.transform);
        let counters = Arc::clone(&T::lane(self).counters);
        let session = self.id;
        Arc::new(move |record: T| {
            let record =
                record.transformed(Transform::from_bits(transform.load(Ordering::Acquire)));
            if storage.push(record) {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.overflowed.fetch_add(1, Ordering::Relaxed);
                trace!(%session, kind = %T::KIND, "bounded storage full, record rejected");
            }
        })
    }
}

impl Drop for BufferSession {
    fn drop(&mut self) {
        self.stop::<Sample>(Some(true));
        self.stop::<Event>(Some(true));
    }
}

impl fmt::Debug for BufferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferSession")
            .field("id", &self.id)
            .field("storage", &self.config.storage)
            .field("transform", &self.transform())
            .field("samples", &self.stats(RecordKind::Sample))
            .field("events", &self.stats(RecordKind::Event))
            .finish()
    }
}
