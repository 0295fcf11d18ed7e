//! 流路由器：把外部数据源的两个回调插槽扇出到所有活跃会话。
//!
//! # 模块定位（Why）
//! - 厂商 API 每类记录只能装一个回调，而同一进程内可能同时存在多个关心同一类记录的会话；
//!   路由器保证“每类别恰好一个已安装回调”，由它把每条记录分发给当前登记的全部会话。
//! - 登记表只在锁内修改：注销与销毁都相对于锁有序，在途回调不会观察到已释放的会话。
//!
//! # 核心机制（How）
//! - 每类别一个 [`Route`]：读写锁保护订阅者列表，独立的安装锁串行化对数据源的安装与卸载调用；
//!   类别之间互不阻塞，样本的注册变更不会卡住事件交付；
//! - 回调路径只取读锁，遍历订阅者逐一交付，同一条记录可能交付给零个、一个或多个会话；
//! - 注册先取安装锁：首个订阅者安装回调后才在写锁内发布订阅者；注销先在写锁内移除订阅者，
//!   最后一个订阅者离开后再卸载回调；调用数据源期间从不持有订阅者锁；
//! - 交给数据源的回调只持有路由器的弱引用，路由器释放后回调不再分发任何记录。
//!
//! # 契约说明（What）
//! - 会话在登记表中至多出现一次，且仅在不再登记任何类别时被移除；
//! - [`StreamRouter::attach`] 返回前订阅已对回调路径可见；[`StreamRouter::detach`] 返回后，
//!   不会再有记录交付给该会话；
//! - 数据源拒绝安装时，会话不被视为已登记，错误向上返回。

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::BufferError;
use crate::record::{Event, KindSet, Record, RecordKind, Sample};
use crate::source::{Hook, RecordSource, SourceError};

/// 进程内唯一的会话标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// 按记录类型选择路由插槽与数据源注册点。
pub(crate) trait Routed: Sized {
    fn route(inner: &RouterInner) -> &Route<Self>;

    fn install(source: &dyn RecordSource, hook: Option<Hook<Self>>) -> Result<(), SourceError>;
}

impl Routed for Sample {
    fn route(inner: &RouterInner) -> &Route<Self> {
        &inner.samples
    }

    fn install(source: &dyn RecordSource, hook: Option<Hook<Self>>) -> Result<(), SourceError> {
        source.install_sample_hook(hook)
    }
}

impl Routed for Event {
    fn route(inner: &RouterInner) -> &Route<Self> {
        &inner.events
    }

    fn install(source: &dyn RecordSource, hook: Option<Hook<Self>>) -> Result<(), SourceError> {
        source.install_event_hook(hook)
    }
}

struct Subscriber<T> {
    session: SessionId,
    inlet: Hook<T>,
}

/// 单个记录类别的订阅表。
///
/// 订阅者列表与数据源回调的安装状态由两把锁分别保护：交付路径只取 `subscribers` 的读锁；
/// 调用外部数据源只持有 `install` 互斥锁，交付路径从不获取它。
pub(crate) struct Route<T> {
    subscribers: RwLock<Vec<Subscriber<T>>>,
    install: Mutex<()>,
    hook_installed: AtomicBool,
}

impl<T> Route<T> {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            install: Mutex::new(()),
            hook_installed: AtomicBool::new(false),
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn hook_installed(&self) -> bool {
        self.hook_installed.load(Ordering::Acquire)
    }
}

impl<T: Copy> Route<T> {
    fn deliver(&self, record: T) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            (subscriber.inlet)(record);
        }
    }
}

pub(crate) struct RouterInner {
    source: Arc<dyn RecordSource>,
    samples: Route<Sample>,
    events: Route<Event>,
    members: Mutex<BTreeMap<SessionId, KindSet>>,
}

impl Drop for RouterInner {
    fn drop(&mut self) {
        if self.samples.hook_installed() {
            let _ = self.source.install_sample_hook(None);
        }
        if self.events.hook_installed() {
            let _ = self.source.install_event_hook(None);
        }
    }
}

/// 流路由器句柄，克隆代价为一次引用计数。
///
/// # 教案式说明
/// - **意图 (Why)**：多个会话共享同一外部数据源，却各自独立启停；路由器是它们之间唯一共享的结构，
///   且永远只在自己的锁内修改。
/// - **逻辑 (How)**：`attach`/`detach` 以类别的安装锁串行化，订阅者列表只在短暂的写锁内修改，
///   同时在 `members` 中维护“会话 → 已登记类别”的登记表；回调路径仅取读锁。
/// - **契约 (What)**：可以通过 [`StreamRouter::new`] 构造独立实例（测试、多设备），
///   也可以通过 [`StreamRouter::install_global`] 安装进程级实例。
#[derive(Clone)]
pub struct StreamRouter {
    inner: Arc<RouterInner>,
}

static GLOBAL: OnceLock<StreamRouter> = OnceLock::new();

impl StreamRouter {
    /// 以给定数据源构造路由器；此时不安装任何回调。
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                source,
                samples: Route::new(),
                events: Route::new(),
                members: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// 安装进程级路由器；重复安装返回 [`BufferError::AlreadyInstalled`]。
    pub fn install_global(source: Arc<dyn RecordSource>) -> Result<StreamRouter, BufferError> {
        // 候选实例尚未安装任何回调，落选时直接丢弃即可。
        GLOBAL
            .set(StreamRouter::new(source))
            .map_err(|_| BufferError::AlreadyInstalled)?;
        GLOBAL.get().cloned().ok_or(BufferError::AlreadyInstalled)
    }

    /// 进程级路由器（若已安装）。
    pub fn global() -> Option<StreamRouter> {
        GLOBAL.get().cloned()
    }

    /// 为会话登记类别 `T`；已登记时为幂等操作。
    ///
    /// # 教案级说明
    /// - **前置条件**：`inlet` 所引用的存储必须已完整构造；订阅者在写锁内发布，
    ///   交付路径要么看不到它，要么看到完整对象。
    /// - **流程**：取安装锁 → 若已登记直接返回 → 首个订阅者负责安装回调 → 取写锁追加订阅者 → 更新登记表。
    ///   调用数据源时不持有订阅者锁，数据源即使等待在途回调结束也不会与交付路径互锁。
    /// - **失败**：数据源拒绝安装时不追加订阅者，返回 [`BufferError::Registration`]。
    pub(crate) fn attach<T: Record>(
        &self,
        session: SessionId,
        inlet: Hook<T>,
    ) -> Result<(), BufferError> {
        let route = T::route(&self.inner);
        let _install = route.install.lock();
        if route
            .subscribers
            .read()
            .iter()
            .any(|sub| sub.session == session)
        {
            return Ok(());
        }
        if !route.hook_installed() {
            let hook = self.dispatch_hook::<T>();
            if let Err(err) = T::install(&*self.inner.source, Some(hook)) {
                warn!(kind = %T::KIND, %session, code = err.code, "record source refused hook installation");
                return Err(BufferError::registration(T::KIND, err));
            }
            route.hook_installed.store(true, Ordering::Release);
            debug!(kind = %T::KIND, "installed source hook");
        }
        let subscribers = {
            let mut subscribers = route.subscribers.write();
            subscribers.push(Subscriber { session, inlet });
            subscribers.len()
        };
        self.inner
            .members
            .lock()
            .entry(session)
            .or_default()
            .insert(T::KIND);
        debug!(kind = %T::KIND, %session, subscribers, "session attached");
        Ok(())
    }

    /// 注销会话在类别 `T` 上的登记，返回此前是否已登记。
    ///
    /// 订阅者先在写锁内移除，返回后不会再有记录交付给该会话；随后若已无订阅者，
    /// 在写锁之外卸载数据源回调。卸载失败只记录告警，回调保持安装但不再分发给任何会话。
    pub(crate) fn detach<T: Record>(&self, session: SessionId) -> bool {
        let route = T::route(&self.inner);
        let _install = route.install.lock();
        let (removed, remaining) = {
            let mut subscribers = route.subscribers.write();
            let before = subscribers.len();
            subscribers.retain(|sub| sub.session != session);
            (subscribers.len() != before, subscribers.len())
        };
        if removed {
            let mut members = self.inner.members.lock();
            if let Some(kinds) = members.get_mut(&session) {
                kinds.remove(T::KIND);
                if kinds.is_empty() {
                    members.remove(&session);
                }
            }
            debug!(kind = %T::KIND, %session, subscribers = remaining, "session detached");
        }
        if remaining == 0 && route.hook_installed() {
            match T::install(&*self.inner.source, None) {
                Ok(()) => {
                    route.hook_installed.store(false, Ordering::Release);
                    debug!(kind = %T::KIND, "uninstalled source hook");
                }
                Err(err) => {
                    warn!(kind = %T::KIND, code = err.code, "record source refused hook removal");
                }
            }
        }
        removed
    }

    /// 会话当前登记的类别集合。
    pub fn registered_kinds(&self, session: SessionId) -> KindSet {
        self.inner
            .members
            .lock()
            .get(&session)
            .copied()
            .unwrap_or_default()
    }

    /// 登记表中的会话数。
    pub fn session_count(&self) -> usize {
        self.inner.members.lock().len()
    }

    /// 某类别的订阅者数量。
    pub fn subscriber_count(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Sample => self.inner.samples.subscriber_count(),
            RecordKind::Event => self.inner.events.subscriber_count(),
        }
    }

    /// 某类别当前是否在数据源上装有回调。
    pub fn is_hook_installed(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Sample => self.inner.samples.hook_installed(),
            RecordKind::Event => self.inner.events.hook_installed(),
        }
    }

    fn dispatch_hook<T: Record>(&self) -> Hook<T> {
        let weak: Weak<RouterInner> = Arc::downgrade(&self.inner);
        Arc::new(move |record: T| {
            if let Some(inner) = weak.upgrade() {
                T::route(&inner).deliver(record);
            }
        })
    }
}

impl fmt::Debug for StreamRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRouter")
            .field("sessions", &self.session_count())
            .field("sample_subscribers", &self.subscriber_count(RecordKind::Sample))
            .field("event_subscribers", &self.subscriber_count(RecordKind::Event))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ManualSource;
    use core::num::NonZeroI32;
    use std::sync::Mutex as StdMutex;
    use tracing_test::traced_test;

    fn collecting_inlet<T: Record>() -> (Hook<T>, Arc<StdMutex<Vec<T>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let inlet: Hook<T> = Arc::new(move |record: T| {
            sink.lock().expect("锁未中毒").push(record);
        });
        (inlet, seen)
    }

    #[test]
    fn hook_installed_once_and_removed_with_last_subscriber() {
        let source = Arc::new(ManualSource::new());
        let router = StreamRouter::new(source.clone());
        let (first_inlet, first_seen) = collecting_inlet::<Sample>();
        let (second_inlet, second_seen) = collecting_inlet::<Sample>();
        let first = SessionId::next();
        let second = SessionId::next();

        router.attach(first, first_inlet).expect("首次登记");
        router.attach(second, second_inlet).expect("第二个会话登记");
        assert_eq!(source.install_count(RecordKind::Sample), 1);
        assert_eq!(router.subscriber_count(RecordKind::Sample), 2);

        assert!(source.emit_sample(Sample {
            timestamp: 1,
            ..Sample::default()
        }));
        assert!(router.detach::<Sample>(first));
        assert!(source.hook_installed(RecordKind::Sample));
        assert!(source.emit_sample(Sample {
            timestamp: 2,
            ..Sample::default()
        }));
        assert!(router.detach::<Sample>(second));
        assert!(!source.hook_installed(RecordKind::Sample));
        assert!(!router.is_hook_installed(RecordKind::Sample));

        assert_eq!(first_seen.lock().expect("锁未中毒").len(), 1);
        assert_eq!(second_seen.lock().expect("锁未中毒").len(), 2);
    }

    #[test]
    fn repeated_attach_is_idempotent() {
        let source = Arc::new(ManualSource::new());
        let router = StreamRouter::new(source.clone());
        let session = SessionId::next();
        let (inlet, seen) = collecting_inlet::<Event>();
        router.attach(session, Arc::clone(&inlet)).expect("登记");
        router.attach(session, inlet).expect("重复登记");
        assert_eq!(router.subscriber_count(RecordKind::Event), 1);
        source.emit_event(Event::default());
        assert_eq!(seen.lock().expect("锁未中毒").len(), 1);
    }

    #[test]
    fn registry_entry_removed_only_when_no_kind_remains() {
        let source = Arc::new(ManualSource::new());
        let router = StreamRouter::new(source);
        let session = SessionId::next();
        let (samples, _) = collecting_inlet::<Sample>();
        let (events, _) = collecting_inlet::<Event>();
        router.attach(session, samples).expect("样本登记");
        router.attach(session, events).expect("事件登记");
        assert_eq!(router.session_count(), 1);
        let kinds = router.registered_kinds(session);
        assert!(kinds.contains(RecordKind::Sample) && kinds.contains(RecordKind::Event));

        assert!(router.detach::<Sample>(session));
        assert_eq!(router.session_count(), 1);
        assert!(!router.registered_kinds(session).contains(RecordKind::Sample));
        assert!(!router.detach::<Sample>(session));

        assert!(router.detach::<Event>(session));
        assert_eq!(router.session_count(), 0);
        assert!(router.registered_kinds(session).is_empty());
    }

    #[test]
    fn refused_install_leaves_session_unregistered() {
        let source = Arc::new(ManualSource::new());
        source.refuse_installs(NonZeroI32::new(-7));
        let router = StreamRouter::new(source.clone());
        let session = SessionId::next();
        let (inlet, _) = collecting_inlet::<Sample>();
        let err = router.attach(session, inlet).expect_err("数据源拒绝");
        assert_eq!(
            err,
            BufferError::Registration {
                kind: RecordKind::Sample,
                code: -7
            }
        );
        assert_eq!(router.subscriber_count(RecordKind::Sample), 0);
        assert!(router.registered_kinds(session).is_empty());
        assert!(!router.is_hook_installed(RecordKind::Sample));
    }

    #[test]
    fn dropped_router_uninstalls_hooks() {
        let source = Arc::new(ManualSource::new());
        {
            let router = StreamRouter::new(source.clone());
            let (inlet, _) = collecting_inlet::<Event>();
            router.attach(SessionId::next(), inlet).expect("登记");
            assert!(source.hook_installed(RecordKind::Event));
        }
        assert!(!source.hook_installed(RecordKind::Event));
        assert!(!source.emit_event(Event::default()));
    }

    #[traced_test]
    #[test]
    fn hook_lifecycle_is_logged() {
        let source = Arc::new(ManualSource::new());
        let router = StreamRouter::new(source);
        let session = SessionId::next();
        let (inlet, _) = collecting_inlet::<Sample>();
        router.attach(session, inlet).expect("登记");
        router.detach::<Sample>(session);
        assert!(logs_contain("installed source hook"));
        assert!(logs_contain("uninstalled source hook"));
    }
}
