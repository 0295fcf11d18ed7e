//! 外部数据源边界。
//!
//! # 模块定位（Why）
//! - 厂商 API 对每类记录只暴露一个回调注册点，传入空值即卸载；缓冲核心只在这一边界上与之交互；
//! - [`RecordSource`] 把该边界抽象为 trait，真实设备适配层与进程内的 [`ManualSource`] 都实现它。
//!
//! # 契约说明（What）
//! - 数据源在自己的线程上同步调用已安装的 [`Hook`]，每次交付一条记录；
//! - 安装失败以 [`SourceError`] 携带厂商返回码上报；
//! - 实现方不得在持有内部锁时调用 hook，否则会与路由器的注册写锁形成环路。

use alloc::sync::Arc;
use core::num::NonZeroI32;
use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use parking_lot::RwLock;
use thiserror::Error;

use crate::record::{Event, RecordKind, Sample};

/// 数据源回调：每次交付一条记录。
pub type Hook<T> = Arc<dyn Fn(T) + Send + Sync>;

/// 数据源拒绝安装回调时的返回码。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("record source returned code {code}")]
pub struct SourceError {
    pub code: i32,
}

/// 外部数据源的回调注册点。
pub trait RecordSource: Send + Sync + 'static {
    /// 安装或卸载（`None`）样本回调。
    fn install_sample_hook(&self, hook: Option<Hook<Sample>>) -> Result<(), SourceError>;

    /// 安装或卸载（`None`）事件回调。
    fn install_event_hook(&self, hook: Option<Hook<Event>>) -> Result<(), SourceError>;
}

/// 进程内数据源：由调用方主动推送记录，用于仿真、演示与测试。
///
/// # 教案式说明
/// - **意图 (Why)**：真实设备只能在特定平台上运行，缓冲核心的并发契约却需要在任何环境中验证；
///   `ManualSource` 以完全相同的回调语义替身外部数据源。
/// - **逻辑 (How)**：每类记录一个 `RwLock<Option<Hook>>` 插槽；`emit_*` 先克隆 hook 再释放锁，
///   之后才调用，保证卸载与交付之间不会互相等待。
/// - **契约 (What)**：[`ManualSource::refuse_installs`] 设置非零返回码（[`NonZeroI32`]）后，后续安装（含卸载）全部失败，
///   用于覆盖注册失败路径；设为 `None` 恢复正常。
#[derive(Default)]
pub struct ManualSource {
    sample_hook: RwLock<Option<Hook<Sample>>>,
    event_hook: RwLock<Option<Hook<Event>>>,
    refusal: AtomicI32,
    sample_installs: AtomicUsize,
    event_installs: AtomicUsize,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 令后续安装请求以 `code` 失败；`None` 恢复接受。
    ///
    /// 返回码 0 在厂商约定中表示成功，因此拒绝码限定为非零值。
    pub fn refuse_installs(&self, code: Option<NonZeroI32>) {
        self.refusal
            .store(code.map_or(0, NonZeroI32::get), Ordering::Release);
    }

    /// 通过已安装的样本回调交付一条记录；无回调时返回 `false`。
    pub fn emit_sample(&self, sample: Sample) -> bool {
        let hook = self.sample_hook.read().clone();
        match hook {
            Some(hook) => {
                hook(sample);
                true
            }
            None => false,
        }
    }

    /// 通过已安装的事件回调交付一条记录；无回调时返回 `false`。
    pub fn emit_event(&self, event: Event) -> bool {
        let hook = self.event_hook.read().clone();
        match hook {
            Some(hook) => {
                hook(event);
                true
            }
            None => false,
        }
    }

    /// 该类别当前是否装有回调。
    pub fn hook_installed(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Sample => self.sample_hook.read().is_some(),
            RecordKind::Event => self.event_hook.read().is_some(),
        }
    }

    /// 该类别累计成功安装（不含卸载）的次数。
    pub fn install_count(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Sample => self.sample_installs.load(Ordering::Acquire),
            RecordKind::Event => self.event_installs.load(Ordering::Acquire),
        }
    }

    fn check_refusal(&self) -> Result<(), SourceError> {
        match self.refusal.load(Ordering::Acquire) {
            0 => Ok(()),
            code => Err(SourceError { code }),
        }
    }
}

impl RecordSource for ManualSource {
    fn install_sample_hook(&self, hook: Option<Hook<Sample>>) -> Result<(), SourceError> {
        self.check_refusal()?;
        if hook.is_some() {
            self.sample_installs.fetch_add(1, Ordering::AcqRel);
        }
        *self.sample_hook.write() = hook;
        Ok(())
    }

    fn install_event_hook(&self, hook: Option<Hook<Event>>) -> Result<(), SourceError> {
        self.check_refusal()?;
        if hook.is_some() {
            self.event_installs.fetch_add(1, Ordering::AcqRel);
        }
        *self.event_hook.write() = hook;
        Ok(())
    }
}

impl core::fmt::Debug for ManualSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManualSource")
            .field("sample_hook", &self.hook_installed(RecordKind::Sample))
            .field("event_hook", &self.hook_installed(RecordKind::Event))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn emit_without_hook_is_a_noop() {
        let source = ManualSource::new();
        assert!(!source.emit_sample(Sample::default()));
        assert!(!source.emit_event(Event::default()));
    }

    #[test]
    fn installed_hook_receives_records_until_uninstalled() {
        let source = ManualSource::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        source
            .install_sample_hook(Some(Arc::new(move |sample: Sample| {
                sink.lock().expect("锁未中毒").push(sample.timestamp);
            })))
            .expect("安装成功");
        assert!(source.emit_sample(Sample {
            timestamp: 5,
            ..Sample::default()
        }));
        source.install_sample_hook(None).expect("卸载成功");
        assert!(!source.emit_sample(Sample::default()));
        assert_eq!(*seen.lock().expect("锁未中毒"), vec![5]);
        assert_eq!(source.install_count(RecordKind::Sample), 1);
    }

    #[test]
    fn refusal_reports_vendor_code() {
        let source = ManualSource::new();
        source.refuse_installs(NonZeroI32::new(-3));
        let err = source
            .install_event_hook(Some(Arc::new(|_event: Event| {})))
            .expect_err("安装应被拒绝");
        assert_eq!(err, SourceError { code: -3 });
        assert!(!source.hook_installed(RecordKind::Event));
        source.refuse_installs(None);
        assert!(source.install_event_hook(Some(Arc::new(|_event: Event| {}))).is_ok());
    }

    #[test]
    fn every_nonzero_refusal_code_is_reported() {
        let source = ManualSource::new();
        for code in [1, -1, i32::MIN, i32::MAX] {
            source.refuse_installs(NonZeroI32::new(code));
            let err = source
                .install_sample_hook(None)
                .expect_err("非零返回码必须拒绝");
            assert_eq!(err.code, code);
        }
        source.refuse_installs(None);
        assert!(source.install_sample_hook(None).is_ok());
    }
}
