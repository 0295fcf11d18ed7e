//! 原子与内部可变单元的 loom 切换层。
//!
//! 常规构建直接使用 `core` 中的类型；以 `RUSTFLAGS="--cfg loom"` 构建时替换为 loom 的模型类型，
//! 使 [`crate::queue::BoundedQueue`] 的协议可以被穷举调度验证。两套实现对外暴露相同的
//! `with_mut` 访问方式，调用方无需感知差异。

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicUsize, Ordering};

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(loom))]
#[derive(Debug)]
pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self(core::cell::UnsafeCell::new(value))
    }

    #[inline(always)]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;
