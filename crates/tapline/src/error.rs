//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义缓冲核心对外暴露的错误语义；
//! - 空与满是稳态结果而非异常：队满通过布尔/计数报告，未启动的类别检索返回空序列，
//!   二者都不会出现在这里。
//!
//! ## 设计要求（What）
//! - 所有变体派生 [`thiserror::Error`]，并满足 `Clone + Eq`，便于测试直接断言；
//! - 外部数据源的原始返回码通过 [`BufferError::Registration`] 原样上抛。

use alloc::string::String;

use thiserror::Error;

use crate::record::RecordKind;
use crate::source::SourceError;

/// 缓冲核心错误域。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BufferError {
    /// 有界队列容量不是 2 的幂或低于下限，在构造阶段拒绝。
    #[error("bounded capacity {requested} must be a power of two and at least {minimum}")]
    InvalidCapacity { requested: usize, minimum: usize },

    /// 外部数据源拒绝安装回调，会话在该类别上保持未启动。
    #[error("record source refused the {kind} hook (code {code})")]
    Registration { kind: RecordKind, code: i32 },

    /// 进程级路由器已安装。
    #[error("process-wide stream router is already installed")]
    AlreadyInstalled,

    /// 配置文本无法解析或取值非法。
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 命令名不在已知动作表中。
    #[error("unrecognized action `{0}`")]
    UnknownAction(String),

    /// 命令参数与动作不匹配。
    #[error("{action}: {detail}")]
    InvalidArgument {
        action: &'static str,
        detail: &'static str,
    },
}

impl BufferError {
    /// 将数据源错误附上记录类别。
    pub fn registration(kind: RecordKind, source: SourceError) -> Self {
        BufferError::Registration {
            kind,
            code: source.code,
        }
    }
}

/// crate 级 `Result` 别名。
pub type Result<T, E = BufferError> = core::result::Result<T, E>;
