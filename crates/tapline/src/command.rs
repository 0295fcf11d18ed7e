//! 按名称驱动会话的命令面。
//!
//! # 设计动机（Why）
//! - 宿主语言的绑定层通常只能传递“动作名 + 一个可选标量参数”，
//!   为每个绑定重复编写动作表既冗长又容易漂移；
//! - 本模块给出与宿主无关的动作词表与参数校验，绑定层只负责把宿主值翻译为 [`Argument`]
//!   并把 [`Reply`] 转换为宿主容器。
//!
//! # 契约说明（What）
//! - 动作名大小写敏感，未知名称返回 [`BufferError::UnknownAction`]；
//! - 参数类型与动作不匹配时返回 [`BufferError::InvalidArgument`]，不会执行任何副作用；
//! - `new` 在已有会话上等价于 [`BufferSession::reset`]，`delete` 停止并销毁两个类别。

use core::fmt;
use core::str::FromStr;

use alloc::string::ToString;

use crate::error::BufferError;
use crate::record::{Event, RecordKind, Sample, Transform};
use crate::session::{BufferSession, RecordBatch};

/// 动作词表。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    New,
    Delete,
    StartBuffering(RecordKind),
    ClearBuffer(RecordKind),
    StopBuffering(RecordKind),
    Consume(RecordKind),
    Peek(RecordKind),
}

const ACTION_TABLE: [(&str, Action); 12] = [
    ("new", Action::New),
    ("delete", Action::Delete),
    ("startSampleBuffering", Action::StartBuffering(RecordKind::Sample)),
    ("clearSampleBuffer", Action::ClearBuffer(RecordKind::Sample)),
    ("stopSampleBuffering", Action::StopBuffering(RecordKind::Sample)),
    ("consumeSamples", Action::Consume(RecordKind::Sample)),
    ("peekSamples", Action::Peek(RecordKind::Sample)),
    ("startEventBuffering", Action::StartBuffering(RecordKind::Event)),
    ("clearEventBuffer", Action::ClearBuffer(RecordKind::Event)),
    ("stopEventBuffering", Action::StopBuffering(RecordKind::Event)),
    ("consumeEvents", Action::Consume(RecordKind::Event)),
    ("peekEvents", Action::Peek(RecordKind::Event)),
];

impl Action {
    /// 动作的规范名称。
    pub fn name(self) -> &'static str {
        ACTION_TABLE
            .iter()
            .find(|(_, action)| *action == self)
            .map_or("unknown", |(name, _)| *name)
    }
}

impl FromStr for Action {
    type Err = BufferError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ACTION_TABLE
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, action)| *action)
            .ok_or_else(|| BufferError::UnknownAction(raw.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 动作的可选标量参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Argument {
    /// 容量或条数。
    Count(u64),
    /// 逻辑开关：`new` 的换眼标记，`stop*` 的销毁标记。
    Flag(bool),
}

/// 一条待执行的命令。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub argument: Option<Argument>,
}

impl Command {
    pub fn new(action: Action, argument: Option<Argument>) -> Self {
        Self { action, argument }
    }

    /// 解析动作名并附上参数。
    pub fn parse(action: &str, argument: Option<Argument>) -> Result<Self, BufferError> {
        Ok(Self::new(action.parse()?, argument))
    }
}

/// 命令执行结果。
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Done,
    Samples(Vec<Sample>),
    Events(Vec<Event>),
}

impl From<RecordBatch> for Reply {
    fn from(batch: RecordBatch) -> Self {
        match batch {
            RecordBatch::Samples(samples) => Reply::Samples(samples),
            RecordBatch::Events(events) => Reply::Events(events),
        }
    }
}

impl BufferSession {
    /// 执行一条命令。
    pub fn execute(&self, command: Command) -> Result<Reply, BufferError> {
        let Command { action, argument } = command;
        match action {
            Action::New => {
                let swap = expect_flag(action, argument)?.unwrap_or(false);
                self.reset(Transform::from(swap));
                Ok(Reply::Done)
            }
            Action::Delete => {
                if argument.is_some() {
                    tracing::warn!(%action, "unexpected argument ignored");
                }
                self.stop_buffering(RecordKind::Event, Some(true));
                self.stop_buffering(RecordKind::Sample, Some(true));
                Ok(Reply::Done)
            }
            Action::StartBuffering(kind) => {
                let capacity = expect_count(action, argument)?;
                self.start_buffering(kind, capacity)?;
                Ok(Reply::Done)
            }
            Action::ClearBuffer(kind) => {
                self.clear(kind);
                Ok(Reply::Done)
            }
            Action::StopBuffering(kind) => {
                let destroy = expect_flag(action, argument)?;
                self.stop_buffering(kind, destroy);
                Ok(Reply::Done)
            }
            Action::Consume(kind) => {
                let count = expect_count(action, argument)?;
                Ok(self.consume_records(kind, count).into())
            }
            Action::Peek(kind) => {
                let count = expect_count(action, argument)?;
                Ok(self.peek_records(kind, count).into())
            }
        }
    }
}

fn expect_count(action: Action, argument: Option<Argument>) -> Result<Option<usize>, BufferError> {
    match argument {
        None => Ok(None),
        // 超出平台宽度的请求按“全部”处理。
        Some(Argument::Count(value)) => Ok(Some(usize::try_from(value).unwrap_or(usize::MAX))),
        Some(Argument::Flag(_)) => Err(BufferError::InvalidArgument {
            action: action.name(),
            detail: "expected an unsigned count",
        }),
    }
}

fn expect_flag(action: Action, argument: Option<Argument>) -> Result<Option<bool>, BufferError> {
    match argument {
        None => Ok(None),
        Some(Argument::Flag(flag)) => Ok(Some(flag)),
        Some(Argument::Count(_)) => Err(BufferError::InvalidArgument {
            action: action.name(),
            detail: "expected a logical flag",
        }),
    }
}
