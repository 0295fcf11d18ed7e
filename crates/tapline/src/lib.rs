#![deny(unsafe_code)]
#![allow(private_bounds)]
#![doc = "tapline: 外部回调数据流的并发摄取与检索缓冲核心。"]
#![doc = ""]
#![doc = "外部数据源在自己的线程上通过回调逐条交付样本与事件记录；客户端会话按需启停缓冲，"]
#![doc = "并在任意线程上消费（取走最早的 N 条）或查看（复制最近的 N 条）已缓冲的数据。"]

//! # 模块地图（How）
//! - [`record`]：记录模型、摄取变换与类别集合；
//! - [`queue`] / [`guarded`] / [`storage`]：两种存储策略及其统一封装；
//! - [`source`]：外部数据源边界与进程内替身 [`ManualSource`]；
//! - [`router`]：每类别单一回调的扇出注册表；
//! - [`session`]：客户端持有的缓冲会话；
//! - [`command`]：与宿主语言无关的动作名命令面；
//! - [`config`]：可从 TOML 装载的会话配置。
//!
//! # 契约说明（What）
//! - 回调路径不会因检索而长时间阻塞：有界存储完全无锁，可增长存储的检索只在持锁期间做一次移动或拷贝；
//! - 所有公开类型均满足 `Send + Sync`，会话可以在线程间共享引用。

extern crate alloc;

mod sync;

pub mod command;
pub mod config;
pub mod error;
pub mod guarded;
#[cfg(feature = "fmt")]
pub mod observability;
#[allow(unsafe_code)]
pub mod queue;
pub mod record;
pub mod router;
pub mod session;
pub mod source;
pub mod storage;

/// 检索“全部”的哨兵条数。
pub const ALL: usize = usize::MAX;

pub use command::{Action, Argument, Command, Reply};
pub use config::SessionConfig;
pub use error::{BufferError, Result};
pub use guarded::GuardedBuffer;
pub use queue::BoundedQueue;
pub use record::{Event, EyeData, KindSet, Record, RecordKind, Sample, Transform};
pub use router::{SessionId, StreamRouter};
pub use session::{BufferSession, LaneStats, RecordBatch};
pub use source::{Hook, ManualSource, RecordSource, SourceError};
pub use storage::StoragePolicy;
