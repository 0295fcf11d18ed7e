//! 可选的日志输出安装入口（`fmt` feature）。
//!
//! 库本身只通过 `tracing` 宏发出事件，从不安装订阅者；二进制或宿主绑定层在没有自己的
//! 订阅者时可以调用 [`install_fmt_subscriber`] 获得一份开箱即用的控制台输出。

use thiserror::Error;
use tracing::dispatcher;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

/// 未设置 `RUST_LOG` 时采用的过滤指令。
pub const DEFAULT_FILTER: &str = "tapline=info";

/// 安装失败的原因。
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// 进程内已存在全局订阅者。
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,
    /// 设置全局订阅者时的底层错误。
    #[error("failed to set global tracing subscriber")]
    SetGlobalSubscriber(#[source] SetGlobalDefaultError),
}

/// 安装 `fmt + EnvFilter` 全局订阅者。
///
/// # 教案式说明
/// - **意图（Why）**：宿主常常只想看到缓冲会话的启停与回调安装日志，不愿自行拼装订阅者；
/// - **逻辑（How）**：先检查是否已有全局订阅者，再以 `RUST_LOG`（缺省 [`DEFAULT_FILTER`]）构造过滤器；
/// - **契约（What）**：重复调用或外部已设置订阅者时返回 [`ObservabilityError::SubscriberAlreadySet`]，
///   不会覆盖既有配置。
pub fn install_fmt_subscriber() -> Result<(), ObservabilityError> {
    if dispatcher::has_been_set() {
        return Err(ObservabilityError::SubscriberAlreadySet);
    }
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
        .map_err(ObservabilityError::SetGlobalSubscriber)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_directive_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
