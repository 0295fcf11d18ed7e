//! 会话配置。
//!
//! # 设计动机（Why）
//! - 存储策略、默认容量、检索默认条数与摄取变换都属于部署期决策，
//!   集中为一个可从 TOML 装载的结构，避免散落在调用点的魔法数字。
//!
//! # 契约说明（What）
//! - 所有字段均有默认值，缺省文本即得到与历史行为一致的配置；
//! - 未知键直接拒绝，防止拼写错误被静默忽略；
//! - [`SessionConfig::validate`] 在会话创建前检查有界策略的容量是否合法。

use alloc::string::ToString;

use serde::{Deserialize, Serialize};

use crate::ALL;
use crate::error::BufferError;
use crate::record::{DEFAULT_EVENT_CAPACITY, DEFAULT_SAMPLE_CAPACITY, RecordKind, Transform};
use crate::storage::StoragePolicy;

/// 检索时未指定条数的 `consume` 默认值：全部。
pub const DEFAULT_CONSUME_AMOUNT: usize = ALL;

/// 检索时未指定条数的 `peek` 默认值：最近一条。
pub const DEFAULT_PEEK_AMOUNT: usize = 1;

/// 缓冲会话配置。
///
/// ```toml
/// storage = "bounded"
/// sample-capacity = 4096
/// transform = "swap-eyes"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SessionConfig {
    pub storage: StoragePolicy,
    pub sample_capacity: usize,
    pub event_capacity: usize,
    pub transform: Transform,
    pub consume_default: usize,
    pub peek_default: usize,
    /// `stop_buffering` 未指定时是否同时销毁存储。
    pub stop_destroys: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage: StoragePolicy::default(),
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            transform: Transform::Identity,
            consume_default: DEFAULT_CONSUME_AMOUNT,
            peek_default: DEFAULT_PEEK_AMOUNT,
            stop_destroys: false,
        }
    }
}

impl SessionConfig {
    /// 从 TOML 文本装载并校验。
    pub fn from_toml_str(raw: &str) -> Result<Self, BufferError> {
        let config: SessionConfig =
            toml::from_str(raw).map_err(|err| BufferError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验默认容量与所选策略是否相容。
    pub fn validate(&self) -> Result<(), BufferError> {
        for kind in RecordKind::ALL {
            self.storage
                .validate_capacity(self.default_capacity(kind))
                .map_err(|err| BufferError::InvalidConfig(err.to_string()))?;
        }
        Ok(())
    }

    /// 某类别在未显式指定容量时使用的容量。
    pub fn default_capacity(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Sample => self.sample_capacity,
            RecordKind::Event => self.event_capacity,
        }
    }

    pub fn with_storage(mut self, storage: StoragePolicy) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_capacity(mut self, kind: RecordKind, capacity: usize) -> Self {
        match kind {
            RecordKind::Sample => self.sample_capacity = capacity,
            RecordKind::Event => self.event_capacity = capacity,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SessionConfig::from_toml_str("").expect("空文本合法");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.consume_default, ALL);
        assert_eq!(config.peek_default, 1);
        assert_eq!(config.default_capacity(RecordKind::Sample), 1 << 22);
        assert_eq!(config.default_capacity(RecordKind::Event), 1 << 14);
        assert!(!config.stop_destroys);
    }

    #[test]
    fn kebab_case_keys_are_parsed() {
        let config = SessionConfig::from_toml_str(
            r#"
            storage = "bounded"
            sample-capacity = 4096
            event-capacity = 64
            transform = "swap-eyes"
            peek-default = 3
            stop-destroys = true
            "#,
        )
        .expect("合法配置");
        assert_eq!(config.storage, StoragePolicy::Bounded);
        assert_eq!(config.sample_capacity, 4096);
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.transform, Transform::SwapEyes);
        assert_eq!(config.peek_default, 3);
        assert!(config.stop_destroys);
    }

    #[test]
    fn unknown_keys_and_bad_capacities_are_rejected() {
        let unknown = SessionConfig::from_toml_str("sample-size = 3");
        assert!(matches!(unknown, Err(BufferError::InvalidConfig(_))));

        let bad = SessionConfig::from_toml_str(
            r#"
            storage = "bounded"
            event-capacity = 100
            "#,
        );
        assert!(matches!(bad, Err(BufferError::InvalidConfig(_))));

        let growable = SessionConfig::from_toml_str("event-capacity = 100").expect("可增长不限容量");
        assert_eq!(growable.event_capacity, 100);
    }
}
