//! 记录模型：外部数据源产出的两类定长记录及其摄取期变换。
//!
//! # 模块定位（Why）
//! - 外部数据源只会通过回调交付两种记录：高频的 [`Sample`] 与低频的 [`Event`]；
//!   二者在缓冲层中走完全相同的路径，因此以 [`Record`] trait 统一抽象，
//!   让队列、缓冲、路由与会话都只需实现一次泛型版本。
//! - [`KindSet`] 用显式的小集合描述“某会话对哪些记录类别感兴趣”。
//!
//! # 契约说明（What）
//! - 记录一经产生即视为不可变；唯一允许的改写是会话在摄取瞬间应用一次 [`Transform`]。
//! - 所有记录类型均为 `Copy + Send + Sync + 'static`，可在回调线程与消费线程之间按值传递。

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::router::Routed;
use crate::session::Laned;

/// 样本缓冲默认容量（条）。
pub const DEFAULT_SAMPLE_CAPACITY: usize = 1 << 22;

/// 事件缓冲默认容量（条）。
pub const DEFAULT_EVENT_CAPACITY: usize = 1 << 14;

/// 记录类别判别量。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    /// 周期性样本流。
    Sample,
    /// 离散事件流。
    Event,
}

impl RecordKind {
    /// 全部类别，按固定顺序排列。
    pub const ALL: [RecordKind; 2] = [RecordKind::Sample, RecordKind::Event];

    /// 该类别的默认缓冲容量。
    pub const fn default_capacity(self) -> usize {
        match self {
            RecordKind::Sample => DEFAULT_SAMPLE_CAPACITY,
            RecordKind::Event => DEFAULT_EVENT_CAPACITY,
        }
    }

    /// 稳定的小写名称，用于日志字段。
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::Sample => "sample",
            RecordKind::Event => "event",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单眼数据子结构。
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeData {
    pub gaze_x: f64,
    pub gaze_y: f64,
    pub diam: f64,
    pub eye_position_x: f64,
    pub eye_position_y: f64,
    pub eye_position_z: f64,
}

/// 样本记录。
///
/// `plane_number` 原样透传；目前受支持的设备都不会填写该字段。
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub plane_number: i32,
    pub left_eye: EyeData,
    pub right_eye: EyeData,
}

/// 事件记录。
///
/// `eye` 取值为 `'l'` 或 `'r'`；其他取值在变换时保持不变。
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: char,
    pub eye: char,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub position_x: f64,
    pub position_y: f64,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            event_type: 'F',
            eye: 'l',
            start_time: 0,
            end_time: 0,
            duration: 0,
            position_x: 0.0,
            position_y: 0.0,
        }
    }
}

/// 会话级摄取变换。
///
/// # 教案式说明
/// - **意图 (Why)**：部分设备安装方式会导致左右眼数据颠倒，需要在入库前统一纠正；
///   放在摄取路径上做一次，检索时即可直接使用，且不会被重复应用。
/// - **契约 (What)**：`Identity` 不改变记录；`SwapEyes` 对样本交换 `left_eye`/`right_eye`，
///   对事件在 `'l'` 与 `'r'` 之间翻转 `eye`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    #[default]
    Identity,
    SwapEyes,
}

impl Transform {
    pub(crate) const fn to_bits(self) -> u8 {
        match self {
            Transform::Identity => 0,
            Transform::SwapEyes => 1,
        }
    }

    pub(crate) const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Transform::SwapEyes,
            _ => Transform::Identity,
        }
    }
}

impl From<bool> for Transform {
    fn from(swap_eyes: bool) -> Self {
        if swap_eyes {
            Transform::SwapEyes
        } else {
            Transform::Identity
        }
    }
}

/// 缓冲层可承载的记录类型。
///
/// 仅 [`Sample`] 与 [`Event`] 实现该 trait；路由与会话通过其私有超 trait 选择对应的
/// 每类别插槽，因此外部无法为其他类型实现。
pub trait Record:
    Copy + Send + Sync + fmt::Debug + PartialEq + 'static + Routed + Laned
{
    /// 记录所属类别。
    const KIND: RecordKind;

    /// 返回应用变换后的新记录。
    fn transformed(self, transform: Transform) -> Self;
}

impl Record for Sample {
    const KIND: RecordKind = RecordKind::Sample;

    fn transformed(mut self, transform: Transform) -> Self {
        if transform == Transform::SwapEyes {
            core::mem::swap(&mut self.left_eye, &mut self.right_eye);
        }
        self
    }
}

impl Record for Event {
    const KIND: RecordKind = RecordKind::Event;

    fn transformed(mut self, transform: Transform) -> Self {
        if transform == Transform::SwapEyes {
            self.eye = match self.eye {
                'l' => 'r',
                'r' => 'l',
                other => other,
            };
        }
        self
    }
}

/// 记录类别的小型集合。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KindSet {
    sample: bool,
    event: bool,
}

impl KindSet {
    /// 空集合。
    pub const fn empty() -> Self {
        Self {
            sample: false,
            event: false,
        }
    }

    /// 插入类别，返回插入前是否缺失。
    pub fn insert(&mut self, kind: RecordKind) -> bool {
        let slot = self.slot_mut(kind);
        let fresh = !*slot;
        *slot = true;
        fresh
    }

    /// 移除类别，返回移除前是否存在。
    pub fn remove(&mut self, kind: RecordKind) -> bool {
        let slot = self.slot_mut(kind);
        let present = *slot;
        *slot = false;
        present
    }

    pub const fn contains(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Sample => self.sample,
            RecordKind::Event => self.event,
        }
    }

    pub const fn is_empty(&self) -> bool {
        !self.sample && !self.event
    }

    /// 按 [`RecordKind::ALL`] 的顺序遍历集合成员。
    pub fn iter(&self) -> impl Iterator<Item = RecordKind> + '_ {
        RecordKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    fn slot_mut(&mut self, kind: RecordKind) -> &mut bool {
        match kind {
            RecordKind::Sample => &mut self.sample,
            RecordKind::Event => &mut self.event,
        }
    }
}

impl FromIterator<RecordKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = RecordKind>>(iter: I) -> Self {
        let mut set = KindSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}
