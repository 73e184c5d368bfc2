//! 遥测字段词表与存储槽位。
//!
//! 词表在编译期固定：新增字段需要同时补充 `FieldKey::ALL` 与 `SlotId`。

use std::fmt;

/// 可识别的字段 key（payload 中的原始写法）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    CurrentQty,
    SetQty,
    Temp,
    Status,
    RunningTime,
    ErrorCode,
    DeviceId,
}

/// 字段值的类型由 key 决定，不从 payload 推断。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
}

impl FieldKey {
    /// 路由顺序即此数组顺序。
    pub const ALL: [FieldKey; 7] = [
        FieldKey::CurrentQty,
        FieldKey::SetQty,
        FieldKey::Temp,
        FieldKey::Status,
        FieldKey::RunningTime,
        FieldKey::ErrorCode,
        FieldKey::DeviceId,
    ];

    /// payload 中的 key 文本。`errocode` 的拼写与设备固件保持一致。
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::CurrentQty => "currentQty",
            FieldKey::SetQty => "setQty",
            FieldKey::Temp => "temp",
            FieldKey::Status => "status",
            FieldKey::RunningTime => "runningTime",
            FieldKey::ErrorCode => "errocode",
            FieldKey::DeviceId => "deviceID",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldKey::Status | FieldKey::DeviceId => FieldKind::Text,
            _ => FieldKind::Number,
        }
    }

    /// 字段对应的存储槽位（1:1）。
    pub fn slot(&self) -> SlotId {
        match self {
            FieldKey::CurrentQty => SlotId::CurrentQty,
            FieldKey::SetQty => SlotId::SetQty,
            FieldKey::Temp => SlotId::Temp,
            FieldKey::Status => SlotId::Status,
            FieldKey::RunningTime => SlotId::RunningTime,
            FieldKey::ErrorCode => SlotId::ErrorCode,
            FieldKey::DeviceId => SlotId::DeviceId,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 地址空间中的固定槽位：7 个字段槽位 + 最近一条原始消息。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Status,
    CurrentQty,
    SetQty,
    Temp,
    RunningTime,
    DeviceId,
    ErrorCode,
    LastMessage,
}

impl SlotId {
    /// 注册顺序（节点创建顺序）。
    pub const ALL: [SlotId; 8] = [
        SlotId::Status,
        SlotId::CurrentQty,
        SlotId::SetQty,
        SlotId::Temp,
        SlotId::RunningTime,
        SlotId::DeviceId,
        SlotId::ErrorCode,
        SlotId::LastMessage,
    ];

    /// 节点显示名（同时用于 browse name 后缀）。
    pub fn display_name(&self) -> &'static str {
        match self {
            SlotId::Status => "Status",
            SlotId::CurrentQty => "CurrentQty",
            SlotId::SetQty => "SetQty",
            SlotId::Temp => "Temp",
            SlotId::RunningTime => "runningTime",
            SlotId::DeviceId => "deviceID",
            SlotId::ErrorCode => "errocode",
            SlotId::LastMessage => "LastMessage",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            SlotId::Status | SlotId::DeviceId | SlotId::LastMessage => FieldKind::Text,
            _ => FieldKind::Number,
        }
    }
}

/// 解析后的字段值。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Text(_) => FieldKind::Text,
        }
    }

    /// 对应类型的初始值（节点创建时使用）。
    pub fn initial(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Number => FieldValue::Number(0.0),
            FieldKind::Text => FieldValue::Text(String::new()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{:.3}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}
