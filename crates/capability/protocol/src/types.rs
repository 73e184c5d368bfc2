//! 地址空间相关类型定义

use domain::{FieldKind, FieldValue};
use serde::Serialize;
use std::fmt;

/// 节点标识
///
/// 文本形式与 OPC UA 一致：`ns=0;i=85`、`ns=1;s=MQTT.Temp`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Numeric { namespace: u16, value: u32 },
    String { namespace: u16, value: String },
}

impl NodeId {
    /// 标准 Objects 文件夹（ns=0;i=85）
    pub const fn objects_folder() -> Self {
        NodeId::Numeric {
            namespace: 0,
            value: 85,
        }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        NodeId::String {
            namespace,
            value: value.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Numeric { namespace, value } => write!(f, "ns={};i={}", namespace, value),
            NodeId::String { namespace, value } => write!(f, "ns={};s={}", namespace, value),
        }
    }
}

/// 变量节点定义
#[derive(Debug, Clone)]
pub struct VariableSpec {
    /// browse name，同时作为字符串 NodeId
    pub browse_name: String,
    /// 显示名
    pub display_name: String,
    /// 声明的数据类型（Double / String）
    pub kind: FieldKind,
}

/// 节点当前值
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub value: FieldValue,
    /// 源时间戳（毫秒）
    pub source_ts_ms: i64,
    /// 每次写入递增，初始为 0
    pub version: u64,
}

/// 变化通知
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    pub node_id: NodeId,
    pub display_name: String,
    pub value: DataValue,
}

/// 端点输出的一行 JSON
#[derive(Debug, Serialize)]
pub(crate) struct NotificationLine<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub node_id: String,
    pub display_name: &'a str,
    pub value: WireValue<'a>,
    pub source_ts_ms: i64,
    pub version: u64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum WireValue<'a> {
    Number(f64),
    Text(&'a str),
}

impl<'a> From<&'a FieldValue> for WireValue<'a> {
    fn from(value: &'a FieldValue) -> Self {
        match value {
            FieldValue::Number(v) => WireValue::Number(*v),
            FieldValue::Text(v) => WireValue::Text(v),
        }
    }
}

impl<'a> NotificationLine<'a> {
    pub fn new(kind: &'static str, change: &'a DataChange) -> Self {
        Self {
            kind,
            node_id: change.node_id.to_string(),
            display_name: &change.display_name,
            value: WireValue::from(&change.value.value),
            source_ts_ms: change.value.source_ts_ms,
            version: change.value.version,
        }
    }

    /// 序列化为以 `\n` 结尾的一行。
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self).unwrap_or_default();
        line.push(b'\n');
        line
    }
}
