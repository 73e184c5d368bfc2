//! 地址空间错误类型定义

use crate::types::NodeId;
use domain::FieldKind;

/// 地址空间错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 启动失败（端点绑定等）
    #[error("startup failed: {0}")]
    Startup(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 节点不存在
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// 节点已存在
    #[error("duplicate node: {0}")]
    DuplicateNode(NodeId),

    /// 写入值类型与节点声明类型不符
    #[error("type mismatch for {node}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        node: NodeId,
        expected: FieldKind,
        actual: FieldKind,
    },

    /// 未启动或已关闭
    #[error("address space not running")]
    NotRunning,
}
