//! 字段路由：把一条消息中识别到的字段写入各自的地址空间槽位。

mod bindings;
mod router;

pub use bindings::{CONTAINER_NAME, NodeBindings};
pub use router::{FieldRouter, RouteReport, SlotWrite};

/// Pipeline 错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("binding registration failed: {0}")]
    Binding(#[from] bridge_protocol::ProtocolError),
}
