//! 地址空间抽象

use crate::error::ProtocolError;
use crate::types::{DataValue, NodeId, VariableSpec};
use domain::FieldValue;

/// 地址空间子系统
///
/// 由服务循环在单线程内驱动：先建节点，再 `startup`，之后每轮调用一次
/// `iterate`，退出时 `shutdown`。
pub trait AddressSpace {
    /// 在 Objects 下创建文件夹
    fn add_folder(&mut self, browse_name: &str, display_name: &str)
    -> Result<NodeId, ProtocolError>;

    /// 在 `parent` 下创建变量节点，返回其 NodeId
    fn add_variable(&mut self, parent: &NodeId, spec: VariableSpec)
    -> Result<NodeId, ProtocolError>;

    fn startup(&mut self) -> Result<(), ProtocolError>;

    /// 执行一轮有界的内部事件处理（通知投递、端点收发），不阻塞
    ///
    /// 返回本轮投递的变化通知数量。
    fn iterate(&mut self) -> Result<usize, ProtocolError>;

    /// 同步写值；写入立即可读，并触发变化通知
    fn write_value(&mut self, node: &NodeId, value: FieldValue) -> Result<(), ProtocolError>;

    fn read_value(&self, node: &NodeId) -> Option<DataValue>;

    /// 可重复调用
    fn shutdown(&mut self);
}
