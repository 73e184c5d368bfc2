use crate::PipelineError;
use bridge_protocol::{AddressSpace, NodeId, VariableSpec};
use domain::SlotId;
use std::collections::HashMap;
use tracing::info;

/// 容器对象名（Objects 下的文件夹）。
pub const CONTAINER_NAME: &str = "MQTT";

/// 槽位到节点的绑定表。
///
/// 启动时一次性注册全部槽位，此后集合不再变化。
#[derive(Debug, Clone)]
pub struct NodeBindings {
    container: NodeId,
    nodes: HashMap<SlotId, NodeId>,
}

impl NodeBindings {
    /// 在地址空间中创建容器与全部槽位节点。
    pub fn register(space: &mut dyn AddressSpace) -> Result<Self, PipelineError> {
        let container = space.add_folder(CONTAINER_NAME, CONTAINER_NAME)?;
        let mut nodes = HashMap::with_capacity(SlotId::ALL.len());
        for slot in SlotId::ALL {
            let spec = VariableSpec {
                browse_name: format!("{}.{}", CONTAINER_NAME, slot.display_name()),
                display_name: slot.display_name().to_string(),
                kind: slot.kind(),
            };
            let node = space.add_variable(&container, spec)?;
            nodes.insert(slot, node);
        }
        info!(
            target: "bridge.router",
            container = %container,
            slots = nodes.len(),
            "node_bindings_registered"
        );
        Ok(Self { container, nodes })
    }

    pub fn container(&self) -> &NodeId {
        &self.container
    }

    /// 注册后每个槽位都有节点。
    pub fn node(&self, slot: SlotId) -> Option<&NodeId> {
        self.nodes.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
