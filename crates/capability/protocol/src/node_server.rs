//! 进程内地址空间实现
//!
//! 节点存储 + 变化通知队列 + 可选的网络通知端点。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let mut server = NodeServer::new(NodeServerConfig::default());
//! let folder = server.add_folder("MQTT", "MQTT")?;
//! let temp = server.add_variable(&folder, VariableSpec {
//!     browse_name: "MQTT.Temp".to_string(),
//!     display_name: "Temp".to_string(),
//!     kind: FieldKind::Number,
//! })?;
//! server.startup()?;
//! server.write_value(&temp, FieldValue::Number(22.5))?;
//! server.iterate()?;
//! ```

use crate::address_space::AddressSpace;
use crate::endpoint::{DEFAULT_MAX_CLIENT_BUFFER, NotificationEndpoint};
use crate::error::ProtocolError;
use crate::types::{DataChange, DataValue, NodeId, NotificationLine, VariableSpec};
use bridge_telemetry::record_notifications_sent;
use domain::{FieldKind, FieldValue, now_epoch_ms};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::mpsc::{Receiver, Sender, channel};
use tracing::{debug, info};

/// 地址空间配置
#[derive(Debug, Clone)]
pub struct NodeServerConfig {
    /// 通知端点监听地址；`None` 表示不对外监听
    pub endpoint_addr: Option<String>,
    /// 自定义节点所在命名空间
    pub namespace: u16,
    /// 单个端点客户端的发送缓冲上限
    pub max_client_buffer: usize,
}

impl Default for NodeServerConfig {
    fn default() -> Self {
        Self {
            endpoint_addr: None,
            namespace: 1,
            max_client_buffer: DEFAULT_MAX_CLIENT_BUFFER,
        }
    }
}

#[derive(Debug)]
struct Node {
    node_id: NodeId,
    display_name: String,
    parent: NodeId,
    /// 变量节点的数据类型；文件夹为 `None`
    kind: Option<FieldKind>,
    value: Option<DataValue>,
}

/// 进程内地址空间
pub struct NodeServer {
    config: NodeServerConfig,
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    pending: VecDeque<DataChange>,
    subscribers: Vec<Sender<DataChange>>,
    endpoint: Option<NotificationEndpoint>,
    running: bool,
}

impl NodeServer {
    pub fn new(config: NodeServerConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            index: HashMap::new(),
            pending: VecDeque::new(),
            subscribers: Vec::new(),
            endpoint: None,
            running: false,
        }
    }

    /// 订阅所有变量节点的变化通知（在 `iterate` 中投递）
    pub fn subscribe(&mut self) -> Receiver<DataChange> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 端点实际监听地址（启动后可用）
    pub fn endpoint_addr(&self) -> Option<SocketAddr> {
        self.endpoint
            .as_ref()
            .and_then(|endpoint| endpoint.local_addr().ok())
    }

    pub fn endpoint_clients(&self) -> usize {
        self.endpoint
            .as_ref()
            .map(NotificationEndpoint::client_count)
            .unwrap_or(0)
    }

    /// 待投递的通知数量
    pub fn pending_notifications(&self) -> usize {
        self.pending.len()
    }

    /// 按 browse name 查找节点
    pub fn find_node(&self, browse_name: &str) -> Option<NodeId> {
        let node_id = NodeId::string(self.config.namespace, browse_name);
        self.index.contains_key(&node_id).then_some(node_id)
    }

    /// 某节点的直接子节点（按创建顺序）
    pub fn children(&self, parent: &NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| &node.parent == parent)
            .map(|node| node.node_id.clone())
            .collect()
    }

    fn insert(&mut self, node: Node) -> Result<NodeId, ProtocolError> {
        if self.index.contains_key(&node.node_id) {
            return Err(ProtocolError::DuplicateNode(node.node_id));
        }
        let node_id = node.node_id.clone();
        self.index.insert(node_id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(node_id)
    }

    fn snapshot_lines(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for node in &self.nodes {
            if let Some(value) = &node.value {
                let change = DataChange {
                    node_id: node.node_id.clone(),
                    display_name: node.display_name.clone(),
                    value: value.clone(),
                };
                bytes.extend(NotificationLine::new("snapshot", &change).to_line());
            }
        }
        bytes
    }

    fn deliver(&mut self, change: &DataChange) {
        self.subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.broadcast(&NotificationLine::new("data_change", change).to_line());
        }
    }
}

impl AddressSpace for NodeServer {
    fn add_folder(
        &mut self,
        browse_name: &str,
        display_name: &str,
    ) -> Result<NodeId, ProtocolError> {
        self.insert(Node {
            node_id: NodeId::string(self.config.namespace, browse_name),
            display_name: display_name.to_string(),
            parent: NodeId::objects_folder(),
            kind: None,
            value: None,
        })
    }

    fn add_variable(
        &mut self,
        parent: &NodeId,
        spec: VariableSpec,
    ) -> Result<NodeId, ProtocolError> {
        if !self.index.contains_key(parent) {
            return Err(ProtocolError::UnknownNode(parent.clone()));
        }
        self.insert(Node {
            node_id: NodeId::string(self.config.namespace, spec.browse_name),
            display_name: spec.display_name,
            parent: parent.clone(),
            kind: Some(spec.kind),
            value: Some(DataValue {
                value: FieldValue::initial(spec.kind),
                source_ts_ms: 0,
                version: 0,
            }),
        })
    }

    fn startup(&mut self) -> Result<(), ProtocolError> {
        if self.running {
            return Ok(());
        }
        if let Some(addr) = self.config.endpoint_addr.as_deref() {
            let endpoint = NotificationEndpoint::bind(addr, self.config.max_client_buffer)
                .map_err(|err| ProtocolError::Startup(format!("endpoint {}: {}", addr, err)))?;
            self.endpoint = Some(endpoint);
        }
        self.running = true;
        info!(
            target: "bridge.protocol",
            nodes = self.nodes.len(),
            endpoint = ?self.endpoint_addr(),
            "address_space_started"
        );
        Ok(())
    }

    fn iterate(&mut self) -> Result<usize, ProtocolError> {
        if !self.running {
            return Err(ProtocolError::NotRunning);
        }

        // 1. 先把已排队的变化推给现有订阅者
        let mut delivered = 0;
        while let Some(change) = self.pending.pop_front() {
            self.deliver(&change);
            delivered += 1;
        }

        // 2. 新连入的端点客户端先收到全量快照
        let new_clients = match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.accept_pending(),
            None => 0..0,
        };
        if !new_clients.is_empty() {
            let snapshot = self.snapshot_lines();
            if let Some(endpoint) = self.endpoint.as_mut() {
                for index in new_clients {
                    endpoint.queue_to(index, &snapshot);
                }
            }
        }

        // 3. 非阻塞写出
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.flush();
        }

        if delivered > 0 {
            record_notifications_sent(delivered as u64);
            debug!(target: "bridge.protocol", delivered, "notifications_delivered");
        }
        Ok(delivered)
    }

    fn write_value(&mut self, node: &NodeId, value: FieldValue) -> Result<(), ProtocolError> {
        if !self.running {
            return Err(ProtocolError::NotRunning);
        }
        let slot = *self
            .index
            .get(node)
            .ok_or_else(|| ProtocolError::UnknownNode(node.clone()))?;
        let entry = &mut self.nodes[slot];
        let Some(expected) = entry.kind else {
            return Err(ProtocolError::UnknownNode(node.clone()));
        };
        if value.kind() != expected {
            return Err(ProtocolError::TypeMismatch {
                node: node.clone(),
                expected,
                actual: value.kind(),
            });
        }

        let version = entry
            .value
            .as_ref()
            .map(|current| current.version + 1)
            .unwrap_or(1);
        let data = DataValue {
            value,
            source_ts_ms: now_epoch_ms(),
            version,
        };
        entry.value = Some(data.clone());
        self.pending.push_back(DataChange {
            node_id: entry.node_id.clone(),
            display_name: entry.display_name.clone(),
            value: data,
        });
        Ok(())
    }

    fn read_value(&self, node: &NodeId) -> Option<DataValue> {
        let slot = *self.index.get(node)?;
        self.nodes[slot].value.clone()
    }

    fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        // 关闭前把剩余通知推完
        while let Some(change) = self.pending.pop_front() {
            self.deliver(&change);
        }
        if let Some(mut endpoint) = self.endpoint.take() {
            endpoint.close();
        }
        self.subscribers.clear();
        self.running = false;
        info!(target: "bridge.protocol", "address_space_stopped");
    }
}

impl Drop for NodeServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
