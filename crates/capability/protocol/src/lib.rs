//! # 地址空间能力模块
//!
//! 为自动化客户端提供结构化、可寻址的节点树：
//! - **AddressSpace**：服务循环驱动的地址空间抽象（建节点、启动、逐轮迭代、写值、关闭）
//! - **NodeServer**：进程内实现，写值同步可见并产生变化通知
//! - **NotificationEndpoint**：TCP 端点，按行推送 JSON 变化通知
//!
//! ## 架构设计
//!
//! ```text
//! Router (字段写入)
//!       │ write_value
//!       ▼
//! NodeServer ── pending DataChange ──┐
//!       │                            │ iterate
//!       ├── subscribe() 进程内订阅 ◀─┤
//!       └── NotificationEndpoint  ◀──┘
//! ```
//!
//! ## 节点布局
//!
//! ```text
//! Objects (ns=0;i=85)
//! └── MQTT (ns=1;s=MQTT)
//!     ├── Status       (ns=1;s=MQTT.Status, String)
//!     ├── CurrentQty   (ns=1;s=MQTT.CurrentQty, Double)
//!     └── ...
//! ```

mod address_space;
mod endpoint;
mod error;
mod node_server;
mod types;

pub use address_space::AddressSpace;
pub use endpoint::{DEFAULT_MAX_CLIENT_BUFFER, NotificationEndpoint};
pub use error::ProtocolError;
pub use node_server::{NodeServer, NodeServerConfig};
pub use types::{DataChange, DataValue, NodeId, VariableSpec};
