//! 订阅端接入：把 broker 上的消息逐条交给 `RawEventHandler`。
//!
//! 服务循环每轮调用一次 `PubSubClient::poll_once`，消息在同一线程内同步投递。

mod mqtt;

use domain::RawEvent;

pub use mqtt::{MqttSource, MqttSourceConfig};

/// 采集错误。前四类对应启动阶段，后两类出现在服务循环内。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("client create failed: {0}")]
    ClientCreate(String),
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("client disconnected")]
    Disconnected,
}

/// RawEvent 处理器。
pub trait RawEventHandler {
    fn handle(&mut self, event: RawEvent);
}

impl<F> RawEventHandler for F
where
    F: FnMut(RawEvent),
{
    fn handle(&mut self, event: RawEvent) {
        self(event)
    }
}

/// 订阅端客户端抽象。
pub trait PubSubClient {
    /// 推进一次网络处理（有界），返回投递的消息条数。
    fn poll_once(&mut self, handler: &mut dyn RawEventHandler) -> Result<usize, IngestError>;

    /// 有界阻塞地重建会话；失败由调用方决定是否重试。
    fn reconnect(&mut self) -> Result<(), IngestError>;

    /// 断开并释放连接，可重复调用。
    fn disconnect(&mut self);
}
