//! 通知端点
//!
//! 监听 TCP 端口，向每个连入的客户端按行推送 JSON 变化通知。
//! 所有操作均为非阻塞，由 `NodeServer::iterate` 每轮驱动一次。
//!
//! ## 输出格式
//!
//! ```text
//! {"type":"snapshot","node_id":"ns=1;s=MQTT.Temp","display_name":"Temp","value":0.0,"source_ts_ms":0,"version":0}
//! {"type":"data_change","node_id":"ns=1;s=MQTT.Temp","display_name":"Temp","value":22.5,"source_ts_ms":1700000000000,"version":1}
//! ```

use crate::error::ProtocolError;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::ops::Range;
use tracing::{debug, info, warn};

/// 单个客户端待发送缓冲上限（字节），超过即断开慢客户端
pub const DEFAULT_MAX_CLIENT_BUFFER: usize = 64 * 1024;

struct EndpointClient {
    stream: TcpStream,
    peer: SocketAddr,
    outbox: Vec<u8>,
}

/// 非阻塞通知端点
pub struct NotificationEndpoint {
    listener: TcpListener,
    clients: Vec<EndpointClient>,
    max_client_buffer: usize,
}

impl NotificationEndpoint {
    /// 绑定监听地址（如 `0.0.0.0:7840`，端口 0 表示随机端口）。
    /// 线路格式为逐行 JSON，不是 OPC UA 二进制协议。
    pub fn bind(addr: &str, max_client_buffer: usize) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(
            target: "bridge.protocol",
            addr = %listener.local_addr()?,
            wire = "json-lines",
            "endpoint_listening"
        );
        Ok(Self {
            listener,
            clients: Vec::new(),
            max_client_buffer,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// 接受所有已就绪的连接，返回新客户端的下标区间
    pub fn accept_pending(&mut self) -> Range<usize> {
        let start = self.clients.len();
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        warn!(target: "bridge.protocol", peer = %peer, error = %err, "endpoint_client_rejected");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    info!(target: "bridge.protocol", peer = %peer, "endpoint_client_connected");
                    self.clients.push(EndpointClient {
                        stream,
                        peer,
                        outbox: Vec::new(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(target: "bridge.protocol", error = %err, "endpoint_accept_failed");
                    break;
                }
            }
        }
        start..self.clients.len()
    }

    /// 向指定客户端排队数据
    pub fn queue_to(&mut self, index: usize, bytes: &[u8]) {
        if let Some(client) = self.clients.get_mut(index) {
            client.outbox.extend_from_slice(bytes);
        }
    }

    /// 向所有客户端排队数据
    pub fn broadcast(&mut self, bytes: &[u8]) {
        for client in &mut self.clients {
            client.outbox.extend_from_slice(bytes);
        }
    }

    /// 尽量写出缓冲数据，并清理已断开或过慢的客户端
    ///
    /// 返回本轮移除的客户端数量。
    pub fn flush(&mut self) -> usize {
        let max_client_buffer = self.max_client_buffer;
        let before = self.clients.len();
        self.clients.retain_mut(|client| {
            if !Self::poll_open(client) {
                info!(target: "bridge.protocol", peer = %client.peer, "endpoint_client_closed");
                return false;
            }
            if let Err(err) = Self::write_outbox(client) {
                warn!(target: "bridge.protocol", peer = %client.peer, error = %err, "endpoint_client_write_failed");
                return false;
            }
            if client.outbox.len() > max_client_buffer {
                warn!(
                    target: "bridge.protocol",
                    peer = %client.peer,
                    buffered = client.outbox.len(),
                    "endpoint_client_too_slow"
                );
                return false;
            }
            true
        });
        before - self.clients.len()
    }

    /// 关闭端点：最后尝试写出一次，然后断开所有客户端
    pub fn close(&mut self) {
        for client in &mut self.clients {
            let _ = Self::write_outbox(client);
            let _ = client.stream.shutdown(std::net::Shutdown::Both);
        }
        self.clients.clear();
    }

    /// 客户端不发送数据；读到 EOF 视为断开，其余输入丢弃（每轮最多读 16 次）
    fn poll_open(client: &mut EndpointClient) -> bool {
        let mut buf = [0u8; 256];
        for _ in 0..16 {
            match client.stream.read(&mut buf) {
                Ok(0) => return false,
                Ok(n) => {
                    debug!(target: "bridge.protocol", peer = %client.peer, bytes = n, "endpoint_input_ignored");
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return true,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return false,
            }
        }
        true
    }

    fn write_outbox(client: &mut EndpointClient) -> std::io::Result<()> {
        while !client.outbox.is_empty() {
            match client.stream.write(&client.outbox) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    client.outbox.drain(..n);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
