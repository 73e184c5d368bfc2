use crate::{IngestError, PubSubClient, RawEventHandler};
use domain::RawEvent;
use rumqttc::{
    Client, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS, RecvTimeoutError,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const DISCONNECT_DRAIN: Duration = Duration::from_millis(500);
const PEM_CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 设置后启用 CA 校验的 TLS 传输。
    pub ca_file: Option<PathBuf>,
    pub keep_alive: Duration,
    /// connect / reconnect / SUBACK 等待的上限。
    pub connect_timeout: Duration,
    /// `poll_once` 单次等待的上限。
    pub poll_timeout: Duration,
}

/// MQTT 采集源（同步 Client + Connection，由服务循环逐次驱动）。
///
/// 会话为 clean session：每次 CONNACK（首次除外）都会重新订阅 topic。
pub struct MqttSource {
    config: MqttSourceConfig,
    client: Client,
    connection: rumqttc::Connection,
    connected: bool,
    subscribed: bool,
    closed: bool,
    backlog: VecDeque<RawEvent>,
}

impl MqttSource {
    /// 校验参数、装配 TLS 并创建客户端对象，不发起网络连接。
    pub fn new(config: MqttSourceConfig) -> Result<Self, IngestError> {
        let host = config.host.trim();
        if host.is_empty() {
            return Err(IngestError::ClientCreate("empty broker host".to_string()));
        }
        if config.client_id.trim().is_empty() || config.client_id.starts_with(' ') {
            return Err(IngestError::ClientCreate(format!(
                "invalid client id: {:?}",
                config.client_id
            )));
        }
        if config.keep_alive < Duration::from_secs(1) {
            return Err(IngestError::ClientCreate(
                "keep alive must be at least 1s".to_string(),
            ));
        }

        let mut options = MqttOptions::new(config.client_id.clone(), host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        if let Some(ca_file) = config.ca_file.as_ref() {
            let ca = load_ca_certificate(ca_file)?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        let (client, connection) = Client::new(options, REQUEST_CHANNEL_CAPACITY);
        info!(
            target: "bridge.ingest",
            host = %host,
            port = config.port,
            client_id = %config.client_id,
            tls = config.ca_file.is_some(),
            "mqtt_client_created"
        );
        Ok(Self {
            config,
            client,
            connection,
            connected: false,
            subscribed: false,
            closed: false,
            backlog: VecDeque::new(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// 阻塞等待 CONNACK（上限 connect_timeout）。
    pub fn connect(&mut self) -> Result<(), IngestError> {
        self.wait_for_connack()?;
        info!(
            target: "bridge.ingest",
            host = %self.config.host,
            port = self.config.port,
            "mqtt_connected"
        );
        Ok(())
    }

    /// 以 QoS 0 订阅配置的 topic，并阻塞等待 SUBACK。
    pub fn subscribe(&mut self) -> Result<(), IngestError> {
        self.client
            .try_subscribe(self.config.topic.clone(), QoS::AtMostOnce)
            .map_err(|err| IngestError::Subscribe(err.to_string()))?;

        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(IngestError::Subscribe("timed out waiting for SUBACK".to_string()));
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::SubAck(ack)))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(IngestError::Subscribe(format!(
                            "broker rejected {}",
                            self.config.topic
                        )));
                    }
                    self.subscribed = true;
                    info!(target: "bridge.ingest", topic = %self.config.topic, "mqtt_subscribed");
                    return Ok(());
                }
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    self.backlog
                        .push_back(RawEvent::new(publish.topic, publish.payload.to_vec()));
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    self.connected = false;
                    return Err(IngestError::Subscribe(err.to_string()));
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(IngestError::Subscribe("timed out waiting for SUBACK".to_string()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.connected = false;
                    return Err(IngestError::Subscribe("client disconnected".to_string()));
                }
            }
        }
    }

    fn wait_for_connack(&mut self) -> Result<(), IngestError> {
        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(IngestError::Connect("timed out waiting for CONNACK".to_string()));
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    self.connected = true;
                    if self.subscribed {
                        self.resubscribe();
                    }
                    return Ok(());
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(IngestError::Connect(describe(&err))),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(IngestError::Connect("timed out waiting for CONNACK".to_string()));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(IngestError::Disconnected),
            }
        }
    }

    /// clean session 重连后订阅丢失，SUBACK 在后续 poll 中确认。
    fn resubscribe(&mut self) {
        match self
            .client
            .try_subscribe(self.config.topic.clone(), QoS::AtMostOnce)
        {
            Ok(()) => {
                info!(target: "bridge.ingest", topic = %self.config.topic, "mqtt_resubscribe_requested");
            }
            Err(err) => {
                warn!(
                    target: "bridge.ingest",
                    topic = %self.config.topic,
                    error = %err,
                    "mqtt_resubscribe_failed"
                );
            }
        }
    }

    fn deliver(&mut self, event: RawEvent, handler: &mut dyn RawEventHandler) {
        bridge_telemetry::record_message_received();
        debug!(
            target: "bridge.ingest",
            topic = %event.topic,
            bytes = event.payload.len(),
            "mqtt_message_received"
        );
        handler.handle(event);
    }
}

impl PubSubClient for MqttSource {
    fn poll_once(&mut self, handler: &mut dyn RawEventHandler) -> Result<usize, IngestError> {
        if self.closed {
            return Err(IngestError::Disconnected);
        }
        let mut delivered = 0;
        while let Some(event) = self.backlog.pop_front() {
            self.deliver(event, handler);
            delivered += 1;
        }
        // 断线期间不在短超时里发起连接，交给 reconnect 有界等待。
        if !self.connected {
            return Err(IngestError::Disconnected);
        }

        match self.connection.recv_timeout(self.config.poll_timeout) {
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                let event = RawEvent::new(publish.topic, publish.payload.to_vec());
                self.deliver(event, handler);
                delivered += 1;
            }
            Ok(Ok(Event::Incoming(Packet::SubAck(ack)))) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    warn!(
                        target: "bridge.ingest",
                        topic = %self.config.topic,
                        "mqtt_resubscribe_rejected"
                    );
                }
            }
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                if self.subscribed {
                    self.resubscribe();
                }
            }
            Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                self.connected = false;
                return Err(IngestError::Connection("broker sent DISCONNECT".to_string()));
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                self.connected = false;
                return Err(IngestError::Connection(describe(&err)));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                self.connected = false;
                return Err(IngestError::Disconnected);
            }
        }
        Ok(delivered)
    }

    fn reconnect(&mut self) -> Result<(), IngestError> {
        if self.closed {
            return Err(IngestError::Disconnected);
        }
        self.connected = false;
        self.wait_for_connack()?;
        info!(
            target: "bridge.ingest",
            host = %self.config.host,
            port = self.config.port,
            "mqtt_reconnected"
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Err(err) = self.client.try_disconnect() {
            warn!(target: "bridge.ingest", error = %err, "mqtt_disconnect_request_failed");
            return;
        }
        // 有界地推进事件循环，直到 DISCONNECT 真正写出。
        let deadline = Instant::now() + DISCONNECT_DRAIN;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(target: "bridge.ingest", "mqtt_disconnect_drain_timeout");
                return;
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) => {
                    info!(target: "bridge.ingest", "mqtt_disconnected");
                    return;
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => return,
            }
        }
    }
}

impl Drop for MqttSource {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// 读取 CA 文件并确认包含 PEM 证书；证书链本身在握手时校验。
fn load_ca_certificate(path: &Path) -> Result<Vec<u8>, IngestError> {
    let ca = std::fs::read(path)
        .map_err(|err| IngestError::Tls(format!("{}: {}", path.display(), err)))?;
    if !String::from_utf8_lossy(&ca).contains(PEM_CERTIFICATE_MARKER) {
        return Err(IngestError::Tls(format!(
            "{}: no PEM certificate found",
            path.display()
        )));
    }
    Ok(ca)
}

fn describe(err: &ConnectionError) -> String {
    match err {
        ConnectionError::ConnectionRefused(code) => format!("connection refused: {:?}", code),
        other => other.to_string(),
    }
}
