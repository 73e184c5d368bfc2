//! MQTT → OPC UA 桥接服务
//!
//! 订阅一个 topic，把报文中的已知字段写入地址空间槽位，供自动化客户端读取与订阅。
//! 启动阶段失败以不同退出码结束；进入服务循环后的故障只重试，不退出。

mod service;

use bridge_config::{AppConfig, ConfigError};
use bridge_ingest::{IngestError, MqttSource, MqttSourceConfig};
use bridge_pipeline::{FieldRouter, NodeBindings, PipelineError};
use bridge_protocol::{AddressSpace, NodeServer, NodeServerConfig, ProtocolError};
use bridge_telemetry::init_tracing;
use clap::Parser;
use service::{BridgeService, ServiceSettings, ShutdownSignal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

const EXIT_USAGE: u8 = 64;

/// 位置参数覆盖对应的 BRIDGE_* 环境变量。
#[derive(Parser, Debug)]
#[command(name = "mqtt-opcua-bridge")]
#[command(version)]
#[command(about = "Bridge MQTT telemetry into an OPC UA style address space")]
#[command(
    after_help = "Slot changes are served on BRIDGE_ENDPOINT_ADDR (default 0.0.0.0:7840) \
as newline-delimited JSON; this endpoint does not speak the OPC UA binary protocol."
)]
struct Cli {
    /// Broker host (default: localhost)
    host: Option<String>,

    /// Broker port (default: 1883)
    port: Option<u16>,

    /// Topic to subscribe (default: esp32/data)
    topic: Option<String>,

    /// Username for broker authentication
    username: Option<String>,

    /// Password for broker authentication
    password: Option<String>,

    /// CA certificate file; enables TLS
    ca_file: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        if let Some(host) = self.host {
            config.mqtt_host = host;
        }
        if let Some(port) = self.port {
            config.mqtt_port = port;
        }
        if let Some(topic) = self.topic {
            config.mqtt_topic = topic;
        }
        if let Some(username) = self.username {
            config.mqtt_username = Some(username);
        }
        if let Some(password) = self.password {
            config.mqtt_password = Some(password);
        }
        if let Some(ca_file) = self.ca_file {
            config.mqtt_ca_file = Some(ca_file);
        }
    }
}

/// 启动阶段错误，每类对应一个退出码。
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("address space startup failed: {0}")]
    AddressSpace(String),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl From<ProtocolError> for StartupError {
    fn from(err: ProtocolError) -> Self {
        StartupError::AddressSpace(err.to_string())
    }
}

impl From<PipelineError> for StartupError {
    fn from(err: PipelineError) -> Self {
        StartupError::AddressSpace(err.to_string())
    }
}

impl StartupError {
    fn exit_code(&self) -> u8 {
        match self {
            StartupError::AddressSpace(_) => 1,
            StartupError::Ingest(IngestError::ClientCreate(_)) => 2,
            StartupError::Ingest(IngestError::Tls(_)) => 3,
            StartupError::Ingest(
                IngestError::Connect(_) | IngestError::Connection(_) | IngestError::Disconnected,
            ) => 4,
            StartupError::Ingest(IngestError::Subscribe(_)) => 5,
            StartupError::Config(_) => EXIT_USAGE,
        }
    }
}

fn main() -> ExitCode {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                target: "bridge.service",
                error = %err,
                exit_code = err.exit_code(),
                "startup_failed"
            );
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), StartupError> {
    let mut config = AppConfig::from_env()?;
    cli.apply(&mut config);

    // 1. 地址空间：容器 + 8 个槽位，再启动端点
    let mut space = NodeServer::new(NodeServerConfig {
        endpoint_addr: Some(config.endpoint_addr.clone()),
        ..NodeServerConfig::default()
    });
    let bindings = NodeBindings::register(&mut space)?;
    space.startup()?;

    // 2-5. 客户端创建（含 TLS）、连接、订阅
    let mut source = MqttSource::new(MqttSourceConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        topic: config.mqtt_topic.clone(),
        client_id: config.mqtt_client_id.clone(),
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        ca_file: config.mqtt_ca_file.clone(),
        keep_alive: config.keep_alive(),
        connect_timeout: config.connect_timeout(),
        poll_timeout: config.poll_timeout(),
    })?;
    source.connect()?;
    source.subscribe()?;

    let shutdown = match ShutdownSignal::install() {
        Ok(signal) => signal,
        Err(err) => {
            warn!(target: "bridge.service", error = %err, "signal_handler_install_failed");
            ShutdownSignal::new()
        }
    };

    info!(
        target: "bridge.service",
        host = %config.mqtt_host,
        port = config.mqtt_port,
        topic = %config.mqtt_topic,
        endpoint = ?space.endpoint_addr(),
        "bridge_ready"
    );

    let router = FieldRouter::new(bindings, config.text_max_len);
    let settings = ServiceSettings {
        reconnect_backoff: config.reconnect_backoff(),
        stats_interval: config.stats_interval(),
    };
    let mut service = BridgeService::new(space, source, router, settings);
    service.run(&shutdown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_arguments_override_config() {
        let cli = Cli::try_parse_from([
            "mqtt-opcua-bridge",
            "broker.local",
            "8883",
            "plant/line1",
            "user",
            "secret",
            "/etc/ssl/ca.pem",
        ])
        .expect("args");
        let mut config = AppConfig::from_env().expect("config");
        cli.apply(&mut config);
        assert_eq!(config.mqtt_host, "broker.local");
        assert_eq!(config.mqtt_port, 8883);
        assert_eq!(config.mqtt_topic, "plant/line1");
        assert_eq!(config.mqtt_username.as_deref(), Some("user"));
        assert_eq!(config.mqtt_password.as_deref(), Some("secret"));
        assert_eq!(config.mqtt_ca_file, Some(PathBuf::from("/etc/ssl/ca.pem")));
    }

    #[test]
    fn invalid_port_is_a_usage_error() {
        let err = Cli::try_parse_from(["mqtt-opcua-bridge", "localhost", "port"])
            .expect_err("not a port");
        assert!(err.use_stderr());
    }

    #[test]
    fn help_describes_the_json_lines_endpoint() {
        use clap::CommandFactory;
        let help = Cli::command().render_help().to_string();
        assert!(help.contains("newline-delimited JSON"));
        assert!(help.contains("7840"));
    }

    #[test]
    fn startup_stages_have_distinct_exit_codes() {
        let codes = [
            StartupError::AddressSpace("bind".to_string()).exit_code(),
            StartupError::from(IngestError::ClientCreate("id".to_string())).exit_code(),
            StartupError::from(IngestError::Tls("ca".to_string())).exit_code(),
            StartupError::from(IngestError::Connect("refused".to_string())).exit_code(),
            StartupError::from(IngestError::Subscribe("rejected".to_string())).exit_code(),
        ];
        assert_eq!(codes, [1, 2, 3, 4, 5]);
    }
}
