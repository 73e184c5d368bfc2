//! 桥接服务运行配置加载。

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 桥接服务运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_ca_file: Option<PathBuf>,
    pub mqtt_client_id: String,
    pub mqtt_keep_alive_seconds: u64,
    pub mqtt_connect_timeout_ms: u64,
    pub mqtt_poll_timeout_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub endpoint_addr: String,
    pub text_max_len: usize,
    pub stats_interval_seconds: u64,
}

impl AppConfig {
    /// 从环境变量读取配置，未设置的项使用默认值。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mqtt_host = env::var("BRIDGE_MQTT_HOST").unwrap_or_else(|_| "localhost".to_string());
        let mqtt_port = read_u16_with_default("BRIDGE_MQTT_PORT", 1883)?;
        let mqtt_topic =
            env::var("BRIDGE_MQTT_TOPIC").unwrap_or_else(|_| "esp32/data".to_string());
        let mqtt_username = read_optional("BRIDGE_MQTT_USERNAME");
        let mqtt_password = read_optional("BRIDGE_MQTT_PASSWORD");
        let mqtt_ca_file = read_optional("BRIDGE_MQTT_CA_FILE").map(PathBuf::from);
        let mqtt_client_id =
            read_optional("BRIDGE_MQTT_CLIENT_ID").unwrap_or_else(default_client_id);
        let mqtt_keep_alive_seconds =
            read_u64_with_default("BRIDGE_MQTT_KEEP_ALIVE_SECONDS", 60)?;
        if mqtt_keep_alive_seconds == 0 {
            return Err(ConfigError::Invalid(
                "BRIDGE_MQTT_KEEP_ALIVE_SECONDS".to_string(),
                "0".to_string(),
            ));
        }
        let mqtt_connect_timeout_ms =
            read_u64_with_default("BRIDGE_MQTT_CONNECT_TIMEOUT_MS", 5000)?;
        let mqtt_poll_timeout_ms = read_u64_with_default("BRIDGE_MQTT_POLL_TIMEOUT_MS", 20)?;
        let reconnect_backoff_ms = read_u64_with_default("BRIDGE_RECONNECT_BACKOFF_MS", 200)?;
        let endpoint_addr =
            env::var("BRIDGE_ENDPOINT_ADDR").unwrap_or_else(|_| "0.0.0.0:7840".to_string());
        let text_max_len = read_usize_with_default("BRIDGE_TEXT_MAX_LEN", 128)?;
        let stats_interval_seconds = read_u64_with_default("BRIDGE_STATS_INTERVAL_SECONDS", 60)?;

        Ok(Self {
            mqtt_host,
            mqtt_port,
            mqtt_topic,
            mqtt_username,
            mqtt_password,
            mqtt_ca_file,
            mqtt_client_id,
            mqtt_keep_alive_seconds,
            mqtt_connect_timeout_ms,
            mqtt_poll_timeout_ms,
            reconnect_backoff_ms,
            endpoint_addr,
            text_max_len,
            stats_interval_seconds,
        })
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.mqtt_connect_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.mqtt_poll_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// 计数器周期日志间隔，0 表示关闭。
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_seconds > 0).then(|| Duration::from_secs(self.stats_interval_seconds))
    }
}

/// 默认 client id：`opcua-bridge-<uuid>`。
pub fn default_client_id() -> String {
    format!("opcua-bridge-{}", uuid::Uuid::new_v4().simple())
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 空字符串视为未设置。
fn read_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
