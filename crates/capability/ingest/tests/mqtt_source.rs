use bridge_ingest::{IngestError, MqttSource, MqttSourceConfig, PubSubClient, RawEventHandler};
use domain::RawEvent;
use std::io::Write;
use std::time::Duration;

fn config() -> MqttSourceConfig {
    MqttSourceConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        topic: "esp32/data".to_string(),
        client_id: "bridge-ingest-test".to_string(),
        username: None,
        password: None,
        ca_file: None,
        keep_alive: Duration::from_secs(5),
        connect_timeout: Duration::from_millis(500),
        poll_timeout: Duration::from_millis(10),
    }
}

#[test]
fn empty_host_fails_at_client_create() {
    let mut config = config();
    config.host = "  ".to_string();
    assert!(matches!(
        MqttSource::new(config),
        Err(IngestError::ClientCreate(_))
    ));
}

#[test]
fn blank_client_id_fails_at_client_create() {
    let mut config = config();
    config.client_id = " ".to_string();
    assert!(matches!(
        MqttSource::new(config),
        Err(IngestError::ClientCreate(_))
    ));
}

#[test]
fn missing_ca_file_fails_at_tls_stage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config();
    config.ca_file = Some(dir.path().join("missing.pem"));
    assert!(matches!(MqttSource::new(config), Err(IngestError::Tls(_))));
}

#[test]
fn non_pem_ca_file_fails_at_tls_stage() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(b"not a certificate").expect("write");
    let mut config = config();
    config.ca_file = Some(file.path().to_path_buf());
    assert!(matches!(MqttSource::new(config), Err(IngestError::Tls(_))));
}

#[test]
fn refused_broker_fails_at_connect_stage() {
    let mut source = MqttSource::new(config()).expect("client");
    let err = source.connect().expect_err("nothing listens on port 1");
    assert!(matches!(err, IngestError::Connect(_)), "{err}");
    assert!(!source.is_connected());
}

#[test]
fn poll_before_connect_reports_disconnected() {
    let mut source = MqttSource::new(config()).expect("client");
    let mut received = Vec::new();
    let mut handler = |event: RawEvent| received.push(event);
    let err = source
        .poll_once(&mut handler as &mut dyn RawEventHandler)
        .expect_err("not connected");
    assert!(matches!(err, IngestError::Disconnected));
    assert!(received.is_empty());
}

#[test]
fn disconnect_is_idempotent_and_closes_the_client() {
    let mut source = MqttSource::new(config()).expect("client");
    source.disconnect();
    source.disconnect();
    assert!(matches!(source.reconnect(), Err(IngestError::Disconnected)));
}
