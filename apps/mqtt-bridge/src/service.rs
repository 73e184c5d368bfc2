//! 双协议服务循环
//!
//! 单线程内交替推进地址空间与订阅端客户端：
//!
//! ```text
//! loop (Running)
//!   ├── 1. space.iterate()          通知投递、端点收发（不阻塞）
//!   ├── 2. client.poll_once(router) 消息同步路由到槽位（短超时）
//!   └── 3. 失败 → reconnect() + 固定退避
//! Stopping
//!   └── client.disconnect() → space.shutdown()
//! ```

use bridge_ingest::{IngestError, PubSubClient, RawEventHandler};
use bridge_pipeline::FieldRouter;
use bridge_protocol::AddressSpace;
use domain::RawEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 停止信号：中断处理只翻转标志，服务循环每轮检查一次。
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Ctrl+C / SIGTERM 处理。
    pub fn install() -> Result<Self, ctrlc::Error> {
        let signal = Self::new();
        let requested = signal.requested.clone();
        ctrlc::set_handler(move || {
            requested.store(true, Ordering::SeqCst);
        })?;
        Ok(signal)
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// 服务状态：Stopping 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopping,
}

/// 由客户端返回值推断的连接状态，只影响重连，不影响路由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// 服务循环参数。
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// 客户端失败后的固定退避
    pub reconnect_backoff: Duration,
    /// 计数器周期日志间隔；`None` 关闭
    pub stats_interval: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_millis(200),
            stats_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// 把客户端投递的消息交给路由器。
struct RouterHandler<'a, S> {
    router: &'a FieldRouter,
    space: &'a mut S,
}

impl<S: AddressSpace> RawEventHandler for RouterHandler<'_, S> {
    fn handle(&mut self, event: RawEvent) {
        self.router.route(&mut *self.space, &event);
    }
}

/// 服务上下文：持有地址空间、客户端与全部槽位绑定。
pub struct BridgeService<S: AddressSpace, C: PubSubClient> {
    space: S,
    client: C,
    router: FieldRouter,
    settings: ServiceSettings,
    state: ServiceState,
    connection: ConnectionState,
    last_stats_at: Instant,
    closed: bool,
}

impl<S: AddressSpace, C: PubSubClient> BridgeService<S, C> {
    /// `space` 已启动、`client` 已连接并订阅。
    pub fn new(space: S, client: C, router: FieldRouter, settings: ServiceSettings) -> Self {
        Self {
            space,
            client,
            router,
            settings,
            state: ServiceState::Running,
            connection: ConnectionState::Connected,
            last_stats_at: Instant::now(),
            closed: false,
        }
    }

    pub fn space(&self) -> &S {
        &self.space
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// 运行到收到停止信号，然后按固定顺序释放资源。
    pub fn run(&mut self, shutdown: &ShutdownSignal) {
        info!(target: "bridge.service", "service_started");
        while self.run_iteration(shutdown) == ServiceState::Running {}
        self.close();
    }

    /// 执行一轮循环；停止信号只在轮首检查。
    pub fn run_iteration(&mut self, shutdown: &ShutdownSignal) -> ServiceState {
        if self.state == ServiceState::Stopping {
            return ServiceState::Stopping;
        }
        if shutdown.is_requested() {
            info!(target: "bridge.service", "shutdown_requested");
            self.state = ServiceState::Stopping;
            return ServiceState::Stopping;
        }

        if let Err(err) = self.space.iterate() {
            warn!(target: "bridge.service", error = %err, "address_space_iterate_failed");
        }

        let polled = {
            let mut handler = RouterHandler {
                router: &self.router,
                space: &mut self.space,
            };
            self.client.poll_once(&mut handler)
        };
        match polled {
            Ok(_) => self.mark_connected(),
            Err(err) => self.recover(err),
        }

        self.log_stats_if_due();
        ServiceState::Running
    }

    /// 断开客户端，再关闭地址空间；可重复调用。
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = ServiceState::Stopping;
        info!(target: "bridge.service", "service_stopping");
        self.client.disconnect();
        self.space.shutdown();
        bridge_telemetry::log_snapshot("shutdown");
        info!(target: "bridge.service", "service_stopped");
    }

    fn recover(&mut self, err: IngestError) {
        bridge_telemetry::record_client_loop_failure();
        if self.connection == ConnectionState::Connected {
            warn!(target: "bridge.service", error = %err, "connection_lost");
            self.connection = ConnectionState::Disconnected;
        } else {
            warn!(target: "bridge.service", error = %err, "mqtt_loop_failed");
        }

        bridge_telemetry::record_reconnect_attempt();
        match self.client.reconnect() {
            Ok(()) => self.mark_connected(),
            Err(err) => {
                bridge_telemetry::record_reconnect_failure();
                warn!(target: "bridge.service", error = %err, "reconnect_failed");
            }
        }
        std::thread::sleep(self.settings.reconnect_backoff);
    }

    fn mark_connected(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            self.connection = ConnectionState::Connected;
            info!(target: "bridge.service", "connection_restored");
        }
    }

    fn log_stats_if_due(&mut self) {
        let Some(interval) = self.settings.stats_interval else {
            return;
        };
        if self.last_stats_at.elapsed() >= interval {
            self.last_stats_at = Instant::now();
            bridge_telemetry::log_snapshot("periodic");
        }
    }
}

impl<S: AddressSpace, C: PubSubClient> Drop for BridgeService<S, C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_pipeline::NodeBindings;
    use bridge_protocol::{
        DataValue, NodeId, NodeServer, NodeServerConfig, ProtocolError, VariableSpec,
    };
    use domain::{FieldValue, SlotId};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    type CallLog = Rc<RefCell<Vec<&'static str>>>;

    enum Step {
        Deliver(&'static str),
        Fail,
    }

    /// 按脚本返回结果的客户端；脚本耗尽后空转。
    struct FakeClient {
        steps: VecDeque<Step>,
        reconnects: VecDeque<bool>,
        reconnect_calls: usize,
        calls: CallLog,
        on_poll: Option<ShutdownSignal>,
    }

    impl FakeClient {
        fn new(steps: Vec<Step>, reconnects: Vec<bool>, calls: CallLog) -> Self {
            Self {
                steps: steps.into(),
                reconnects: reconnects.into(),
                reconnect_calls: 0,
                calls,
                on_poll: None,
            }
        }
    }

    impl PubSubClient for FakeClient {
        fn poll_once(&mut self, handler: &mut dyn RawEventHandler) -> Result<usize, IngestError> {
            if let Some(signal) = &self.on_poll {
                signal.request();
            }
            match self.steps.pop_front() {
                Some(Step::Deliver(payload)) => {
                    handler.handle(RawEvent::new("esp32/data", payload));
                    Ok(1)
                }
                Some(Step::Fail) => Err(IngestError::Connection("connection reset".to_string())),
                None => Ok(0),
            }
        }

        fn reconnect(&mut self) -> Result<(), IngestError> {
            self.reconnect_calls += 1;
            if self.reconnects.pop_front().unwrap_or(true) {
                Ok(())
            } else {
                Err(IngestError::Connect("connection refused".to_string()))
            }
        }

        fn disconnect(&mut self) {
            self.calls.borrow_mut().push("client_disconnect");
        }
    }

    /// 记录 shutdown 调用的地址空间。
    struct RecordingSpace {
        inner: NodeServer,
        calls: CallLog,
    }

    impl AddressSpace for RecordingSpace {
        fn add_folder(
            &mut self,
            browse_name: &str,
            display_name: &str,
        ) -> Result<NodeId, ProtocolError> {
            self.inner.add_folder(browse_name, display_name)
        }

        fn add_variable(
            &mut self,
            parent: &NodeId,
            spec: VariableSpec,
        ) -> Result<NodeId, ProtocolError> {
            self.inner.add_variable(parent, spec)
        }

        fn startup(&mut self) -> Result<(), ProtocolError> {
            self.inner.startup()
        }

        fn iterate(&mut self) -> Result<usize, ProtocolError> {
            self.inner.iterate()
        }

        fn write_value(&mut self, node: &NodeId, value: FieldValue) -> Result<(), ProtocolError> {
            self.inner.write_value(node, value)
        }

        fn read_value(&self, node: &NodeId) -> Option<DataValue> {
            self.inner.read_value(node)
        }

        fn shutdown(&mut self) {
            self.calls.borrow_mut().push("space_shutdown");
            self.inner.shutdown();
        }
    }

    fn settings() -> ServiceSettings {
        ServiceSettings {
            reconnect_backoff: Duration::ZERO,
            stats_interval: None,
        }
    }

    fn service(client: FakeClient, calls: CallLog) -> BridgeService<RecordingSpace, FakeClient> {
        let mut space = RecordingSpace {
            inner: NodeServer::new(NodeServerConfig::default()),
            calls,
        };
        let bindings = NodeBindings::register(&mut space).expect("bindings");
        space.startup().expect("startup");
        BridgeService::new(space, client, FieldRouter::new(bindings, 128), settings())
    }

    fn slot_value(service: &BridgeService<RecordingSpace, FakeClient>, slot: SlotId) -> FieldValue {
        let node = service
            .router
            .bindings()
            .node(slot)
            .expect("bound")
            .clone();
        service.space().read_value(&node).expect("value").value
    }

    #[test]
    fn routing_resumes_after_repeated_client_failures() {
        let calls = CallLog::default();
        let client = FakeClient::new(
            vec![
                Step::Deliver(r#"{"temp":21,"status":"OK"}"#),
                Step::Fail,
                Step::Fail,
                Step::Fail,
                Step::Deliver(r#"{"temp":22.5}"#),
            ],
            vec![false, false, true],
            calls.clone(),
        );
        let mut service = service(client, calls);
        let shutdown = ShutdownSignal::new();

        assert_eq!(service.run_iteration(&shutdown), ServiceState::Running);
        assert_eq!(slot_value(&service, SlotId::Temp), FieldValue::Number(21.0));

        for _ in 0..2 {
            assert_eq!(service.run_iteration(&shutdown), ServiceState::Running);
            assert_eq!(service.connection_state(), ConnectionState::Disconnected);
        }
        assert_eq!(service.run_iteration(&shutdown), ServiceState::Running);
        assert_eq!(service.connection_state(), ConnectionState::Connected);
        assert_eq!(service.client().reconnect_calls, 3);

        assert_eq!(service.run_iteration(&shutdown), ServiceState::Running);
        assert_eq!(slot_value(&service, SlotId::Temp), FieldValue::Number(22.5));
        assert_eq!(
            slot_value(&service, SlotId::Status),
            FieldValue::Text("OK".to_string())
        );
        assert_eq!(
            slot_value(&service, SlotId::LastMessage),
            FieldValue::Text(r#"{"temp":22.5}"#.to_string())
        );
    }

    #[test]
    fn stop_releases_client_before_address_space() {
        let calls = CallLog::default();
        let client = FakeClient::new(Vec::new(), Vec::new(), calls.clone());
        let mut service = service(client, calls.clone());
        let shutdown = ShutdownSignal::new();
        shutdown.request();

        service.run(&shutdown);
        assert_eq!(service.state(), ServiceState::Stopping);
        assert_eq!(*calls.borrow(), ["client_disconnect", "space_shutdown"]);

        // Drop 不重复释放
        drop(service);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn drop_releases_in_the_same_order() {
        let calls = CallLog::default();
        let client = FakeClient::new(Vec::new(), Vec::new(), calls.clone());
        drop(service(client, calls.clone()));
        assert_eq!(*calls.borrow(), ["client_disconnect", "space_shutdown"]);
    }

    #[test]
    fn shutdown_is_observed_at_the_next_iteration() {
        let calls = CallLog::default();
        let shutdown = ShutdownSignal::new();
        let mut client = FakeClient::new(
            vec![
                Step::Deliver(r#"{"currentQty":5}"#),
                Step::Deliver(r#"{"currentQty":6}"#),
            ],
            Vec::new(),
            calls.clone(),
        );
        client.on_poll = Some(shutdown.clone());
        let mut service = service(client, calls);

        service.run(&shutdown);
        // 信号在第一轮中途到达，该轮仍完整执行
        assert_eq!(
            slot_value(&service, SlotId::CurrentQty),
            FieldValue::Number(5.0)
        );
        assert_eq!(service.client().steps.len(), 1);
    }
}
