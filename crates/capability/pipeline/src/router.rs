use crate::NodeBindings;
use bridge_normalize::parse_field;
use bridge_protocol::AddressSpace;
use domain::{FieldKey, FieldValue, RawEvent, SlotId};
use tracing::{debug, info, warn};

/// 单个槽位的写入结果。
#[derive(Debug, Clone, PartialEq)]
pub struct SlotWrite {
    pub slot: SlotId,
    pub written: bool,
}

/// 一条消息的路由结果。
#[derive(Debug, Clone, Default)]
pub struct RouteReport {
    /// 解析成功的字段数（不含原始消息槽位）。
    pub matched: usize,
    /// 字段槽位写入结果，按路由顺序。
    pub writes: Vec<SlotWrite>,
    /// 原始消息是否已写入 LastMessage。
    pub raw_stored: bool,
    /// 是否已按"无字段命中"告警并计数。
    pub unmatched: bool,
}

impl RouteReport {
    /// 成功写入的字段槽位数。
    pub fn written(&self) -> usize {
        self.writes.iter().filter(|write| write.written).count()
    }

    pub fn no_fields_matched(&self) -> bool {
        self.unmatched
    }
}

/// 字段路由器。
///
/// 每个字段独立解析、独立写入：单个字段失败只跳过该字段。
#[derive(Debug, Clone)]
pub struct FieldRouter {
    bindings: NodeBindings,
    text_max_len: usize,
}

impl FieldRouter {
    pub fn new(bindings: NodeBindings, text_max_len: usize) -> Self {
        Self {
            bindings,
            text_max_len,
        }
    }

    pub fn bindings(&self) -> &NodeBindings {
        &self.bindings
    }

    pub fn route(&self, space: &mut dyn AddressSpace, event: &RawEvent) -> RouteReport {
        let payload = event.payload_text();
        info!(
            target: "bridge.router",
            topic = %event.topic,
            bytes = event.payload.len(),
            payload = %payload,
            "message_received"
        );

        let mut report = RouteReport::default();
        for key in FieldKey::ALL {
            let value = match parse_field(&payload, key, self.text_max_len) {
                Ok(value) => value,
                Err(err) => {
                    bridge_telemetry::record_field_miss();
                    debug!(target: "bridge.router", key = %key, error = %err, "field_skipped");
                    continue;
                }
            };
            report.matched += 1;
            bridge_telemetry::record_field_matched();
            info!(target: "bridge.router", key = %key, value = %value, "field_parsed");
            report.writes.push(self.write_slot(space, key.slot(), value));
        }

        // 无论是否命中字段，原始消息都写入 LastMessage。
        let raw = FieldValue::Text(payload.into_owned());
        let raw = self.write_slot(space, SlotId::LastMessage, raw);
        report.raw_stored = raw.written;

        if report.matched == 0 {
            report.unmatched = true;
            bridge_telemetry::record_unmatched_message();
            warn!(
                target: "bridge.router",
                topic = %event.topic,
                "no_fields_matched"
            );
        }
        report
    }

    fn write_slot(
        &self,
        space: &mut dyn AddressSpace,
        slot: SlotId,
        value: FieldValue,
    ) -> SlotWrite {
        let Some(node) = self.bindings.node(slot) else {
            bridge_telemetry::record_slot_write_failure();
            warn!(target: "bridge.router", slot = slot.display_name(), "slot_unbound");
            return SlotWrite {
                slot,
                written: false,
            };
        };
        match space.write_value(node, value) {
            Ok(()) => {
                bridge_telemetry::record_slot_write_success();
                SlotWrite {
                    slot,
                    written: true,
                }
            }
            Err(err) => {
                bridge_telemetry::record_slot_write_failure();
                warn!(
                    target: "bridge.router",
                    slot = slot.display_name(),
                    node = %node,
                    error = %err,
                    "slot_write_failed"
                );
                SlotWrite {
                    slot,
                    written: false,
                }
            }
        }
    }
}
