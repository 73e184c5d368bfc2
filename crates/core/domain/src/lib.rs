pub mod data;
pub mod field;

pub use data::{RawEvent, now_epoch_ms};
pub use field::{FieldKey, FieldKind, FieldValue, SlotId};
