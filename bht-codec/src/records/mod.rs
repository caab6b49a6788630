//! 记录解码模块
//!
//! 各消息类型的载荷布局与解析/编码函数

pub mod hxm;
pub mod signal;
pub mod summary;
pub mod timestamp;

pub use hxm::{encode_hxm_payload, parse_hxm, HXM_LAYOUT};
pub use signal::{encode_signal_payload, SignalLayout, SIGNAL_HEADER_BYTES};
pub use summary::{
    encode_summary_payload, parse_summary, summary_from_fields, summary_to_fields,
    SUMMARY_HEADER_BYTES, SUMMARY_LAYOUT,
};
pub use timestamp::{parse_timestamp, DeviceTimestamp, TIMESTAMP_LAYOUT};
