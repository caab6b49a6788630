//! BioHarness Telemetry Codec
//!
//! 设备消息的线上格式：位字段解码、采样数组解码、
//! 按消息ID分发，以及用于测试和仿真的帧构造。

pub mod dispatcher;
pub mod field_decoder;
pub mod frame_builder;
pub mod records;
pub mod samples;

pub use dispatcher::{decode_payload, DispatchStats, MessageDispatcher, MessageSubscriber};
pub use field_decoder::{extract_bit_field, BitCursor, DecodedFields, FieldSpec, FieldValue};
pub use frame_builder::{CapturedFrame, FrameGenerator};
pub use records::{parse_hxm, parse_summary, parse_timestamp, SignalLayout};
pub use samples::SampleFormat;
