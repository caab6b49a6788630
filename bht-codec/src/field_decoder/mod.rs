//! 字段解码模块
//!
//! 提供固定位布局的通用解码功能，支持：
//! - bit级字段精确提取
//! - 前向位游标（小端整数、补码、状态位）
//! - 声明式字段表的解码与编码

pub mod bit_extractor;
pub mod field_table;

pub use bit_extractor::{extract_bit_field, extract_byte_range, BitCursor};
pub use field_table::{
    decode_fields, encode_fields, table_bits, DecodedFields, FieldEncoding, FieldSpec, FieldValue,
};
