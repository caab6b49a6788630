//! Bit字段提取器
//!
//! 提供精确的bit级字段提取功能，支持跨字节的bit字段，
//! 以及按声明顺序前向读取的位游标

use bht_core::TelemetryError;

/// 从载荷中提取bit字段值（MSB优先）
///
/// # 参数
/// - `data`: 原始载荷
/// - `bit_offset`: bit偏移量（从0开始）
/// - `bit_length`: bit长度（1..=64）
///
/// # 示例
/// ```
/// use bht_codec::field_decoder::extract_bit_field;
///
/// // 三个紧密排列的10bit采样中的第二个
/// let data = [0xFF, 0xC0, 0x08, 0x00];
/// assert_eq!(extract_bit_field(&data, 10, 10).unwrap(), 0);
/// assert_eq!(extract_bit_field(&data, 20, 10).unwrap(), 512);
/// ```
pub fn extract_bit_field(
    data: &[u8],
    bit_offset: usize,
    bit_length: usize,
) -> Result<u64, TelemetryError> {
    if bit_length == 0 || bit_length > 64 {
        return Err(TelemetryError::malformed(format!(
            "Invalid bit length: {bit_length}"
        )));
    }

    let start_byte = bit_offset / 8;
    let start_bit = bit_offset % 8;
    let end_byte = (bit_offset + bit_length - 1) / 8;

    if end_byte >= data.len() {
        return Err(TelemetryError::malformed(format!(
            "Bit field exceeds payload boundary: bit_offset={}, bit_length={}, payload_size={}",
            bit_offset,
            bit_length,
            data.len()
        )));
    }

    // 最多涉及9个字节，用u128拼接避免溢出
    let mut value = 0u128;
    for &byte in &data[start_byte..=end_byte] {
        value = (value << 8) | u128::from(byte);
    }

    let total_bits = (end_byte - start_byte + 1) * 8;
    let shift = total_bits - start_bit - bit_length;
    let mask = (1u128 << bit_length) - 1;

    Ok(((value >> shift) & mask) as u64)
}

/// 从字节数组中提取指定字节范围
pub fn extract_byte_range(
    data: &[u8],
    byte_offset: usize,
    byte_length: usize,
) -> Result<&[u8], TelemetryError> {
    if byte_offset + byte_length > data.len() {
        return Err(TelemetryError::malformed(format!(
            "Byte range exceeds payload boundary: offset={}, length={}, payload_size={}",
            byte_offset,
            byte_length,
            data.len()
        )));
    }

    Ok(&data[byte_offset..byte_offset + byte_length])
}

/// 前向位游标
///
/// 只能向前读取；多字节的小端字段按字节读取后再按小端组合
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// 当前bit位置
    pub fn position(&self) -> usize {
        self.bit_pos
    }

    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_pos)
    }

    /// 读取`width`位无符号值（MSB优先）
    pub fn read_bits(&mut self, width: usize) -> Result<u64, TelemetryError> {
        let value = extract_bit_field(self.data, self.bit_pos, width)?;
        self.bit_pos += width;
        Ok(value)
    }

    /// 读取小端无符号整数；宽度不是8的倍数时退化为MSB优先位组
    pub fn read_uint_le(&mut self, width: usize) -> Result<u64, TelemetryError> {
        if width <= 8 || width % 8 != 0 {
            return self.read_bits(width);
        }
        if width > self.remaining_bits() {
            return Err(TelemetryError::malformed(format!(
                "{width}-bit field at bit {} exceeds payload of {} bits",
                self.bit_pos,
                self.data.len() * 8
            )));
        }

        let mut value = 0u64;
        for i in 0..width / 8 {
            value |= self.read_bits(8)? << (8 * i);
        }
        Ok(value)
    }

    /// 读取小端二进制补码有符号整数
    pub fn read_int_le(&mut self, width: usize) -> Result<i64, TelemetryError> {
        let raw = self.read_uint_le(width)?;
        Ok(sign_extend(raw, width))
    }

    pub fn read_bool(&mut self) -> Result<bool, TelemetryError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// 跳过`width`位
    pub fn skip(&mut self, width: usize) -> Result<(), TelemetryError> {
        if width > self.remaining_bits() {
            return Err(TelemetryError::malformed(format!(
                "cannot skip {width} bits at bit {}, payload has {} bits",
                self.bit_pos,
                self.data.len() * 8
            )));
        }
        self.bit_pos += width;
        Ok(())
    }
}

/// 将`width`位二进制补码值符号扩展为i64
pub fn sign_extend(raw: u64, width: usize) -> i64 {
    if width == 0 || width >= 64 {
        return raw as i64;
    }
    let sign_bit = 1u64 << (width - 1);
    if raw & sign_bit != 0 {
        (raw as i64) - (1i64 << width)
    } else {
        raw as i64
    }
}
