//! 工具模块
//!
//! 提供BHT系统中常用的工具函数

/// 将字节数组转换为十六进制字符串（用于日志）
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 位操作工具
///
/// 位序均为MSB优先：第0位是首字节的最高位
pub mod bit_ops {
    /// 将值设置到位数组的指定位置
    pub fn set_bits(data: &mut [u8], start_bit: usize, bit_count: usize, value: u64) {
        for i in 0..bit_count {
            let bit_pos = start_bit + i;
            let byte_idx = bit_pos / 8;
            let bit_idx = 7 - (bit_pos % 8); // MSB first

            if byte_idx < data.len() {
                let bit_val = (value >> (bit_count - 1 - i)) & 1;
                if bit_val == 1 {
                    data[byte_idx] |= 1 << bit_idx;
                } else {
                    data[byte_idx] &= !(1 << bit_idx);
                }
            }
        }
    }

    /// 将若干等宽无符号值紧密打包为字节（末尾不足一字节的位补0）
    pub fn pack_values(values: &[u64], bit_width: usize) -> Vec<u8> {
        let total_bits = values.len() * bit_width;
        let mut data = vec![0u8; total_bits.div_ceil(8)];
        for (i, &value) in values.iter().enumerate() {
            set_bits(&mut data, i * bit_width, bit_width, value);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        let bytes = [0xAB, 0xCD, 0xEF];
        let hex = bytes_to_hex(&bytes);
        assert_eq!(hex, "AB CD EF");
    }

    #[test]
    fn test_set_bits_cross_byte() {
        let mut data = [0u8; 2];
        bit_ops::set_bits(&mut data, 3, 10, 0b11_1111_1111);
        assert_eq!(data, [0b0001_1111, 0b1111_1000]);
    }

    #[test]
    fn test_pack_values_ten_bit() {
        // 1111111111 0000000000 1000000000 00
        let packed = bit_ops::pack_values(&[1023, 0, 512], 10);
        assert_eq!(packed, vec![0xFF, 0xC0, 0x08, 0x00]);
    }
}
