//! 采样数组解码
//!
//! 三种打包方式：
//! - N bit紧密打包无符号数（呼吸/ECG波形）
//! - 16bit有符号大端整数（RR间期）
//! - 交错三元组（加速度，按N bit打包后分组并换算为g）

use bht_core::utils::bit_ops::pack_values;
use bht_core::{AccelerationSample, Samples, SignalType, TelemetryError};

use crate::field_decoder::extract_bit_field;

/// 波形与加速度采样的位宽
pub const PACKED_SAMPLE_BITS: usize = 10;

/// RR采样的位宽
pub const RR_SAMPLE_BITS: usize = 16;

/// 加速度计每g对应的计数（14bit信号中83计数为1g，10bit中为其1/4）
pub const ACCELERATION_COUNTS_PER_G: f64 = 20.75;

/// 采样打包方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// N bit紧密打包无符号数
    Packed(usize),
    /// 16bit有符号大端
    SignedBigEndian16,
    /// N bit打包的(x, y, z)交错三元组
    Triplets(usize),
}

impl SampleFormat {
    /// 设备固件为各信号类型使用的打包方式
    pub fn for_signal(signal_type: SignalType) -> Self {
        match signal_type {
            SignalType::Breathing | SignalType::Ecg => SampleFormat::Packed(PACKED_SAMPLE_BITS),
            SignalType::Rr => SampleFormat::SignedBigEndian16,
            SignalType::Acceleration => SampleFormat::Triplets(PACKED_SAMPLE_BITS),
        }
    }

    /// 解码采样数据
    pub fn decode(self, data: &[u8]) -> Result<Samples, TelemetryError> {
        match self {
            SampleFormat::Packed(width) => Ok(Samples::Waveform(parse_packed_u16(data, width)?)),
            SampleFormat::SignedBigEndian16 => Ok(Samples::Rr(parse_rr_samples(data)?)),
            SampleFormat::Triplets(width) => {
                Ok(Samples::Acceleration(parse_triplet_samples(data, width)?))
            }
        }
    }
}

/// 按N bit解包连续的无符号采样，不足一个采样的剩余位丢弃
pub fn unpack_bit_packed(data: &[u8], bit_width: usize) -> Result<Vec<u64>, TelemetryError> {
    if bit_width == 0 || bit_width > 32 {
        return Err(TelemetryError::malformed(format!(
            "unsupported sample width {bit_width}"
        )));
    }

    let count = data.len() * 8 / bit_width;
    (0..count)
        .map(|i| extract_bit_field(data, i * bit_width, bit_width))
        .collect()
}

/// 解码10bit波形采样
pub fn parse_waveform_samples(data: &[u8]) -> Result<Vec<u16>, TelemetryError> {
    parse_packed_u16(data, PACKED_SAMPLE_BITS)
}

fn parse_packed_u16(data: &[u8], bit_width: usize) -> Result<Vec<u16>, TelemetryError> {
    unpack_bit_packed(data, bit_width)?
        .into_iter()
        .map(|v| {
            u16::try_from(v).map_err(|_| {
                TelemetryError::malformed(format!("{bit_width}-bit sample {v} exceeds u16"))
            })
        })
        .collect()
}

/// 解码16bit有符号大端RR采样，字节数必须为偶数
pub fn parse_rr_samples(data: &[u8]) -> Result<Vec<i16>, TelemetryError> {
    if data.len() % 2 != 0 {
        return Err(TelemetryError::malformed(format!(
            "RR payload of {} bytes is not a multiple of {RR_SAMPLE_BITS} bits",
            data.len()
        )));
    }

    Ok(data
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// 解码加速度三元组并换算为g
pub fn parse_acceleration_samples(data: &[u8]) -> Result<Vec<AccelerationSample>, TelemetryError> {
    parse_triplet_samples(data, PACKED_SAMPLE_BITS)
}

fn parse_triplet_samples(
    data: &[u8],
    bit_width: usize,
) -> Result<Vec<AccelerationSample>, TelemetryError> {
    let raw = unpack_bit_packed(data, bit_width)?;
    if raw.len() % 3 != 0 {
        return Err(TelemetryError::malformed(format!(
            "acceleration payload holds {} samples, not a multiple of 3",
            raw.len()
        )));
    }

    Ok(raw
        .chunks_exact(3)
        .map(|xyz| AccelerationSample {
            x: xyz[0] as f64 / ACCELERATION_COUNTS_PER_G,
            y: xyz[1] as f64 / ACCELERATION_COUNTS_PER_G,
            z: xyz[2] as f64 / ACCELERATION_COUNTS_PER_G,
        })
        .collect())
}

/// 将10bit原始采样紧密打包（用于构造测试帧与仿真数据）
pub fn encode_packed_samples(samples: &[u16]) -> Vec<u8> {
    let values: Vec<u64> = samples
        .iter()
        .map(|&s| u64::from(s) & ((1 << PACKED_SAMPLE_BITS) - 1))
        .collect();
    pack_values(&values, PACKED_SAMPLE_BITS)
}

/// 将RR采样编码为16bit有符号大端
pub fn encode_rr_samples(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

/// 将原始加速度计数三元组紧密打包
pub fn encode_acceleration_counts(triplets: &[[u16; 3]]) -> Vec<u8> {
    let flat: Vec<u16> = triplets.iter().flatten().copied().collect();
    encode_packed_samples(&flat)
}
