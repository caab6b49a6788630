//! 信号包解码
//!
//! 载荷布局：序列号（1字节）、设备时间戳（8字节）、采样数据

use bht_core::{SignalPacket, SignalType, TelemetryError};
use bytes::{BufMut, Bytes, BytesMut};

use super::timestamp::{parse_timestamp, DeviceTimestamp, TIMESTAMP_BYTES};
use crate::samples::SampleFormat;

/// 信号包头部长度
pub const SIGNAL_HEADER_BYTES: usize = 1 + TIMESTAMP_BYTES;

/// 单个信号流的解码参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalLayout {
    pub signal_type: SignalType,
    pub samplerate: f64,
    pub format: SampleFormat,
}

impl SignalLayout {
    /// 设备固件为该信号类型使用的布局
    pub fn for_signal(signal_type: SignalType) -> Self {
        Self {
            signal_type,
            samplerate: signal_type.samplerate(),
            format: SampleFormat::for_signal(signal_type),
        }
    }

    /// 解析信号包载荷
    pub fn parse(&self, payload: &[u8]) -> Result<SignalPacket, TelemetryError> {
        if payload.len() < SIGNAL_HEADER_BYTES {
            return Err(TelemetryError::malformed(format!(
                "{} payload of {} bytes is shorter than its {SIGNAL_HEADER_BYTES}-byte header",
                self.signal_type,
                payload.len()
            )));
        }

        let sequence_number = payload[0];
        let timestamp = parse_timestamp(&payload[1..SIGNAL_HEADER_BYTES])?;
        let samples = self.format.decode(&payload[SIGNAL_HEADER_BYTES..])?;

        SignalPacket::new(
            self.signal_type,
            timestamp,
            self.samplerate,
            samples,
            sequence_number,
        )
    }
}

/// 拼接信号包载荷（头部 + 已编码的采样数据）
pub fn encode_signal_payload(
    sequence_number: u8,
    timestamp: &DeviceTimestamp,
    sample_bytes: &[u8],
) -> Bytes {
    let mut payload = BytesMut::with_capacity(SIGNAL_HEADER_BYTES + sample_bytes.len());
    payload.put_u8(sequence_number);
    payload.put_slice(&timestamp.to_bytes());
    payload.put_slice(sample_bytes);
    payload.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{encode_acceleration_counts, encode_packed_samples, encode_rr_samples};
    use bht_core::Samples;

    fn device_time() -> DeviceTimestamp {
        DeviceTimestamp {
            year: 2016,
            month: 3,
            day: 9,
            day_milliseconds: 500,
        }
    }

    #[test]
    fn test_parse_ecg_packet() {
        let payload = encode_signal_payload(17, &device_time(), &encode_packed_samples(&[1023, 0, 512]));
        let packet = SignalLayout::for_signal(SignalType::Ecg).parse(&payload).unwrap();

        assert_eq!(packet.signal_type(), SignalType::Ecg);
        assert_eq!(packet.sequence_number(), 17);
        assert_eq!(packet.samplerate(), 250.0);
        assert_eq!(packet.timestamp(), 1_457_481_600.5);
        assert_eq!(packet.samples(), &Samples::Waveform(vec![1023, 0, 512]));
    }

    #[test]
    fn test_parse_rr_packet() {
        let payload = encode_signal_payload(3, &device_time(), &encode_rr_samples(&[812, -812]));
        let packet = SignalLayout::for_signal(SignalType::Rr).parse(&payload).unwrap();
        assert_eq!(packet.samples(), &Samples::Rr(vec![812, -812]));
        assert_eq!(packet.samplerate(), 18.0);
    }

    #[test]
    fn test_parse_acceleration_packet() {
        let payload = encode_signal_payload(
            0,
            &device_time(),
            &encode_acceleration_counts(&[[83, 0, 166]; 20]),
        );
        let packet = SignalLayout::for_signal(SignalType::Acceleration)
            .parse(&payload)
            .unwrap();
        assert_eq!(packet.len(), 20);
        match packet.samples() {
            Samples::Acceleration(samples) => {
                assert!((samples[0].x - 4.0).abs() < 1e-12);
                assert!((samples[0].z - 8.0).abs() < 1e-12);
            }
            other => panic!("unexpected samples {other:?}"),
        }
    }

    #[test]
    fn test_short_header_rejected() {
        let err = SignalLayout::for_signal(SignalType::Breathing)
            .parse(&[1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, TelemetryError::MalformedPayload(_)));
    }

    #[test]
    fn test_header_only_packet_is_empty() {
        let payload = encode_signal_payload(5, &device_time(), &[]);
        let packet = SignalLayout::for_signal(SignalType::Ecg).parse(&payload).unwrap();
        assert!(packet.is_empty());
    }
}
