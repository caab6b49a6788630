//! 帧构造与仿真数据生成
//!
//! 把类型化记录编码回设备线上格式，用于测试与离线仿真。
//! `FrameGenerator`使用固定种子的随机数生成器，输出可重复。

use bht_core::{HxMMessage, MessageFrame, MessageId, SignalType, SummaryMessage, TelemetryError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::field_decoder::{decode_fields, table_bits};
use crate::records::{
    encode_hxm_payload, encode_signal_payload, encode_summary_payload, summary_from_fields,
    DeviceTimestamp, SUMMARY_LAYOUT,
};
use crate::samples::{encode_acceleration_counts, encode_packed_samples, encode_rr_samples};

fn device_time(timestamp: f64) -> Result<DeviceTimestamp, TelemetryError> {
    DeviceTimestamp::from_unix_seconds(timestamp).ok_or_else(|| {
        TelemetryError::malformed(format!(
            "timestamp {timestamp} cannot be represented on the wire"
        ))
    })
}

/// 构造10bit波形帧（呼吸或ECG）
pub fn waveform_frame(
    signal_type: SignalType,
    sequence_number: u8,
    timestamp: f64,
    samples: &[u16],
) -> Result<MessageFrame, TelemetryError> {
    if !matches!(signal_type, SignalType::Breathing | SignalType::Ecg) {
        return Err(TelemetryError::InvalidSignal(format!(
            "{signal_type} is not a waveform stream"
        )));
    }
    let payload = encode_signal_payload(
        sequence_number,
        &device_time(timestamp)?,
        &encode_packed_samples(samples),
    );
    Ok(MessageFrame::new(signal_type.message_id().as_u8(), payload))
}

/// 构造RR帧
pub fn rr_frame(
    sequence_number: u8,
    timestamp: f64,
    samples: &[i16],
) -> Result<MessageFrame, TelemetryError> {
    let payload = encode_signal_payload(
        sequence_number,
        &device_time(timestamp)?,
        &encode_rr_samples(samples),
    );
    Ok(MessageFrame::new(MessageId::Rr.as_u8(), payload))
}

/// 构造加速度帧（原始计数三元组）
pub fn acceleration_frame(
    sequence_number: u8,
    timestamp: f64,
    counts: &[[u16; 3]],
) -> Result<MessageFrame, TelemetryError> {
    let payload = encode_signal_payload(
        sequence_number,
        &device_time(timestamp)?,
        &encode_acceleration_counts(counts),
    );
    Ok(MessageFrame::new(MessageId::Acceleration.as_u8(), payload))
}

pub fn summary_frame(message: &SummaryMessage) -> Result<MessageFrame, TelemetryError> {
    Ok(MessageFrame::new(
        MessageId::Summary.as_u8(),
        encode_summary_payload(message)?,
    ))
}

pub fn hxm_frame(message: &HxMMessage) -> Result<MessageFrame, TelemetryError> {
    Ok(MessageFrame::new(
        MessageId::Hxm.as_u8(),
        encode_hxm_payload(message)?,
    ))
}

/// 仿真捕获中的一帧及其主机接收时间
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub host_time: f64,
    pub frame: MessageFrame,
}

/// 每种信号流每包的采样数
const BREATHING_SAMPLES_PER_PACKET: usize = 18;
const ECG_SAMPLES_PER_PACKET: usize = 63;
const RR_SAMPLES_PER_PACKET: usize = 18;
const ACCELERATION_SAMPLES_PER_PACKET: usize = 20;

/// 仿真帧生成器
pub struct FrameGenerator {
    rng: StdRng,
    /// 主机时钟相对设备时钟的偏移（秒）
    clock_offset: f64,
    /// 最大附加传输延迟（秒）
    max_latency: f64,
    /// 丢包概率（0..=1）
    loss_probability: f64,
    sequence: [u8; 5],
    rr_interval: i16,
    rr_until_next_beat: f64,
}

impl FrameGenerator {
    /// 使用指定种子创建（可重复）
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            clock_offset: 0.0,
            max_latency: 0.05,
            loss_probability: 0.0,
            sequence: [0; 5],
            rr_interval: 800,
            rr_until_next_beat: 0.8,
        }
    }

    pub fn clock_offset(mut self, seconds: f64) -> Self {
        self.clock_offset = seconds;
        self
    }

    pub fn max_latency(mut self, seconds: f64) -> Self {
        self.max_latency = seconds.max(0.0);
        self
    }

    pub fn loss_probability(mut self, probability: f64) -> Self {
        self.loss_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// 生成指定长度的随机字节
    pub fn random_bytes(&mut self, length: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; length];
        self.rng.fill_bytes(&mut bytes);
        bytes
    }

    /// 生成[0, 1)内的随机数
    fn unit(&mut self) -> f64 {
        let mut buf = [0u8; 8];
        self.rng.fill_bytes(&mut buf);
        (u64::from_le_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, bound: u16) -> u16 {
        (self.unit() * f64::from(bound)) as u16
    }

    /// 生成一条随机摘要消息，所有字段都可在线上格式中精确表示
    pub fn random_summary(
        &mut self,
        sequence_number: u8,
        timestamp: f64,
    ) -> Result<SummaryMessage, TelemetryError> {
        let bytes = self.random_bytes(table_bits(SUMMARY_LAYOUT).div_ceil(8));
        let fields = decode_fields(SUMMARY_LAYOUT, &bytes)?;
        let timestamp = device_time(timestamp)?.to_unix_seconds();
        summary_from_fields(sequence_number, timestamp, &fields)
    }

    fn next_sequence(&mut self, slot: usize) -> u8 {
        let seq = self.sequence[slot];
        self.sequence[slot] = seq.wrapping_add(1);
        seq
    }

    fn rr_samples(&mut self, samplerate: f64) -> Vec<i16> {
        let mut samples = Vec::with_capacity(RR_SAMPLES_PER_PACKET);
        for _ in 0..RR_SAMPLES_PER_PACKET {
            self.rr_until_next_beat -= 1.0 / samplerate;
            if self.rr_until_next_beat <= 0.0 {
                // 每个新心跳翻转符号
                let interval = 700 + self.below(300) as i16;
                self.rr_interval = if self.rr_interval > 0 { -interval } else { interval };
                self.rr_until_next_beat += f64::from(interval) / 1000.0;
            }
            samples.push(self.rr_interval);
        }
        samples
    }

    /// 生成从`start`开始、持续`duration`秒的设备数据流，按主机接收时间排序
    pub fn capture(
        &mut self,
        start: f64,
        duration: f64,
    ) -> Result<Vec<CapturedFrame>, TelemetryError> {
        let mut frames = Vec::new();

        let streams = [
            (SignalType::Breathing, BREATHING_SAMPLES_PER_PACKET),
            (SignalType::Ecg, ECG_SAMPLES_PER_PACKET),
            (SignalType::Rr, RR_SAMPLES_PER_PACKET),
            (SignalType::Acceleration, ACCELERATION_SAMPLES_PER_PACKET),
        ];

        for (slot, (signal_type, per_packet)) in streams.into_iter().enumerate() {
            let period = per_packet as f64 / signal_type.samplerate();
            let mut t = start;
            while t < start + duration {
                let seq = self.next_sequence(slot);
                let frame = match signal_type {
                    SignalType::Breathing | SignalType::Ecg => {
                        let samples: Vec<u16> =
                            (0..per_packet).map(|_| 400 + self.below(200)).collect();
                        waveform_frame(signal_type, seq, t, &samples)?
                    }
                    SignalType::Rr => {
                        let samples = self.rr_samples(signal_type.samplerate());
                        rr_frame(seq, t, &samples)?
                    }
                    SignalType::Acceleration => {
                        let counts: Vec<[u16; 3]> = (0..per_packet)
                            .map(|_| [500 + self.below(40), 500 + self.below(40), 583])
                            .collect();
                        acceleration_frame(seq, t, &counts)?
                    }
                };
                let end = t + (per_packet - 1) as f64 / signal_type.samplerate();
                self.push(&mut frames, end, frame);
                t += period;
            }
        }

        let mut t = start;
        while t < start + duration {
            let seq = self.next_sequence(4);
            let summary = self.random_summary(seq, t)?;
            self.push(&mut frames, t, summary_frame(&summary)?);
            t += 1.0;
        }

        frames.sort_by(|a, b| a.host_time.total_cmp(&b.host_time));
        Ok(frames)
    }

    fn push(&mut self, frames: &mut Vec<CapturedFrame>, device_end: f64, frame: MessageFrame) {
        if self.loss_probability > 0.0 && self.unit() < self.loss_probability {
            return;
        }
        let latency = self.unit() * self.max_latency;
        frames.push(CapturedFrame {
            host_time: device_end + self.clock_offset + latency,
            frame,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{parse_summary, SignalLayout};
    use bht_core::Samples;

    #[test]
    fn test_waveform_frame_rejects_rr() {
        assert!(waveform_frame(SignalType::Rr, 0, 0.0, &[1]).is_err());
    }

    #[test]
    fn test_rr_frame_layout() {
        let frame = rr_frame(9, 1_457_481_600.0, &[5, -3]).unwrap();
        assert_eq!(frame.message_id, 0x24);
        assert_eq!(frame.payload.len(), 9 + 4);
        assert_eq!(frame.payload[0], 9);

        let packet = SignalLayout::for_signal(SignalType::Rr)
            .parse(&frame.payload)
            .unwrap();
        assert_eq!(packet.samples(), &Samples::Rr(vec![5, -3]));
    }

    #[test]
    fn test_seeded_generator_is_repeatable() {
        let mut a = FrameGenerator::with_seed(42);
        let mut b = FrameGenerator::with_seed(42);
        assert_eq!(a.random_bytes(32), b.random_bytes(32));
        assert_eq!(
            a.random_summary(1, 1_457_481_600.0).unwrap(),
            b.random_summary(1, 1_457_481_600.0).unwrap()
        );
    }

    #[test]
    fn test_random_summary_encodes() {
        let mut generator = FrameGenerator::with_seed(7);
        let summary = generator.random_summary(3, 1_457_481_600.5).unwrap();
        let frame = summary_frame(&summary).unwrap();
        assert_eq!(parse_summary(&frame.payload).unwrap(), summary);
    }

    #[test]
    fn test_capture_is_time_ordered() {
        let frames = FrameGenerator::with_seed(1)
            .clock_offset(2.0)
            .capture(1_457_481_600.0, 3.0)
            .unwrap();

        assert!(!frames.is_empty());
        assert!(frames
            .windows(2)
            .all(|pair| pair[0].host_time <= pair[1].host_time));
        // 3秒：3个摘要、3个呼吸包
        let summaries = frames.iter().filter(|f| f.frame.message_id == 0x2B).count();
        assert_eq!(summaries, 3);
        let breathing = frames.iter().filter(|f| f.frame.message_id == 0x21).count();
        assert_eq!(breathing, 3);
    }

    #[test]
    fn test_packet_loss_drops_frames() {
        let full = FrameGenerator::with_seed(5).capture(0.0, 10.0).unwrap();
        let lossy = FrameGenerator::with_seed(5)
            .loss_probability(0.5)
            .capture(0.0, 10.0)
            .unwrap();
        assert!(lossy.len() < full.len());
    }
}
