//! 消息与记录模块
//!
//! 定义消息帧、解码后的记录类型，以及信号包的逐采样时间戳展开

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// 消息帧
///
/// 由外部成帧/校验层产生，只读，且只被消费一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFrame {
    pub message_id: u8,
    pub payload: Bytes,
}

impl MessageFrame {
    pub fn new(message_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            message_id,
            payload: payload.into(),
        }
    }
}

/// 设备固件的消息标识表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageId {
    Breathing = 0x21,
    Ecg = 0x22,
    Rr = 0x24,
    Acceleration = 0x25,
    Hxm = 0x26,
    Summary = 0x2B,
}

impl MessageId {
    /// 所有已知消息标识
    pub const ALL: [MessageId; 6] = [
        MessageId::Breathing,
        MessageId::Ecg,
        MessageId::Rr,
        MessageId::Acceleration,
        MessageId::Hxm,
        MessageId::Summary,
    ];

    pub fn from_u8(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_u8() == id)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 信号流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Breathing,
    Ecg,
    Rr,
    Acceleration,
}

impl SignalType {
    pub const ALL: [SignalType; 4] = [
        SignalType::Breathing,
        SignalType::Ecg,
        SignalType::Rr,
        SignalType::Acceleration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignalType::Breathing => "breathing",
            SignalType::Ecg => "ecg",
            SignalType::Rr => "rr",
            SignalType::Acceleration => "acceleration",
        }
    }

    /// 设备标称采样率（Hz）
    pub fn samplerate(self) -> f64 {
        match self {
            SignalType::Breathing => 18.0,
            SignalType::Ecg => 250.0,
            SignalType::Rr => 18.0,
            SignalType::Acceleration => 50.0,
        }
    }

    pub fn message_id(self) -> MessageId {
        match self {
            SignalType::Breathing => MessageId::Breathing,
            SignalType::Ecg => MessageId::Ecg,
            SignalType::Rr => MessageId::Rr,
            SignalType::Acceleration => MessageId::Acceleration,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 三轴加速度采样（单位：g）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// 信号包内的采样序列，形状由信号类型决定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Samples {
    /// 呼吸/ECG波形（10bit无符号）
    Waveform(Vec<u16>),
    /// RR间期（16bit有符号，符号交替标记心跳边界）
    Rr(Vec<i16>),
    /// 加速度三元组
    Acceleration(Vec<AccelerationSample>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Waveform(v) => v.len(),
            Samples::Rr(v) => v.len(),
            Samples::Acceleration(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 判断采样形状是否与信号类型相符
    pub fn fits(&self, signal_type: SignalType) -> bool {
        matches!(
            (self, signal_type),
            (Samples::Waveform(_), SignalType::Breathing)
                | (Samples::Waveform(_), SignalType::Ecg)
                | (Samples::Rr(_), SignalType::Rr)
                | (Samples::Acceleration(_), SignalType::Acceleration)
        )
    }
}

/// 信号包
///
/// 一个包携带起始时间戳、采样率与N个采样。字段只读，
/// 构造时保证采样形状与信号类型一致。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalPacket {
    #[serde(rename = "type")]
    signal_type: SignalType,
    timestamp: f64,
    samplerate: f64,
    samples: Samples,
    sequence_number: u8,
}

impl SignalPacket {
    pub fn new(
        signal_type: SignalType,
        timestamp: f64,
        samplerate: f64,
        samples: Samples,
        sequence_number: u8,
    ) -> Result<Self, TelemetryError> {
        if !samples.fits(signal_type) {
            return Err(TelemetryError::InvalidSignal(format!(
                "sample shape does not match signal type {signal_type}"
            )));
        }
        if !(samplerate.is_finite() && samplerate > 0.0) {
            return Err(TelemetryError::InvalidSignal(format!(
                "invalid samplerate {samplerate} for {signal_type}"
            )));
        }
        Ok(Self {
            signal_type,
            timestamp,
            samplerate,
            samples,
            sequence_number,
        })
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn samplerate(&self) -> f64 {
        self.samplerate
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn sequence_number(&self) -> u8 {
        self.sequence_number
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 第`index`个采样的时间戳
    pub fn sample_timestamp(&self, index: usize) -> f64 {
        self.timestamp + index as f64 / self.samplerate
    }

    /// 包内最后一个采样的标称时间戳
    pub fn end_timestamp(&self) -> f64 {
        match self.len() {
            0 => self.timestamp,
            n => self.sample_timestamp(n - 1),
        }
    }

    /// 替换起始时间戳，保持包内采样间隔不变
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 逐采样展开，可重复调用以重新开始
    pub fn timed_samples(&self) -> TimedSamples<'_> {
        TimedSamples {
            packet: self,
            index: 0,
        }
    }
}

/// 单个展开后的标量采样
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalSample {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub timestamp: f64,
    pub samplerate: f64,
    pub sample: f64,
    pub sequence_number: u8,
}

/// 单个展开后的加速度采样
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccelerationSignalSample {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub timestamp: f64,
    pub samplerate: f64,
    pub sample_x: f64,
    pub sample_y: f64,
    pub sample_z: f64,
    pub sequence_number: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TimedSample {
    Scalar(SignalSample),
    Acceleration(AccelerationSignalSample),
}

impl TimedSample {
    pub fn timestamp(&self) -> f64 {
        match self {
            TimedSample::Scalar(s) => s.timestamp,
            TimedSample::Acceleration(s) => s.timestamp,
        }
    }

    pub fn signal_type(&self) -> SignalType {
        match self {
            TimedSample::Scalar(s) => s.signal_type,
            TimedSample::Acceleration(s) => s.signal_type,
        }
    }
}

/// 信号包的逐采样迭代器
#[derive(Debug, Clone)]
pub struct TimedSamples<'a> {
    packet: &'a SignalPacket,
    index: usize,
}

impl Iterator for TimedSamples<'_> {
    type Item = TimedSample;

    fn next(&mut self) -> Option<Self::Item> {
        let packet = self.packet;
        let index = self.index;
        let timestamp = packet.sample_timestamp(index);

        let item = match &packet.samples {
            Samples::Waveform(v) => v.get(index).map(|&s| f64::from(s)),
            Samples::Rr(v) => v.get(index).map(|&s| f64::from(s)),
            Samples::Acceleration(v) => {
                let s = v.get(index)?;
                self.index += 1;
                return Some(TimedSample::Acceleration(AccelerationSignalSample {
                    signal_type: packet.signal_type,
                    timestamp,
                    samplerate: packet.samplerate,
                    sample_x: s.x,
                    sample_y: s.y,
                    sample_z: s.z,
                    sequence_number: packet.sequence_number,
                }));
            }
        }?;

        self.index += 1;
        Some(TimedSample::Scalar(SignalSample {
            signal_type: packet.signal_type,
            timestamp,
            samplerate: packet.samplerate,
            sample: item,
            sequence_number: packet.sequence_number,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.packet.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TimedSamples<'_> {}

/// 摘要消息（生理参数与设备状态）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMessage {
    pub sequence_number: u8,
    pub timestamp: f64,
    pub heart_rate: u16,
    pub respiration_rate: f64,
    pub skin_temperature: f64,
    pub posture: i16,
    pub activity: f64,
    pub peak_acceleration: f64,
    pub battery_voltage: f64,
    pub battery_level: u8,
    pub respiration_wave_amplitude: u16,
    pub respiration_wave_noise: u16,
    pub respiration_wave_confidence: u8,
    pub ecg_wave_amplitude: f64,
    pub ecg_wave_noise: f64,
    pub ecg_wave_confidence: u8,
    pub hrv: u16,
    pub system_confidence: u8,
    pub gsr: u16,
    pub rog: u16,
    pub accl_vertical_min: f64,
    pub accl_vertical_peak: f64,
    pub accl_lateral_min: f64,
    pub accl_lateral_peak: f64,
    pub accl_sagittal_min: f64,
    pub accl_sagittal_peak: f64,
    pub device_internal_temp: f64,
    pub posture_unreliable: bool,
    pub skin_temperature_unreliable: bool,
    pub respiration_rate_unreliable: bool,
    pub heart_rate_unreliable: bool,
    pub not_fitted_to_garment: bool,
    pub button_pressed: bool,
    /// 2bit佩戴检测等级
    pub device_worn_detection_level: u8,
    pub external_sensors_connected: bool,
    pub resting_stage_detection: bool,
    pub usb_connected: bool,
    pub estimated_core_temp_unreliable: bool,
    pub hrv_unreliable: bool,
    pub activity_unreliable: bool,
    pub link_quality: u8,
    pub rssi: i8,
    pub tx_power: i8,
    pub estimated_core_temp: f64,
}

impl SummaryMessage {
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// HxM心率带消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HxMMessage {
    pub firmware_id: u16,
    pub firmware_version: u16,
    pub hardware_id: u16,
    pub hardware_version: u16,
    pub battery_charge: u8,
    pub heart_rate: u8,
    pub heartbeat_number: u8,
    /// 15个心跳时间戳（毫秒，最旧在前）
    pub heartbeat_timestamps: [u16; 15],
    /// 距离（米）
    pub distance: f64,
    /// 瞬时速度（米/秒）
    pub speed: f64,
    pub strides: u16,
}

/// 解码后的消息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Summary(SummaryMessage),
    Signal(SignalPacket),
    Hxm(HxMMessage),
}

impl Message {
    pub fn message_id(&self) -> MessageId {
        match self {
            Message::Summary(_) => MessageId::Summary,
            Message::Signal(p) => p.signal_type().message_id(),
            Message::Hxm(_) => MessageId::Hxm,
        }
    }
}

/// 从信号流中派生的离散事件
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PhysiologicalEvent {
    HeartbeatInterval { timestamp: f64, interval: u16 },
}

impl PhysiologicalEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PhysiologicalEvent::HeartbeatInterval { .. } => "heartbeat_interval",
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            PhysiologicalEvent::HeartbeatInterval { timestamp, .. } => *timestamp,
        }
    }
}
