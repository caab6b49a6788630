//! 流序列号跟踪器
//!
//! 每种信号流独立跟踪8位滚动序列号，判断每个包是否与上一个包连续

use std::collections::HashMap;

use bht_core::SignalType;
use tracing::warn;

/// 序列号检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// 与上一个包连续
    Continuous,
    /// 该流的第一个包
    FirstPacket,
    /// 重复的序列号
    Duplicate,
    /// 序列号跳变，`lost`为估计丢失的包数
    Gap {
        expected: u16,
        observed: u16,
        lost: u16,
    },
}

impl SequenceCheck {
    /// 包是否开始一段新的连续流
    pub fn starts_new_stream(&self) -> bool {
        !matches!(self, SequenceCheck::Continuous)
    }
}

/// 单个流的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamCounters {
    pub packets: u64,
    pub gaps: u64,
    pub lost_packets: u64,
    pub duplicates: u64,
}

#[derive(Debug, Clone, Default)]
struct StreamState {
    last_sequence: Option<u16>,
    counters: StreamCounters,
}

/// 序列号跟踪器
///
/// 没有重置操作；设备重连时构造新的跟踪器
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    streams: HashMap<SignalType, StreamState>,
    /// 序列号模数
    wraparound: u16,
}

impl SequenceTracker {
    /// 创建新的序列号跟踪器
    ///
    /// # 示例
    /// ```
    /// use bht_core::SignalType;
    /// use bht_stream::{SequenceCheck, SequenceTracker};
    ///
    /// let mut tracker = SequenceTracker::new(256);
    /// assert_eq!(tracker.check(SignalType::Ecg, 255), SequenceCheck::FirstPacket);
    /// assert_eq!(tracker.check(SignalType::Ecg, 0), SequenceCheck::Continuous);
    /// ```
    pub fn new(wraparound: u16) -> Self {
        Self {
            streams: HashMap::new(),
            wraparound: wraparound.max(1),
        }
    }

    /// 检查序列号并记录为该流的最后序列号
    pub fn check(&mut self, signal_type: SignalType, sequence: u8) -> SequenceCheck {
        let observed = u16::from(sequence);
        let modulo = u32::from(self.wraparound);
        let state = self.streams.entry(signal_type).or_default();
        state.counters.packets += 1;

        let result = match state.last_sequence {
            None => SequenceCheck::FirstPacket,
            Some(last) => {
                let expected = ((u32::from(last) + 1) % modulo) as u16;
                if observed == expected {
                    SequenceCheck::Continuous
                } else if observed == last {
                    state.counters.duplicates += 1;
                    warn!(%signal_type, sequence = observed, "duplicate sequence number");
                    SequenceCheck::Duplicate
                } else {
                    let lost = ((u32::from(observed) + modulo - u32::from(expected)) % modulo) as u16;
                    state.counters.gaps += 1;
                    state.counters.lost_packets += u64::from(lost);
                    warn!(
                        %signal_type,
                        expected,
                        observed,
                        lost,
                        "sequence gap detected"
                    );
                    SequenceCheck::Gap {
                        expected,
                        observed,
                        lost,
                    }
                }
            }
        };

        state.last_sequence = Some(observed);
        result
    }

    pub fn last_sequence(&self, signal_type: SignalType) -> Option<u16> {
        self.streams.get(&signal_type)?.last_sequence
    }

    pub fn counters(&self, signal_type: SignalType) -> StreamCounters {
        self.streams
            .get(&signal_type)
            .map(|s| s.counters.clone())
            .unwrap_or_default()
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_tracker_normal() {
        let mut tracker = SequenceTracker::default();

        assert_eq!(tracker.check(SignalType::Rr, 0), SequenceCheck::FirstPacket);
        assert_eq!(tracker.check(SignalType::Rr, 1), SequenceCheck::Continuous);
        assert_eq!(tracker.check(SignalType::Rr, 2), SequenceCheck::Continuous);
        assert_eq!(tracker.last_sequence(SignalType::Rr), Some(2));
    }

    #[test]
    fn test_sequence_tracker_wraparound() {
        let mut tracker = SequenceTracker::default();

        tracker.check(SignalType::Ecg, 254);
        assert_eq!(tracker.check(SignalType::Ecg, 255), SequenceCheck::Continuous);
        assert_eq!(tracker.check(SignalType::Ecg, 0), SequenceCheck::Continuous);
        assert!(!tracker.check(SignalType::Ecg, 1).starts_new_stream());
    }

    #[test]
    fn test_sequence_tracker_gap() {
        let mut tracker = SequenceTracker::default();

        tracker.check(SignalType::Breathing, 10);
        let result = tracker.check(SignalType::Breathing, 14);
        assert_eq!(
            result,
            SequenceCheck::Gap {
                expected: 11,
                observed: 14,
                lost: 3
            }
        );
        assert!(result.starts_new_stream());

        // 跳变后以新序列号为基准
        assert_eq!(tracker.check(SignalType::Breathing, 15), SequenceCheck::Continuous);

        // 跨回绕的跳变：254 -> 2，丢失255、0、1
        tracker.check(SignalType::Breathing, 254);
        assert_eq!(
            tracker.check(SignalType::Breathing, 2),
            SequenceCheck::Gap {
                expected: 255,
                observed: 2,
                lost: 3
            }
        );

        let counters = tracker.counters(SignalType::Breathing);
        assert_eq!(counters.packets, 5);
        assert_eq!(counters.gaps, 3);
    }

    #[test]
    fn test_sequence_tracker_duplicate() {
        let mut tracker = SequenceTracker::default();

        tracker.check(SignalType::Acceleration, 7);
        let result = tracker.check(SignalType::Acceleration, 7);
        assert_eq!(result, SequenceCheck::Duplicate);
        assert!(result.starts_new_stream());
        assert_eq!(tracker.counters(SignalType::Acceleration).duplicates, 1);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut tracker = SequenceTracker::default();

        tracker.check(SignalType::Rr, 5);
        assert_eq!(tracker.check(SignalType::Ecg, 100), SequenceCheck::FirstPacket);
        assert_eq!(tracker.check(SignalType::Rr, 6), SequenceCheck::Continuous);
        assert_eq!(tracker.last_sequence(SignalType::Breathing), None);
    }

    #[test]
    fn test_custom_wraparound() {
        let mut tracker = SequenceTracker::new(16);

        tracker.check(SignalType::Rr, 15);
        assert_eq!(tracker.check(SignalType::Rr, 0), SequenceCheck::Continuous);
    }
}
