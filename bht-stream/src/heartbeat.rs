//! 心跳边沿检测
//!
//! 设备在每次检测到新心跳时翻转RR间期的符号，
//! 符号变化的位置即一次心跳，间期为该采样的绝对值（毫秒）

use bht_core::{PhysiologicalEvent, Samples, SignalPacket, TelemetryError};

use crate::handler::{subscriber_failed, EventSubscriber, SignalSubscriber};

/// 心跳检测器，只处理RR流
#[derive(Default)]
pub struct HeartbeatDetector {
    /// 上一个采样的符号，尚未见过任何采样时为None
    last_sign: Option<i8>,
    subscribers: Vec<Box<dyn EventSubscriber>>,
    emitted: u64,
}

impl HeartbeatDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_subscriber(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// 已发出的心跳事件数
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn emit(&mut self, event: PhysiologicalEvent) -> Result<(), TelemetryError> {
        self.emitted += 1;
        for (i, subscriber) in self.subscribers.iter_mut().enumerate() {
            subscriber
                .on_event(&event)
                .map_err(|e| subscriber_failed("event", i, e))?;
        }
        Ok(())
    }
}

impl SignalSubscriber for HeartbeatDetector {
    fn on_signal(
        &mut self,
        packet: &SignalPacket,
        starts_new_stream: bool,
    ) -> Result<(), TelemetryError> {
        let Samples::Rr(samples) = packet.samples() else {
            return Ok(());
        };

        // 订阅者出错后停止发出事件，但仍逐个采样更新符号
        let mut result = Ok(());
        for (index, &raw) in samples.iter().enumerate() {
            let sign = raw.signum() as i8;
            let discontinuity = index == 0 && starts_new_stream;
            let changed = self.last_sign.is_some_and(|last| last != sign);
            self.last_sign = Some(sign);

            if changed && !discontinuity && result.is_ok() {
                result = self.emit(PhysiologicalEvent::HeartbeatInterval {
                    timestamp: packet.sample_timestamp(index),
                    interval: raw.unsigned_abs(),
                });
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bht_core::SignalType;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn rr_packet(timestamp: f64, samples: Vec<i16>) -> SignalPacket {
        SignalPacket::new(SignalType::Rr, timestamp, 18.0, Samples::Rr(samples), 0).unwrap()
    }

    fn detector_with_log() -> (HeartbeatDetector, Rc<RefCell<Vec<PhysiologicalEvent>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut detector = HeartbeatDetector::new();
        detector.add_event_subscriber(Box::new(
            move |event: &PhysiologicalEvent| -> Result<(), TelemetryError> {
                sink.borrow_mut().push(*event);
                Ok(())
            },
        ));
        (detector, log)
    }

    #[test]
    fn test_sign_changes_emit_heartbeats() {
        let (mut detector, log) = detector_with_log();

        detector
            .on_signal(&rr_packet(36.0, vec![5, 5, -3, -3, 2]), true)
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                PhysiologicalEvent::HeartbeatInterval {
                    timestamp: 36.0 + 2.0 / 18.0,
                    interval: 3
                },
                PhysiologicalEvent::HeartbeatInterval {
                    timestamp: 36.0 + 4.0 / 18.0,
                    interval: 2
                },
            ]
        );
        assert_eq!(detector.emitted(), 2);
    }

    #[test]
    fn test_first_sample_has_no_previous_sign() {
        let (mut detector, log) = detector_with_log();

        detector
            .on_signal(&rr_packet(0.0, vec![5, 5, -3, -3, 2]), false)
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                PhysiologicalEvent::HeartbeatInterval {
                    timestamp: 2.0 / 18.0,
                    interval: 3
                },
                PhysiologicalEvent::HeartbeatInterval {
                    timestamp: 4.0 / 18.0,
                    interval: 2
                },
            ]
        );
    }

    #[test]
    fn test_sign_tracked_through_subscriber_failure() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let failing = Rc::new(Cell::new(true));
        let sink = Rc::clone(&log);
        let fail = Rc::clone(&failing);

        let mut detector = HeartbeatDetector::new();
        detector.add_event_subscriber(Box::new(
            move |event: &PhysiologicalEvent| -> Result<(), TelemetryError> {
                if fail.get() {
                    return Err(TelemetryError::Other("sink unavailable".to_string()));
                }
                sink.borrow_mut().push(*event);
                Ok(())
            },
        ));

        let err = detector
            .on_signal(&rr_packet(0.0, vec![800, -700, -700]), true)
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Subscriber(_)));

        // 失败包的末尾符号为负，下一包的正值是一次新心跳
        failing.set(false);
        detector
            .on_signal(&rr_packet(3.0 / 18.0, vec![800, 800]), false)
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![PhysiologicalEvent::HeartbeatInterval {
                timestamp: 3.0 / 18.0,
                interval: 800
            }]
        );
    }

    #[test]
    fn test_no_spurious_event_on_new_stream() {
        let (mut detector, log) = detector_with_log();

        detector.on_signal(&rr_packet(0.0, vec![800, 800]), true).unwrap();
        // 序列号跳变后的首个采样即使符号不同也不视为心跳
        detector.on_signal(&rr_packet(10.0, vec![-790, -790]), true).unwrap();
        assert!(log.borrow().is_empty());

        // 连续包中的首个采样正常检测
        detector.on_signal(&rr_packet(10.0 + 2.0 / 18.0, vec![810]), false).unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].timestamp(), 10.0 + 2.0 / 18.0);
    }

    #[test]
    fn test_zero_counts_as_sign_change() {
        let (mut detector, log) = detector_with_log();

        detector.on_signal(&rr_packet(0.0, vec![700, 0, 0, -700]), true).unwrap();
        let intervals: Vec<u16> = log
            .borrow()
            .iter()
            .map(|e| match e {
                PhysiologicalEvent::HeartbeatInterval { interval, .. } => *interval,
            })
            .collect();
        assert_eq!(intervals, vec![0, 700]);
    }

    #[test]
    fn test_other_signals_ignored() {
        let (mut detector, log) = detector_with_log();

        let ecg = SignalPacket::new(
            SignalType::Ecg,
            0.0,
            250.0,
            Samples::Waveform(vec![0, 1023, 0]),
            0,
        )
        .unwrap();
        detector.on_signal(&ecg, false).unwrap();
        assert!(log.borrow().is_empty());
    }
}
