//! 常用订阅者：RR滑动窗口、摘要状态监视与事件记录

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bht_core::{
    PhysiologicalEvent, RrWindowConfig, Samples, SignalPacket, SummaryMessage, TelemetryError,
};
use tracing::warn;

use crate::handler::{EventSubscriber, SignalSubscriber, SummarySubscriber};

/// 一个完整的RR窗口
#[derive(Debug, Clone, PartialEq)]
pub struct RrWindowSnapshot {
    /// 窗口中最新采样的时间戳
    pub timestamp: f64,
    /// 最旧在前
    pub values: Vec<i16>,
}

/// 窗口接收者
pub trait WindowSink {
    fn on_window(&mut self, window: &RrWindowSnapshot) -> Result<(), TelemetryError>;
}

impl<F> WindowSink for F
where
    F: FnMut(&RrWindowSnapshot) -> Result<(), TelemetryError>,
{
    fn on_window(&mut self, window: &RrWindowSnapshot) -> Result<(), TelemetryError> {
        self(window)
    }
}

/// RR采样滑动窗口
///
/// 窗口满时把全部内容交给接收者，然后丢弃最旧的`step`个采样
pub struct RrWindow {
    buffer: VecDeque<i16>,
    capacity: usize,
    step: usize,
    sink: Box<dyn WindowSink>,
    windows: u64,
}

impl RrWindow {
    pub fn new(config: &RrWindowConfig, sink: Box<dyn WindowSink>) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            step: config.step.clamp(1, capacity),
            sink,
            windows: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 已发出的窗口数
    pub fn windows(&self) -> u64 {
        self.windows
    }

    fn push(&mut self, value: i16, timestamp: f64) -> Result<(), TelemetryError> {
        self.buffer.push_back(value);
        if self.buffer.len() < self.capacity {
            return Ok(());
        }

        let snapshot = RrWindowSnapshot {
            timestamp,
            values: self.buffer.iter().copied().collect(),
        };
        self.buffer.drain(..self.step);
        self.windows += 1;
        self.sink.on_window(&snapshot)
    }
}

impl SignalSubscriber for RrWindow {
    fn on_signal(&mut self, packet: &SignalPacket, _: bool) -> Result<(), TelemetryError> {
        let Samples::Rr(samples) = packet.samples() else {
            return Ok(());
        };
        for (index, &value) in samples.iter().enumerate() {
            self.push(value, packet.sample_timestamp(index))?;
        }
        Ok(())
    }
}

/// 摘要状态监视器
///
/// 心率、呼吸率或HRV不可靠，或按钮被按下时记录警告。克隆体共享计数。
#[derive(Debug, Clone, Default)]
pub struct SummaryStatusMonitor {
    flagged: Rc<Cell<u64>>,
}

impl SummaryStatusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 被标记的摘要数
    pub fn flagged(&self) -> u64 {
        self.flagged.get()
    }
}

impl SummarySubscriber for SummaryStatusMonitor {
    fn on_summary(&mut self, summary: &SummaryMessage) -> Result<(), TelemetryError> {
        if summary.heart_rate_unreliable
            || summary.respiration_rate_unreliable
            || summary.hrv_unreliable
            || summary.button_pressed
        {
            self.flagged.set(self.flagged.get() + 1);
            warn!(
                heart_rate_reliable = !summary.heart_rate_unreliable,
                respiration_rate_reliable = !summary.respiration_rate_unreliable,
                hrv_reliable = !summary.hrv_unreliable,
                button_pressed = summary.button_pressed,
                "device reported degraded summary"
            );
        }
        Ok(())
    }
}

/// 事件记录，克隆体共享同一份记录
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<PhysiologicalEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PhysiologicalEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// 取出并清空已记录的事件
    pub fn take(&self) -> Vec<PhysiologicalEvent> {
        self.events.take()
    }
}

impl EventSubscriber for EventLog {
    fn on_event(&mut self, event: &PhysiologicalEvent) -> Result<(), TelemetryError> {
        self.events.borrow_mut().push(*event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bht_core::SignalType;

    fn rr_packet(timestamp: f64, samples: Vec<i16>) -> SignalPacket {
        SignalPacket::new(SignalType::Rr, timestamp, 18.0, Samples::Rr(samples), 0).unwrap()
    }

    type WindowLog = Rc<RefCell<Vec<RrWindowSnapshot>>>;

    fn window_with_log(capacity: usize, step: usize) -> (RrWindow, WindowLog) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let window = RrWindow::new(
            &RrWindowConfig { capacity, step },
            Box::new(move |w: &RrWindowSnapshot| -> Result<(), TelemetryError> {
                sink.borrow_mut().push(w.clone());
                Ok(())
            }),
        );
        (window, log)
    }

    #[test]
    fn test_rr_window_emits_when_full() {
        let (mut window, log) = window_with_log(4, 2);

        window.on_signal(&rr_packet(0.0, vec![1, 2, 3]), true).unwrap();
        assert!(log.borrow().is_empty());

        window.on_signal(&rr_packet(3.0 / 18.0, vec![4, 5, 6]), false).unwrap();
        let windows = log.borrow();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].values, vec![1, 2, 3, 4]);
        assert_eq!(windows[0].timestamp, 3.0 / 18.0);
        assert_eq!(windows[1].values, vec![3, 4, 5, 6]);
        assert_eq!(window.len(), 2);
        assert_eq!(window.windows(), 2);
    }

    #[test]
    fn test_rr_window_memory_bounded() {
        let (mut window, log) = window_with_log(1024, 18);

        for i in 0..100 {
            let packet = rr_packet(i as f64, vec![800; 18]);
            window.on_signal(&packet, i == 0).unwrap();
            assert!(window.len() < 1024);
        }
        // 1800个采样：第一个窗口在第1024个采样时发出，其后每18个采样一个
        assert_eq!(log.borrow().len(), 1 + (1800 - 1024) / 18);
        assert!(log.borrow().iter().all(|w| w.values.len() == 1024));
    }

    #[test]
    fn test_rr_window_ignores_other_signals() {
        let (mut window, _) = window_with_log(2, 1);
        let ecg = SignalPacket::new(
            SignalType::Ecg,
            0.0,
            250.0,
            Samples::Waveform(vec![1, 2, 3]),
            0,
        )
        .unwrap();
        window.on_signal(&ecg, true).unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn test_status_monitor_counts_flagged() {
        use bht_codec::FrameGenerator;

        let monitor = SummaryStatusMonitor::new();
        let mut subscriber = monitor.clone();

        let mut summary = FrameGenerator::with_seed(9).random_summary(0, 0.0).unwrap();
        summary.heart_rate_unreliable = false;
        summary.respiration_rate_unreliable = false;
        summary.hrv_unreliable = false;
        summary.button_pressed = false;
        subscriber.on_summary(&summary).unwrap();
        assert_eq!(monitor.flagged(), 0);

        summary.button_pressed = true;
        subscriber.on_summary(&summary).unwrap();
        assert_eq!(monitor.flagged(), 1);
    }

    #[test]
    fn test_event_log_shared() {
        let log = EventLog::new();
        let mut subscriber = log.clone();
        subscriber
            .on_event(&PhysiologicalEvent::HeartbeatInterval {
                timestamp: 1.0,
                interval: 812,
            })
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.take().len(), 1);
        assert!(log.is_empty());
    }
}
