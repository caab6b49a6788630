//! 包处理器与单连接流水线
//!
//! 解码后的消息依次经过序列号检查、时钟校正，再分发给各类订阅者

use bht_codec::{MessageDispatcher, MessageSubscriber};
use bht_core::utils::bytes_to_hex;
use bht_core::{
    HxMMessage, Message, MessageFrame, MessageId, PhysiologicalEvent, PipelineConfig,
    SignalPacket, SummaryMessage, TelemetryError,
};
use tracing::debug;

use crate::clock::{ClockCorrector, HostClock};
use crate::sequence::SequenceTracker;

/// 信号包订阅者，接收时钟校正后的包
pub trait SignalSubscriber {
    fn on_signal(
        &mut self,
        packet: &SignalPacket,
        starts_new_stream: bool,
    ) -> Result<(), TelemetryError>;
}

pub trait SummarySubscriber {
    fn on_summary(&mut self, summary: &SummaryMessage) -> Result<(), TelemetryError>;
}

pub trait HxmSubscriber {
    fn on_hxm(&mut self, hxm: &HxMMessage) -> Result<(), TelemetryError>;
}

/// 派生事件订阅者
pub trait EventSubscriber {
    fn on_event(&mut self, event: &PhysiologicalEvent) -> Result<(), TelemetryError>;
}

impl<F> SignalSubscriber for F
where
    F: FnMut(&SignalPacket, bool) -> Result<(), TelemetryError>,
{
    fn on_signal(
        &mut self,
        packet: &SignalPacket,
        starts_new_stream: bool,
    ) -> Result<(), TelemetryError> {
        self(packet, starts_new_stream)
    }
}

impl<F> SummarySubscriber for F
where
    F: FnMut(&SummaryMessage) -> Result<(), TelemetryError>,
{
    fn on_summary(&mut self, summary: &SummaryMessage) -> Result<(), TelemetryError> {
        self(summary)
    }
}

impl<F> HxmSubscriber for F
where
    F: FnMut(&HxMMessage) -> Result<(), TelemetryError>,
{
    fn on_hxm(&mut self, hxm: &HxMMessage) -> Result<(), TelemetryError> {
        self(hxm)
    }
}

impl<F> EventSubscriber for F
where
    F: FnMut(&PhysiologicalEvent) -> Result<(), TelemetryError>,
{
    fn on_event(&mut self, event: &PhysiologicalEvent) -> Result<(), TelemetryError> {
        self(event)
    }
}

/// 订阅者错误统一包装为`Subscriber`，保留原始信息
pub(crate) fn subscriber_failed(
    kind: &str,
    index: usize,
    error: TelemetryError,
) -> TelemetryError {
    match error {
        TelemetryError::Subscriber(msg) => TelemetryError::Subscriber(msg),
        other => {
            TelemetryError::Subscriber(format!("{kind} subscriber {index} failed: {other}"))
        }
    }
}

/// 包处理器
///
/// 持有单个连接的全部流状态：序列号跟踪器、按流的时钟估计器和订阅者
pub struct PacketHandler<C: HostClock> {
    clock: C,
    sequence: SequenceTracker,
    corrector: ClockCorrector,
    signal_subscribers: Vec<Box<dyn SignalSubscriber>>,
    summary_subscribers: Vec<Box<dyn SummarySubscriber>>,
    hxm_subscribers: Vec<Box<dyn HxmSubscriber>>,
}

impl<C: HostClock> PacketHandler<C> {
    pub fn new(config: &PipelineConfig, clock: C) -> Self {
        Self {
            clock,
            sequence: SequenceTracker::new(config.sequence_wraparound),
            corrector: ClockCorrector::new(config.clock.clone()),
            signal_subscribers: Vec::new(),
            summary_subscribers: Vec::new(),
            hxm_subscribers: Vec::new(),
        }
    }

    pub fn add_signal_subscriber(&mut self, subscriber: Box<dyn SignalSubscriber>) {
        self.signal_subscribers.push(subscriber);
    }

    pub fn add_summary_subscriber(&mut self, subscriber: Box<dyn SummarySubscriber>) {
        self.summary_subscribers.push(subscriber);
    }

    pub fn add_hxm_subscriber(&mut self, subscriber: Box<dyn HxmSubscriber>) {
        self.hxm_subscribers.push(subscriber);
    }

    pub fn sequence_tracker(&self) -> &SequenceTracker {
        &self.sequence
    }

    pub fn clock_corrector(&self) -> &ClockCorrector {
        &self.corrector
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// 处理信号包：序列号检查 → 时钟校正 → 分发
    pub fn handle_signal(&mut self, packet: SignalPacket) -> Result<(), TelemetryError> {
        let host_time = self.clock.now();
        let check = self
            .sequence
            .check(packet.signal_type(), packet.sequence_number());
        let packet = self.corrector.correct_signal(packet, host_time);
        let starts_new_stream = check.starts_new_stream();

        for (i, subscriber) in self.signal_subscribers.iter_mut().enumerate() {
            subscriber
                .on_signal(&packet, starts_new_stream)
                .map_err(|e| subscriber_failed("signal", i, e))?;
        }
        Ok(())
    }

    pub fn handle_summary(&mut self, summary: SummaryMessage) -> Result<(), TelemetryError> {
        let host_time = self.clock.now();
        let summary = self.corrector.correct_summary(summary, host_time);

        for (i, subscriber) in self.summary_subscribers.iter_mut().enumerate() {
            subscriber
                .on_summary(&summary)
                .map_err(|e| subscriber_failed("summary", i, e))?;
        }
        Ok(())
    }

    /// HxM消息不带时间戳，原样分发
    pub fn handle_hxm(&mut self, hxm: &HxMMessage) -> Result<(), TelemetryError> {
        for (i, subscriber) in self.hxm_subscribers.iter_mut().enumerate() {
            subscriber
                .on_hxm(hxm)
                .map_err(|e| subscriber_failed("hxm", i, e))?;
        }
        Ok(())
    }
}

impl<C: HostClock> MessageSubscriber for PacketHandler<C> {
    fn on_message(&mut self, message: &Message) -> Result<(), TelemetryError> {
        match message {
            Message::Signal(packet) => self.handle_signal(packet.clone()),
            Message::Summary(summary) => self.handle_summary(summary.clone()),
            Message::Hxm(hxm) => self.handle_hxm(hxm),
        }
    }
}

/// 单帧处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// 未知消息ID，未调用任何订阅者
    Ignored,
    Dispatched(MessageId),
}

/// 单个设备连接的处理流水线
///
/// 设备重连时构造新的流水线，所有流状态随之重置
pub struct BioHarnessPipeline<C: HostClock> {
    dispatcher: MessageDispatcher,
    handler: PacketHandler<C>,
}

impl<C: HostClock> BioHarnessPipeline<C> {
    pub fn new(config: &PipelineConfig, clock: C) -> Result<Self, TelemetryError> {
        config.validate()?;
        Ok(Self {
            dispatcher: MessageDispatcher::new(),
            handler: PacketHandler::new(config, clock),
        })
    }

    pub fn handler(&self) -> &PacketHandler<C> {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut PacketHandler<C> {
        &mut self.handler
    }

    /// 原始消息订阅者在包处理器之后调用，收到未校正的消息
    pub fn dispatcher_mut(&mut self) -> &mut MessageDispatcher {
        &mut self.dispatcher
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    /// 处理一帧
    ///
    /// 返回的错误只影响该帧，调用方记录后可继续处理后续帧
    pub fn handle_frame(&mut self, frame: &MessageFrame) -> Result<FrameOutcome, TelemetryError> {
        let message = match self.dispatcher.decode(frame) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(FrameOutcome::Ignored),
            Err(e) => {
                debug!(
                    message_id = frame.message_id,
                    payload = %bytes_to_hex(&frame.payload),
                    error = %e,
                    "dropping malformed frame"
                );
                return Err(e);
            }
        };

        self.handler.on_message(&message)?;
        self.dispatcher.publish(&message)?;
        Ok(FrameOutcome::Dispatched(message.message_id()))
    }
}
