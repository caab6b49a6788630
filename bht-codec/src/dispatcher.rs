//! 消息分发器
//!
//! 按消息ID选择解码器，并把解码结果按注册顺序同步分发给订阅者

use bht_core::{Message, MessageFrame, MessageId, SignalType, TelemetryError};
use tracing::trace;

use crate::records::{parse_hxm, parse_summary, SignalLayout};

/// 消息订阅者
pub trait MessageSubscriber {
    fn on_message(&mut self, message: &Message) -> Result<(), TelemetryError>;
}

impl<F> MessageSubscriber for F
where
    F: FnMut(&Message) -> Result<(), TelemetryError>,
{
    fn on_message(&mut self, message: &Message) -> Result<(), TelemetryError> {
        self(message)
    }
}

/// 分发统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub decoded: u64,
    pub ignored: u64,
    pub malformed: u64,
}

/// 消息分发器
#[derive(Default)]
pub struct MessageDispatcher {
    subscribers: Vec<Box<dyn MessageSubscriber>>,
    stats: DispatchStats,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者，调用顺序即注册顺序
    pub fn subscribe(&mut self, subscriber: Box<dyn MessageSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// 解码一帧
    ///
    /// # 返回
    /// - `Ok(None)`: 未知消息ID，忽略
    /// - `Ok(Some(message))`: 解码成功
    /// - `Err(TelemetryError)`: 载荷格式错误
    pub fn decode(&mut self, frame: &MessageFrame) -> Result<Option<Message>, TelemetryError> {
        let Some(id) = MessageId::from_u8(frame.message_id) else {
            trace!(message_id = frame.message_id, "ignoring unknown message id");
            self.stats.ignored += 1;
            return Ok(None);
        };

        match decode_payload(id, &frame.payload) {
            Ok(message) => {
                self.stats.decoded += 1;
                Ok(Some(message))
            }
            Err(e) => {
                self.stats.malformed += 1;
                Err(e)
            }
        }
    }

    /// 把已解码的消息依次交给所有订阅者，首个错误中止分发
    pub fn publish(&mut self, message: &Message) -> Result<usize, TelemetryError> {
        for (invoked, subscriber) in self.subscribers.iter_mut().enumerate() {
            subscriber.on_message(message).map_err(|e| match e {
                TelemetryError::Subscriber(msg) => TelemetryError::Subscriber(msg),
                other => TelemetryError::Subscriber(format!(
                    "subscriber {invoked} failed on {:?}: {other}",
                    message.message_id()
                )),
            })?;
        }
        Ok(self.subscribers.len())
    }

    /// 解码并分发一帧，返回被调用的订阅者数量
    pub fn dispatch(&mut self, frame: &MessageFrame) -> Result<usize, TelemetryError> {
        match self.decode(frame)? {
            Some(message) => self.publish(&message),
            None => Ok(0),
        }
    }
}

/// 固定的消息ID到解码器映射
pub fn decode_payload(id: MessageId, payload: &[u8]) -> Result<Message, TelemetryError> {
    let message = match id {
        MessageId::Summary => Message::Summary(parse_summary(payload)?),
        MessageId::Hxm => Message::Hxm(parse_hxm(payload)?),
        MessageId::Breathing => signal(SignalType::Breathing, payload)?,
        MessageId::Ecg => signal(SignalType::Ecg, payload)?,
        MessageId::Rr => signal(SignalType::Rr, payload)?,
        MessageId::Acceleration => signal(SignalType::Acceleration, payload)?,
    };
    Ok(message)
}

fn signal(signal_type: SignalType, payload: &[u8]) -> Result<Message, TelemetryError> {
    Ok(Message::Signal(
        SignalLayout::for_signal(signal_type).parse(payload)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_builder::rr_frame;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(
        log: &Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
    ) -> Box<dyn MessageSubscriber> {
        let log = Rc::clone(log);
        Box::new(move |_: &Message| -> Result<(), TelemetryError> {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.subscribe(recorder(&log, "a"));

        let frame = MessageFrame::new(0x23, vec![1, 2, 3]);
        assert_eq!(dispatcher.dispatch(&frame).unwrap(), 0);
        assert!(log.borrow().is_empty());
        assert_eq!(dispatcher.stats().ignored, 1);
    }

    #[test]
    fn test_subscribers_called_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.subscribe(recorder(&log, "first"));
        dispatcher.subscribe(recorder(&log, "second"));

        let frame = rr_frame(0, 1_457_481_600.0, &[812]).unwrap();
        assert_eq!(dispatcher.dispatch(&frame).unwrap(), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_failing_subscriber_aborts_fan_out() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.subscribe(recorder(&log, "first"));
        dispatcher.subscribe(Box::new(|_: &Message| -> Result<(), TelemetryError> {
            Err(TelemetryError::from("sink closed"))
        }));
        dispatcher.subscribe(recorder(&log, "third"));

        let err = dispatcher
            .dispatch(&rr_frame(0, 1_457_481_600.0, &[812]).unwrap())
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Subscriber(_)));
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn test_malformed_payload_not_dispatched() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.subscribe(recorder(&log, "a"));

        let frame = MessageFrame::new(MessageId::Summary.as_u8(), vec![0u8; 12]);
        let err = dispatcher.dispatch(&frame).unwrap_err();
        assert!(err.is_frame_local());
        assert!(log.borrow().is_empty());
        assert_eq!(dispatcher.stats().malformed, 1);
    }
}
