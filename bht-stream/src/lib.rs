//! BioHarness Telemetry Stream Processing
//!
//! 单个设备连接的流处理：序列号跟踪、时钟漂移校正、
//! 心跳检测，以及把校正后的记录分发给订阅者的流水线。

pub mod clock;
pub mod handler;
pub mod heartbeat;
pub mod sequence;
pub mod subscribers;

pub use clock::{
    ClockCorrector, ClockDifferenceEstimator, ClockKey, HostClock, ManualClock, SystemClock,
};
pub use handler::{
    BioHarnessPipeline, EventSubscriber, FrameOutcome, HxmSubscriber, PacketHandler,
    SignalSubscriber, SummarySubscriber,
};
pub use heartbeat::HeartbeatDetector;
pub use sequence::{SequenceCheck, SequenceTracker, StreamCounters};
pub use subscribers::{EventLog, RrWindow, RrWindowSnapshot, SummaryStatusMonitor, WindowSink};
