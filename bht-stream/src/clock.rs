//! 时钟漂移校正
//!
//! 设备时钟与主机时钟之间存在固定偏移和缓慢漂移，而传输延迟只会让
//! 观测到的 `主机接收时间 - 设备时间` 变大。估计器跟踪该差值的
//! 衰减最小值，按流独立维护。

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use bht_core::{ClockConfig, SignalPacket, SignalType, SummaryMessage};
use tracing::{debug, warn};

/// 时钟估计器的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockKey {
    Signal(SignalType),
    Summary,
}

impl ClockKey {
    pub fn name(&self) -> &'static str {
        match self {
            ClockKey::Signal(signal_type) => signal_type.name(),
            ClockKey::Summary => "bh_summary",
        }
    }
}

impl fmt::Display for ClockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 主机时钟（Unix纪元秒）
pub trait HostClock {
    fn now(&self) -> f64;
}

/// 系统墙钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl HostClock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}

/// 手动推进的时钟，克隆体共享同一时间
///
/// 用于回放捕获文件（时间来自记录）和测试
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl HostClock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// 单个流的时钟差估计器
#[derive(Debug, Clone)]
pub struct ClockDifferenceEstimator {
    config: ClockConfig,
    /// 当前估计的 `主机时间 - 设备时间`
    estimate: Option<f64>,
    /// 上次更新估计值时的主机时间
    last_update: f64,
    consecutive_outliers: u32,
    observations: u64,
    outliers: u64,
}

impl ClockDifferenceEstimator {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            estimate: None,
            last_update: 0.0,
            consecutive_outliers: 0,
            observations: 0,
            outliers: 0,
        }
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn outliers(&self) -> u64 {
        self.outliers
    }

    /// 记录一次 (设备时间, 主机接收时间) 观测，返回更新后的估计值
    pub fn observe(&mut self, device_time: f64, host_time: f64) -> Option<f64> {
        if !(device_time.is_finite() && host_time.is_finite()) {
            debug!(device_time, host_time, "ignoring non-finite clock observation");
            return self.estimate;
        }

        self.observations += 1;
        let lag = host_time - device_time;

        let Some(estimate) = self.estimate else {
            self.seed(lag, host_time);
            return self.estimate;
        };

        let elapsed = (host_time - self.last_update).max(0.0);
        let decayed = estimate + self.config.decay_rate * elapsed;

        if (lag - decayed).abs() > self.config.outlier_threshold {
            self.outliers += 1;
            self.consecutive_outliers += 1;
            debug!(
                lag,
                estimate = decayed,
                consecutive = self.consecutive_outliers,
                "clock observation outside outlier threshold"
            );
            if self.consecutive_outliers >= self.config.outlier_reset_count {
                warn!(lag, previous = decayed, "device clock jumped, re-seeding estimate");
                self.seed(lag, host_time);
            }
            return self.estimate;
        }

        self.consecutive_outliers = 0;
        self.estimate = Some(decayed.min(lag));
        self.last_update = host_time;
        self.estimate
    }

    fn seed(&mut self, lag: f64, host_time: f64) {
        self.estimate = Some(lag);
        self.last_update = host_time;
        self.consecutive_outliers = 0;
    }
}

/// 按键维护独立估计器的时钟校正器
#[derive(Debug, Clone)]
pub struct ClockCorrector {
    config: ClockConfig,
    estimators: HashMap<ClockKey, ClockDifferenceEstimator>,
}

impl ClockCorrector {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            estimators: HashMap::new(),
        }
    }

    /// 观测标称结束时间并返回校正后的结束时间
    ///
    /// 尚无有效估计时原样返回
    pub fn correct(&mut self, key: ClockKey, nominal_end: f64, host_time: f64) -> f64 {
        let config = &self.config;
        let estimator = self
            .estimators
            .entry(key)
            .or_insert_with(|| ClockDifferenceEstimator::new(config.clone()));

        match estimator.observe(nominal_end, host_time) {
            Some(offset) if nominal_end.is_finite() => nominal_end + offset,
            _ => nominal_end,
        }
    }

    /// 校正信号包：整包按结束时间的修正量平移，包内间隔不变
    pub fn correct_signal(&mut self, packet: SignalPacket, host_time: f64) -> SignalPacket {
        let nominal_end = packet.end_timestamp();
        let key = ClockKey::Signal(packet.signal_type());
        let corrected_end = self.correct(key, nominal_end, host_time);
        let start = packet.timestamp() + (corrected_end - nominal_end);
        packet.with_timestamp(start)
    }

    pub fn correct_summary(&mut self, summary: SummaryMessage, host_time: f64) -> SummaryMessage {
        let corrected = self.correct(ClockKey::Summary, summary.timestamp, host_time);
        summary.with_timestamp(corrected)
    }

    pub fn estimator(&self, key: ClockKey) -> Option<&ClockDifferenceEstimator> {
        self.estimators.get(&key)
    }
}
