//! 流水线配置
//!
//! 所有字段均有默认值，JSON中缺省的字段取默认值

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// 时钟差估计器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// 估计值每秒主机时间向上衰减的秒数
    pub decay_rate: f64,
    /// 与当前估计值偏差超过该阈值（秒）的观测视为离群
    pub outlier_threshold: f64,
    /// 连续离群次数达到该值时按新观测重新初始化
    pub outlier_reset_count: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.0005,
            outlier_threshold: 5.0,
            outlier_reset_count: 10,
        }
    }
}

/// RR滑动窗口参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RrWindowConfig {
    pub capacity: usize,
    pub step: usize,
}

impl Default for RrWindowConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            step: 18,
        }
    }
}

/// 单个设备连接的流水线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 序列号模数
    pub sequence_wraparound: u16,
    pub clock: ClockConfig,
    pub rr_window: RrWindowConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sequence_wraparound: 256,
            clock: ClockConfig::default(),
            rr_window: RrWindowConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, TelemetryError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TelemetryError::Io(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&text)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.sequence_wraparound == 0 {
            return Err(TelemetryError::Config(
                "sequence_wraparound must be positive".to_string(),
            ));
        }

        let clock = &self.clock;
        if !(clock.decay_rate.is_finite() && clock.decay_rate >= 0.0) {
            return Err(TelemetryError::Config(format!(
                "clock.decay_rate must be a non-negative number, got {}",
                clock.decay_rate
            )));
        }
        if !(clock.outlier_threshold.is_finite() && clock.outlier_threshold > 0.0) {
            return Err(TelemetryError::Config(format!(
                "clock.outlier_threshold must be positive, got {}",
                clock.outlier_threshold
            )));
        }
        if clock.outlier_reset_count == 0 {
            return Err(TelemetryError::Config(
                "clock.outlier_reset_count must be positive".to_string(),
            ));
        }

        let window = &self.rr_window;
        if window.capacity == 0 || window.step == 0 {
            return Err(TelemetryError::Config(
                "rr_window.capacity and rr_window.step must be positive".to_string(),
            ));
        }
        if window.step > window.capacity {
            return Err(TelemetryError::Config(format!(
                "rr_window.step ({}) exceeds capacity ({})",
                window.step, window.capacity
            )));
        }

        Ok(())
    }
}
