//! BHT Core Library
//!
//! 本crate提供BioHarness遥测系统的核心数据结构：
//! 消息帧、解码后的记录类型、采样展开、错误类型与流水线配置。

pub mod config;
pub mod error;
pub mod message;
pub mod utils;

// 导出错误类型
pub use error::TelemetryError;

// 导出配置类型
pub use config::{ClockConfig, PipelineConfig, RrWindowConfig};

// 导出消息与记录类型，便于其他模块使用
pub use message::*;

/// 库内统一的Result别名
pub type Result<T> = std::result::Result<T, TelemetryError>;
