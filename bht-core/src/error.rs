//! 遥测错误定义

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// 载荷长度与固定布局不一致
    MalformedPayload(String),
    /// 采样形状与信号类型不匹配
    InvalidSignal(String),
    /// 订阅者处理失败
    Subscriber(String),
    /// 配置错误
    Config(String),
    /// 文件读写错误
    Io(String),
    /// 其他错误
    Other(String),
}

impl TelemetryError {
    /// 构造载荷格式错误
    pub fn malformed(msg: impl Into<String>) -> Self {
        TelemetryError::MalformedPayload(msg.into())
    }

    /// 是否为单帧可丢弃的解码错误
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            TelemetryError::MalformedPayload(_) | TelemetryError::InvalidSignal(_)
        )
    }
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::MalformedPayload(msg) => write!(f, "Malformed payload: {msg}"),
            TelemetryError::InvalidSignal(msg) => write!(f, "Invalid signal: {msg}"),
            TelemetryError::Subscriber(msg) => write!(f, "Subscriber error: {msg}"),
            TelemetryError::Config(msg) => write!(f, "Config error: {msg}"),
            TelemetryError::Io(msg) => write!(f, "IO error: {msg}"),
            TelemetryError::Other(msg) => write!(f, "Other error: {msg}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<String> for TelemetryError {
    fn from(s: String) -> Self {
        TelemetryError::Other(s)
    }
}

impl From<&str> for TelemetryError {
    fn from(s: &str) -> Self {
        TelemetryError::Other(s.to_string())
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(e: std::io::Error) -> Self {
        TelemetryError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(e: serde_json::Error) -> Self {
        TelemetryError::Config(e.to_string())
    }
}
