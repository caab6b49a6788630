//! 捕获文件格式
//!
//! 每行一帧：`<主机接收时间(秒)> <消息ID(十六进制)> <载荷(十六进制)>`，
//! 以`#`开头的行和空行被忽略

use bht_codec::CapturedFrame;
use bht_core::{MessageFrame, TelemetryError};

/// 解析一行捕获记录
pub fn parse_line(line: &str) -> Result<Option<CapturedFrame>, TelemetryError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (Some(host), Some(id), payload) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TelemetryError::malformed(format!(
            "expected `<host_seconds> <message_id> <payload>`, got `{line}`"
        )));
    };
    if parts.next().is_some() {
        return Err(TelemetryError::malformed(format!(
            "unexpected trailing fields in `{line}`"
        )));
    }

    let host_time: f64 = host
        .parse()
        .map_err(|_| TelemetryError::malformed(format!("invalid host time `{host}`")))?;
    if !host_time.is_finite() {
        return Err(TelemetryError::malformed(format!(
            "host time `{host}` is not finite"
        )));
    }

    let id = id.trim_start_matches("0x").trim_start_matches("0X");
    let message_id = u8::from_str_radix(id, 16)
        .map_err(|_| TelemetryError::malformed(format!("invalid message id `{id}`")))?;

    let payload = hex::decode(payload.unwrap_or_default())
        .map_err(|e| TelemetryError::malformed(format!("invalid payload hex: {e}")))?;

    Ok(Some(CapturedFrame {
        host_time,
        frame: MessageFrame::new(message_id, payload),
    }))
}

/// 格式化为一行捕获记录
pub fn format_line(captured: &CapturedFrame) -> String {
    format!(
        "{:.6} {:02X} {}",
        captured.host_time,
        captured.frame.message_id,
        hex::encode_upper(&captured.frame.payload)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let captured = parse_line("1457481602.250000 2B 01ff").unwrap().unwrap();
        assert_eq!(captured.host_time, 1_457_481_602.25);
        assert_eq!(captured.frame.message_id, 0x2B);
        assert_eq!(&captured.frame.payload[..], &[0x01, 0xFF]);

        let captured = parse_line("  3.5 0x24  ").unwrap().unwrap();
        assert_eq!(captured.frame.message_id, 0x24);
        assert!(captured.frame.payload.is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines() {
        assert!(parse_line("# recorded 2016-03-09").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_line("abc 2B 00").is_err());
        assert!(parse_line("1.0 2B0 00").is_err());
        assert!(parse_line("1.0 2B 0").is_err());
        assert!(parse_line("1.0").is_err());
        assert!(parse_line("1.0 2B 00 11").is_err());
        assert!(parse_line("NaN 2B 00").is_err());
    }

    #[test]
    fn test_format_then_parse() {
        let captured = CapturedFrame {
            host_time: 1_457_481_600.125,
            frame: MessageFrame::new(0x22, vec![0xDE, 0xAD, 0xBE, 0xEF]),
        };
        let line = format_line(&captured);
        assert_eq!(line, "1457481600.125000 22 DEADBEEF");
        assert_eq!(parse_line(&line).unwrap(), Some(captured));
    }
}
