//! 设备时间戳
//!
//! 8字节布局：年（u16小端）、月、日、当日毫秒数（u32小端）。
//! 日历日期按UTC解释，换算为Unix纪元秒。

use bht_core::TelemetryError;

use crate::field_decoder::{decode_fields, encode_fields, DecodedFields, FieldSpec, FieldValue};

pub const TIMESTAMP_BYTES: usize = 8;

pub const TIMESTAMP_LAYOUT: [FieldSpec; 4] = [
    FieldSpec::uint("year", 16),
    FieldSpec::uint("month", 8),
    FieldSpec::uint("day", 8),
    FieldSpec::uint("day_milliseconds", 32),
];

const MILLISECONDS_PER_DAY: u32 = 86_400_000;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub day_milliseconds: u32,
}

impl DeviceTimestamp {
    /// 从8字节载荷片段解析
    pub fn parse(bytes: &[u8]) -> Result<Self, TelemetryError> {
        let fields = decode_fields(&TIMESTAMP_LAYOUT, bytes)?;
        let timestamp = Self {
            year: fields.narrow_unsigned("year")?,
            month: fields.narrow_unsigned("month")?,
            day: fields.narrow_unsigned("day")?,
            day_milliseconds: fields.narrow_unsigned("day_milliseconds")?,
        };
        timestamp.validate()?;
        Ok(timestamp)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        if !(1..=12).contains(&self.month) || !(1..=31).contains(&self.day) {
            return Err(TelemetryError::malformed(format!(
                "invalid device date {:04}-{:02}-{:02}",
                self.year, self.month, self.day
            )));
        }
        if self.day_milliseconds >= MILLISECONDS_PER_DAY {
            return Err(TelemetryError::malformed(format!(
                "invalid millisecond of day {}",
                self.day_milliseconds
            )));
        }
        Ok(())
    }

    pub fn to_unix_seconds(&self) -> f64 {
        let days = days_from_civil(i64::from(self.year), u32::from(self.month), u32::from(self.day));
        days as f64 * SECONDS_PER_DAY + f64::from(self.day_milliseconds) / 1000.0
    }

    /// 由Unix纪元秒构造（精确到毫秒），超出u16年份范围时返回None
    pub fn from_unix_seconds(seconds: f64) -> Option<Self> {
        if !seconds.is_finite() {
            return None;
        }
        let total_ms = (seconds * 1000.0).round() as i64;
        let days = total_ms.div_euclid(i64::from(MILLISECONDS_PER_DAY));
        let day_milliseconds = total_ms.rem_euclid(i64::from(MILLISECONDS_PER_DAY)) as u32;
        let (year, month, day) = civil_from_days(days);

        Some(Self {
            year: u16::try_from(year).ok()?,
            month: month as u8,
            day: day as u8,
            day_milliseconds,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut fields = DecodedFields::new();
        fields.push("year", FieldValue::Unsigned(u64::from(self.year)));
        fields.push("month", FieldValue::Unsigned(u64::from(self.month)));
        fields.push("day", FieldValue::Unsigned(u64::from(self.day)));
        fields.push(
            "day_milliseconds",
            FieldValue::Unsigned(u64::from(self.day_milliseconds)),
        );
        // 所有字段都在位宽范围内，编码不会失败
        encode_fields(&TIMESTAMP_LAYOUT, &fields).unwrap_or_default()
    }
}

/// 解析设备时间戳并换算为Unix纪元秒
pub fn parse_timestamp(bytes: &[u8]) -> Result<f64, TelemetryError> {
    Ok(DeviceTimestamp::parse(bytes)?.to_unix_seconds())
}

/// 公历日期到1970-01-01起的天数
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let m = i64::from(month);
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// 1970-01-01起的天数到公历日期
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { y + 1 } else { y }, month, day)
}
