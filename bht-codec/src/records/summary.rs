//! 摘要消息解码
//!
//! 载荷前10字节为头部：序列号、设备时间戳、打包格式版本号（跳过）；
//! 其后是按`SUMMARY_LAYOUT`紧密排列的位字段。

use bht_core::{SummaryMessage, TelemetryError};

use super::timestamp::{parse_timestamp, DeviceTimestamp, TIMESTAMP_BYTES};
use crate::field_decoder::{
    decode_fields, encode_fields, DecodedFields, FieldSpec, FieldValue,
};

/// 头部长度：序列号 + 时间戳 + 版本号
pub const SUMMARY_HEADER_BYTES: usize = 1 + TIMESTAMP_BYTES + 1;

/// 当前固件使用的打包格式版本
pub const SUMMARY_FORMAT_VERSION: u8 = 2;

/// 摘要位字段布局，顺序与位宽必须与设备固件一致
pub const SUMMARY_LAYOUT: &[FieldSpec] = &[
    FieldSpec::uint("heart_rate", 16),
    FieldSpec::scaled_uint("respiration_rate", 16, 0.1),
    FieldSpec::scaled_int("skin_temperature", 16, 0.1),
    FieldSpec::int("posture", 16),
    FieldSpec::scaled_uint("activity", 16, 0.01),
    FieldSpec::scaled_uint("peak_acceleration", 16, 0.01),
    FieldSpec::scaled_uint("battery_voltage", 16, 0.001),
    FieldSpec::uint("battery_level", 8),
    FieldSpec::uint("respiration_wave_amplitude", 16),
    FieldSpec::uint("respiration_wave_noise", 16),
    FieldSpec::uint("respiration_wave_confidence", 8),
    FieldSpec::scaled_uint("ecg_wave_amplitude", 16, 0.000001),
    FieldSpec::scaled_uint("ecg_wave_noise", 16, 0.000001),
    FieldSpec::uint("ecg_wave_confidence", 8),
    FieldSpec::uint("hrv", 16),
    FieldSpec::uint("system_confidence", 8),
    FieldSpec::uint("gsr", 16),
    FieldSpec::uint("rog", 16),
    FieldSpec::scaled_int("accl_vertical_min", 16, 0.01),
    FieldSpec::scaled_int("accl_vertical_peak", 16, 0.01),
    FieldSpec::scaled_int("accl_lateral_min", 16, 0.01),
    FieldSpec::scaled_int("accl_lateral_peak", 16, 0.01),
    FieldSpec::scaled_int("accl_sagittal_min", 16, 0.01),
    FieldSpec::scaled_int("accl_sagittal_peak", 16, 0.01),
    FieldSpec::scaled_int("device_internal_temp", 16, 0.1),
    // 状态字（16bit）
    FieldSpec::flag("posture_unreliable"),
    FieldSpec::flag("skin_temperature_unreliable"),
    FieldSpec::flag("respiration_rate_unreliable"),
    FieldSpec::flag("heart_rate_unreliable"),
    FieldSpec::flag("not_fitted_to_garment"),
    FieldSpec::flag("button_pressed"),
    FieldSpec::bits("device_worn_detection_level", 2),
    FieldSpec::flag("external_sensors_connected"),
    FieldSpec::flag("resting_stage_detection"),
    FieldSpec::reserved(2),
    FieldSpec::flag("usb_connected"),
    FieldSpec::flag("estimated_core_temp_unreliable"),
    FieldSpec::flag("hrv_unreliable"),
    FieldSpec::flag("activity_unreliable"),
    FieldSpec::uint("link_quality", 8),
    FieldSpec::int("rssi", 8),
    FieldSpec::int("tx_power", 8),
    FieldSpec::scaled_uint("estimated_core_temp", 16, 0.1),
];

/// 解析摘要消息载荷
pub fn parse_summary(payload: &[u8]) -> Result<SummaryMessage, TelemetryError> {
    if payload.len() < SUMMARY_HEADER_BYTES {
        return Err(TelemetryError::malformed(format!(
            "summary payload of {} bytes is shorter than its {SUMMARY_HEADER_BYTES}-byte header",
            payload.len()
        )));
    }

    let sequence_number = payload[0];
    let timestamp = parse_timestamp(&payload[1..1 + TIMESTAMP_BYTES])?;

    let version = payload[SUMMARY_HEADER_BYTES - 1];
    if version != SUMMARY_FORMAT_VERSION {
        tracing::trace!(version, "unexpected summary packing format version");
    }

    let fields = decode_fields(SUMMARY_LAYOUT, &payload[SUMMARY_HEADER_BYTES..])?;
    summary_from_fields(sequence_number, timestamp, &fields)
}

/// 由解码后的字段构造摘要消息
pub fn summary_from_fields(
    sequence_number: u8,
    timestamp: f64,
    f: &DecodedFields,
) -> Result<SummaryMessage, TelemetryError> {
    Ok(SummaryMessage {
        sequence_number,
        timestamp,
        heart_rate: f.narrow_unsigned("heart_rate")?,
        respiration_rate: f.scaled("respiration_rate")?,
        skin_temperature: f.scaled("skin_temperature")?,
        posture: f.narrow_signed("posture")?,
        activity: f.scaled("activity")?,
        peak_acceleration: f.scaled("peak_acceleration")?,
        battery_voltage: f.scaled("battery_voltage")?,
        battery_level: f.narrow_unsigned("battery_level")?,
        respiration_wave_amplitude: f.narrow_unsigned("respiration_wave_amplitude")?,
        respiration_wave_noise: f.narrow_unsigned("respiration_wave_noise")?,
        respiration_wave_confidence: f.narrow_unsigned("respiration_wave_confidence")?,
        ecg_wave_amplitude: f.scaled("ecg_wave_amplitude")?,
        ecg_wave_noise: f.scaled("ecg_wave_noise")?,
        ecg_wave_confidence: f.narrow_unsigned("ecg_wave_confidence")?,
        hrv: f.narrow_unsigned("hrv")?,
        system_confidence: f.narrow_unsigned("system_confidence")?,
        gsr: f.narrow_unsigned("gsr")?,
        rog: f.narrow_unsigned("rog")?,
        accl_vertical_min: f.scaled("accl_vertical_min")?,
        accl_vertical_peak: f.scaled("accl_vertical_peak")?,
        accl_lateral_min: f.scaled("accl_lateral_min")?,
        accl_lateral_peak: f.scaled("accl_lateral_peak")?,
        accl_sagittal_min: f.scaled("accl_sagittal_min")?,
        accl_sagittal_peak: f.scaled("accl_sagittal_peak")?,
        device_internal_temp: f.scaled("device_internal_temp")?,
        posture_unreliable: f.flag("posture_unreliable")?,
        skin_temperature_unreliable: f.flag("skin_temperature_unreliable")?,
        respiration_rate_unreliable: f.flag("respiration_rate_unreliable")?,
        heart_rate_unreliable: f.flag("heart_rate_unreliable")?,
        not_fitted_to_garment: f.flag("not_fitted_to_garment")?,
        button_pressed: f.flag("button_pressed")?,
        device_worn_detection_level: f.narrow_unsigned("device_worn_detection_level")?,
        external_sensors_connected: f.flag("external_sensors_connected")?,
        resting_stage_detection: f.flag("resting_stage_detection")?,
        usb_connected: f.flag("usb_connected")?,
        estimated_core_temp_unreliable: f.flag("estimated_core_temp_unreliable")?,
        hrv_unreliable: f.flag("hrv_unreliable")?,
        activity_unreliable: f.flag("activity_unreliable")?,
        link_quality: f.narrow_unsigned("link_quality")?,
        rssi: f.narrow_signed("rssi")?,
        tx_power: f.narrow_signed("tx_power")?,
        estimated_core_temp: f.scaled("estimated_core_temp")?,
    })
}

/// 摘要消息到字段集合（与`SUMMARY_LAYOUT`同名同序）
pub fn summary_to_fields(m: &SummaryMessage) -> DecodedFields {
    use FieldValue::{Bool, Scaled, Signed, Unsigned};

    let values = [
        ("heart_rate", Unsigned(u64::from(m.heart_rate))),
        ("respiration_rate", Scaled(m.respiration_rate)),
        ("skin_temperature", Scaled(m.skin_temperature)),
        ("posture", Signed(i64::from(m.posture))),
        ("activity", Scaled(m.activity)),
        ("peak_acceleration", Scaled(m.peak_acceleration)),
        ("battery_voltage", Scaled(m.battery_voltage)),
        ("battery_level", Unsigned(u64::from(m.battery_level))),
        (
            "respiration_wave_amplitude",
            Unsigned(u64::from(m.respiration_wave_amplitude)),
        ),
        (
            "respiration_wave_noise",
            Unsigned(u64::from(m.respiration_wave_noise)),
        ),
        (
            "respiration_wave_confidence",
            Unsigned(u64::from(m.respiration_wave_confidence)),
        ),
        ("ecg_wave_amplitude", Scaled(m.ecg_wave_amplitude)),
        ("ecg_wave_noise", Scaled(m.ecg_wave_noise)),
        (
            "ecg_wave_confidence",
            Unsigned(u64::from(m.ecg_wave_confidence)),
        ),
        ("hrv", Unsigned(u64::from(m.hrv))),
        ("system_confidence", Unsigned(u64::from(m.system_confidence))),
        ("gsr", Unsigned(u64::from(m.gsr))),
        ("rog", Unsigned(u64::from(m.rog))),
        ("accl_vertical_min", Scaled(m.accl_vertical_min)),
        ("accl_vertical_peak", Scaled(m.accl_vertical_peak)),
        ("accl_lateral_min", Scaled(m.accl_lateral_min)),
        ("accl_lateral_peak", Scaled(m.accl_lateral_peak)),
        ("accl_sagittal_min", Scaled(m.accl_sagittal_min)),
        ("accl_sagittal_peak", Scaled(m.accl_sagittal_peak)),
        ("device_internal_temp", Scaled(m.device_internal_temp)),
        ("posture_unreliable", Bool(m.posture_unreliable)),
        ("skin_temperature_unreliable", Bool(m.skin_temperature_unreliable)),
        ("respiration_rate_unreliable", Bool(m.respiration_rate_unreliable)),
        ("heart_rate_unreliable", Bool(m.heart_rate_unreliable)),
        ("not_fitted_to_garment", Bool(m.not_fitted_to_garment)),
        ("button_pressed", Bool(m.button_pressed)),
        (
            "device_worn_detection_level",
            Unsigned(u64::from(m.device_worn_detection_level)),
        ),
        ("external_sensors_connected", Bool(m.external_sensors_connected)),
        ("resting_stage_detection", Bool(m.resting_stage_detection)),
        ("usb_connected", Bool(m.usb_connected)),
        (
            "estimated_core_temp_unreliable",
            Bool(m.estimated_core_temp_unreliable),
        ),
        ("hrv_unreliable", Bool(m.hrv_unreliable)),
        ("activity_unreliable", Bool(m.activity_unreliable)),
        ("link_quality", Unsigned(u64::from(m.link_quality))),
        ("rssi", Signed(i64::from(m.rssi))),
        ("tx_power", Signed(i64::from(m.tx_power))),
        ("estimated_core_temp", Scaled(m.estimated_core_temp)),
    ];

    let mut fields = DecodedFields::new();
    for (name, value) in values {
        fields.push(name, value);
    }
    fields
}

/// 把摘要消息编码为完整载荷（头部 + 位字段）
///
/// 时间戳按毫秒精度写入；比例字段按比例因子取整。
pub fn encode_summary_payload(message: &SummaryMessage) -> Result<Vec<u8>, TelemetryError> {
    let timestamp = DeviceTimestamp::from_unix_seconds(message.timestamp).ok_or_else(|| {
        TelemetryError::malformed(format!(
            "timestamp {} cannot be represented on the wire",
            message.timestamp
        ))
    })?;

    let mut payload = Vec::with_capacity(SUMMARY_HEADER_BYTES + 53);
    payload.push(message.sequence_number);
    payload.extend_from_slice(&timestamp.to_bytes());
    payload.push(SUMMARY_FORMAT_VERSION);
    payload.extend_from_slice(&encode_fields(SUMMARY_LAYOUT, &summary_to_fields(message))?);
    Ok(payload)
}
