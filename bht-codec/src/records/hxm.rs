//! HxM心率带消息解码

use bht_core::{HxMMessage, TelemetryError};

use crate::field_decoder::{decode_fields, encode_fields, DecodedFields, FieldSpec, FieldValue};

/// 心跳时间戳字段名（最旧在前）
const HEARTBEAT_TIMESTAMP_FIELDS: [&str; 15] = [
    "heartbeat_timestamp_1",
    "heartbeat_timestamp_2",
    "heartbeat_timestamp_3",
    "heartbeat_timestamp_4",
    "heartbeat_timestamp_5",
    "heartbeat_timestamp_6",
    "heartbeat_timestamp_7",
    "heartbeat_timestamp_8",
    "heartbeat_timestamp_9",
    "heartbeat_timestamp_10",
    "heartbeat_timestamp_11",
    "heartbeat_timestamp_12",
    "heartbeat_timestamp_13",
    "heartbeat_timestamp_14",
    "heartbeat_timestamp_15",
];

/// HxM载荷布局（53字节，其后的保留字节忽略）
pub const HXM_LAYOUT: &[FieldSpec] = &[
    FieldSpec::uint("firmware_id", 16),
    FieldSpec::uint("firmware_version", 16),
    FieldSpec::uint("hardware_id", 16),
    FieldSpec::uint("hardware_version", 16),
    FieldSpec::uint("battery_charge", 8),
    FieldSpec::uint("heart_rate", 8),
    FieldSpec::uint("heartbeat_number", 8),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[0], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[1], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[2], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[3], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[4], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[5], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[6], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[7], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[8], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[9], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[10], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[11], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[12], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[13], 16),
    FieldSpec::uint(HEARTBEAT_TIMESTAMP_FIELDS[14], 16),
    FieldSpec::reserved(48),
    FieldSpec::scaled_uint("distance", 16, 1.0 / 16.0),
    FieldSpec::scaled_uint("speed", 16, 1.0 / 256.0),
    FieldSpec::uint("strides", 16),
];

/// 解析HxM消息载荷
pub fn parse_hxm(payload: &[u8]) -> Result<HxMMessage, TelemetryError> {
    let f = decode_fields(HXM_LAYOUT, payload)?;

    let mut heartbeat_timestamps = [0u16; 15];
    for (slot, name) in heartbeat_timestamps.iter_mut().zip(HEARTBEAT_TIMESTAMP_FIELDS) {
        *slot = f.narrow_unsigned(name)?;
    }

    Ok(HxMMessage {
        firmware_id: f.narrow_unsigned("firmware_id")?,
        firmware_version: f.narrow_unsigned("firmware_version")?,
        hardware_id: f.narrow_unsigned("hardware_id")?,
        hardware_version: f.narrow_unsigned("hardware_version")?,
        battery_charge: f.narrow_unsigned("battery_charge")?,
        heart_rate: f.narrow_unsigned("heart_rate")?,
        heartbeat_number: f.narrow_unsigned("heartbeat_number")?,
        heartbeat_timestamps,
        distance: f.scaled("distance")?,
        speed: f.scaled("speed")?,
        strides: f.narrow_unsigned("strides")?,
    })
}

/// 把HxM消息编码为载荷（保留字节写0）
pub fn encode_hxm_payload(m: &HxMMessage) -> Result<Vec<u8>, TelemetryError> {
    let mut f = DecodedFields::new();
    f.push("firmware_id", FieldValue::Unsigned(u64::from(m.firmware_id)));
    f.push("firmware_version", FieldValue::Unsigned(u64::from(m.firmware_version)));
    f.push("hardware_id", FieldValue::Unsigned(u64::from(m.hardware_id)));
    f.push("hardware_version", FieldValue::Unsigned(u64::from(m.hardware_version)));
    f.push("battery_charge", FieldValue::Unsigned(u64::from(m.battery_charge)));
    f.push("heart_rate", FieldValue::Unsigned(u64::from(m.heart_rate)));
    f.push("heartbeat_number", FieldValue::Unsigned(u64::from(m.heartbeat_number)));
    for (&name, &ts) in HEARTBEAT_TIMESTAMP_FIELDS.iter().zip(&m.heartbeat_timestamps) {
        f.push(name, FieldValue::Unsigned(u64::from(ts)));
    }
    f.push("distance", FieldValue::Scaled(m.distance));
    f.push("speed", FieldValue::Scaled(m.speed));
    f.push("strides", FieldValue::Unsigned(u64::from(m.strides)));

    encode_fields(HXM_LAYOUT, &f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_decoder::table_bits;

    #[test]
    fn test_layout_size() {
        assert_eq!(table_bits(HXM_LAYOUT), 53 * 8);
    }

    #[test]
    fn test_parse_offsets() {
        let mut payload = vec![0u8; 60];
        payload[8] = 90; // battery
        payload[9] = 65; // heart rate
        payload[10] = 201; // heartbeat number
        payload[11..13].copy_from_slice(&1000u16.to_le_bytes());
        payload[39..41].copy_from_slice(&15000u16.to_le_bytes());
        payload[41..47].copy_from_slice(&[0xFF; 6]); // 保留
        payload[47..49].copy_from_slice(&(16u16 * 250).to_le_bytes()); // 250 m
        payload[49..51].copy_from_slice(&(256u16 * 3 + 128).to_le_bytes()); // 3.5 m/s
        payload[51..53].copy_from_slice(&321u16.to_le_bytes());

        let hxm = parse_hxm(&payload).unwrap();
        assert_eq!(hxm.battery_charge, 90);
        assert_eq!(hxm.heart_rate, 65);
        assert_eq!(hxm.heartbeat_number, 201);
        assert_eq!(hxm.heartbeat_timestamps[0], 1000);
        assert_eq!(hxm.heartbeat_timestamps[14], 15000);
        assert_eq!(hxm.distance, 250.0);
        assert_eq!(hxm.speed, 3.5);
        assert_eq!(hxm.strides, 321);
    }

    #[test]
    fn test_short_payload() {
        let err = parse_hxm(&[0u8; 52]).unwrap_err();
        assert!(matches!(err, TelemetryError::MalformedPayload(_)));
    }

    #[test]
    fn test_encode_then_parse() {
        let hxm = HxMMessage {
            firmware_id: 0x1A2B,
            firmware_version: 0x0102,
            hardware_id: 0x3C4D,
            hardware_version: 0x0304,
            battery_charge: 77,
            heart_rate: 58,
            heartbeat_number: 12,
            heartbeat_timestamps: [
                100, 200, 300, 400, 500, 600, 700, 800, 900, 1000, 1100, 1200, 1300, 1400, 1500,
            ],
            distance: 12.5,
            speed: 1.25,
            strides: 40,
        };
        let payload = encode_hxm_payload(&hxm).unwrap();
        assert_eq!(payload.len(), 53);
        assert_eq!(parse_hxm(&payload).unwrap(), hxm);
    }
}
