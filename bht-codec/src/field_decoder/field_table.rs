//! 声明式字段表
//!
//! 每种记录布局都是一张字段表（名称、位宽、编码、比例因子），
//! 由同一个通用解码器按声明顺序读取；编码器使用同一张表把字段写回字节。

use bht_core::utils::bit_ops::set_bits;
use bht_core::TelemetryError;

use super::bit_extractor::BitCursor;

/// 字段编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    /// 小端无符号整数
    UnsignedLe,
    /// 小端二进制补码有符号整数
    SignedLe,
    /// 单个bit布尔量（状态字节内MSB优先）
    Boolean,
    /// MSB优先的原始位组
    RawBits,
    /// 保留位，只消耗不输出
    Reserved,
}

/// 字段定义
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// 以bit为单位
    pub width: usize,
    pub encoding: FieldEncoding,
    /// 比例因子，输出为 `raw * scale`
    pub scale: Option<f64>,
}

impl FieldSpec {
    pub const fn uint(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            encoding: FieldEncoding::UnsignedLe,
            scale: None,
        }
    }

    pub const fn int(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            encoding: FieldEncoding::SignedLe,
            scale: None,
        }
    }

    pub const fn scaled_uint(name: &'static str, width: usize, scale: f64) -> Self {
        Self {
            name,
            width,
            encoding: FieldEncoding::UnsignedLe,
            scale: Some(scale),
        }
    }

    pub const fn scaled_int(name: &'static str, width: usize, scale: f64) -> Self {
        Self {
            name,
            width,
            encoding: FieldEncoding::SignedLe,
            scale: Some(scale),
        }
    }

    pub const fn flag(name: &'static str) -> Self {
        Self {
            name,
            width: 1,
            encoding: FieldEncoding::Boolean,
            scale: None,
        }
    }

    pub const fn bits(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            encoding: FieldEncoding::RawBits,
            scale: None,
        }
    }

    pub const fn reserved(width: usize) -> Self {
        Self {
            name: "reserved",
            width,
            encoding: FieldEncoding::Reserved,
            scale: None,
        }
    }

    fn is_signed(&self) -> bool {
        self.encoding == FieldEncoding::SignedLe
    }
}

/// 字段表占用的总bit数
pub fn table_bits(table: &[FieldSpec]) -> usize {
    table.iter().map(|f| f.width).sum()
}

/// 解码后的字段值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Bool(bool),
    Scaled(f64),
}

/// 按声明顺序保存的字段集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFields {
    values: Vec<(&'static str, FieldValue)>,
}

impl DecodedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: FieldValue) {
        self.values.push((name, value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.values.iter()
    }

    pub fn get(&self, name: &str) -> Result<FieldValue, TelemetryError> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| TelemetryError::malformed(format!("Field not found: {name}")))
    }

    pub fn unsigned(&self, name: &str) -> Result<u64, TelemetryError> {
        match self.get(name)? {
            FieldValue::Unsigned(v) => Ok(v),
            other => Err(type_mismatch(name, "unsigned", other)),
        }
    }

    pub fn signed(&self, name: &str) -> Result<i64, TelemetryError> {
        match self.get(name)? {
            FieldValue::Signed(v) => Ok(v),
            other => Err(type_mismatch(name, "signed", other)),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, TelemetryError> {
        match self.get(name)? {
            FieldValue::Bool(v) => Ok(v),
            other => Err(type_mismatch(name, "boolean", other)),
        }
    }

    pub fn scaled(&self, name: &str) -> Result<f64, TelemetryError> {
        match self.get(name)? {
            FieldValue::Scaled(v) => Ok(v),
            other => Err(type_mismatch(name, "scaled", other)),
        }
    }

    /// 读取无符号字段并收窄到目标整数类型
    pub fn narrow_unsigned<T: TryFrom<u64>>(&self, name: &str) -> Result<T, TelemetryError> {
        let value = self.unsigned(name)?;
        T::try_from(value).map_err(|_| {
            TelemetryError::malformed(format!("Field {name} value {value} out of range"))
        })
    }

    /// 读取有符号字段并收窄到目标整数类型
    pub fn narrow_signed<T: TryFrom<i64>>(&self, name: &str) -> Result<T, TelemetryError> {
        let value = self.signed(name)?;
        T::try_from(value).map_err(|_| {
            TelemetryError::malformed(format!("Field {name} value {value} out of range"))
        })
    }
}

fn type_mismatch(name: &str, expected: &str, got: FieldValue) -> TelemetryError {
    TelemetryError::malformed(format!(
        "Field {name} expected {expected} value, got {got:?}"
    ))
}

/// 按字段表解码载荷
///
/// 载荷不足字段表所需的bit数时返回`MalformedPayload`；
/// 字段表之后的尾随字节被忽略。
pub fn decode_fields(
    table: &[FieldSpec],
    payload: &[u8],
) -> Result<DecodedFields, TelemetryError> {
    let required = table_bits(table);
    let available = payload.len() * 8;
    if available < required {
        return Err(TelemetryError::malformed(format!(
            "layout needs {required} bits, payload has {available}"
        )));
    }

    let mut cursor = BitCursor::new(payload);
    let mut fields = DecodedFields::new();

    for spec in table {
        let value = match spec.encoding {
            FieldEncoding::Reserved => {
                cursor.skip(spec.width)?;
                continue;
            }
            FieldEncoding::Boolean => FieldValue::Bool(cursor.read_bits(spec.width)? != 0),
            FieldEncoding::RawBits => FieldValue::Unsigned(cursor.read_bits(spec.width)?),
            FieldEncoding::UnsignedLe => {
                let raw = cursor.read_uint_le(spec.width)?;
                match spec.scale {
                    Some(scale) => FieldValue::Scaled(raw as f64 * scale),
                    None => FieldValue::Unsigned(raw),
                }
            }
            FieldEncoding::SignedLe => {
                let raw = cursor.read_int_le(spec.width)?;
                match spec.scale {
                    Some(scale) => FieldValue::Scaled(raw as f64 * scale),
                    None => FieldValue::Signed(raw),
                }
            }
        };
        fields.push(spec.name, value);
    }

    Ok(fields)
}

/// 按字段表把字段集合编码为字节（保留位写0）
///
/// 比例字段按 `round(value / scale)` 还原为原始整数；
/// 超出位宽可表示范围的值返回`MalformedPayload`。
pub fn encode_fields(
    table: &[FieldSpec],
    fields: &DecodedFields,
) -> Result<Vec<u8>, TelemetryError> {
    let mut data = vec![0u8; table_bits(table).div_ceil(8)];
    let mut bit_pos = 0usize;

    for spec in table {
        if spec.encoding != FieldEncoding::Reserved {
            let raw = raw_value(spec, fields.get(spec.name)?)?;
            write_field(&mut data, bit_pos, spec, raw);
        }
        bit_pos += spec.width;
    }

    Ok(data)
}

/// 把字段值换算为位宽内的原始位模式
fn raw_value(spec: &FieldSpec, value: FieldValue) -> Result<u64, TelemetryError> {
    let integer: i128 = match (value, spec.scale) {
        (FieldValue::Bool(b), _) => i128::from(b),
        (FieldValue::Unsigned(v), None) => i128::from(v),
        (FieldValue::Signed(v), None) => i128::from(v),
        (FieldValue::Scaled(v), Some(scale)) => {
            let raw = (v / scale).round();
            if !raw.is_finite() {
                return Err(TelemetryError::malformed(format!(
                    "Field {} value {v} is not finite",
                    spec.name
                )));
            }
            raw as i128
        }
        (other, _) => {
            return Err(TelemetryError::malformed(format!(
                "Field {} cannot encode {other:?}",
                spec.name
            )))
        }
    };

    let width = spec.width as u32;
    let (min, max) = if spec.is_signed() {
        (-(1i128 << (width - 1)), (1i128 << (width - 1)) - 1)
    } else {
        (0, (1i128 << width) - 1)
    };
    if integer < min || integer > max {
        return Err(TelemetryError::malformed(format!(
            "Field {} value {integer} does not fit in {} bits",
            spec.name, spec.width
        )));
    }

    let mask = (1u128 << width) - 1;
    Ok(((integer as u128) & mask) as u64)
}

fn write_field(data: &mut [u8], bit_pos: usize, spec: &FieldSpec, raw: u64) {
    let little_endian = matches!(
        spec.encoding,
        FieldEncoding::UnsignedLe | FieldEncoding::SignedLe
    ) && spec.width > 8
        && spec.width % 8 == 0;

    if little_endian {
        for i in 0..spec.width / 8 {
            set_bits(data, bit_pos + 8 * i, 8, (raw >> (8 * i)) & 0xFF);
        }
    } else {
        set_bits(data, bit_pos, spec.width, raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO_LAYOUT: [FieldSpec; 7] = [
        FieldSpec::uint("count", 16),
        FieldSpec::scaled_int("temperature", 16, 0.1),
        FieldSpec::int("offset", 8),
        FieldSpec::flag("alarm"),
        FieldSpec::flag("muted"),
        FieldSpec::bits("level", 2),
        FieldSpec::reserved(4),
    ];

    #[test]
    fn test_decode_demo_layout() {
        // count=0x0102, temperature=-25(-2.5), offset=-3, 状态字节 10_11_0000
        let payload = [0x02, 0x01, 0xE7, 0xFF, 0xFD, 0b1011_0000, 0xEE];
        let fields = decode_fields(&DEMO_LAYOUT, &payload).unwrap();

        assert_eq!(fields.len(), 6);
        assert_eq!(fields.unsigned("count").unwrap(), 0x0102);
        assert!((fields.scaled("temperature").unwrap() + 2.5).abs() < 1e-9);
        assert_eq!(fields.signed("offset").unwrap(), -3);
        assert!(fields.flag("alarm").unwrap());
        assert!(!fields.flag("muted").unwrap());
        assert_eq!(fields.unsigned("level").unwrap(), 0b11);
    }

    #[test]
    fn test_decode_short_payload() {
        let err = decode_fields(&DEMO_LAYOUT, &[0x00; 5]).unwrap_err();
        assert_eq!(
            err,
            TelemetryError::MalformedPayload("layout needs 48 bits, payload has 40".to_string())
        );
    }

    #[test]
    fn test_encode_matches_decode() {
        let payload = [0x02, 0x01, 0xE7, 0xFF, 0xFD, 0b1011_0000];
        let fields = decode_fields(&DEMO_LAYOUT, &payload).unwrap();
        let encoded = encode_fields(&DEMO_LAYOUT, &fields).unwrap();
        assert_eq!(encoded, payload);
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        let mut fields = DecodedFields::new();
        fields.push("count", FieldValue::Unsigned(70_000));
        fields.push("temperature", FieldValue::Scaled(0.0));
        fields.push("offset", FieldValue::Signed(0));
        fields.push("alarm", FieldValue::Bool(false));
        fields.push("muted", FieldValue::Bool(false));
        fields.push("level", FieldValue::Unsigned(0));

        let err = encode_fields(&DEMO_LAYOUT, &fields).unwrap_err();
        assert!(matches!(err, TelemetryError::MalformedPayload(_)));
    }

    #[test]
    fn test_narrowing_and_type_errors() {
        let mut fields = DecodedFields::new();
        fields.push("small", FieldValue::Unsigned(300));
        fields.push("neg", FieldValue::Signed(-5));

        assert_eq!(fields.narrow_unsigned::<u16>("small").unwrap(), 300);
        assert!(fields.narrow_unsigned::<u8>("small").is_err());
        assert_eq!(fields.narrow_signed::<i8>("neg").unwrap(), -5);
        assert!(fields.flag("small").is_err());
        assert!(fields.get("missing").is_err());
    }
}
