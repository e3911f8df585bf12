//! Schema-driven field access for generic tools
//!
//! Loggers, the relay boundary and `bbtool` walk payloads through the
//! field table alone; they never need the Rust type.

use crate::error::{BbError, BbResult};
use crate::schema::{FieldInfo, FieldType, read_fixed_str, write_fixed_str};
use serde::{Deserialize, Serialize};

/// Value of one field, detached from the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// `Bool`
    Bool(bool),
    /// Signed integers
    Int(i64),
    /// Unsigned integers
    Uint(u64),
    /// `Float` and `Double`
    Float(f64),
    /// `String`
    String(String),
    /// `Enum`, with its symbolic name when known
    Enum {
        /// Numeric value
        value: i32,
        /// Symbolic name
        name: Option<String>,
    },
    /// `Byte` arrays
    Bytes(Vec<u8>),
    /// Arrays of any other kind
    Array(Vec<FieldValue>),
}

impl FieldValue {
    fn as_i128(&self) -> Option<i128> {
        match self {
            FieldValue::Bool(b) => Some(i128::from(*b)),
            FieldValue::Int(v) => Some(i128::from(*v)),
            FieldValue::Uint(v) => Some(i128::from(*v)),
            FieldValue::Enum { value, .. } => Some(i128::from(*value)),
            FieldValue::Float(v) if v.fract() == 0.0 => Some(*v as i128),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Uint(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Field reflection over a raw payload
pub trait FieldAccess {
    /// Name of the interface or message type
    fn schema_name(&self) -> &'static str;

    /// Field table
    fn schema_fields(&self) -> &'static [FieldInfo];

    /// Payload bytes
    fn payload(&self) -> &[u8];

    /// Payload bytes, mutable
    fn payload_mut(&mut self) -> &mut [u8];

    /// Look a field up by name
    fn field_info(&self, name: &str) -> BbResult<&'static FieldInfo> {
        self.schema_fields()
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| BbError::InvalidField {
                type_name: self.schema_name().to_string(),
                field: name.to_string(),
                reason: "no such field".to_string(),
            })
    }

    /// Current value of a field
    fn field_value(&self, name: &str) -> BbResult<FieldValue> {
        let field = self.field_info(name)?;
        Ok(decode_field(field, self.payload()))
    }

    /// Assign a field, converting `value` to the field's kind
    fn set_field_value(&mut self, name: &str, value: &FieldValue) -> BbResult<()> {
        let field = self.field_info(name)?;
        let owner = self.schema_name();
        encode_field(field, &mut self.payload_mut()[..], value).map_err(|reason| {
            BbError::InvalidField {
                type_name: owner.to_string(),
                field: name.to_string(),
                reason,
            }
        })
    }

    /// All fields in declaration order
    fn field_values(&self) -> Vec<(&'static str, FieldValue)> {
        self.schema_fields()
            .iter()
            .map(|f| (f.name, decode_field(f, self.payload())))
            .collect()
    }
}

fn element(field: &FieldInfo, payload: &[u8], index: usize) -> FieldValue {
    let size = field.kind.element_size();
    let at = field.offset + index * size;
    let bytes = &payload[at..at + size];
    let mut raw = [0u8; 8];
    raw[..size].copy_from_slice(bytes);

    match field.kind {
        FieldType::Bool => FieldValue::Bool(raw[0] != 0),
        FieldType::Int8 => FieldValue::Int(i64::from(raw[0] as i8)),
        FieldType::Uint8 | FieldType::Byte | FieldType::String => FieldValue::Uint(u64::from(raw[0])),
        FieldType::Int16 => FieldValue::Int(i64::from(i16::from_ne_bytes([raw[0], raw[1]]))),
        FieldType::Uint16 => FieldValue::Uint(u64::from(u16::from_ne_bytes([raw[0], raw[1]]))),
        FieldType::Int32 => FieldValue::Int(i64::from(i32::from_ne_bytes(word(&raw)))),
        FieldType::Uint32 => FieldValue::Uint(u64::from(u32::from_ne_bytes(word(&raw)))),
        FieldType::Int64 => FieldValue::Int(i64::from_ne_bytes(raw)),
        FieldType::Uint64 => FieldValue::Uint(u64::from_ne_bytes(raw)),
        FieldType::Float => FieldValue::Float(f64::from(f32::from_ne_bytes(word(&raw)))),
        FieldType::Double => FieldValue::Float(f64::from_ne_bytes(raw)),
        FieldType::Enum => {
            let value = i32::from_ne_bytes(word(&raw));
            FieldValue::Enum {
                value,
                name: field.enum_name(value).map(str::to_string),
            }
        }
    }
}

fn word(raw: &[u8; 8]) -> [u8; 4] {
    [raw[0], raw[1], raw[2], raw[3]]
}

/// Decode one field out of a payload
pub fn decode_field(field: &FieldInfo, payload: &[u8]) -> FieldValue {
    let span = &payload[field.offset..field.offset + field.byte_len()];
    match field.kind {
        FieldType::String => FieldValue::String(read_fixed_str(span)),
        FieldType::Byte => FieldValue::Bytes(span.to_vec()),
        _ if field.length == 1 => element(field, payload, 0),
        _ => FieldValue::Array(
            (0..field.length)
                .map(|i| element(field, payload, i))
                .collect(),
        ),
    }
}

fn encode_element(
    field: &FieldInfo,
    payload: &mut [u8],
    index: usize,
    value: &FieldValue,
) -> Result<(), String> {
    let size = field.kind.element_size();
    let at = field.offset + index * size;
    let out = &mut payload[at..at + size];

    macro_rules! integer {
        ($ty:ty) => {{
            let wide = value
                .as_i128()
                .ok_or_else(|| format!("expected integer, got {value:?}"))?;
            let narrow = <$ty>::try_from(wide)
                .map_err(|_| format!("{wide} out of range for {}", stringify!($ty)))?;
            out.copy_from_slice(&narrow.to_ne_bytes());
        }};
    }

    match field.kind {
        FieldType::Bool => match value {
            FieldValue::Bool(b) => out[0] = u8::from(*b),
            other => match other.as_i128() {
                Some(0) => out[0] = 0,
                Some(1) => out[0] = 1,
                _ => return Err(format!("expected bool, got {other:?}")),
            },
        },
        FieldType::Int8 => integer!(i8),
        FieldType::Uint8 | FieldType::Byte | FieldType::String => integer!(u8),
        FieldType::Int16 => integer!(i16),
        FieldType::Uint16 => integer!(u16),
        FieldType::Int32 => integer!(i32),
        FieldType::Uint32 => integer!(u32),
        FieldType::Int64 => integer!(i64),
        FieldType::Uint64 => integer!(u64),
        FieldType::Float => {
            let v = value
                .as_f64()
                .ok_or_else(|| format!("expected number, got {value:?}"))?;
            out.copy_from_slice(&(v as f32).to_ne_bytes());
        }
        FieldType::Double => {
            let v = value
                .as_f64()
                .ok_or_else(|| format!("expected number, got {value:?}"))?;
            out.copy_from_slice(&v.to_ne_bytes());
        }
        FieldType::Enum => {
            let v = match value {
                FieldValue::String(name) | FieldValue::Enum { name: Some(name), .. } => field
                    .enum_value(name)
                    .ok_or_else(|| format!("unknown enum value {name:?}"))?,
                other => other
                    .as_i128()
                    .and_then(|w| i32::try_from(w).ok())
                    .ok_or_else(|| format!("expected enum, got {other:?}"))?,
            };
            out.copy_from_slice(&v.to_ne_bytes());
        }
    }
    Ok(())
}

/// Encode `value` into the field's span of `payload`
pub fn encode_field(field: &FieldInfo, payload: &mut [u8], value: &FieldValue) -> Result<(), String> {
    match (field.kind, value) {
        (FieldType::String, FieldValue::String(s)) => {
            let span = &mut payload[field.offset..field.offset + field.byte_len()];
            if s.len() >= span.len() {
                return Err(format!("string of {} bytes exceeds capacity {}", s.len(), span.len() - 1));
            }
            write_fixed_str(span, s);
            Ok(())
        }
        (FieldType::String, other) => Err(format!("expected string, got {other:?}")),
        (FieldType::Byte, FieldValue::Bytes(bytes)) => {
            if bytes.len() > field.length {
                return Err(format!("{} bytes exceed length {}", bytes.len(), field.length));
            }
            let span = &mut payload[field.offset..field.offset + field.byte_len()];
            span[..bytes.len()].copy_from_slice(bytes);
            span[bytes.len()..].fill(0);
            Ok(())
        }
        // Small integer arrays come back from JSON as bytes
        (_, FieldValue::Bytes(bytes)) => {
            let items = bytes.iter().map(|b| FieldValue::Uint(u64::from(*b))).collect();
            encode_field(field, payload, &FieldValue::Array(items))
        }
        (_, FieldValue::Array(items)) => {
            if items.len() != field.length {
                return Err(format!("expected {} elements, got {}", field.length, items.len()));
            }
            for (index, item) in items.iter().enumerate() {
                encode_element(field, payload, index, item)?;
            }
            Ok(())
        }
        (FieldType::Byte, other) if field.length > 1 => {
            Err(format!("expected bytes, got {other:?}"))
        }
        (_, scalar) if field.length == 1 => encode_element(field, payload, 0, scalar),
        (_, other) => Err(format!("expected array of {}, got {other:?}", field.length)),
    }
}
