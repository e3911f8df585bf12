//! Static interface and message schemas
//!
//! Every interface type is a `#[repr(C)]` plain-data struct paired with a
//! [`Schema`] describing its fields. The schema hash is what two processes
//! compare before sharing a block, so it covers everything that affects the
//! byte layout: names, kinds, offsets, lengths and the accepted messages.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::message::Message;

/// Kind of a schema field
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// `u8`, 0 or 1
    Bool = 1,
    /// `i8`
    Int8,
    /// `u8`
    Uint8,
    /// `i16`
    Int16,
    /// `u16`
    Uint16,
    /// `i32`
    Int32,
    /// `u32`
    Uint32,
    /// `i64`
    Int64,
    /// `u64`
    Uint64,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// NUL-terminated UTF-8 in a fixed byte array; `length` is the capacity
    String,
    /// Raw bytes
    Byte,
    /// `i32` with a name table
    Enum,
}

impl FieldType {
    /// Size of one element in bytes
    pub const fn element_size(self) -> usize {
        match self {
            FieldType::Bool
            | FieldType::Int8
            | FieldType::Uint8
            | FieldType::String
            | FieldType::Byte => 1,
            FieldType::Int16 | FieldType::Uint16 => 2,
            FieldType::Int32 | FieldType::Uint32 | FieldType::Float | FieldType::Enum => 4,
            FieldType::Int64 | FieldType::Uint64 | FieldType::Double => 8,
        }
    }
}

/// Description of one field of an interface or message payload
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    /// Field name
    pub name: &'static str,
    /// Element kind
    pub kind: FieldType,
    /// Byte offset inside the payload
    pub offset: usize,
    /// Element count (string capacity for `String`)
    pub length: usize,
    /// Symbolic names for `Enum` fields
    pub enum_values: &'static [(&'static str, i32)],
}

impl FieldInfo {
    /// Scalar or array field
    pub const fn new(name: &'static str, kind: FieldType, offset: usize, length: usize) -> Self {
        Self {
            name,
            kind,
            offset,
            length,
            enum_values: &[],
        }
    }

    /// Enum field backed by an `i32`
    pub const fn enumeration(
        name: &'static str,
        offset: usize,
        values: &'static [(&'static str, i32)],
    ) -> Self {
        Self {
            name,
            kind: FieldType::Enum,
            offset,
            length: 1,
            enum_values: values,
        }
    }

    /// Bytes occupied in the payload
    pub const fn byte_len(&self) -> usize {
        self.kind.element_size() * self.length
    }

    /// Symbolic name of an enum value
    pub fn enum_name(&self, value: i32) -> Option<&'static str> {
        self.enum_values
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| *name)
    }

    /// Numeric value of an enum name
    pub fn enum_value(&self, name: &str) -> Option<i32> {
        self.enum_values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| *value)
    }
}

/// Schema of a message type
#[derive(Debug)]
pub struct MessageSchema {
    /// Message type name, unique within its interface
    pub type_name: &'static str,
    /// Payload size in bytes
    pub data_size: usize,
    /// Payload fields
    pub fields: &'static [FieldInfo],
    hash: OnceLock<u64>,
}

impl MessageSchema {
    /// Build a message schema
    pub const fn new(
        type_name: &'static str,
        data_size: usize,
        fields: &'static [FieldInfo],
    ) -> Self {
        Self {
            type_name,
            data_size,
            fields,
            hash: OnceLock::new(),
        }
    }

    /// Look a field up by name
    pub fn field(&self, name: &str) -> Option<&'static FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Layout fingerprint: name, size and every field
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = Fnv64::new();
            write_message(&mut hasher, self);
            hasher.finish()
        })
    }

    /// Same message type: identical schema, or identical layout.
    ///
    /// Different interfaces may declare unrelated messages of the same name
    /// and size; their field tables tell them apart.
    pub fn same_as(&self, other: &MessageSchema) -> bool {
        std::ptr::eq(self, other) || self.hash() == other.hash()
    }
}

/// Schema of an interface type
#[derive(Debug)]
pub struct Schema {
    /// Interface type name
    pub type_name: &'static str,
    /// Payload size in bytes
    pub data_size: usize,
    /// Payload fields
    pub fields: &'static [FieldInfo],
    /// Messages the interface accepts
    pub messages: &'static [&'static MessageSchema],
    hash: OnceLock<u64>,
}

impl Schema {
    /// Build an interface schema
    pub const fn new(
        type_name: &'static str,
        data_size: usize,
        fields: &'static [FieldInfo],
        messages: &'static [&'static MessageSchema],
    ) -> Self {
        Self {
            type_name,
            data_size,
            fields,
            messages,
            hash: OnceLock::new(),
        }
    }

    /// Layout fingerprint
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = Fnv64::new();
            hasher.write_str(self.type_name);
            hasher.write_usize(self.data_size);
            hash_fields(&mut hasher, self.fields);
            for message in self.messages {
                write_message(&mut hasher, message);
            }
            hasher.finish()
        })
    }

    /// Hash rendered the way tools display it
    pub fn hash_hex(&self) -> String {
        format!("{:016x}", self.hash())
    }

    /// Look a field up by name
    pub fn field(&self, name: &str) -> Option<&'static FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Schema of an accepted message type
    pub fn message(&self, type_name: &str) -> Option<&'static MessageSchema> {
        self.messages
            .iter()
            .copied()
            .find(|m| m.type_name == type_name)
    }

    /// True if `type_name` is in the accept table
    pub fn accepts(&self, type_name: &str) -> bool {
        self.message(type_name).is_some()
    }

    /// True if a message of `schema` is in the accept table
    pub fn accepts_schema(&self, schema: &MessageSchema) -> bool {
        self.messages.iter().any(|m| m.same_as(schema))
    }

    /// Check that fields fit the payload and do not overlap
    pub fn validate_layout(&self) -> Result<(), String> {
        check_fields(self.type_name, self.data_size, self.fields)?;
        for message in self.messages {
            check_fields(message.type_name, message.data_size, message.fields)?;
        }
        Ok(())
    }
}

fn write_message(hasher: &mut Fnv64, message: &MessageSchema) {
    hasher.write_str(message.type_name);
    hasher.write_usize(message.data_size);
    hash_fields(hasher, message.fields);
}

fn hash_fields(hasher: &mut Fnv64, fields: &[FieldInfo]) {
    for field in fields {
        hasher.write_str(field.name);
        hasher.write(&[field.kind as u8]);
        hasher.write_usize(field.offset);
        hasher.write_usize(field.length);
    }
}

fn check_fields(owner: &str, data_size: usize, fields: &[FieldInfo]) -> Result<(), String> {
    let mut spans: Vec<(usize, usize, &str)> = Vec::with_capacity(fields.len());
    for field in fields {
        if field.length == 0 {
            return Err(format!("{owner}.{} has zero length", field.name));
        }
        let end = field.offset + field.byte_len();
        if end > data_size {
            return Err(format!(
                "{owner}.{} ends at {end}, payload is {data_size} bytes",
                field.name
            ));
        }
        if field.offset % field.kind.element_size() != 0 {
            return Err(format!("{owner}.{} is misaligned", field.name));
        }
        spans.push((field.offset, end, field.name));
    }
    spans.sort_unstable();
    for pair in spans.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(format!("{owner}.{} overlaps {}", pair[1].2, pair[0].2));
        }
    }
    Ok(())
}

/// 64-bit FNV-1a
struct Fnv64(u64);

impl Fnv64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn write_usize(&mut self, value: usize) {
        self.write(&(value as u64).to_le_bytes());
    }

    fn write_str(&mut self, value: &str) {
        self.write_usize(value.len());
        self.write(value.as_bytes());
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Plain data that may be copied byte-wise in and out of shared memory.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with no implicit padding (declare
/// explicit `_pad` fields instead) and every bit pattern must be a valid
/// value. Use `u8` for booleans and `i32`/`u32` for enums.
pub unsafe trait PlainData: Copy + Send + Sync + 'static {}

/// Typed interface payload
///
/// # Safety
///
/// Same contract as [`PlainData`]; additionally `schema()` must describe
/// the struct's actual layout.
pub unsafe trait InterfaceData: PlainData {
    /// Interface type name
    const TYPE_NAME: &'static str;
    /// Messages the interface accepts, decoded
    type Messages: MessageSet;
    /// Field and message description
    fn schema() -> &'static Schema;
}

/// Typed message payload
///
/// # Safety
///
/// Same contract as [`PlainData`]; additionally `schema()` must describe
/// the struct's actual layout.
pub unsafe trait MessageData: PlainData {
    /// Message type name
    const TYPE_NAME: &'static str;
    /// Field description
    fn schema() -> &'static MessageSchema;
}

/// Closed set of messages an interface accepts
pub trait MessageSet: Sized {
    /// Decode a queued message; `None` for foreign message types
    fn decode(message: &Message) -> Option<Self>;
}

/// Interfaces without messages
impl MessageSet for () {
    fn decode(_message: &Message) -> Option<Self> {
        None
    }
}

/// All-zero value of a plain-data type
pub fn zeroed<T: PlainData>() -> T {
    // SAFETY: PlainData guarantees every bit pattern is valid
    unsafe { std::mem::zeroed() }
}

/// Bytes of a plain-data value
pub fn bytes_of<T: PlainData>(value: &T) -> &[u8] {
    // SAFETY: no padding, so every byte is initialized
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) }
}

/// Mutable bytes of a plain-data value
pub fn bytes_of_mut<T: PlainData>(value: &mut T) -> &mut [u8] {
    // SAFETY: any bit pattern written through the slice is a valid `T`
    unsafe { std::slice::from_raw_parts_mut(value as *mut T as *mut u8, size_of::<T>()) }
}

/// Copy a plain-data value out of a byte slice of the right size
pub fn from_bytes<T: PlainData>(bytes: &[u8]) -> Option<T> {
    if bytes.len() != size_of::<T>() {
        return None;
    }
    let mut value = zeroed::<T>();
    bytes_of_mut(&mut value).copy_from_slice(bytes);
    Some(value)
}

/// Read a NUL-terminated string out of a fixed buffer
pub fn read_fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Store `value` in a fixed buffer, truncating on a character boundary so
/// that a terminating NUL always fits
pub fn write_fixed_str(buf: &mut [u8], value: &str) {
    let Some(capacity) = buf.len().checked_sub(1) else {
        return;
    };
    let mut len = value.len().min(capacity);
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    buf[..len].copy_from_slice(&value.as_bytes()[..len]);
    buf[len..].fill(0);
}
