//! Typed command objects queued against one interface

use crate::field::FieldAccess;
use crate::schema::{FieldInfo, MessageData, MessageSchema, bytes_of, from_bytes};
use std::fmt;

/// A message: schema, sender stamp and payload bytes.
///
/// The stamp (`id`, sender, time) is filled in when the message is enqueued.
#[derive(Clone)]
pub struct Message {
    schema: &'static MessageSchema,
    pub(crate) id: u32,
    pub(crate) sender_serial: u32,
    pub(crate) sender_thread: String,
    pub(crate) enqueued_at: u64,
    data: Vec<u8>,
}

impl Message {
    /// Message carrying a typed payload
    pub fn new<M: MessageData>(payload: &M) -> Self {
        Self::with_bytes(M::schema(), bytes_of(payload).to_vec())
    }

    /// Zero-filled message of a schema known only at run time
    pub fn from_schema(schema: &'static MessageSchema) -> Self {
        Self::with_bytes(schema, vec![0; schema.data_size])
    }

    fn with_bytes(schema: &'static MessageSchema, data: Vec<u8>) -> Self {
        Self {
            schema,
            id: 0,
            sender_serial: 0,
            sender_thread: String::new(),
            enqueued_at: 0,
            data,
        }
    }

    /// Message type name
    pub fn type_name(&self) -> &'static str {
        self.schema.type_name
    }

    /// Field description
    pub fn schema(&self) -> &'static MessageSchema {
        self.schema
    }

    /// True if the message carries an `M`
    pub fn is<M: MessageData>(&self) -> bool {
        self.schema.same_as(M::schema())
    }

    /// Typed payload, `None` if the message is of another type
    pub fn decode<M: MessageData>(&self) -> Option<M> {
        if !self.is::<M>() {
            return None;
        }
        from_bytes(&self.data)
    }

    /// Queue-assigned id, 0 before enqueue
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Instance serial of the enqueuing accessor
    pub fn sender_serial(&self) -> u32 {
        self.sender_serial
    }

    /// Thread that enqueued the message
    pub fn sender_thread(&self) -> &str {
        &self.sender_thread
    }

    /// Enqueue wall clock in nanoseconds
    pub fn enqueued_at(&self) -> u64 {
        self.enqueued_at
    }

    /// Raw payload
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Raw payload, mutable
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.schema.type_name)
            .field("id", &self.id)
            .field("sender_serial", &self.sender_serial)
            .field("sender_thread", &self.sender_thread)
            .field("size", &self.data.len())
            .finish()
    }
}

impl FieldAccess for Message {
    fn schema_name(&self) -> &'static str {
        self.type_name()
    }

    fn schema_fields(&self) -> &'static [FieldInfo] {
        self.schema().fields
    }

    fn payload(&self) -> &[u8] {
        Message::payload(self)
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        Message::payload_mut(self)
    }
}
