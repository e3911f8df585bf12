//! Self-describing payload and message encoding for external relays
//!
//! A relay forwards interface data and messages between BlackBoards on
//! different machines. It never needs the Rust types: everything is
//! expressed as field maps built from the schemas, with the schema hash
//! carried along so both ends can refuse incompatible peers.

use crate::error::{BbError, BbResult};
use crate::field::{FieldAccess, FieldValue, encode_field};
use crate::interface::AccessorCore;
use crate::message::Message;
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use tracing::trace;

/// Payload of one interface at one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadSnapshot {
    /// Interface type
    pub type_name: String,
    /// Instance id
    pub id: String,
    /// Schema hash, hex
    pub hash: String,
    /// Revision of the local copy the snapshot was taken from
    pub revision: u64,
    /// Field values by name
    pub fields: BTreeMap<String, FieldValue>,
}

/// A message in transit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Interface type the message is addressed to
    pub interface_type: String,
    /// Interface schema hash, hex
    pub interface_hash: String,
    /// Message type
    pub message_type: String,
    /// Sender-side id, 0 if not yet queued
    pub id: u32,
    /// Field values by name
    pub fields: BTreeMap<String, FieldValue>,
}

fn field_map(source: &impl FieldAccess) -> BTreeMap<String, FieldValue> {
    source
        .field_values()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Encode all fields into a copy of the payload; the target changes only
/// if every field fits.
fn apply_fields(
    target: &mut impl FieldAccess,
    fields: &BTreeMap<String, FieldValue>,
) -> BbResult<()> {
    let mut staged = target.payload().to_vec();
    for (name, value) in fields {
        let field = target.field_info(name)?;
        encode_field(field, &mut staged, value).map_err(|reason| BbError::InvalidField {
            type_name: target.schema_name().to_string(),
            field: name.clone(),
            reason,
        })?;
    }
    target.payload_mut().copy_from_slice(&staged);
    Ok(())
}

/// Capture the local copy of an accessor
pub fn snapshot<A>(accessor: &A) -> PayloadSnapshot
where
    A: FieldAccess + Deref<Target = AccessorCore>,
{
    PayloadSnapshot {
        type_name: accessor.type_name().to_string(),
        id: accessor.id().to_string(),
        hash: accessor.schema().hash_hex(),
        revision: accessor.revision(),
        fields: field_map(accessor),
    }
}

/// Overwrite the local copy of an accessor with a snapshot. The caller
/// publishes it with `write()`.
pub fn apply<A>(snapshot: &PayloadSnapshot, accessor: &mut A) -> BbResult<()>
where
    A: FieldAccess + Deref<Target = AccessorCore>,
{
    let schema = accessor.schema();
    if snapshot.type_name != schema.type_name || snapshot.hash != schema.hash_hex() {
        return Err(BbError::TypeMismatch {
            uid: accessor.uid().to_string(),
            reason: format!(
                "snapshot of {} hash {}, local hash {}",
                snapshot.type_name,
                snapshot.hash,
                schema.hash_hex()
            ),
        });
    }
    apply_fields(accessor, &snapshot.fields)?;
    trace!(interface = %accessor.uid(), revision = snapshot.revision, "Snapshot applied");
    Ok(())
}

/// Wrap a message addressed to an interface of `schema`
pub fn encode_message(schema: &Schema, message: &Message) -> MessageEnvelope {
    MessageEnvelope {
        interface_type: schema.type_name.to_string(),
        interface_hash: schema.hash_hex(),
        message_type: message.type_name().to_string(),
        id: message.id(),
        fields: field_map(message),
    }
}

/// Rebuild a message for an interface of `schema`.
///
/// # Errors
///
/// `TypeMismatch` if the envelope was built against another schema,
/// `InvalidMessageType` if the interface does not accept the message type,
/// `InvalidField` for fields that do not fit.
pub fn decode_message(schema: &'static Schema, envelope: &MessageEnvelope) -> BbResult<Message> {
    if envelope.interface_type != schema.type_name || envelope.interface_hash != schema.hash_hex()
    {
        return Err(BbError::TypeMismatch {
            uid: envelope.interface_type.clone(),
            reason: format!(
                "envelope hash {}, local hash {}",
                envelope.interface_hash,
                schema.hash_hex()
            ),
        });
    }
    let message_schema =
        schema
            .message(&envelope.message_type)
            .ok_or_else(|| BbError::InvalidMessageType {
                interface_type: schema.type_name.to_string(),
                message_type: envelope.message_type.clone(),
            })?;
    let mut message = Message::from_schema(message_schema);
    apply_fields(&mut message, &envelope.fields)?;
    Ok(message)
}

/// JSON text of any relay record
pub fn to_json<T: Serialize>(record: &T) -> BbResult<String> {
    Ok(serde_json::to_string(record)?)
}

/// Parse a relay record from JSON
pub fn from_json<T: for<'de> Deserialize<'de>>(text: &str) -> BbResult<T> {
    Ok(serde_json::from_str(text)?)
}
