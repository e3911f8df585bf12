//! Interface identity: `(type name, identifier)`

use crate::error::{BbError, BbResult};
use bb_common::consts::{INTERFACE_ID_SIZE, INTERFACE_TYPE_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-capacity type name; one byte of the slot is kept for the NUL
pub type TypeName = heapless::String<{ INTERFACE_TYPE_SIZE - 1 }>;
/// Fixed-capacity identifier; one byte of the slot is kept for the NUL
pub type InterfaceId = heapless::String<{ INTERFACE_ID_SIZE - 1 }>;

/// Globally unique identity of an interface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceUid {
    type_name: TypeName,
    id: InterfaceId,
}

fn check(name: &str, what: &'static str) -> BbResult<()> {
    if name.is_empty() {
        return Err(BbError::InvalidName {
            name: name.to_string(),
            reason: what,
        });
    }
    if name.contains('\0') {
        return Err(BbError::InvalidName {
            name: name.to_string(),
            reason: "contains NUL",
        });
    }
    Ok(())
}

impl InterfaceUid {
    /// Validate and build an identity
    pub fn new(type_name: &str, id: &str) -> BbResult<Self> {
        check(type_name, "empty type name")?;
        check(id, "empty identifier")?;
        let type_name_fixed = TypeName::try_from(type_name).map_err(|_| BbError::InvalidName {
            name: type_name.to_string(),
            reason: "type name too long",
        })?;
        let id_fixed = InterfaceId::try_from(id).map_err(|_| BbError::InvalidName {
            name: id.to_string(),
            reason: "identifier too long",
        })?;
        Ok(Self {
            type_name: type_name_fixed,
            id: id_fixed,
        })
    }

    /// Interface type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Instance identifier
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for InterfaceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_name, self.id)
    }
}
