//! Interface types shipped with the BlackBoard
//!
//! Each module defines a `#[repr(C)]` payload, its static schema, its
//! message payloads and the tagged union of accepted messages.

pub mod motor;
pub mod skiller;

pub use motor::{MotorInterface, MotorMessage};
pub use skiller::{SkillerInterface, SkillerMessage};

use crate::type_registry::TypeRegistry;

/// Register every built-in interface type
pub fn register_builtin(registry: &TypeRegistry) {
    registry.register::<MotorInterface>();
    registry.register::<SkillerInterface>();
}
