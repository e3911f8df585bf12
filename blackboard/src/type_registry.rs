//! Run-time lookup of interface schemas by type name
//!
//! Generic tools open interfaces they have no Rust type for. The registry
//! maps type names to the static schemas compiled into this process.

use crate::error::{BbError, BbResult};
use crate::schema::{InterfaceData, Schema};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, error};

/// Type name to schema map
#[derive(Default)]
pub struct TypeRegistry {
    schemas: RwLock<HashMap<&'static str, &'static Schema>>,
}

impl TypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in interface type
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        crate::interfaces::register_builtin(&registry);
        registry
    }

    /// Register the schema of `T`
    pub fn register<T: InterfaceData>(&self) {
        if let Err(reason) = T::schema().validate_layout() {
            error!(type_name = T::TYPE_NAME, %reason, "Refusing inconsistent schema");
            return;
        }
        self.register_schema(T::schema());
    }

    /// Register a schema directly; an existing entry of the same name is
    /// replaced only if the hashes agree
    pub fn register_schema(&self, schema: &'static Schema) {
        let mut schemas = self.schemas.write();
        match schemas.get(schema.type_name) {
            Some(existing) if existing.hash() != schema.hash() => {
                error!(
                    type_name = schema.type_name,
                    existing = %existing.hash_hex(),
                    new = %schema.hash_hex(),
                    "Conflicting schema for registered type"
                );
            }
            Some(_) => {}
            None => {
                debug!(type_name = schema.type_name, hash = %schema.hash_hex(), "Registered interface type");
                schemas.insert(schema.type_name, schema);
            }
        }
    }

    /// Schema registered for `type_name`
    pub fn get(&self, type_name: &str) -> BbResult<&'static Schema> {
        self.schemas
            .read()
            .get(type_name)
            .copied()
            .ok_or_else(|| BbError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.schemas.read().keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{MotorInterface, SkillerInterface};

    #[test]
    fn test_builtin_types_present() {
        let registry = TypeRegistry::with_builtin();
        assert_eq!(registry.type_names(), ["MotorInterface", "SkillerInterface"]);
        let schema = registry.get("MotorInterface").unwrap();
        assert_eq!(schema.hash(), MotorInterface::schema().hash());
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.get("LaserInterface"),
            Err(BbError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = TypeRegistry::new();
        registry.register::<SkillerInterface>();
        registry.register::<SkillerInterface>();
        assert_eq!(registry.type_names().len(), 1);
    }
}
