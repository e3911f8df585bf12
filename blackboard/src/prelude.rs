//! Prelude module for common re-exports.
//!
//! ```rust
//! use blackboard::prelude::*;
//! ```

// ─── Facade ─────────────────────────────────────────────────────────
pub use crate::blackboard::{ArenaState, BlackBoard};
pub use crate::config::{ArenaMode, BlackBoardConfig};
pub use crate::error::{BbError, BbResult};

// ─── Accessors ──────────────────────────────────────────────────────
pub use crate::field::{FieldAccess, FieldValue};
pub use crate::interface::{DynInterface, Interface};
pub use crate::message::Message;
pub use crate::schema::{InterfaceData, MessageData, MessageSet};

// ─── Events ─────────────────────────────────────────────────────────
pub use crate::events::{InterfaceListener, InterfaceObserver, ListenerFlags, ObserverFlags};
pub use crate::uid::InterfaceUid;

// ─── Built-in interfaces ────────────────────────────────────────────
pub use crate::interfaces::motor::{MotorInterface, MotorMessage, SetVelocityMessage};
pub use crate::interfaces::skiller::{SkillerInterface, SkillerMessage};
