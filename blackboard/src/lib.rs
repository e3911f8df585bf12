//! # BlackBoard
//!
//! Shared-memory data distribution for robot software components. Components
//! exchange typed, versioned state through *interfaces*: named blocks in a
//! shared arena with exactly one writer and any number of readers, an
//! embedded queue for reader-to-writer commands, and change events.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────┐   open_for_writing   ┌──────────────────────────┐
//! │ Writer        ├─────────────────────►│ Region (/dev/shm/bb_*)   │
//! │ Interface<T>  │  write(): seqlock    │ header | directory |     │
//! │  msgq_pop()   │◄──────┐              │ chunks | heap of blocks  │
//! └───────────────┘       │              └──────────────────────────┘
//!                         │ message queue             ▲
//! ┌───────────────┐       │                           │ read(): retry on
//! │ Reader        ├───────┘ msgq_enqueue()            │ odd sequence
//! │ Interface<T>  ├───────────────────────────────────┘
//! └───────────────┘
//!         │ events (synchronous, caller's thread)
//!         ▼
//! ┌───────────────────────────────────────┐
//! │ Notifier: listeners per interface,    │
//! │ observers per type/id glob            │
//! └───────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Single writer**: a second `open_for_writing` of the same `(type, id)`
//!   fails with [`BbError::WriterAlreadyActive`]
//! - **No torn reads**: every block carries a sequence counter; readers retry
//!   until they copy a stable snapshot
//! - **FIFO messages**: the writer drains messages in enqueue order
//! - **Contained callbacks**: a panicking listener is logged and skipped
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blackboard::prelude::*;
//!
//! # fn main() -> Result<(), BbError> {
//! let bb = BlackBoard::new(BlackBoardConfig::master("robot"))?;
//!
//! let mut motor = bb.open_for_writing::<MotorInterface>("Robotino")?;
//! let mut remote = bb.open_for_reading::<MotorInterface>("Robotino")?;
//!
//! remote.msgq_enqueue(&SetVelocityMessage { vx: 0.3, vy: 0.0, omega: 0.1 })?;
//!
//! while let Some(message) = motor.msgq_pop()? {
//!     if let Some(MotorMessage::SetVelocity(v)) = MotorMessage::decode(&message) {
//!         let data = motor.data_mut();
//!         data.vx = v.vx;
//!         data.omega = v.omega;
//!     }
//! }
//! motor.write()?;
//!
//! remote.read()?;
//! assert_eq!(remote.data().vx, 0.3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Master and Slave
//!
//! The master creates the region and removes it when its last handle goes
//! away. Slaves in other processes attach by name. A slave whose master
//! disappeared reports `is_alive() == false` and may call
//! `try_restore_aliveness()` once a new master runs; accessors opened before
//! that must be reopened.
//!
//! Message queues and event registries live in the process. Payload data,
//! reader counts and writer flags are shared through the region.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod blackboard;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod events;
pub mod field;
pub mod glob;
pub mod interface;
pub mod interfaces;
pub mod lifecycle;
pub mod message;
pub mod msgq;
mod notifier;
pub mod platform;
pub mod prelude;
pub mod region;
pub mod relay;
pub mod schema;
pub mod type_registry;
pub mod uid;
pub mod version;

pub use crate::blackboard::{ArenaState, BlackBoard, BlackBoardStats};
pub use config::{ArenaMode, BlackBoardConfig};
pub use directory::InterfaceInfo;
pub use error::{BbError, BbResult};
pub use events::{InterfaceListener, InterfaceObserver, ListenerFlags, ObserverFlags};
pub use field::{FieldAccess, FieldValue};
pub use interface::{AccessMode, DynInterface, Interface};
pub use message::Message;
pub use schema::{FieldInfo, FieldType, InterfaceData, MessageData, MessageSet, Schema};
pub use uid::InterfaceUid;

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// For tests and small tools; applications configure their own.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_names(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
