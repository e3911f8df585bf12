//! Error types for BlackBoard operations

use bb_common::config::ConfigError;
use thiserror::Error;

/// Errors that can occur during BlackBoard operations
#[derive(Error, Debug)]
pub enum BbError {
    /// Arena exhausted, no free run large enough for the block
    #[error("Out of memory: requested {requested} bytes, largest free run {largest_free} bytes")]
    OutOfMemory {
        /// Requested block size in bytes
        requested: usize,
        /// Largest contiguous free run at the time of the request
        largest_free: usize,
    },

    /// Every directory slot is occupied
    #[error("Interface directory full ({capacity} slots)")]
    DirectoryFull {
        /// Number of directory slots
        capacity: u32,
    },

    /// Another accessor already holds the writer slot
    #[error("Writer already active for {uid}")]
    WriterAlreadyActive {
        /// `Type::id` of the interface
        uid: String,
    },

    /// Operation not permitted for the accessor's mode
    #[error("Permission denied: {operation} on {uid}")]
    PermissionDenied {
        /// `Type::id` of the interface
        uid: String,
        /// Operation that was refused
        operation: &'static str,
    },

    /// Schema hash or layout disagreement for the same type name
    #[error("Type mismatch for {uid}: {reason}")]
    TypeMismatch {
        /// `Type::id` of the interface
        uid: String,
        /// What disagreed
        reason: String,
    },

    /// Message rejected by the interface's accept table
    #[error("Message type {message_type} not accepted by interface type {interface_type}")]
    InvalidMessageType {
        /// Interface type name
        interface_type: String,
        /// Rejected message type name
        message_type: String,
    },

    /// Reader enqueued a message while no writer exists
    #[error("No writer for {uid}, message cannot be delivered")]
    NoWriter {
        /// `Type::id` of the interface
        uid: String,
    },

    /// Feature not available in the current deployment
    #[error("Not supported: {operation}")]
    NotSupported {
        /// Operation that is not supported
        operation: String,
    },

    /// Arena or registry unreachable
    #[error("BlackBoard aliveness lost: {reason}")]
    AlivenessLost {
        /// Why the arena is considered dead
        reason: String,
    },

    /// Accessor handle refers to a block that was freed or reallocated
    #[error("Stale handle for {uid} (slot {slot}, generation {generation})")]
    StaleHandle {
        /// `Type::id` of the interface
        uid: String,
        /// Directory slot
        slot: u32,
        /// Generation recorded in the handle
        generation: u32,
    },

    /// Reader could not obtain a consistent snapshot
    #[error("Version conflict on {uid} after {attempts} attempts - writer stalled")]
    VersionConflict {
        /// `Type::id` of the interface
        uid: String,
        /// Number of read attempts made
        attempts: u32,
    },

    /// Type or identifier empty, too long, or containing NUL
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Type not present in the type registry
    #[error("Unknown interface type: {type_name}")]
    UnknownType {
        /// Requested type name
        type_name: String,
    },

    /// Interface absent from the directory and the open must not create it
    #[error("No interface {uid}")]
    NotFound {
        /// Requested interface
        uid: String,
    },

    /// Field lookup or assignment failed
    #[error("Invalid field {field} on {type_name}: {reason}")]
    InvalidField {
        /// Interface or message type name
        type_name: String,
        /// Field name
        field: String,
        /// Why the operation failed
        reason: String,
    },

    /// Region header failed validation
    #[error("Invalid region {name}: {reason}")]
    InvalidRegion {
        /// Region name
        name: String,
        /// What failed
        reason: String,
    },

    /// Named region already owned by a live master
    #[error("Region already exists: {name}")]
    AlreadyExists {
        /// Region name
        name: String,
    },

    /// Free of an offset that is not an allocated chunk
    #[error("Invalid free at heap offset {offset}")]
    InvalidFree {
        /// Heap offset passed to free
        offset: u64,
    },

    /// Configuration rejected
    #[error("Configuration error: {source}")]
    Config {
        /// Source configuration error
        #[from]
        source: ConfigError,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error
        #[from]
        source: serde_json::Error,
    },
}

/// Result type for BlackBoard operations
pub type BbResult<T> = Result<T, BbError>;
