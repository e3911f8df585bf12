//! System-wide constants for the BlackBoard workspace.
//!
//! Single source of truth for name bounds and arena sizing limits.
//! Imported by all crates; values are not duplicated elsewhere.

use static_assertions::const_assert;

/// Maximum length in bytes of an interface type name.
pub const INTERFACE_TYPE_SIZE: usize = 48;

/// Maximum length in bytes of an interface identifier.
pub const INTERFACE_ID_SIZE: usize = 64;

/// Maximum length in bytes of a message type name.
pub const MESSAGE_TYPE_SIZE: usize = 64;

/// CPU cache line size in bytes.
///
/// Every block carved from the arena is aligned and rounded to this size so
/// that per-block sequence counters never share a line with a neighbour.
pub const CACHE_LINE_SIZE: usize = 64;

/// Smallest arena (total mapped bytes) accepted by configuration.
pub const ARENA_MIN_SIZE: usize = 64 * 1024;

/// Largest arena accepted by configuration (1GB).
pub const ARENA_MAX_SIZE: usize = 1_073_741_824;

/// Default arena size (2MB), matching a typical robot deployment.
pub const DEFAULT_MEMORY_SIZE: usize = 2 * 1024 * 1024;

/// Default number of directory slots (concurrently existing interfaces).
pub const DEFAULT_MAX_INTERFACES: u32 = 256;

/// Default number of allocator chunk records.
pub const DEFAULT_MAX_CHUNKS: u32 = 1024;

/// Default number of attempts a reader makes before giving up on a
/// consistent snapshot.
pub const DEFAULT_READ_RETRY_LIMIT: u32 = 100_000;

/// Prefix of named regions under `/dev/shm`.
pub const REGION_PREFIX: &str = "bb_";

/// Directory holding POSIX shared memory objects.
pub const SHM_DIR: &str = "/dev/shm";

const_assert!(CACHE_LINE_SIZE.is_power_of_two());
const_assert!(ARENA_MIN_SIZE < ARENA_MAX_SIZE);
const_assert!(DEFAULT_MEMORY_SIZE >= ARENA_MIN_SIZE);
