//! BlackBoard configuration

use bb_common::config::ConfigError;
use bb_common::consts::{
    ARENA_MAX_SIZE, ARENA_MIN_SIZE, DEFAULT_MAX_CHUNKS, DEFAULT_MAX_INTERFACES,
    DEFAULT_MEMORY_SIZE, DEFAULT_READ_RETRY_LIMIT,
};
use serde::{Deserialize, Serialize};

/// Who owns the arena lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArenaMode {
    /// Creates the region and destroys it when the last handle goes away
    #[default]
    Master,
    /// Attaches to a region created by a master in another process
    Slave,
}

/// Arena and registry configuration
///
/// # TOML Example
///
/// ```toml
/// [blackboard]
/// mode = "master"
/// region_name = "robot"
/// memory_size = 2097152
/// max_interfaces = 256
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlackBoardConfig {
    /// Master or slave
    pub mode: ArenaMode,
    /// Name of the shared region under `/dev/shm`; `None` maps anonymous
    /// process-local memory (master only)
    pub region_name: Option<String>,
    /// Total mapped size in bytes, including directory and allocator tables
    pub memory_size: usize,
    /// Directory slots, i.e. interfaces that may exist at the same time
    pub max_interfaces: u32,
    /// Allocator chunk records; bounds fragmentation
    pub max_chunks: u32,
    /// Attempts a reader makes before reporting a version conflict
    pub read_retry_limit: u32,
}

impl Default for BlackBoardConfig {
    fn default() -> Self {
        Self {
            mode: ArenaMode::Master,
            region_name: None,
            memory_size: DEFAULT_MEMORY_SIZE,
            max_interfaces: DEFAULT_MAX_INTERFACES,
            max_chunks: DEFAULT_MAX_CHUNKS,
            read_retry_limit: DEFAULT_READ_RETRY_LIMIT,
        }
    }
}

impl BlackBoardConfig {
    /// Anonymous process-local master arena of the given size
    pub fn local(memory_size: usize) -> Self {
        Self {
            memory_size,
            ..Self::default()
        }
    }

    /// Master owning the named region
    pub fn master(region_name: &str) -> Self {
        Self {
            region_name: Some(region_name.to_string()),
            ..Self::default()
        }
    }

    /// Slave attaching to the named region
    pub fn slave(region_name: &str) -> Self {
        Self {
            mode: ArenaMode::Slave,
            region_name: Some(region_name.to_string()),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `memory_size` is outside the accepted arena bounds (master only)
    /// - `max_interfaces`, `max_chunks` or `read_retry_limit` is zero
    /// - slave mode has no region name
    /// - the region name is empty or contains a path separator
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == ArenaMode::Master
            && !(ARENA_MIN_SIZE..=ARENA_MAX_SIZE).contains(&self.memory_size)
        {
            return Err(ConfigError::ValidationError(format!(
                "memory_size {} outside {}..={}",
                self.memory_size, ARENA_MIN_SIZE, ARENA_MAX_SIZE
            )));
        }
        if self.max_interfaces == 0 {
            return Err(ConfigError::ValidationError(
                "max_interfaces must be > 0".to_string(),
            ));
        }
        if self.max_chunks < 2 {
            return Err(ConfigError::ValidationError(
                "max_chunks must be >= 2".to_string(),
            ));
        }
        if self.read_retry_limit == 0 {
            return Err(ConfigError::ValidationError(
                "read_retry_limit must be > 0".to_string(),
            ));
        }
        match (&self.mode, &self.region_name) {
            (ArenaMode::Slave, None) => Err(ConfigError::ValidationError(
                "slave mode requires region_name".to_string(),
            )),
            (_, Some(name)) if name.is_empty() || name.contains('/') => Err(
                ConfigError::ValidationError(format!("invalid region_name {name:?}")),
            ),
            _ => Ok(()),
        }
    }
}
