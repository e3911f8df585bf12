//! `bbtool serve` configuration file

use bb_common::config::{ConfigError, SharedConfig};
use blackboard::{ArenaMode, BlackBoardConfig};
use serde::Deserialize;

/// Top level of the TOML file
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "bb-master"
/// log_level = "debug"
///
/// [blackboard]
/// region_name = "robot"
/// memory_size = 4194304
/// max_interfaces = 128
///
/// [serve]
/// stats_interval_s = 10
/// cleanup_orphans = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Logging and service identity
    pub shared: SharedConfig,
    /// Arena served by this process
    pub blackboard: BlackBoardConfig,
    /// Serve loop tuning
    #[serde(default)]
    pub serve: ServeConfig,
}

/// Serve loop tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    /// Seconds between statistics log lines, 0 disables them
    pub stats_interval_s: u64,
    /// Remove regions of dead masters before starting
    pub cleanup_orphans: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            stats_interval_s: 30,
            cleanup_orphans: false,
        }
    }
}

impl ToolConfig {
    /// Validate every section; `serve` needs a named master region
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.blackboard.validate()?;
        if self.blackboard.mode != ArenaMode::Master {
            return Err(ConfigError::ValidationError(
                "serve runs the master; set mode = \"master\"".to_string(),
            ));
        }
        if self.blackboard.region_name.is_none() {
            return Err(ConfigError::ValidationError(
                "serve needs blackboard.region_name".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_common::config::{ConfigLoader, LogLevel};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EXAMPLE: &str = r#"
[shared]
service_name = "bb-master"
log_level = "debug"

[blackboard]
region_name = "robot"
memory_size = 4194304
max_interfaces = 128

[serve]
stats_interval_s = 5
"#;

    #[test]
    fn test_load_example() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();

        let config = ToolConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.blackboard.region_name.as_deref(), Some("robot"));
        assert_eq!(config.blackboard.max_interfaces, 128);
        assert_eq!(config.serve.stats_interval_s, 5);
        assert!(!config.serve.cleanup_orphans);
        config.validate().unwrap();
    }

    #[test]
    fn test_anonymous_region_rejected() {
        let text = EXAMPLE.replace("region_name = \"robot\"\n", "");
        let config = ToolConfig::parse(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unknown_blackboard_key_rejected() {
        let text = EXAMPLE.replace("max_interfaces = 128", "max_interface = 128");
        assert!(matches!(
            ToolConfig::parse(&text),
            Err(ConfigError::ParseError(_))
        ));
    }
}
