// Vault Extract Configuration Module
//
// Optional settings loaded from a YAML file. Every field has a default, so an
// absent or empty file behaves like the built-in ansible setup.

use crate::error::ExtractError;
use crate::filter::{DenyList, FlattenOptions};
use crate::parser::Dialect;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file inside the user config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Extra deny-list entries
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DenyListConfig {
    /// Additional key prefixes to drop
    pub prefixes: Vec<String>,

    /// Additional exact key names to drop
    pub names: Vec<String>,

    /// Start from an empty list instead of the built-in one
    pub replace_defaults: bool,
}

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Decryption tool executable (name looked up in PATH, or a path)
    pub tool: String,

    /// Host name used in the synthetic inventory
    pub host: String,

    /// Variable printed by the debug action
    pub payload_key: String,

    /// Seconds before the tool is killed; 0 waits forever
    pub timeout_secs: u64,

    /// Single character joining nested keys
    pub separator: String,

    /// Trim whitespace around string values
    pub strip_strings: bool,

    /// Grammar of the payload block
    pub dialect: Dialect,

    pub deny_list: DenyListConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tool: "ansible".to_string(),
            host: "localhost".to_string(),
            payload_key: "hostvars[inventory_hostname]".to_string(),
            timeout_secs: 120,
            separator: "_".to_string(),
            strip_strings: true,
            dialect: Dialect::Auto,
            deny_list: DenyListConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Load the configuration for this run.
    ///
    /// An explicit path must exist. Without one, the file in the user config
    /// directory is used when present, else the defaults.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(expand_tilde(path)?);
        }

        match default_path() {
            Some(path) if path.is_file() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.tool.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("tool cannot be empty".into()));
        }
        if self.host.trim().is_empty() || self.host.chars().any(char::is_whitespace) {
            return Err(ExtractError::InvalidConfig(format!(
                "host must be a single non-empty word, got '{}'",
                self.host
            )));
        }
        if self.payload_key.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("payload_key cannot be empty".into()));
        }
        self.separator_char()?;
        Ok(())
    }

    /// The flattening separator as a character
    pub fn separator_char(&self) -> Result<char, ExtractError> {
        let mut chars = self.separator.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(ExtractError::InvalidConfig(format!(
                "separator must be exactly one character, got '{}'",
                self.separator
            ))),
        }
    }

    /// Tool timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Built-in deny-list merged with the configured entries
    pub fn deny_list(&self) -> DenyList {
        let mut deny = if self.deny_list.replace_defaults {
            DenyList::empty()
        } else {
            DenyList::default()
        };
        deny.extend(&self.deny_list.prefixes, &self.deny_list.names);
        deny
    }

    pub fn flatten_options(&self) -> Result<FlattenOptions, ExtractError> {
        Ok(FlattenOptions {
            separator: self.separator_char()?,
            strip_strings: self.strip_strings,
        })
    }
}

/// Default config location: `<config dir>/vault-extract/config.yaml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vault-extract").join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if path == "~" {
        return dirs::home_dir().context("Failed to determine home directory");
    }
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir().context("Failed to determine home directory")?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.separator_char().unwrap(), '_');
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "timeout_secs: 5\ndialect: python\ndeny_list:\n  prefixes: [\"synthetic_\"]").unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.tool, "ansible");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.dialect, Dialect::Python);
        assert!(config.deny_list().is_internal("synthetic_host_name"));
        assert!(config.deny_list().is_internal("ansible_facts"));
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(Config::from_file(file.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_replace_defaults() {
        let config = Config {
            deny_list: DenyListConfig {
                prefixes: vec!["tool_".into()],
                names: vec![],
                replace_defaults: true,
            },
            ..Config::default()
        };

        let deny = config.deny_list();
        assert!(deny.is_internal("tool_x"));
        assert!(!deny.is_internal("ansible_facts"));
    }

    #[test]
    fn test_validation_rejects_bad_separator() {
        let config = Config {
            separator: "__".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ExtractError::InvalidConfig(_))));

        let config = Config {
            separator: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_tool_and_spaced_host() {
        let config = Config {
            tool: " ".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            host: "local host".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = Config {
            timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "dialect: toml").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        assert!(Config::load(Some("/no/such/vault-extract.yaml")).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("vars.yml").unwrap(), PathBuf::from("vars.yml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/vars.yml").unwrap(), home.join("vars.yml"));
        }
    }
}
