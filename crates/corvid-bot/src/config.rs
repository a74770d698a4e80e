//! Bot configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Host configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Display name for the bot.
    #[serde(default = "default_name")]
    pub name: String,

    /// Platform authentication token. Unused by the console host but kept so
    /// a gateway client can be wired in without a config migration.
    #[serde(default)]
    pub token: String,

    /// Prefix marking console/chat input as a command.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Extra recognized event names beyond the platform catalog.
    #[serde(default)]
    pub extra_events: Vec<String>,
}

fn default_name() -> String {
    "Corvid".to_string()
}

fn default_prefix() -> String {
    ">".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            token: String::new(),
            prefix: default_prefix(),
            extra_events: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "token = \"abc\"").unwrap();
        let config = BotConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "Corvid");
        assert_eq!(config.prefix, ">");
        assert_eq!(config.token, "abc");
        assert!(config.extra_events.is_empty());
    }

    #[test]
    fn test_full_config_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name = \"Feyn\"\nprefix = \"!\"\nextra_events = [\"on_custom\"]"
        )
        .unwrap();
        let config = BotConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "Feyn");
        assert_eq!(config.prefix, "!");
        assert_eq!(config.extra_events, vec!["on_custom".to_string()]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = BotConfig::load("/nonexistent/corvid.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
