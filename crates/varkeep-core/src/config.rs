use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};

use crate::model::SystemPatterns;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub library_root: String,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_system_patterns")]
    pub system_patterns: Vec<String>,
    #[serde(default = "default_use_trash")]
    pub use_trash: bool,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

fn default_system_patterns() -> Vec<String> {
    vec!["vam.core*".to_string(), "system.*".to_string()]
}

fn default_use_trash() -> bool {
    true
}

fn default_snapshot_path() -> String {
    "varkeep_snapshot.json".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library_root: String::new(),
            ignore_patterns: Vec::new(),
            system_patterns: default_system_patterns(),
            use_trash: default_use_trash(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl AppConfig {
    pub fn with_library_root(mut self, root: &str) -> Self {
        self.library_root = root.to_string();
        self
    }

    /// Compiled system/core exception patterns.
    pub fn system_patterns(&self) -> SystemPatterns {
        SystemPatterns::new(&self.system_patterns)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Load `Config.toml` (optional) with `VARKEEP_*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("VARKEEP").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = AppConfig::default();
        assert!(config.library_root.is_empty());
        assert!(config.use_trash);
        assert_eq!(config.system_patterns, vec!["vam.core*", "system.*"]);
        assert_eq!(config.snapshot_path, "varkeep_snapshot.json");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str("library_root = \"/games/vam/AddonPackages\"").unwrap();
        assert_eq!(config.library_root, "/games/vam/AddonPackages");
        assert!(config.use_trash);
        assert_eq!(config.system_patterns.len(), 2);
    }

    #[test]
    fn test_to_toml_round_trips_root() {
        let config = AppConfig::default().with_library_root("/lib");
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("library_root = \"/lib\""));
    }
}
