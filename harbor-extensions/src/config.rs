//! Runtime configuration: reads `~/.harbor/harbor.toml`.
//!
//! Every section and key is optional. A missing file runs on defaults; a
//! malformed one is reported and also runs on defaults.

use harbor_capabilities::{DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL, SurfaceConfig};
use harbor_sandbox::HostConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "harbor.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarborConfig {
    #[serde(default)]
    pub directories: Directories,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directories {
    /// Extensions shipped with the application.
    pub builtin: PathBuf,
    /// Extensions installed by the user.
    pub user: PathBuf,
    /// JSON file holding the disabled list and per-extension settings.
    pub state_file: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        let root = dirs_path();
        Self {
            builtin: root.join("builtin"),
            user: root.join("extensions"),
            state_file: root.join("extensions.json"),
        }
    }
}

/// All values in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub activation_secs: u64,
    pub unload_grace_secs: u64,
    pub api_call_secs: u64,
    pub prompt_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            activation_secs: 30,
            unload_grace_secs: 5,
            api_call_secs: 30,
            prompt_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub default_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            default_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

impl HarborConfig {
    /// Loads `~/.harbor/harbor.toml` if it exists.
    pub fn load() -> Self {
        Self::load_from(&dirs_path().join(CONFIG_FILE))
    }

    /// Loads configuration from an explicit path.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<HarborConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?}: {}. Falling back to defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            activation_timeout: Duration::from_secs(self.timeouts.activation_secs),
            unload_grace: Duration::from_secs(self.timeouts.unload_grace_secs),
            call_timeout: Duration::from_secs(self.timeouts.api_call_secs),
        }
    }

    pub fn surface_config(&self) -> SurfaceConfig {
        SurfaceConfig {
            prompt_timeout: Duration::from_secs(self.timeouts.prompt_secs),
            chat_endpoint: self.llm.endpoint.clone(),
            default_model: self.llm.default_model.clone(),
        }
    }
}

/// Resolve the Harbor config directory, `~/.harbor` when a home directory
/// is known and `./.harbor` otherwise.
pub fn dirs_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".harbor"))
        .unwrap_or_else(|| PathBuf::from(".harbor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_dir_lives_under_home() {
        let path = dirs_path();
        assert!(path.ends_with(".harbor"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join(".harbor"));
        }
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            [directories]
            builtin = "/opt/harbor/builtin"
            user = "/home/me/.harbor/extensions"
            state_file = "/home/me/.harbor/state.json"

            [timeouts]
            activation_secs = 10
            unload_grace_secs = 2
            api_call_secs = 15
            prompt_secs = 90

            [llm]
            endpoint = "http://127.0.0.1:9999"
            default_model = "mistral"
        "#;
        let config: HarborConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.directories.builtin, PathBuf::from("/opt/harbor/builtin"));
        assert_eq!(config.timeouts.prompt_secs, 90);

        let host = config.host_config();
        assert_eq!(host.activation_timeout, Duration::from_secs(10));
        assert_eq!(host.unload_grace, Duration::from_secs(2));
        assert_eq!(host.call_timeout, Duration::from_secs(15));

        let surface = config.surface_config();
        assert_eq!(surface.prompt_timeout, Duration::from_secs(90));
        assert_eq!(surface.chat_endpoint, "http://127.0.0.1:9999");
        assert_eq!(surface.default_model, "mistral");
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: HarborConfig = toml::from_str("[timeouts]\nactivation_secs = 5\n").unwrap();
        assert_eq!(config.timeouts.activation_secs, 5);
        assert_eq!(config.timeouts.unload_grace_secs, 5);
        assert_eq!(config.timeouts.prompt_secs, 60);
        assert_eq!(config.llm, LlmConfig::default());
        assert_eq!(config.directories, Directories::default());
    }

    #[test]
    fn load_from_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(HarborConfig::load_from(&dir.path().join("nope.toml")), HarborConfig::default());
    }

    #[test]
    fn load_from_malformed_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert_eq!(HarborConfig::load_from(&path), HarborConfig::default());
    }

    #[test]
    fn load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[llm]\ndefault_model = \"phi3\"\n").unwrap();
        let config = HarborConfig::load_from(&path);
        assert_eq!(config.llm.default_model, "phi3");
        assert_eq!(config.llm.endpoint, DEFAULT_CHAT_ENDPOINT);
    }
}
