//! Application configuration loading.
//!
//! One YAML file declares the tool servers to launch and the completion
//! backend to talk to. The file is the single source of truth for
//! endpoints, the tool paradigm, and loop bounds.
//!
//! ```yaml
//! servers:
//!   calculator:
//!     command: python3
//!     args: ["servers/calculator.py"]
//! backend:
//!   base_url: http://localhost:11434/v1
//!   model: qwen2.5:14b
//!   paradigm: structured
//!   api_key_env: OPENAI_API_KEY
//! chat:
//!   max_tool_rounds: 8
//!   probe_interval_secs: 10
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::backend::ToolParadigm;
use crate::mcp_client::LaunchSpec;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse config file '{path}': {reason}")]
    Parse { path: String, reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// Completion-backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key. Unset for
    /// keyless local runtimes.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub paradigm: ToolParadigm,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Chat-session tuning knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    /// Upper bound on tool-call rounds per turn in the structured paradigm.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Seconds between health-probe rounds.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

fn default_max_tool_rounds() -> usize {
    8
}
fn default_probe_interval_secs() -> u64 {
    10
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Tool servers to launch, keyed by identifier.
    #[serde(default)]
    pub servers: HashMap<String, LaunchSpec>,
    pub backend: BackendSettings,
    #[serde(default)]
    pub chat: ChatSettings,
}

impl AppConfig {
    /// Load and parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Platform-standard location of the config file:
/// `{config_dir}/toolbridge/config.yaml`, falling back to the current
/// directory when no config dir can be resolved.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolbridge")
        .join("config.yaml")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
servers:
  calculator:
    command: python3
    args: ["servers/calculator.py"]
    env:
      LOG_LEVEL: debug
backend:
  base_url: http://localhost:11434/v1
  model: qwen2.5:14b
  paradigm: structured
chat:
  max_tool_rounds: 5
  probe_interval_secs: 30
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.servers.len(), 1);
        let calc = &config.servers["calculator"];
        assert_eq!(calc.command, "python3");
        assert_eq!(calc.env["LOG_LEVEL"], "debug");
        assert_eq!(config.backend.paradigm, ToolParadigm::Structured);
        assert_eq!(config.chat.max_tool_rounds, 5);
        assert_eq!(config.chat.probe_interval_secs, 30);
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
backend:
  base_url: http://localhost:8080/v1
  model: llama3
  paradigm: generic
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.servers.is_empty());
        assert_eq!(config.backend.paradigm, ToolParadigm::Generic);
        assert!(config.backend.api_key_env.is_none());
        assert_eq!(config.backend.temperature, 0.7);
        assert_eq!(config.backend.max_tokens, 4096);
        assert_eq!(config.chat.max_tool_rounds, 8);
        assert_eq!(config.chat.probe_interval_secs, 10);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_bad_yaml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "backend: [not, a, mapping").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
