//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable (`FINOPS_DATA_FOLDER`)
/// 3. TOML config file (`data_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var("FINOPS_DATA_FOLDER") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(folder) = config.get("data_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_data_folder()
}

/// Database file path inside the data folder
pub fn database_path(data_folder: &std::path::Path) -> PathBuf {
    data_folder.join("finops.db")
}

/// Language-model endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint
    pub base_url: String,
    /// API key (bearer token)
    pub api_key: String,
    /// Model identifier submitted with each request and recorded on
    /// validated patterns for audit
    pub model: String,
    /// Maximum concurrent validation calls per batch pass
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Minimum interval between requests, in milliseconds
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
}

fn default_concurrency() -> usize {
    3
}

fn default_request_interval_ms() -> u64 {
    250
}

impl LlmConfig {
    /// Load LLM configuration.
    ///
    /// Environment variables (`FINOPS_LLM_BASE_URL`, `FINOPS_LLM_API_KEY`,
    /// `FINOPS_LLM_MODEL`) override the `[llm]` table of the config file.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_config_file().unwrap_or_else(|_| Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            concurrency: default_concurrency(),
            request_interval_ms: default_request_interval_ms(),
        });

        if let Ok(url) = std::env::var("FINOPS_LLM_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(key) = std::env::var("FINOPS_LLM_API_KEY") {
            config.api_key = key;
        }
        if let Ok(model) = std::env::var("FINOPS_LLM_MODEL") {
            config.model = model;
        }

        if config.api_key.is_empty() {
            return Err(Error::Config(
                "LLM API key not configured (set FINOPS_LLM_API_KEY or [llm] api_key)".to_string(),
            ));
        }

        Ok(config)
    }

    fn from_config_file() -> Result<Self> {
        let config_path = locate_config_file()?;
        let toml_content = std::fs::read_to_string(&config_path)?;
        let value = toml::from_str::<toml::Value>(&toml_content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        let llm = value
            .get("llm")
            .ok_or_else(|| Error::Config("Missing [llm] section".to_string()))?;
        llm.clone()
            .try_into()
            .map_err(|e| Error::Config(format!("Invalid [llm] section: {}", e)))
    }
}

/// Get default configuration file path for the platform
fn locate_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/finops/config.toml first, then /etc/finops/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("finops").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/finops/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("finops").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default data folder path
fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("FinOps")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".finops")
    }
}
