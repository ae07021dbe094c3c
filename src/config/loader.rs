//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/sampling-lab/config.toml)
//! 3. Project config (.sampling-lab/config.toml)
//! 4. Environment variables (SAMPLING_LAB_* prefix, `__` between sections)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::constants::history as history_constants;
use crate::types::{Result, SamplingError};

const ENV_PREFIX: &str = "SAMPLING_LAB_";
const PROJECT_DIR: &str = ".sampling-lab";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layers(Self::global_config_path(), Self::project_config_path())
    }

    fn load_layers(global: Option<PathBuf>, project: PathBuf) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(&project));
        }

        // e.g. SAMPLING_LAB_RETRY__MAX_RETRIES -> retry.max_retries
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| SamplingError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| SamplingError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory; `XDG_CONFIG_HOME` wins over the platform default
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|p| PathBuf::from(p).join("sampling-lab"))
            .or_else(|| {
                ProjectDirs::from("", "", "sampling-lab").map(|d| d.config_dir().to_path_buf())
            })
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(PROJECT_DIR)
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// History snapshot location, honoring `storage.history_path`
    pub fn history_path(config: &Config) -> PathBuf {
        config
            .storage
            .history_path
            .clone()
            .unwrap_or_else(|| Self::project_dir().join(history_constants::FILE_NAME))
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Render the effective configuration
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| SamplingError::Config(e.to_string()))
        }
    }

    /// Write a starter config file; existing files are kept unless `force`
    pub fn init(global: bool, force: bool) -> Result<PathBuf> {
        let path = if global {
            Self::global_config_path().ok_or_else(|| {
                SamplingError::Config("Cannot determine global config directory".to_string())
            })?
        } else {
            Self::project_config_path()
        };
        Self::init_at(&path, force)?;
        Ok(path)
    }

    fn init_at(path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            info!("Config exists: {}", path.display());
            return Ok(false);
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::default_config_template())?;
        info!("Created config: {}", path.display());
        Ok(true)
    }

    fn default_config_template() -> &'static str {
        r#"# sampling-lab configuration
# Project settings in .sampling-lab/config.toml override the global file.
# Environment overrides: SAMPLING_LAB_SAMPLING__MODE=llm

version = "1.0"
active_provider = "openai"

[sampling]
default_max_tokens = 1000
default_temperature = 0.7
# manual | llm | hybrid
mode = "manual"
fallback_to_human = true
debounce_ms = 300
refresh_interval_secs = 30
request_timeout_secs = 120

# [[sampling.rules]]
# name = "trusted filesystem server"
# condition = { type = "trusted_server", value = "filesystem" }
# action = { type = "auto_approve" }

[retry]
max_retries = 3
initial_delay_ms = 1000

[storage]
max_persisted = 50
max_in_memory = 20

[[providers]]
id = "openai"
name = "OpenAI"
family = "openai"
model = "gpt-4o-mini"
# api_key_env = "OPENAI_API_KEY"

[providers.cost]
inputCostPer1k = 0.00015
outputCostPer1k = 0.0006

[[providers]]
id = "anthropic"
name = "Anthropic"
family = "anthropic"
model = "claude-sonnet-4-5"

[providers.cost]
inputCostPer1k = 0.003
outputCostPer1k = 0.015
thinkingCostPer1k = 0.015

[[providers]]
id = "ollama"
name = "Ollama"
family = "local"
model = "llama3.2"
base_url = "http://localhost:11434/v1"

[providers.cost]
inputCostPer1k = 0.0
outputCostPer1k = 0.0
"#
    }
}
