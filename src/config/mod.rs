use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub model: ModelConfig,
    pub search: SearchConfig,
    pub scrape: ScrapeConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub endpoint: String,
    pub name: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub max_results: usize,
    pub region: String,
    pub safe_search: bool,
    pub recency: String, // "d", "w", "m"
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeConfig {
    pub page_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                endpoint: "http://localhost:11434".to_string(),
                name: "gemma3".to_string(),
                request_timeout_secs: 120,
            },
            search: SearchConfig {
                max_results: 50,
                region: "wt-wt".to_string(),
                safe_search: false,
                recency: "w".to_string(),
            },
            scrape: ScrapeConfig {
                page_timeout_secs: 60,
            },
            output: OutputConfig {
                directory: PathBuf::from("./artifacts"),
            },
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        // check if config file exists, create default if not
        if !self.config_path.exists() {
            warn!(
                "Configuration file not found, creating default config at {:?}",
                self.config_path
            );
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| PipelineError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        // checking model config
        if config.model.name.trim().is_empty() {
            return Err(PipelineError::Config("Model name cannot be empty".to_string()).into());
        }
        if !config.model.endpoint.starts_with("http://")
            && !config.model.endpoint.starts_with("https://")
        {
            return Err(PipelineError::Config(
                "Model endpoint must start with http:// or https://".to_string(),
            )
            .into());
        }
        if config.model.request_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        // checking search config
        if config.search.max_results == 0 {
            return Err(
                PipelineError::Config("max_results must be greater than 0".to_string()).into(),
            );
        }
        if config.search.max_results > 200 {
            return Err(
                PipelineError::Config("max_results cannot exceed 200".to_string()).into(),
            );
        }
        let valid_recency = ["d", "w", "m"];
        if !valid_recency.contains(&config.search.recency.as_str()) {
            return Err(PipelineError::Config(format!(
                "Invalid recency '{}', must be one of: {:?}",
                config.search.recency, valid_recency
            ))
            .into());
        }

        // checking scrape config
        if config.scrape.page_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "page_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        // checking output config
        if config.output.directory.as_os_str().is_empty() {
            return Err(
                PipelineError::Config("Output directory cannot be empty".to_string()).into(),
            );
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config).map_err(|e| {
            PipelineError::Config(format!("Failed to serialize default config: {}", e))
        })?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| PipelineError::Config(format!("Failed to write default config: {}", e)))?;

        info!(
            "Default configuration file created at {:?}",
            self.config_path
        );
        Ok(())
    }
}
