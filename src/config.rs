// =============================================================================
// CONFIGURATION - Load settings from gpu_forge.toml
// =============================================================================
//
// Instance, validation, bind group pool and query pool settings.
// Every section falls back to defaults when missing from the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "gpu_forge.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub instance: InstanceConfig,
    pub debug: DebugConfig,
    pub bind_groups: BindGroupPoolConfig,
    pub queries: QueryConfig,
}

/// Instance creation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub application_name: String,
    pub application_version: u32,
    /// "1.1", "1.2" or "1.3"
    pub api_version: String,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            application_name: "gpu-forge application".to_string(),
            application_version: 1,
            api_version: "1.3".to_string(),
            layers: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

/// Validation and logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    /// Message id names that are never forwarded to the logger
    pub suppressed_message_ids: Vec<String>,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            suppressed_message_ids: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

/// Descriptor pool sizing used whenever the device needs a fresh pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BindGroupPoolConfig {
    pub uniform_buffers: u32,
    pub dynamic_uniform_buffers: u32,
    pub storage_buffers: u32,
    pub combined_image_samplers: u32,
    pub sampled_images: u32,
    pub samplers: u32,
    pub storage_images: u32,
    pub input_attachments: u32,
    pub acceleration_structures: u32,
    pub max_sets: u32,
}

impl Default for BindGroupPoolConfig {
    fn default() -> Self {
        Self {
            uniform_buffers: 512,
            dynamic_uniform_buffers: 16,
            storage_buffers: 512,
            combined_image_samplers: 128,
            sampled_images: 128,
            samplers: 8,
            storage_images: 8,
            input_attachments: 8,
            acceleration_structures: 8,
            max_sets: 1024,
        }
    }
}

/// Timestamp query settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub timestamp_query_capacity: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timestamp_query_capacity: 4096,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_FILE).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", DEFAULT_CONFIG_FILE, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Requested API version as (major, minor)
    pub fn api_version(&self) -> Result<(u32, u32)> {
        parse_api_version(&self.instance.api_version)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.debug.log_level.to_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" | "warning" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            other => {
                log::warn!("Unknown log level '{}', defaulting to info", other);
                log::LevelFilter::Info
            }
        }
    }
}

pub fn parse_api_version(text: &str) -> Result<(u32, u32)> {
    let (major, minor) = text
        .trim()
        .split_once('.')
        .with_context(|| format!("API version '{}' is not of the form MAJOR.MINOR", text))?;
    let major = major
        .parse::<u32>()
        .with_context(|| format!("Invalid major version in '{}'", text))?;
    let minor = minor
        .parse::<u32>()
        .with_context(|| format!("Invalid minor version in '{}'", text))?;
    if major != 1 || !(1..=3).contains(&minor) {
        anyhow::bail!("Unsupported API version {}.{} (expected 1.1 to 1.3)", major, minor);
    }
    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.bind_groups, BindGroupPoolConfig::default());
        assert_eq!(config.queries.timestamp_query_capacity, 4096);
        assert_eq!(config.api_version().unwrap(), (1, 3));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml_str(
            r#"
            [instance]
            api_version = "1.2"

            [debug]
            suppressed_message_ids = ["VUID-VkSwapchainCreateInfoKHR-imageExtent-01274"]
            log_level = "debug"

            [bind_groups]
            max_sets = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.api_version().unwrap(), (1, 2));
        assert_eq!(config.debug.suppressed_message_ids.len(), 1);
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
        assert_eq!(config.bind_groups.max_sets, 2);
        assert_eq!(config.bind_groups.uniform_buffers, 512);
        assert_eq!(config.instance.application_name, "gpu-forge application");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::from_toml_str("[bind_groups\nmax_sets = ").is_err());
        assert!(Config::from_toml_str("[bind_groups]\nmax_sets = \"many\"").is_err());
    }

    #[test]
    fn api_version_parsing() {
        assert_eq!(parse_api_version("1.1").unwrap(), (1, 1));
        assert_eq!(parse_api_version(" 1.3 ").unwrap(), (1, 3));
        assert!(parse_api_version("1.0").is_err());
        assert!(parse_api_version("2.0").is_err());
        assert!(parse_api_version("13").is_err());
        assert!(parse_api_version("1.x").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from_path("/definitely/not/here/gpu_forge.toml").unwrap();
        assert_eq!(config.queries, QueryConfig::default());
    }
}
