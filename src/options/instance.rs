// Instance options

use crate::config::Config;
use anyhow::Result;
use raw_window_handle::RawDisplayHandle;

#[derive(Debug, Clone)]
pub struct InstanceOptions {
    pub application_name: String,
    pub application_version: u32,
    /// (major, minor)
    pub api_version: (u32, u32),
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    /// Enables VK_LAYER_KHRONOS_validation and the debug messenger
    pub validation: bool,
    pub suppressed_message_ids: Vec<String>,
    /// Display the surfaces will be created on; adds the platform surface
    /// extensions when set
    pub display_handle: Option<RawDisplayHandle>,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            application_name: "gpu-forge application".to_string(),
            application_version: 1,
            api_version: (1, 3),
            layers: Vec::new(),
            extensions: Vec::new(),
            validation: cfg!(debug_assertions),
            suppressed_message_ids: Vec::new(),
            display_handle: None,
        }
    }
}

impl InstanceOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            application_name: config.instance.application_name.clone(),
            application_version: config.instance.application_version,
            api_version: config.api_version()?,
            layers: config.instance.layers.clone(),
            extensions: config.instance.extensions.clone(),
            validation: config.debug.validation_layers,
            suppressed_message_ids: config.debug.suppressed_message_ids.clone(),
            display_handle: None,
        })
    }
}
