// Device options

use super::adapter::AdapterFeatures;
use crate::config::{BindGroupPoolConfig, Config};
use anyhow::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct QueueRequest {
    pub queue_type_index: u32,
    pub count: u32,
    /// One priority per queue; missing entries default to 1.0
    pub priorities: Vec<f32>,
}

impl Default for QueueRequest {
    fn default() -> Self {
        Self {
            queue_type_index: 0,
            count: 1,
            priorities: vec![1.0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    pub requested_features: AdapterFeatures,
    /// Empty means one queue from queue type 0
    pub queues: Vec<QueueRequest>,
    /// (major, minor); downgraded to what the adapter and allocator support
    pub api_version: (u32, u32),
    pub bind_group_pool: BindGroupPoolConfig,
    pub timestamp_query_capacity: u32,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            extensions: Vec::new(),
            requested_features: AdapterFeatures::default(),
            queues: Vec::new(),
            api_version: (1, 3),
            bind_group_pool: BindGroupPoolConfig::default(),
            timestamp_query_capacity: 4096,
        }
    }
}

impl DeviceOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            api_version: config.api_version()?,
            bind_group_pool: config.bind_groups,
            timestamp_query_capacity: config.queries.timestamp_query_capacity,
            ..Default::default()
        })
    }
}
