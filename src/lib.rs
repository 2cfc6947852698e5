// gpu-forge - Typed resource graph over Vulkan
//
// Client code creates GPU objects through the ResourceManager and refers to
// them by generational handles. Commands are recorded with CommandRecorder
// and its render, compute and ray tracing pass recorders.

pub mod backend;
pub mod config;
pub mod handle;
pub mod logging;
pub mod options;
pub mod resources;
pub mod types;

pub use backend::{
    CommandRecorder, ComputePassCommandRecorder, RayTracingPassCommandRecorder,
    RayTracingShaderBindingTable, RenderPassCommandRecorder, ResourceManager,
};
pub use handle::{Handle, Pool};
pub use options::*;
pub use types::*;
