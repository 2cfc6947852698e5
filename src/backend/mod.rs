// Backend module - Vulkan implementation of the resource graph
//
// ResourceManager owns one Pool per resource kind. Each file below adds the
// create/delete/get methods of one family of resources to it, next to the
// native struct stored in that pool.

pub mod enums;

mod acceleration_structure;
mod adapter;
mod bind_group;
mod buffer;
mod command_recorder;
mod compute_pass_recorder;
mod device;
mod external;
mod instance;
mod memory;
mod pipeline;
mod queue;
mod raytracing_pass_recorder;
mod raytracing_pipeline;
mod render_pass;
mod render_pass_recorder;
mod resource_manager;
mod sampler;
mod shader;
mod swapchain;
mod sync;
mod texture;
mod timestamp_query;

pub use acceleration_structure::{pack_instance, VulkanAccelerationStructure};
pub use adapter::VulkanAdapter;
pub use bind_group::{VulkanBindGroup, VulkanBindGroupLayout};
pub use buffer::VulkanBuffer;
pub use command_recorder::{CommandRecorder, VulkanCommandBuffer, VulkanCommandRecorder};
pub use compute_pass_recorder::{ComputePassCommandRecorder, VulkanComputePassCommandRecorder};
pub use device::{VulkanDevice, MIN_API_VERSION};
pub use external::ExternalMemoryAllocator;
pub use instance::{VulkanInstance, VulkanSurface};
pub use pipeline::{
    VulkanComputePipeline, VulkanGraphicsPipeline, VulkanPipelineLayout,
};
pub use queue::VulkanQueue;
pub use raytracing_pass_recorder::{
    RayTracingPassCommandRecorder, VulkanRayTracingPassCommandRecorder,
};
pub use raytracing_pipeline::{RayTracingShaderBindingTable, VulkanRayTracingPipeline};
pub use render_pass::{
    ColorAttachmentKey, DepthAttachmentKey, FramebufferKey, RenderPassKey, VulkanFramebuffer,
    VulkanRenderPass,
};
pub use render_pass_recorder::{RenderPassCommandRecorder, VulkanRenderPassCommandRecorder};
pub use resource_manager::ResourceManager;
pub use sampler::VulkanSampler;
pub use shader::VulkanShaderModule;
pub use swapchain::VulkanSwapchain;
pub use sync::{VulkanFence, VulkanGpuSemaphore};
pub use texture::{VulkanTexture, VulkanTextureView};
pub use timestamp_query::VulkanTimestampQueryRecorder;

/// Pass recorder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    NotStarted,
    Active,
    Ended,
}

/// Round `value` up to a power-of-two `alignment`
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

/// Label as a C string, None when it contains a NUL
pub(crate) fn label_cstring(label: &Option<String>) -> Option<std::ffi::CString> {
    label
        .as_deref()
        .and_then(|l| std::ffi::CString::new(l).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(13, 1), 13);
        assert_eq!(align_up(13, 0), 13);
    }
}
