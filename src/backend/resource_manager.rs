// Resource Manager - Owner of every GPU object
//
// One Pool per resource kind. The create/delete/get triads live next to the
// native structs in the sibling modules; this file holds the pools, the
// validation suppression list and the teardown order.

use super::*;
use crate::config::Config;
use crate::handle::{Handle, Pool};
use crate::resources;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Message id names the validation callback drops
pub(crate) type SuppressionList = Arc<RwLock<HashSet<String>>>;

pub struct ResourceManager {
    pub(crate) instances: Pool<VulkanInstance, resources::Instance>,
    pub(crate) adapters: Pool<VulkanAdapter, resources::Adapter>,
    pub(crate) devices: Pool<VulkanDevice, resources::Device>,
    pub(crate) queues: Pool<VulkanQueue, resources::Queue>,
    pub(crate) surfaces: Pool<VulkanSurface, resources::Surface>,
    pub(crate) swapchains: Pool<VulkanSwapchain, resources::Swapchain>,
    pub(crate) textures: Pool<VulkanTexture, resources::Texture>,
    pub(crate) texture_views: Pool<VulkanTextureView, resources::TextureView>,
    pub(crate) buffers: Pool<VulkanBuffer, resources::Buffer>,
    pub(crate) shader_modules: Pool<VulkanShaderModule, resources::ShaderModule>,
    pub(crate) render_passes: Pool<VulkanRenderPass, resources::RenderPass>,
    pub(crate) framebuffers: Pool<VulkanFramebuffer, resources::Framebuffer>,
    pub(crate) pipeline_layouts: Pool<VulkanPipelineLayout, resources::PipelineLayout>,
    pub(crate) graphics_pipelines: Pool<VulkanGraphicsPipeline, resources::GraphicsPipeline>,
    pub(crate) compute_pipelines: Pool<VulkanComputePipeline, resources::ComputePipeline>,
    pub(crate) ray_tracing_pipelines:
        Pool<VulkanRayTracingPipeline, resources::RayTracingPipeline>,
    pub(crate) gpu_semaphores: Pool<VulkanGpuSemaphore, resources::GpuSemaphore>,
    pub(crate) fences: Pool<VulkanFence, resources::Fence>,
    pub(crate) command_recorders: Pool<VulkanCommandRecorder, resources::CommandRecorder>,
    pub(crate) render_pass_recorders:
        Pool<VulkanRenderPassCommandRecorder, resources::RenderPassCommandRecorder>,
    pub(crate) compute_pass_recorders:
        Pool<VulkanComputePassCommandRecorder, resources::ComputePassCommandRecorder>,
    pub(crate) ray_tracing_pass_recorders:
        Pool<VulkanRayTracingPassCommandRecorder, resources::RayTracingPassCommandRecorder>,
    pub(crate) timestamp_query_recorders:
        Pool<VulkanTimestampQueryRecorder, resources::TimestampQueryRecorder>,
    pub(crate) command_buffers: Pool<VulkanCommandBuffer, resources::CommandBuffer>,
    pub(crate) bind_group_layouts: Pool<VulkanBindGroupLayout, resources::BindGroupLayout>,
    pub(crate) bind_groups: Pool<VulkanBindGroup, resources::BindGroup>,
    pub(crate) samplers: Pool<VulkanSampler, resources::Sampler>,
    pub(crate) acceleration_structures:
        Pool<VulkanAccelerationStructure, resources::AccelerationStructure>,

    pub(crate) suppressed_messages: SuppressionList,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            instances: Pool::new(),
            adapters: Pool::new(),
            devices: Pool::new(),
            queues: Pool::new(),
            surfaces: Pool::new(),
            swapchains: Pool::new(),
            textures: Pool::new(),
            texture_views: Pool::new(),
            buffers: Pool::new(),
            shader_modules: Pool::new(),
            render_passes: Pool::new(),
            framebuffers: Pool::new(),
            pipeline_layouts: Pool::new(),
            graphics_pipelines: Pool::new(),
            compute_pipelines: Pool::new(),
            ray_tracing_pipelines: Pool::new(),
            gpu_semaphores: Pool::new(),
            fences: Pool::new(),
            command_recorders: Pool::new(),
            render_pass_recorders: Pool::new(),
            compute_pass_recorders: Pool::new(),
            ray_tracing_pass_recorders: Pool::new(),
            timestamp_query_recorders: Pool::new(),
            command_buffers: Pool::new(),
            bind_group_layouts: Pool::new(),
            bind_groups: Pool::new(),
            samplers: Pool::new(),
            acceleration_structures: Pool::new(),
            suppressed_messages: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Seed the validation suppression list from configuration
    pub fn with_config(config: &Config) -> Self {
        let manager = Self::new();
        manager.set_suppressed_validation_messages(&config.debug.suppressed_message_ids);
        manager
    }

    /// Replace the list of validation message ids that are never logged
    pub fn set_suppressed_validation_messages<S: AsRef<str>>(&self, message_ids: &[S]) {
        let mut list = self.suppressed_messages.write();
        list.clear();
        list.extend(message_ids.iter().map(|id| id.as_ref().to_string()));
        log::debug!("{} validation message ids suppressed", list.len());
    }

    pub fn suppressed_validation_messages(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.suppressed_messages.read().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Device that owns the native objects of a recorder, buffer or pipeline
    pub(crate) fn device(&self, handle: Handle<resources::Device>) -> Option<&VulkanDevice> {
        let device = self.devices.get(handle);
        if device.is_none() {
            log::error!("Unknown device {:?}", handle);
        }
        device
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        log::info!("Destroying resource manager...");

        for device in self.devices.handles() {
            self.wait_until_idle(device);
        }

        // Step 1: Recording state
        for h in self.render_pass_recorders.handles() {
            self.render_pass_recorders.remove(h);
        }
        for h in self.compute_pass_recorders.handles() {
            self.compute_pass_recorders.remove(h);
        }
        for h in self.ray_tracing_pass_recorders.handles() {
            self.ray_tracing_pass_recorders.remove(h);
        }
        for h in self.command_recorders.handles() {
            self.delete_command_recorder(h);
        }
        for h in self.timestamp_query_recorders.handles() {
            self.delete_timestamp_query_recorder(h);
        }
        for h in self.command_buffers.handles() {
            self.delete_command_buffer(h);
        }

        // Step 2: Objects that reference buffers, textures and layouts
        for h in self.acceleration_structures.handles() {
            self.delete_acceleration_structure(h);
        }
        for h in self.bind_groups.handles() {
            self.delete_bind_group(h);
        }
        for h in self.graphics_pipelines.handles() {
            self.delete_graphics_pipeline(h);
        }
        for h in self.compute_pipelines.handles() {
            self.delete_compute_pipeline(h);
        }
        for h in self.ray_tracing_pipelines.handles() {
            self.delete_ray_tracing_pipeline(h);
        }
        for h in self.pipeline_layouts.handles() {
            self.delete_pipeline_layout(h);
        }
        for h in self.bind_group_layouts.handles() {
            self.delete_bind_group_layout(h);
        }
        for h in self.shader_modules.handles() {
            self.delete_shader_module(h);
        }
        for h in self.samplers.handles() {
            self.delete_sampler(h);
        }
        for h in self.fences.handles() {
            self.delete_fence(h);
        }
        for h in self.gpu_semaphores.handles() {
            self.delete_gpu_semaphore(h);
        }

        // Step 3: Memory resources
        for h in self.texture_views.handles() {
            self.delete_texture_view(h);
        }
        for h in self.swapchains.handles() {
            self.delete_swapchain(h);
        }
        for h in self.textures.handles() {
            self.delete_texture(h);
        }
        for h in self.buffers.handles() {
            self.delete_buffer(h);
        }

        // Step 4: Devices drop their caches, pools and allocators
        for h in self.devices.handles() {
            self.delete_device(h);
        }
        for h in self.surfaces.handles() {
            self.delete_surface(h);
        }
        for h in self.instances.handles() {
            self.delete_instance(h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_list_is_replaced() {
        let manager = ResourceManager::new();
        manager.set_suppressed_validation_messages(&["VUID-a", "VUID-b"]);
        assert_eq!(manager.suppressed_validation_messages(), vec!["VUID-a", "VUID-b"]);

        manager.set_suppressed_validation_messages(&["VUID-c"]);
        assert_eq!(manager.suppressed_validation_messages(), vec!["VUID-c"]);
    }

    #[test]
    fn empty_manager_drops_cleanly() {
        let manager = ResourceManager::new();
        assert!(manager.devices.is_empty());
        assert!(manager.get_buffer(Handle::null()).is_none());
        drop(manager);
    }
}
