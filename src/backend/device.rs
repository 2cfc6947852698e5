// Vulkan Device - Logical GPU context
//
// Responsibilities:
// - API version negotiation against the adapter and the allocator
// - Extension selection with per-extension fallbacks below 1.2
// - Feature chain construction (umbrella structs or individual structs)
// - Logical device + queue creation
// - Memory allocator, command pools, timestamp query pool
// - Teardown of everything the device owns, in a fixed order

use super::adapter::adapter_features_to_core;
use super::external::{ExternalMemoryAllocator, PlatformExporter};
use super::queue::VulkanQueue;
use super::render_pass::{FramebufferKey, RenderPassKey};
use super::resource_manager::ResourceManager;
use super::timestamp_query::TimestampBuckets;
use crate::config::BindGroupPoolConfig;
use crate::handle::Handle;
use crate::options::{AdapterFeatures, AdapterProperties, DeviceOptions, QueueRequest};
use crate::resources::{Adapter, Device, Framebuffer, Queue, RenderPass};
use crate::types::ExternalMemoryHandleType;
use anyhow::{bail, Context, Result};
use ash::extensions::{ext, khr};
use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, CStr, CString};

/// Oldest API tier a device can be created with
pub const MIN_API_VERSION: (u32, u32) = (1, 1);

/// Newest API tier gpu-allocator is written against
const ALLOCATOR_MAX_API_VERSION: (u32, u32) = (1, 3);

fn ext_name(name: &CStr) -> String {
    name.to_string_lossy().into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Version and extension negotiation
// ─────────────────────────────────────────────────────────────────────────────

/// Downgrade the requested version to what the adapter and the allocator
/// support. Fails only below MIN_API_VERSION.
pub(crate) fn negotiate_api_version(requested: (u32, u32), adapter_version: u32) -> Result<u32> {
    let mut version = vk::make_api_version(0, requested.0, requested.1, 0);

    let adapter_version = vk::make_api_version(
        0,
        vk::api_version_major(adapter_version),
        vk::api_version_minor(adapter_version),
        0,
    );
    if version > adapter_version {
        log::warn!(
            "Requested Vulkan {}.{} but the adapter supports {}.{}, downgrading",
            requested.0,
            requested.1,
            vk::api_version_major(adapter_version),
            vk::api_version_minor(adapter_version)
        );
        version = adapter_version;
    }

    let allocator_max = vk::make_api_version(0, ALLOCATOR_MAX_API_VERSION.0, ALLOCATOR_MAX_API_VERSION.1, 0);
    if version > allocator_max {
        log::warn!(
            "Clamping Vulkan {}.{} to {}.{} supported by the memory allocator",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            ALLOCATOR_MAX_API_VERSION.0,
            ALLOCATOR_MAX_API_VERSION.1
        );
        version = allocator_max;
    }

    let minimum = vk::make_api_version(0, MIN_API_VERSION.0, MIN_API_VERSION.1, 0);
    if version < minimum {
        bail!(
            "Vulkan {}.{} is required, only {}.{} is available",
            MIN_API_VERSION.0,
            MIN_API_VERSION.1,
            vk::api_version_major(version),
            vk::api_version_minor(version)
        );
    }
    Ok(version)
}

/// Runs its closure on drop unless disarmed
pub(crate) struct Teardown<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> Teardown<F> {
    pub(crate) fn new(action: F) -> Self {
        Self { action: Some(action) }
    }

    pub(crate) fn disarm(mut self) {
        self.action = None;
    }
}

impl<F: FnOnce()> Drop for Teardown<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

/// Device extensions to enable for the negotiated version and requested features
pub(crate) fn select_device_extensions(
    api_version: u32,
    available: &HashSet<String>,
    features: &AdapterFeatures,
    requested: &[String],
) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    let add = |name: String, selected: &mut Vec<String>| {
        if !selected.contains(&name) {
            selected.push(name);
        }
    };
    let offered = |name: &CStr| available.contains(name.to_string_lossy().as_ref());

    if offered(khr::Swapchain::name()) {
        add(ext_name(khr::Swapchain::name()), &mut selected);
    }
    if api_version < vk::API_VERSION_1_3 && offered(khr::Synchronization2::name()) {
        add(ext_name(khr::Synchronization2::name()), &mut selected);
    }
    if api_version < vk::API_VERSION_1_3 && features.dynamic_rendering {
        add(ext_name(khr::DynamicRendering::name()), &mut selected);
    }

    // Promoted to core in 1.2
    if api_version < vk::API_VERSION_1_2 {
        for name in [
            khr::CreateRenderPass2::name(),
            vk::KhrDepthStencilResolveFn::name(),
            vk::ExtDescriptorIndexingFn::name(),
            khr::BufferDeviceAddress::name(),
            vk::KhrUniformBufferStandardLayoutFn::name(),
            vk::ExtHostQueryResetFn::name(),
        ] {
            if offered(name) {
                add(ext_name(name), &mut selected);
            }
        }
    }

    if features.acceleration_structures {
        add(ext_name(khr::AccelerationStructure::name()), &mut selected);
        add(ext_name(khr::DeferredHostOperations::name()), &mut selected);
        if api_version < vk::API_VERSION_1_2 {
            add(ext_name(khr::BufferDeviceAddress::name()), &mut selected);
        }
    }
    if features.ray_tracing_pipeline {
        add(ext_name(khr::RayTracingPipeline::name()), &mut selected);
        if api_version < vk::API_VERSION_1_2 {
            add(ext_name(vk::KhrSpirv14Fn::name()), &mut selected);
            add(ext_name(vk::KhrShaderFloatControlsFn::name()), &mut selected);
        }
    }
    if features.ray_query {
        add(ext_name(vk::KhrRayQueryFn::name()), &mut selected);
    }
    if offered(khr::PushDescriptor::name()) {
        add(ext_name(khr::PushDescriptor::name()), &mut selected);
    }

    #[cfg(unix)]
    let external = [
        khr::ExternalMemoryFd::name(),
        khr::ExternalSemaphoreFd::name(),
        khr::ExternalFenceFd::name(),
    ];
    #[cfg(windows)]
    let external = [
        khr::ExternalMemoryWin32::name(),
        khr::ExternalSemaphoreWin32::name(),
        khr::ExternalFenceWin32::name(),
    ];
    #[cfg(any(unix, windows))]
    for name in external {
        if offered(name) {
            add(ext_name(name), &mut selected);
        }
    }
    #[cfg(unix)]
    if offered(khr::ExternalMemoryFd::name()) && offered(vk::ExtExternalMemoryDmaBufFn::name()) {
        add(ext_name(vk::ExtExternalMemoryDmaBufFn::name()), &mut selected);
    }

    for name in requested {
        if !available.contains(name) {
            log::warn!("Requested device extension {} is not offered by the adapter", name);
        }
        add(name.clone(), &mut selected);
    }

    selected
}

// ─────────────────────────────────────────────────────────────────────────────
// Feature chain
// ─────────────────────────────────────────────────────────────────────────────

/// Feature groups chained into device creation.
///
/// From 1.2 the promoted features travel in the Vulkan11/12/13 umbrella
/// structs. Below that each promoted feature uses its own struct, and only
/// when the matching extension is enabled. Umbrella and individual structs
/// are never chained together.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DeviceFeatureChain {
    pub core: vk::PhysicalDeviceFeatures,
    pub vulkan11: Option<vk::PhysicalDeviceVulkan11Features>,
    pub vulkan12: Option<vk::PhysicalDeviceVulkan12Features>,
    pub vulkan13: Option<vk::PhysicalDeviceVulkan13Features>,
    pub multiview: Option<vk::PhysicalDeviceMultiviewFeatures>,
    pub descriptor_indexing: Option<vk::PhysicalDeviceDescriptorIndexingFeatures>,
    pub buffer_device_address: Option<vk::PhysicalDeviceBufferDeviceAddressFeatures>,
    pub uniform_buffer_standard_layout: Option<vk::PhysicalDeviceUniformBufferStandardLayoutFeatures>,
    pub host_query_reset: Option<vk::PhysicalDeviceHostQueryResetFeatures>,
    pub synchronization2: Option<vk::PhysicalDeviceSynchronization2Features>,
    pub dynamic_rendering: Option<vk::PhysicalDeviceDynamicRenderingFeatures>,
    pub acceleration_structure: Option<vk::PhysicalDeviceAccelerationStructureFeaturesKHR>,
    pub ray_tracing_pipeline: Option<vk::PhysicalDeviceRayTracingPipelineFeaturesKHR>,
    pub ray_query: Option<vk::PhysicalDeviceRayQueryFeaturesKHR>,
}

impl DeviceFeatureChain {
    pub fn new(api_version: u32, extensions: &[String], features: &AdapterFeatures) -> Self {
        let enabled = |name: &CStr| extensions.iter().any(|e| e.as_str() == name.to_string_lossy());
        let b = |on: bool| if on { vk::TRUE } else { vk::FALSE };
        let mut chain = DeviceFeatureChain {
            core: adapter_features_to_core(features),
            ..Default::default()
        };

        let bda = features.buffer_device_address || features.acceleration_structures;

        if api_version >= vk::API_VERSION_1_2 {
            chain.vulkan11 = Some(vk::PhysicalDeviceVulkan11Features {
                multiview: b(features.multi_view),
                multiview_geometry_shader: b(features.multi_view_geometry_shader),
                multiview_tessellation_shader: b(features.multi_view_tessellation_shader),
                ..Default::default()
            });
            chain.vulkan12 = Some(vk::PhysicalDeviceVulkan12Features {
                descriptor_indexing: b(features.uses_descriptor_indexing()),
                shader_uniform_buffer_array_non_uniform_indexing: b(
                    features.shader_uniform_buffer_array_non_uniform_indexing,
                ),
                shader_sampled_image_array_non_uniform_indexing: b(
                    features.shader_sampled_image_array_non_uniform_indexing,
                ),
                shader_storage_buffer_array_non_uniform_indexing: b(
                    features.shader_storage_buffer_array_non_uniform_indexing,
                ),
                shader_storage_image_array_non_uniform_indexing: b(
                    features.shader_storage_image_array_non_uniform_indexing,
                ),
                descriptor_binding_uniform_buffer_update_after_bind: b(
                    features.descriptor_binding_uniform_buffer_update_after_bind,
                ),
                descriptor_binding_sampled_image_update_after_bind: b(
                    features.descriptor_binding_sampled_image_update_after_bind,
                ),
                descriptor_binding_storage_image_update_after_bind: b(
                    features.descriptor_binding_storage_image_update_after_bind,
                ),
                descriptor_binding_storage_buffer_update_after_bind: b(
                    features.descriptor_binding_storage_buffer_update_after_bind,
                ),
                descriptor_binding_update_unused_while_pending: b(
                    features.descriptor_binding_update_unused_while_pending,
                ),
                descriptor_binding_partially_bound: b(features.descriptor_binding_partially_bound),
                descriptor_binding_variable_descriptor_count: b(
                    features.descriptor_binding_variable_descriptor_count,
                ),
                runtime_descriptor_array: b(features.runtime_descriptor_array),
                buffer_device_address: b(bda),
                uniform_buffer_standard_layout: b(features.uniform_buffer_standard_layout),
                host_query_reset: b(features.host_query_reset),
                ..Default::default()
            });
        } else {
            chain.multiview = Some(vk::PhysicalDeviceMultiviewFeatures {
                multiview: b(features.multi_view),
                multiview_geometry_shader: b(features.multi_view_geometry_shader),
                multiview_tessellation_shader: b(features.multi_view_tessellation_shader),
                ..Default::default()
            });
            if enabled(vk::ExtDescriptorIndexingFn::name()) && features.uses_descriptor_indexing() {
                chain.descriptor_indexing = Some(vk::PhysicalDeviceDescriptorIndexingFeatures {
                    shader_uniform_buffer_array_non_uniform_indexing: b(
                        features.shader_uniform_buffer_array_non_uniform_indexing,
                    ),
                    shader_sampled_image_array_non_uniform_indexing: b(
                        features.shader_sampled_image_array_non_uniform_indexing,
                    ),
                    shader_storage_buffer_array_non_uniform_indexing: b(
                        features.shader_storage_buffer_array_non_uniform_indexing,
                    ),
                    shader_storage_image_array_non_uniform_indexing: b(
                        features.shader_storage_image_array_non_uniform_indexing,
                    ),
                    descriptor_binding_uniform_buffer_update_after_bind: b(
                        features.descriptor_binding_uniform_buffer_update_after_bind,
                    ),
                    descriptor_binding_sampled_image_update_after_bind: b(
                        features.descriptor_binding_sampled_image_update_after_bind,
                    ),
                    descriptor_binding_storage_image_update_after_bind: b(
                        features.descriptor_binding_storage_image_update_after_bind,
                    ),
                    descriptor_binding_storage_buffer_update_after_bind: b(
                        features.descriptor_binding_storage_buffer_update_after_bind,
                    ),
                    descriptor_binding_update_unused_while_pending: b(
                        features.descriptor_binding_update_unused_while_pending,
                    ),
                    descriptor_binding_partially_bound: b(features.descriptor_binding_partially_bound),
                    descriptor_binding_variable_descriptor_count: b(
                        features.descriptor_binding_variable_descriptor_count,
                    ),
                    runtime_descriptor_array: b(features.runtime_descriptor_array),
                    ..Default::default()
                });
            }
            if enabled(khr::BufferDeviceAddress::name()) && bda {
                chain.buffer_device_address = Some(vk::PhysicalDeviceBufferDeviceAddressFeatures {
                    buffer_device_address: vk::TRUE,
                    ..Default::default()
                });
            }
            if enabled(vk::KhrUniformBufferStandardLayoutFn::name())
                && features.uniform_buffer_standard_layout
            {
                chain.uniform_buffer_standard_layout =
                    Some(vk::PhysicalDeviceUniformBufferStandardLayoutFeatures {
                        uniform_buffer_standard_layout: vk::TRUE,
                        ..Default::default()
                    });
            }
            if enabled(vk::ExtHostQueryResetFn::name()) && features.host_query_reset {
                chain.host_query_reset = Some(vk::PhysicalDeviceHostQueryResetFeatures {
                    host_query_reset: vk::TRUE,
                    ..Default::default()
                });
            }
        }

        if api_version >= vk::API_VERSION_1_3 {
            chain.vulkan13 = Some(vk::PhysicalDeviceVulkan13Features {
                synchronization2: b(features.synchronization2),
                dynamic_rendering: b(features.dynamic_rendering),
                ..Default::default()
            });
        } else {
            if enabled(khr::Synchronization2::name()) && features.synchronization2 {
                chain.synchronization2 = Some(vk::PhysicalDeviceSynchronization2Features {
                    synchronization2: vk::TRUE,
                    ..Default::default()
                });
            }
            if enabled(khr::DynamicRendering::name()) && features.dynamic_rendering {
                chain.dynamic_rendering = Some(vk::PhysicalDeviceDynamicRenderingFeatures {
                    dynamic_rendering: vk::TRUE,
                    ..Default::default()
                });
            }
        }

        if features.acceleration_structures && enabled(khr::AccelerationStructure::name()) {
            chain.acceleration_structure = Some(vk::PhysicalDeviceAccelerationStructureFeaturesKHR {
                acceleration_structure: vk::TRUE,
                descriptor_binding_acceleration_structure_update_after_bind: b(
                    features.descriptor_binding_acceleration_structure_update_after_bind,
                ),
                ..Default::default()
            });
        }
        if features.ray_tracing_pipeline && enabled(khr::RayTracingPipeline::name()) {
            chain.ray_tracing_pipeline = Some(vk::PhysicalDeviceRayTracingPipelineFeaturesKHR {
                ray_tracing_pipeline: vk::TRUE,
                ray_tracing_pipeline_trace_rays_indirect: b(
                    features.ray_tracing_pipeline_trace_rays_indirect,
                ),
                ray_traversal_primitive_culling: b(features.ray_traversal_primitive_culling),
                ..Default::default()
            });
        }
        if features.ray_query && enabled(vk::KhrRayQueryFn::name()) {
            chain.ray_query = Some(vk::PhysicalDeviceRayQueryFeaturesKHR {
                ray_query: vk::TRUE,
                ..Default::default()
            });
        }

        chain
    }

    /// Number of feature structs chained after PhysicalDeviceFeatures2
    pub fn len(&self) -> usize {
        [
            self.vulkan11.is_some(),
            self.vulkan12.is_some(),
            self.vulkan13.is_some(),
            self.multiview.is_some(),
            self.descriptor_indexing.is_some(),
            self.buffer_device_address.is_some(),
            self.uniform_buffer_standard_layout.is_some(),
            self.host_query_reset.is_some(),
            self.synchronization2.is_some(),
            self.dynamic_rendering.is_some(),
            self.acceleration_structure.is_some(),
            self.ray_tracing_pipeline.is_some(),
            self.ray_query.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// Link the populated groups behind a PhysicalDeviceFeatures2. Groups are
    /// visited in declaration order, and push_next inserts each one right
    /// behind the head, so the resulting pNext chain runs in reverse order.
    pub fn features2(&mut self) -> vk::PhysicalDeviceFeatures2Builder<'_> {
        let mut features2 = vk::PhysicalDeviceFeatures2::builder().features(self.core);
        if let Some(f) = self.vulkan11.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.vulkan12.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.vulkan13.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.multiview.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.descriptor_indexing.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.buffer_device_address.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.uniform_buffer_standard_layout.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.host_query_reset.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.synchronization2.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.dynamic_rendering.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.acceleration_structure.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.ray_tracing_pipeline.as_mut() {
            features2 = features2.push_next(f);
        }
        if let Some(f) = self.ray_query.as_mut() {
            features2 = features2.push_next(f);
        }
        features2
    }
}

/// Merge the baseline features the crate always turns on when supported
pub(crate) fn merge_baseline_features(
    requested: &AdapterFeatures,
    supported: &AdapterFeatures,
) -> AdapterFeatures {
    let mut features = *requested;
    features.sampler_anisotropy |= supported.sampler_anisotropy;
    features.synchronization2 |= supported.synchronization2;
    if features.acceleration_structures {
        features.buffer_device_address = true;
    }
    features
}

// ─────────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────────

/// How pipeline barriers are recorded
#[derive(Clone)]
pub(crate) enum BarrierSupport {
    /// vkCmdPipelineBarrier2 from 1.3 core
    Core,
    /// vkCmdPipelineBarrier2KHR
    Khr(khr::Synchronization2),
    /// vkCmdPipelineBarrier with unioned masks
    Legacy,
}

/// How render passes without a VkRenderPass are begun and ended
#[derive(Clone)]
pub(crate) enum DynamicRenderingSupport {
    /// vkCmdBeginRendering from 1.3 core
    Core,
    /// vkCmdBeginRenderingKHR
    Khr(khr::DynamicRendering),
    Unsupported,
}

impl DynamicRenderingSupport {
    pub fn is_supported(&self) -> bool {
        !matches!(self, DynamicRenderingSupport::Unsupported)
    }

    pub unsafe fn begin(&self, device: &ash::Device, cmd: vk::CommandBuffer, info: &vk::RenderingInfo) {
        match self {
            DynamicRenderingSupport::Core => device.cmd_begin_rendering(cmd, info),
            DynamicRenderingSupport::Khr(loader) => loader.cmd_begin_rendering(cmd, info),
            DynamicRenderingSupport::Unsupported => {}
        }
    }

    pub unsafe fn end(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        match self {
            DynamicRenderingSupport::Core => device.cmd_end_rendering(cmd),
            DynamicRenderingSupport::Khr(loader) => loader.cmd_end_rendering(cmd),
            DynamicRenderingSupport::Unsupported => {}
        }
    }
}

/// Extension function tables loaded for the device
pub(crate) struct DeviceLoaders {
    pub swapchain: Option<khr::Swapchain>,
    pub create_render_pass2: Option<khr::CreateRenderPass2>,
    pub buffer_device_address: Option<khr::BufferDeviceAddress>,
    pub acceleration_structure: Option<khr::AccelerationStructure>,
    pub ray_tracing_pipeline: Option<khr::RayTracingPipeline>,
    pub push_descriptor: Option<khr::PushDescriptor>,
    pub debug_utils: Option<ext::DebugUtils>,
    pub exporter: PlatformExporter,
}

pub struct VulkanDevice {
    pub device: ash::Device,
    pub adapter: Handle<Adapter>,
    pub physical_device: vk::PhysicalDevice,
    pub api_version: u32,
    pub properties: AdapterProperties,
    pub enabled_features: AdapterFeatures,
    pub enabled_extensions: Vec<String>,
    pub queues: Vec<Handle<Queue>>,

    pub(crate) allocator: Option<Allocator>,
    pub(crate) external_allocators: HashMap<ExternalMemoryHandleType, ExternalMemoryAllocator>,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) loaders: DeviceLoaders,
    pub(crate) barriers: BarrierSupport,
    pub(crate) dynamic_rendering: DynamicRenderingSupport,

    pub(crate) command_pools: HashMap<u32, vk::CommandPool>,
    pub(crate) descriptor_pools: Vec<vk::DescriptorPool>,
    pub(crate) update_after_bind_descriptor_pools: Vec<vk::DescriptorPool>,
    pub(crate) bind_group_pool_config: BindGroupPoolConfig,

    pub(crate) render_pass_cache: HashMap<RenderPassKey, Handle<RenderPass>>,
    pub(crate) framebuffer_cache: HashMap<FramebufferKey, Handle<Framebuffer>>,

    pub(crate) timestamp_query_pool: vk::QueryPool,
    pub(crate) timestamp_buckets: TimestampBuckets,

    owned: bool,
}

impl VulkanDevice {
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.enabled_extensions
            .iter()
            .any(|e| e.as_str() == name.to_string_lossy())
    }

    /// Attach a debug name to a native object when debug utils are loaded
    pub(crate) fn set_object_name<H: vk::Handle>(&self, object: H, label: &Option<String>) {
        let (Some(debug_utils), Some(name)) = (&self.loaders.debug_utils, super::label_cstring(label))
        else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(object.as_raw())
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(self.device.handle(), &info) } {
            log::warn!("Failed to name {:?}: {:?}", H::TYPE, e);
        }
    }

    /// Command pool for a queue family, created on first use
    pub(crate) fn command_pool(&mut self, queue_type_index: u32) -> VkResult<vk::CommandPool> {
        if let Some(pool) = self.command_pools.get(&queue_type_index) {
            return Ok(*pool);
        }
        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_type_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { self.device.create_command_pool(&create_info, None) }?;
        self.command_pools.insert(queue_type_index, pool);
        Ok(pool)
    }

    pub(crate) fn create_render_pass2(
        &self,
        create_info: &vk::RenderPassCreateInfo2,
    ) -> VkResult<vk::RenderPass> {
        if self.api_version >= vk::API_VERSION_1_2 {
            unsafe { self.device.create_render_pass2(create_info, None) }
        } else if let Some(loader) = &self.loaders.create_render_pass2 {
            unsafe { loader.create_render_pass2(create_info, None) }
        } else {
            Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
        }
    }

    pub(crate) fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::builder().buffer(buffer);
        if self.api_version >= vk::API_VERSION_1_2 {
            unsafe { self.device.get_buffer_device_address(&info) }
        } else if let Some(loader) = &self.loaders.buffer_device_address {
            unsafe { loader.get_buffer_device_address(&info) }
        } else {
            0
        }
    }

    pub(crate) fn allocator(&mut self) -> Result<&mut Allocator> {
        self.allocator.as_mut().context("Device memory allocator is gone")
    }
}

impl ResourceManager {
    /// Create a logical device on an adapter
    pub fn create_device(
        &mut self,
        adapter_handle: Handle<Adapter>,
        options: &DeviceOptions,
    ) -> Result<Handle<Device>> {
        let Some(adapter) = self.adapters.get(adapter_handle) else {
            bail!("Unknown adapter {:?}", adapter_handle);
        };
        log::info!("Creating device on {}", adapter.properties.device_name);

        // Step 1: Negotiate API version
        let api_version = negotiate_api_version(options.api_version, adapter.properties.api_version)?;

        // Step 2: Select extensions and features
        let features = merge_baseline_features(&options.requested_features, &adapter.features);
        let extensions =
            select_device_extensions(api_version, &adapter.extensions, &features, &options.extensions);
        let mut chain = DeviceFeatureChain::new(api_version, &extensions, &features);

        // Step 3: Queue requests
        let requests = queue_requests(&options.queues);
        let priorities: Vec<Vec<f32>> = requests
            .iter()
            .map(|r| {
                (0..r.count as usize)
                    .map(|i| r.priorities.get(i).copied().unwrap_or(1.0))
                    .collect()
            })
            .collect();
        for request in &requests {
            let Some(queue_type) = adapter.queue_types.get(request.queue_type_index as usize) else {
                bail!("Adapter has no queue type {}", request.queue_type_index);
            };
            if request.count > queue_type.available_queues {
                bail!(
                    "Queue type {} offers {} queues, {} requested",
                    request.queue_type_index,
                    queue_type.available_queues,
                    request.count
                );
            }
        }
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = requests
            .iter()
            .zip(&priorities)
            .map(|(r, p)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(r.queue_type_index)
                    .queue_priorities(p)
                    .build()
            })
            .collect();

        // Step 4: Create logical device
        let extension_names: Vec<CString> = extensions
            .iter()
            .map(|e| CString::new(e.as_str()))
            .collect::<std::result::Result<_, _>>()?;
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|e| e.as_ptr()).collect();
        let layer_names: Vec<CString> = options
            .layers
            .iter()
            .map(|l| CString::new(l.as_str()))
            .collect::<std::result::Result<_, _>>()?;
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|l| l.as_ptr()).collect();

        let mut features2 = chain.features2();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .push_next(&mut features2);

        let device = unsafe {
            adapter
                .vk_instance
                .create_device(adapter.physical_device, &create_info, None)
        }
        .context("Failed to create logical device")?;

        log::info!(
            "Device API version {}.{} with {} extensions",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            extensions.len()
        );

        self.finish_device(adapter_handle, device, api_version, extensions, features, &requests, options, true)
    }

    /// Adopt a device created elsewhere. It is not destroyed on delete.
    ///
    /// `options` must describe the queues and extensions the device was created with.
    pub fn create_device_from_existing(
        &mut self,
        adapter_handle: Handle<Adapter>,
        device: vk::Device,
        options: &DeviceOptions,
    ) -> Result<Handle<Device>> {
        let Some(adapter) = self.adapters.get(adapter_handle) else {
            bail!("Unknown adapter {:?}", adapter_handle);
        };
        let api_version = negotiate_api_version(options.api_version, adapter.properties.api_version)?;
        let device = unsafe { ash::Device::load(adapter.vk_instance.fp_v1_0(), device) };
        let features = options.requested_features;
        let extensions = options.extensions.clone();
        let requests = queue_requests(&options.queues);
        self.finish_device(adapter_handle, device, api_version, extensions, features, &requests, options, false)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_device(
        &mut self,
        adapter_handle: Handle<Adapter>,
        device: ash::Device,
        api_version: u32,
        extensions: Vec<String>,
        features: AdapterFeatures,
        requests: &[QueueRequest],
        options: &DeviceOptions,
        owned: bool,
    ) -> Result<Handle<Device>> {
        // Destroys a device we created if any step below fails. Declared
        // before the allocator so the allocator drops first.
        let teardown_device = device.clone();
        let teardown = Teardown::new(move || {
            if owned {
                log::warn!("Destroying partially initialized device");
                unsafe { teardown_device.destroy_device(None) };
            }
        });

        let Some(adapter) = self.adapters.get(adapter_handle) else {
            bail!("Unknown adapter {:?}", adapter_handle);
        };
        let instance = &adapter.vk_instance;
        let enabled = |name: &CStr| extensions.iter().any(|e| e.as_str() == name.to_string_lossy());

        // Step 5: Extension loaders
        let debug_utils = self
            .instances
            .get(adapter.instance)
            .and_then(|i| i.debug_utils.clone());
        let loaders = DeviceLoaders {
            swapchain: enabled(khr::Swapchain::name()).then(|| khr::Swapchain::new(instance, &device)),
            create_render_pass2: enabled(khr::CreateRenderPass2::name())
                .then(|| khr::CreateRenderPass2::new(instance, &device)),
            buffer_device_address: enabled(khr::BufferDeviceAddress::name())
                .then(|| khr::BufferDeviceAddress::new(instance, &device)),
            acceleration_structure: enabled(khr::AccelerationStructure::name())
                .then(|| khr::AccelerationStructure::new(instance, &device)),
            ray_tracing_pipeline: enabled(khr::RayTracingPipeline::name())
                .then(|| khr::RayTracingPipeline::new(instance, &device)),
            push_descriptor: enabled(khr::PushDescriptor::name())
                .then(|| khr::PushDescriptor::new(instance, &device)),
            debug_utils,
            exporter: PlatformExporter::new(instance, &device, &extensions),
        };

        let barriers = if !features.synchronization2 {
            BarrierSupport::Legacy
        } else if api_version >= vk::API_VERSION_1_3 {
            BarrierSupport::Core
        } else if enabled(khr::Synchronization2::name()) {
            BarrierSupport::Khr(khr::Synchronization2::new(instance, &device))
        } else {
            BarrierSupport::Legacy
        };
        let dynamic_rendering = if !features.dynamic_rendering {
            DynamicRenderingSupport::Unsupported
        } else if api_version >= vk::API_VERSION_1_3 {
            DynamicRenderingSupport::Core
        } else if enabled(khr::DynamicRendering::name()) {
            DynamicRenderingSupport::Khr(khr::DynamicRendering::new(instance, &device))
        } else {
            DynamicRenderingSupport::Unsupported
        };

        // Step 6: Create memory allocator
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: adapter.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: features.buffer_device_address,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(adapter.physical_device) };

        // Step 7: Device-wide timestamp query pool
        let capacity = options.timestamp_query_capacity;
        let timestamp_query_pool = if capacity > 0 {
            let create_info = vk::QueryPoolCreateInfo::builder()
                .query_type(vk::QueryType::TIMESTAMP)
                .query_count(capacity);
            unsafe { device.create_query_pool(&create_info, None) }
                .context("Failed to create timestamp query pool")?
        } else {
            vk::QueryPool::null()
        };
        teardown.disarm();

        let queue_types = adapter.queue_types.clone();
        let physical_device = adapter.physical_device;
        let properties = adapter.properties.clone();

        let handle = self.devices.emplace(VulkanDevice {
            device,
            adapter: adapter_handle,
            physical_device,
            api_version,
            properties,
            enabled_features: features,
            enabled_extensions: extensions,
            queues: Vec::new(),
            allocator: Some(allocator),
            external_allocators: HashMap::new(),
            memory_properties,
            loaders,
            barriers,
            dynamic_rendering,
            command_pools: HashMap::new(),
            descriptor_pools: Vec::new(),
            update_after_bind_descriptor_pools: Vec::new(),
            bind_group_pool_config: options.bind_group_pool,
            render_pass_cache: HashMap::new(),
            framebuffer_cache: HashMap::new(),
            timestamp_query_pool,
            timestamp_buckets: TimestampBuckets::new(capacity),
            owned,
        });

        // Step 8: Fetch queues
        let mut queues = Vec::new();
        if let Some(vk_device) = self.devices.get(handle) {
            for request in requests {
                let queue_type = queue_types
                    .get(request.queue_type_index as usize)
                    .copied()
                    .unwrap_or_default();
                for index in 0..request.count {
                    let queue = unsafe {
                        vk_device
                            .device
                            .get_device_queue(request.queue_type_index, index)
                    };
                    queues.push(VulkanQueue {
                        queue,
                        device: handle,
                        queue_type_index: request.queue_type_index,
                        flags: queue_type.flags,
                        timestamp_valid_bits: queue_type.timestamp_valid_bits,
                        min_image_transfer_granularity: queue_type.min_image_transfer_granularity,
                        last_present_results: Vec::new(),
                    });
                }
            }
        }
        let queue_handles: Vec<Handle<Queue>> =
            queues.into_iter().map(|q| self.queues.emplace(q)).collect();
        if let Some(vk_device) = self.devices.get_mut(handle) {
            vk_device.queues = queue_handles;
        }

        Ok(handle)
    }

    pub fn get_device(&self, handle: Handle<Device>) -> Option<&VulkanDevice> {
        self.devices.get(handle)
    }

    /// Queues created with the device, in request order
    pub fn device_queues(&self, device: Handle<Device>) -> Vec<Handle<Queue>> {
        self.devices
            .get(device)
            .map(|d| d.queues.clone())
            .unwrap_or_default()
    }

    /// Block until the device has finished all submitted work
    pub fn wait_until_idle(&self, device: Handle<Device>) {
        if let Some(device) = self.devices.get(device) {
            if let Err(e) = unsafe { device.device.device_wait_idle() } {
                log::error!("Failed to wait for device idle: {:?}", e);
            }
        }
    }

    pub fn delete_device(&mut self, handle: Handle<Device>) {
        let Some(mut device) = self.devices.remove(handle) else {
            return;
        };
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        if let Err(e) = unsafe { device.device.device_wait_idle() } {
            log::warn!("device_wait_idle failed during teardown: {:?}", e);
        }

        // Cleanup in fixed order
        unsafe {
            for h in self.render_passes.handles() {
                if self.render_passes.get(h).is_some_and(|rp| rp.device == handle) {
                    if let Some(rp) = self.render_passes.remove(h) {
                        device.device.destroy_render_pass(rp.render_pass, None);
                    }
                }
            }
            for h in self.framebuffers.handles() {
                if self.framebuffers.get(h).is_some_and(|fb| fb.device == handle) {
                    if let Some(fb) = self.framebuffers.remove(h) {
                        device.device.destroy_framebuffer(fb.framebuffer, None);
                    }
                }
            }
            device.render_pass_cache.clear();
            device.framebuffer_cache.clear();

            for pool in device
                .descriptor_pools
                .drain(..)
                .chain(device.update_after_bind_descriptor_pools.drain(..))
            {
                device.device.destroy_descriptor_pool(pool, None);
            }
            for (_, pool) in device.command_pools.drain() {
                device.device.destroy_command_pool(pool, None);
            }
            if device.timestamp_query_pool != vk::QueryPool::null() {
                device.device.destroy_query_pool(device.timestamp_query_pool, None);
            }
        }

        for (_, allocator) in device.external_allocators.drain() {
            allocator.destroy(&device.device);
        }
        drop(device.allocator.take());

        for queue in &device.queues {
            self.queues.remove(*queue);
        }

        if device.owned {
            unsafe { device.device.destroy_device(None) };
        }
    }
}

fn queue_requests(requested: &[QueueRequest]) -> Vec<QueueRequest> {
    if requested.is_empty() {
        vec![QueueRequest::default()]
    } else {
        requested.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn failing_step(ran: &Cell<u32>, fail: bool) -> Result<()> {
        let teardown = Teardown::new(|| ran.set(ran.get() + 1));
        if fail {
            bail!("allocator creation failed");
        }
        teardown.disarm();
        Ok(())
    }

    #[test]
    fn feature_chain_links_last_group_first() {
        let mut chain = DeviceFeatureChain {
            vulkan11: Some(vk::PhysicalDeviceVulkan11Features::default()),
            vulkan12: Some(vk::PhysicalDeviceVulkan12Features::default()),
            ..Default::default()
        };
        let features2 = chain.features2();
        let first = features2.p_next as *const vk::BaseOutStructure;
        unsafe {
            assert_eq!((*first).s_type, vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES);
            let second = (*first).p_next;
            assert_eq!((*second).s_type, vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_1_FEATURES);
            assert!((*second).p_next.is_null());
        }
    }

    #[test]
    fn teardown_runs_when_initialization_fails() {
        let ran = Cell::new(0);
        assert!(failing_step(&ran, true).is_err());
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn disarmed_teardown_does_nothing() {
        let ran = Cell::new(0);
        assert!(failing_step(&ran, false).is_ok());
        assert_eq!(ran.get(), 0);
    }

    fn names(list: &[&CStr]) -> HashSet<String> {
        list.iter().map(|n| ext_name(n)).collect()
    }

    #[test]
    fn version_is_downgraded_to_adapter() {
        let adapter = vk::make_api_version(0, 1, 2, 198);
        let version = negotiate_api_version((1, 3), adapter).unwrap();
        assert_eq!(version, vk::API_VERSION_1_2);
    }

    #[test]
    fn version_is_clamped_to_allocator() {
        let adapter = vk::make_api_version(0, 1, 4, 0);
        let version = negotiate_api_version((1, 4), adapter).unwrap();
        assert_eq!(version, vk::API_VERSION_1_3);
    }

    #[test]
    fn version_below_minimum_fails() {
        let adapter = vk::make_api_version(0, 1, 0, 61);
        assert!(negotiate_api_version((1, 3), adapter).is_err());
    }

    #[test]
    fn promoted_extensions_only_below_1_2() {
        let available = names(&[
            khr::Swapchain::name(),
            khr::CreateRenderPass2::name(),
            vk::KhrDepthStencilResolveFn::name(),
            khr::Synchronization2::name(),
        ]);
        let features = AdapterFeatures::default();

        let on_1_1 = select_device_extensions(vk::API_VERSION_1_1, &available, &features, &[]);
        assert!(on_1_1.contains(&ext_name(khr::CreateRenderPass2::name())));
        assert!(on_1_1.contains(&ext_name(vk::KhrDepthStencilResolveFn::name())));
        assert!(on_1_1.contains(&ext_name(khr::Synchronization2::name())));

        let on_1_3 = select_device_extensions(vk::API_VERSION_1_3, &available, &features, &[]);
        assert_eq!(on_1_3, vec![ext_name(khr::Swapchain::name())]);
    }

    #[test]
    fn ray_tracing_pulls_its_dependencies() {
        let features = AdapterFeatures {
            acceleration_structures: true,
            ray_tracing_pipeline: true,
            ..Default::default()
        };
        let selected = select_device_extensions(vk::API_VERSION_1_2, &HashSet::new(), &features, &[]);
        assert!(selected.contains(&ext_name(khr::AccelerationStructure::name())));
        assert!(selected.contains(&ext_name(khr::DeferredHostOperations::name())));
        assert!(selected.contains(&ext_name(khr::RayTracingPipeline::name())));
        assert!(!selected.contains(&ext_name(khr::BufferDeviceAddress::name())));
    }

    #[test]
    fn requested_extensions_are_not_duplicated() {
        let available = names(&[khr::Swapchain::name()]);
        let requested = vec![ext_name(khr::Swapchain::name()), "VK_EXT_custom".to_string()];
        let selected = select_device_extensions(
            vk::API_VERSION_1_3,
            &available,
            &AdapterFeatures::default(),
            &requested,
        );
        assert_eq!(selected, requested);
    }

    #[test]
    fn umbrella_structs_from_1_2() {
        let features = AdapterFeatures {
            multi_view: true,
            buffer_device_address: true,
            synchronization2: true,
            ..Default::default()
        };
        let chain = DeviceFeatureChain::new(vk::API_VERSION_1_3, &[], &features);
        assert!(chain.vulkan11.is_some());
        assert!(chain.vulkan13.is_some());
        assert_eq!(chain.vulkan12.map(|f| f.buffer_device_address), Some(vk::TRUE));
        assert!(chain.multiview.is_none());
        assert!(chain.buffer_device_address.is_none());
        assert!(chain.synchronization2.is_none());
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn dynamic_rendering_is_core_from_1_3() {
        let features = AdapterFeatures {
            dynamic_rendering: true,
            ..Default::default()
        };
        let selected = select_device_extensions(vk::API_VERSION_1_3, &HashSet::new(), &features, &[]);
        assert!(!selected.contains(&ext_name(khr::DynamicRendering::name())));
        let chain = DeviceFeatureChain::new(vk::API_VERSION_1_3, &selected, &features);
        assert_eq!(chain.vulkan13.map(|f| f.dynamic_rendering), Some(vk::TRUE));
        assert!(chain.dynamic_rendering.is_none());

        let selected = select_device_extensions(vk::API_VERSION_1_2, &HashSet::new(), &features, &[]);
        assert!(selected.contains(&ext_name(khr::DynamicRendering::name())));
        let chain = DeviceFeatureChain::new(vk::API_VERSION_1_2, &selected, &features);
        assert_eq!(chain.dynamic_rendering.map(|f| f.dynamic_rendering), Some(vk::TRUE));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn individual_structs_on_1_1() {
        let features = AdapterFeatures {
            buffer_device_address: true,
            synchronization2: true,
            ..Default::default()
        };
        let extensions = vec![
            ext_name(khr::BufferDeviceAddress::name()),
            ext_name(khr::Synchronization2::name()),
        ];
        let chain = DeviceFeatureChain::new(vk::API_VERSION_1_1, &extensions, &features);
        assert!(chain.vulkan11.is_none());
        assert!(chain.vulkan12.is_none());
        assert!(chain.multiview.is_some());
        assert!(chain.buffer_device_address.is_some());
        assert!(chain.synchronization2.is_some());
    }

    #[test]
    fn individual_structs_need_their_extension() {
        let features = AdapterFeatures {
            buffer_device_address: true,
            ..Default::default()
        };
        let chain = DeviceFeatureChain::new(vk::API_VERSION_1_1, &[], &features);
        assert!(chain.buffer_device_address.is_none());
    }

    #[test]
    fn sync2_extension_struct_on_1_2() {
        let features = AdapterFeatures {
            synchronization2: true,
            ..Default::default()
        };
        let extensions = vec![ext_name(khr::Synchronization2::name())];
        let chain = DeviceFeatureChain::new(vk::API_VERSION_1_2, &extensions, &features);
        assert!(chain.vulkan13.is_none());
        assert!(chain.synchronization2.is_some());
    }

    #[test]
    fn baseline_enables_supported_anisotropy() {
        let supported = AdapterFeatures {
            sampler_anisotropy: true,
            ..Default::default()
        };
        let requested = AdapterFeatures {
            acceleration_structures: true,
            ..Default::default()
        };
        let merged = merge_baseline_features(&requested, &supported);
        assert!(merged.sampler_anisotropy);
        assert!(merged.buffer_device_address);
        assert!(!merged.synchronization2);
    }

    #[test]
    fn default_queue_request() {
        let requests = queue_requests(&[]);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].queue_type_index, 0);
        assert_eq!(requests[0].count, 1);
    }
}
