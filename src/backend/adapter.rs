// Vulkan Adapter - Physical device capabilities
//
// Properties, features, queue types and extensions are queried once when the
// instance enumerates its physical devices and cached on the adapter.

use super::enums::*;
use super::instance::VulkanInstance;
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::*;
use crate::resources::{Adapter, Instance, Surface};
use crate::types::Format;
use ash::extensions::khr;
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

pub struct VulkanAdapter {
    pub instance: Handle<Instance>,
    pub physical_device: vk::PhysicalDevice,
    pub properties: AdapterProperties,
    pub features: AdapterFeatures,
    pub queue_types: Vec<AdapterQueueType>,
    pub extensions: HashSet<String>,
    pub(crate) vk_instance: ash::Instance,
    pub(crate) surface_loader: khr::Surface,
}

impl VulkanAdapter {
    pub(crate) fn query(
        instance_handle: Handle<Instance>,
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let vk_instance = &instance.instance;

        let extensions: HashSet<String> =
            unsafe { vk_instance.enumerate_device_extension_properties(physical_device) }
                .unwrap_or_else(|e| {
                    log::warn!("Failed to enumerate device extensions: {:?}", e);
                    Vec::new()
                })
                .iter()
                .map(|e| {
                    unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }
                        .to_string_lossy()
                        .into_owned()
                })
                .collect();

        let base_properties = unsafe { vk_instance.get_physical_device_properties(physical_device) };
        let properties = query_properties(vk_instance, physical_device, &base_properties, &extensions);
        let features = query_features(vk_instance, physical_device, base_properties.api_version, &extensions);

        let queue_types = unsafe {
            vk_instance.get_physical_device_queue_family_properties(physical_device)
        }
        .iter()
        .map(|family| AdapterQueueType {
            flags: vk_to_queue_flags(family.queue_flags),
            available_queues: family.queue_count,
            timestamp_valid_bits: family.timestamp_valid_bits,
            min_image_transfer_granularity: vk_to_extent3d(family.min_image_transfer_granularity),
        })
        .collect();

        Self {
            instance: instance_handle,
            physical_device,
            properties,
            features,
            queue_types,
            extensions,
            vk_instance: vk_instance.clone(),
            surface_loader: instance.surface_loader.clone(),
        }
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.contains(name.to_string_lossy().as_ref())
    }
}

fn query_properties(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    base: &vk::PhysicalDeviceProperties,
    extensions: &HashSet<String>,
) -> AdapterProperties {
    let has = |name: &CStr| extensions.contains(name.to_string_lossy().as_ref());
    let api_1_2 = base.api_version >= vk::API_VERSION_1_2;

    let mut multiview = vk::PhysicalDeviceMultiviewProperties::default();
    let mut depth_resolve = vk::PhysicalDeviceDepthStencilResolveProperties::default();
    let mut ray_tracing = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
    let mut acceleration_structure = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
    let mut push_descriptor = vk::PhysicalDevicePushDescriptorPropertiesKHR::default();

    let mut properties2 = vk::PhysicalDeviceProperties2::builder().push_next(&mut multiview);
    if api_1_2 || has(vk::KhrDepthStencilResolveFn::name()) {
        properties2 = properties2.push_next(&mut depth_resolve);
    }
    if has(khr::RayTracingPipeline::name()) {
        properties2 = properties2.push_next(&mut ray_tracing);
    }
    if has(khr::AccelerationStructure::name()) {
        properties2 = properties2.push_next(&mut acceleration_structure);
    }
    if has(khr::PushDescriptor::name()) {
        properties2 = properties2.push_next(&mut push_descriptor);
    }
    unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
    let props = properties2.properties;
    let limits = &props.limits;

    AdapterProperties {
        api_version: props.api_version,
        driver_version: props.driver_version,
        vendor_id: props.vendor_id,
        device_id: props.device_id,
        device_type: vk_to_adapter_device_type(props.device_type),
        device_name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned(),
        pipeline_cache_uuid: props.pipeline_cache_uuid,
        limits: AdapterLimits {
            max_image_dimension_1d: limits.max_image_dimension1_d,
            max_image_dimension_2d: limits.max_image_dimension2_d,
            max_image_dimension_3d: limits.max_image_dimension3_d,
            max_image_dimension_cube: limits.max_image_dimension_cube,
            max_image_array_layers: limits.max_image_array_layers,
            max_uniform_buffer_range: limits.max_uniform_buffer_range,
            max_storage_buffer_range: limits.max_storage_buffer_range,
            max_push_constants_size: limits.max_push_constants_size,
            max_bound_descriptor_sets: limits.max_bound_descriptor_sets,
            max_vertex_input_attributes: limits.max_vertex_input_attributes,
            max_vertex_input_bindings: limits.max_vertex_input_bindings,
            max_compute_work_group_count: limits.max_compute_work_group_count,
            max_compute_work_group_size: limits.max_compute_work_group_size,
            max_compute_work_group_invocations: limits.max_compute_work_group_invocations,
            max_sampler_anisotropy: limits.max_sampler_anisotropy,
            max_viewports: limits.max_viewports,
            max_framebuffer_width: limits.max_framebuffer_width,
            max_framebuffer_height: limits.max_framebuffer_height,
            max_framebuffer_layers: limits.max_framebuffer_layers,
            max_color_attachments: limits.max_color_attachments,
            framebuffer_color_sample_counts: vk_to_sample_counts(
                limits.framebuffer_color_sample_counts,
            ),
            framebuffer_depth_sample_counts: vk_to_sample_counts(
                limits.framebuffer_depth_sample_counts,
            ),
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
            optimal_buffer_copy_offset_alignment: limits.optimal_buffer_copy_offset_alignment,
            non_coherent_atom_size: limits.non_coherent_atom_size,
            timestamp_period: limits.timestamp_period,
            timestamp_compute_and_graphics: limits.timestamp_compute_and_graphics == vk::TRUE,
        },
        multiview: AdapterMultiviewProperties {
            max_multiview_view_count: multiview.max_multiview_view_count,
            max_multiview_instance_index: multiview.max_multiview_instance_index,
        },
        depth_resolve: AdapterDepthResolveProperties {
            supported_depth_resolve_modes: vk_to_resolve_modes(
                depth_resolve.supported_depth_resolve_modes,
            ),
            supported_stencil_resolve_modes: vk_to_resolve_modes(
                depth_resolve.supported_stencil_resolve_modes,
            ),
            independent_resolve_none: depth_resolve.independent_resolve_none == vk::TRUE,
            independent_resolve: depth_resolve.independent_resolve == vk::TRUE,
        },
        ray_tracing: AdapterRayTracingProperties {
            shader_group_handle_size: ray_tracing.shader_group_handle_size,
            max_ray_recursion_depth: ray_tracing.max_ray_recursion_depth,
            max_shader_group_stride: ray_tracing.max_shader_group_stride,
            shader_group_base_alignment: ray_tracing.shader_group_base_alignment,
            shader_group_handle_alignment: ray_tracing.shader_group_handle_alignment,
            max_ray_dispatch_invocation_count: ray_tracing.max_ray_dispatch_invocation_count,
            max_ray_hit_attribute_size: ray_tracing.max_ray_hit_attribute_size,
        },
        acceleration_structure: AdapterAccelerationStructureProperties {
            max_geometry_count: acceleration_structure.max_geometry_count,
            max_instance_count: acceleration_structure.max_instance_count,
            max_primitive_count: acceleration_structure.max_primitive_count,
            min_acceleration_structure_scratch_offset_alignment: acceleration_structure
                .min_acceleration_structure_scratch_offset_alignment,
        },
        max_push_descriptors: push_descriptor.max_push_descriptors,
    }
}

fn query_features(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    api_version: u32,
    extensions: &HashSet<String>,
) -> AdapterFeatures {
    let has = |name: &CStr| extensions.contains(name.to_string_lossy().as_ref());
    let api_1_2 = api_version >= vk::API_VERSION_1_2;
    let api_1_3 = api_version >= vk::API_VERSION_1_3;

    let mut multiview = vk::PhysicalDeviceMultiviewFeatures::default();
    let mut descriptor_indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
    let mut buffer_device_address = vk::PhysicalDeviceBufferDeviceAddressFeatures::default();
    let mut uniform_layout = vk::PhysicalDeviceUniformBufferStandardLayoutFeatures::default();
    let mut host_query_reset = vk::PhysicalDeviceHostQueryResetFeatures::default();
    let mut synchronization2 = vk::PhysicalDeviceSynchronization2Features::default();
    let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default();
    let mut acceleration_structure = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
    let mut ray_tracing = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
    let mut ray_query = vk::PhysicalDeviceRayQueryFeaturesKHR::default();

    let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut multiview);
    if api_1_2 || has(vk::ExtDescriptorIndexingFn::name()) {
        features2 = features2.push_next(&mut descriptor_indexing);
    }
    if api_1_2 || has(khr::BufferDeviceAddress::name()) {
        features2 = features2.push_next(&mut buffer_device_address);
    }
    if api_1_2 || has(vk::KhrUniformBufferStandardLayoutFn::name()) {
        features2 = features2.push_next(&mut uniform_layout);
    }
    if api_1_2 || has(vk::ExtHostQueryResetFn::name()) {
        features2 = features2.push_next(&mut host_query_reset);
    }
    if api_1_3 || has(khr::Synchronization2::name()) {
        features2 = features2.push_next(&mut synchronization2);
    }
    if api_1_3 || has(khr::DynamicRendering::name()) {
        features2 = features2.push_next(&mut dynamic_rendering);
    }
    if has(khr::AccelerationStructure::name()) {
        features2 = features2.push_next(&mut acceleration_structure);
    }
    if has(khr::RayTracingPipeline::name()) {
        features2 = features2.push_next(&mut ray_tracing);
    }
    if has(vk::KhrRayQueryFn::name()) {
        features2 = features2.push_next(&mut ray_query);
    }
    unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
    let core = features2.features;

    let mut features = core_features_to_adapter(&core);
    let on = |b: vk::Bool32| b == vk::TRUE;

    features.multi_view = on(multiview.multiview);
    features.multi_view_geometry_shader = on(multiview.multiview_geometry_shader);
    features.multi_view_tessellation_shader = on(multiview.multiview_tessellation_shader);

    let di = &descriptor_indexing;
    features.shader_uniform_buffer_array_non_uniform_indexing =
        on(di.shader_uniform_buffer_array_non_uniform_indexing);
    features.shader_sampled_image_array_non_uniform_indexing =
        on(di.shader_sampled_image_array_non_uniform_indexing);
    features.shader_storage_buffer_array_non_uniform_indexing =
        on(di.shader_storage_buffer_array_non_uniform_indexing);
    features.shader_storage_image_array_non_uniform_indexing =
        on(di.shader_storage_image_array_non_uniform_indexing);
    features.descriptor_binding_uniform_buffer_update_after_bind =
        on(di.descriptor_binding_uniform_buffer_update_after_bind);
    features.descriptor_binding_sampled_image_update_after_bind =
        on(di.descriptor_binding_sampled_image_update_after_bind);
    features.descriptor_binding_storage_image_update_after_bind =
        on(di.descriptor_binding_storage_image_update_after_bind);
    features.descriptor_binding_storage_buffer_update_after_bind =
        on(di.descriptor_binding_storage_buffer_update_after_bind);
    features.descriptor_binding_update_unused_while_pending =
        on(di.descriptor_binding_update_unused_while_pending);
    features.descriptor_binding_partially_bound = on(di.descriptor_binding_partially_bound);
    features.descriptor_binding_variable_descriptor_count =
        on(di.descriptor_binding_variable_descriptor_count);
    features.runtime_descriptor_array = on(di.runtime_descriptor_array);

    features.buffer_device_address = on(buffer_device_address.buffer_device_address);
    features.uniform_buffer_standard_layout = on(uniform_layout.uniform_buffer_standard_layout);
    features.host_query_reset = on(host_query_reset.host_query_reset);
    features.synchronization2 = on(synchronization2.synchronization2);
    features.dynamic_rendering = on(dynamic_rendering.dynamic_rendering);

    features.acceleration_structures = on(acceleration_structure.acceleration_structure);
    features.descriptor_binding_acceleration_structure_update_after_bind =
        on(acceleration_structure.descriptor_binding_acceleration_structure_update_after_bind);
    features.ray_tracing_pipeline = on(ray_tracing.ray_tracing_pipeline);
    features.ray_tracing_pipeline_trace_rays_indirect =
        on(ray_tracing.ray_tracing_pipeline_trace_rays_indirect);
    features.ray_traversal_primitive_culling = on(ray_tracing.ray_traversal_primitive_culling);
    features.ray_query = on(ray_query.ray_query);

    features
}

pub(crate) fn core_features_to_adapter(core: &vk::PhysicalDeviceFeatures) -> AdapterFeatures {
    let on = |b: vk::Bool32| b == vk::TRUE;
    AdapterFeatures {
        robust_buffer_access: on(core.robust_buffer_access),
        full_draw_index_uint32: on(core.full_draw_index_uint32),
        image_cube_array: on(core.image_cube_array),
        independent_blend: on(core.independent_blend),
        geometry_shader: on(core.geometry_shader),
        tessellation_shader: on(core.tessellation_shader),
        sample_rate_shading: on(core.sample_rate_shading),
        dual_src_blend: on(core.dual_src_blend),
        logic_op: on(core.logic_op),
        multi_draw_indirect: on(core.multi_draw_indirect),
        draw_indirect_first_instance: on(core.draw_indirect_first_instance),
        depth_clamp: on(core.depth_clamp),
        depth_bias_clamp: on(core.depth_bias_clamp),
        fill_mode_non_solid: on(core.fill_mode_non_solid),
        depth_bounds: on(core.depth_bounds),
        wide_lines: on(core.wide_lines),
        large_points: on(core.large_points),
        alpha_to_one: on(core.alpha_to_one),
        multi_viewport: on(core.multi_viewport),
        sampler_anisotropy: on(core.sampler_anisotropy),
        texture_compression_bc: on(core.texture_compression_bc),
        pipeline_statistics_query: on(core.pipeline_statistics_query),
        vertex_pipeline_stores_and_atomics: on(core.vertex_pipeline_stores_and_atomics),
        fragment_stores_and_atomics: on(core.fragment_stores_and_atomics),
        shader_storage_image_extended_formats: on(core.shader_storage_image_extended_formats),
        shader_float64: on(core.shader_float64),
        shader_int64: on(core.shader_int64),
        shader_int16: on(core.shader_int16),
        shader_clip_distance: on(core.shader_clip_distance),
        shader_cull_distance: on(core.shader_cull_distance),
        ..Default::default()
    }
}

pub(crate) fn adapter_features_to_core(features: &AdapterFeatures) -> vk::PhysicalDeviceFeatures {
    let b = |on: bool| if on { vk::TRUE } else { vk::FALSE };
    vk::PhysicalDeviceFeatures {
        robust_buffer_access: b(features.robust_buffer_access),
        full_draw_index_uint32: b(features.full_draw_index_uint32),
        image_cube_array: b(features.image_cube_array),
        independent_blend: b(features.independent_blend),
        geometry_shader: b(features.geometry_shader),
        tessellation_shader: b(features.tessellation_shader),
        sample_rate_shading: b(features.sample_rate_shading),
        dual_src_blend: b(features.dual_src_blend),
        logic_op: b(features.logic_op),
        multi_draw_indirect: b(features.multi_draw_indirect),
        draw_indirect_first_instance: b(features.draw_indirect_first_instance),
        depth_clamp: b(features.depth_clamp),
        depth_bias_clamp: b(features.depth_bias_clamp),
        fill_mode_non_solid: b(features.fill_mode_non_solid),
        depth_bounds: b(features.depth_bounds),
        wide_lines: b(features.wide_lines),
        large_points: b(features.large_points),
        alpha_to_one: b(features.alpha_to_one),
        multi_viewport: b(features.multi_viewport),
        sampler_anisotropy: b(features.sampler_anisotropy),
        texture_compression_bc: b(features.texture_compression_bc),
        pipeline_statistics_query: b(features.pipeline_statistics_query),
        vertex_pipeline_stores_and_atomics: b(features.vertex_pipeline_stores_and_atomics),
        fragment_stores_and_atomics: b(features.fragment_stores_and_atomics),
        shader_storage_image_extended_formats: b(features.shader_storage_image_extended_formats),
        shader_float64: b(features.shader_float64),
        shader_int64: b(features.shader_int64),
        shader_int16: b(features.shader_int16),
        shader_clip_distance: b(features.shader_clip_distance),
        shader_cull_distance: b(features.shader_cull_distance),
        ..Default::default()
    }
}

impl ResourceManager {
    pub fn get_adapter(&self, handle: Handle<Adapter>) -> Option<&VulkanAdapter> {
        self.adapters.get(handle)
    }

    /// Whether a queue type of the adapter can present to the surface
    pub fn supports_presentation(
        &self,
        adapter: Handle<Adapter>,
        surface: Handle<Surface>,
        queue_type_index: u32,
    ) -> bool {
        let (Some(adapter), Some(surface)) = (self.adapters.get(adapter), self.surfaces.get(surface))
        else {
            return false;
        };
        unsafe {
            adapter.surface_loader.get_physical_device_surface_support(
                adapter.physical_device,
                queue_type_index,
                surface.surface,
            )
        }
        .unwrap_or_else(|e| {
            log::error!("Failed to query presentation support: {:?}", e);
            false
        })
    }

    pub fn format_properties(&self, adapter: Handle<Adapter>, format: Format) -> FormatProperties {
        let Some(adapter) = self.adapters.get(adapter) else {
            return FormatProperties::default();
        };
        let props = unsafe {
            adapter
                .vk_instance
                .get_physical_device_format_properties(adapter.physical_device, format_to_vk(format))
        };
        FormatProperties {
            linear_tiling_features: vk_to_format_feature_flags(props.linear_tiling_features),
            optimal_tiling_features: vk_to_format_feature_flags(props.optimal_tiling_features),
            buffer_features: vk_to_format_feature_flags(props.buffer_features),
        }
    }

    /// Surface capabilities, formats and present modes for swapchain creation
    pub fn swapchain_properties(
        &self,
        adapter: Handle<Adapter>,
        surface: Handle<Surface>,
    ) -> AdapterSwapchainProperties {
        let (Some(adapter), Some(surface)) = (self.adapters.get(adapter), self.surfaces.get(surface))
        else {
            return AdapterSwapchainProperties::default();
        };
        let loader = &adapter.surface_loader;
        let pd = adapter.physical_device;

        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(pd, surface.surface)
        }
        .map(|caps| SurfaceCapabilities {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            current_extent: vk_to_extent2d(caps.current_extent),
            min_image_extent: vk_to_extent2d(caps.min_image_extent),
            max_image_extent: vk_to_extent2d(caps.max_image_extent),
            max_image_array_layers: caps.max_image_array_layers,
            supported_transforms: vk_to_surface_transform(caps.supported_transforms),
            current_transform: vk_to_surface_transform(caps.current_transform),
            supported_composite_alpha: vk_to_composite_alpha(caps.supported_composite_alpha),
            supported_usage_flags: vk_to_texture_usage(caps.supported_usage_flags),
        })
        .unwrap_or_else(|e| {
            log::error!("Failed to query surface capabilities: {:?}", e);
            SurfaceCapabilities::default()
        });

        // Formats and modes this crate has no name for are skipped
        let formats = unsafe { loader.get_physical_device_surface_formats(pd, surface.surface) }
            .unwrap_or_default()
            .iter()
            .filter_map(|f| {
                Some(SurfaceFormat {
                    format: vk_to_format(f.format),
                    color_space: vk_to_color_space(f.color_space)?,
                })
            })
            .collect();
        let present_modes =
            unsafe { loader.get_physical_device_surface_present_modes(pd, surface.surface) }
                .unwrap_or_default()
                .into_iter()
                .filter_map(vk_to_present_mode)
                .collect();

        AdapterSwapchainProperties {
            capabilities,
            formats,
            present_modes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_features_survive_conversion() {
        let requested = AdapterFeatures {
            sampler_anisotropy: true,
            fill_mode_non_solid: true,
            shader_int64: true,
            ..Default::default()
        };
        let core = adapter_features_to_core(&requested);
        assert_eq!(core.sampler_anisotropy, vk::TRUE);
        assert_eq!(core.geometry_shader, vk::FALSE);
        assert_eq!(core_features_to_adapter(&core), requested);
    }
}
