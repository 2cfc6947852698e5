// Adapter capabilities
//
// Backend-agnostic snapshot of what a physical device reports. The same
// AdapterFeatures struct is used to request features at device creation.

use crate::types::{
    ColorSpace, CompositeAlphaFlags, Extent2D, Extent3D, Format, FormatFeatureFlags, PresentMode,
    QueueFlags, ResolveMode, SampleCount, SurfaceTransformFlags, TextureUsageFlags,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdapterDeviceType {
    #[default]
    Other,
    IntegratedGpu,
    DiscreteGpu,
    VirtualGpu,
    Cpu,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterLimits {
    pub max_image_dimension_1d: u32,
    pub max_image_dimension_2d: u32,
    pub max_image_dimension_3d: u32,
    pub max_image_dimension_cube: u32,
    pub max_image_array_layers: u32,
    pub max_uniform_buffer_range: u32,
    pub max_storage_buffer_range: u32,
    pub max_push_constants_size: u32,
    pub max_bound_descriptor_sets: u32,
    pub max_vertex_input_attributes: u32,
    pub max_vertex_input_bindings: u32,
    pub max_compute_work_group_count: [u32; 3],
    pub max_compute_work_group_size: [u32; 3],
    pub max_compute_work_group_invocations: u32,
    pub max_sampler_anisotropy: f32,
    pub max_viewports: u32,
    pub max_framebuffer_width: u32,
    pub max_framebuffer_height: u32,
    pub max_framebuffer_layers: u32,
    pub max_color_attachments: u32,
    pub framebuffer_color_sample_counts: Vec<SampleCount>,
    pub framebuffer_depth_sample_counts: Vec<SampleCount>,
    pub min_uniform_buffer_offset_alignment: u64,
    pub min_storage_buffer_offset_alignment: u64,
    pub optimal_buffer_copy_offset_alignment: u64,
    pub non_coherent_atom_size: u64,
    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
    pub timestamp_compute_and_graphics: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterMultiviewProperties {
    pub max_multiview_view_count: u32,
    pub max_multiview_instance_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterDepthResolveProperties {
    pub supported_depth_resolve_modes: Vec<ResolveMode>,
    pub supported_stencil_resolve_modes: Vec<ResolveMode>,
    pub independent_resolve_none: bool,
    pub independent_resolve: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterRayTracingProperties {
    pub shader_group_handle_size: u32,
    pub max_ray_recursion_depth: u32,
    pub max_shader_group_stride: u32,
    pub shader_group_base_alignment: u32,
    pub shader_group_handle_alignment: u32,
    pub max_ray_dispatch_invocation_count: u32,
    pub max_ray_hit_attribute_size: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterAccelerationStructureProperties {
    pub max_geometry_count: u64,
    pub max_instance_count: u64,
    pub max_primitive_count: u64,
    pub min_acceleration_structure_scratch_offset_alignment: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterProperties {
    /// Packed Vulkan-style version
    pub api_version: u32,
    pub driver_version: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub device_type: AdapterDeviceType,
    pub device_name: String,
    pub pipeline_cache_uuid: [u8; 16],
    pub limits: AdapterLimits,
    pub multiview: AdapterMultiviewProperties,
    pub depth_resolve: AdapterDepthResolveProperties,
    pub ray_tracing: AdapterRayTracingProperties,
    pub acceleration_structure: AdapterAccelerationStructureProperties,
    pub max_push_descriptors: u32,
}

/// Device features. Queried from an adapter, or requested at device creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterFeatures {
    pub robust_buffer_access: bool,
    pub full_draw_index_uint32: bool,
    pub image_cube_array: bool,
    pub independent_blend: bool,
    pub geometry_shader: bool,
    pub tessellation_shader: bool,
    pub sample_rate_shading: bool,
    pub dual_src_blend: bool,
    pub logic_op: bool,
    pub multi_draw_indirect: bool,
    pub draw_indirect_first_instance: bool,
    pub depth_clamp: bool,
    pub depth_bias_clamp: bool,
    pub fill_mode_non_solid: bool,
    pub depth_bounds: bool,
    pub wide_lines: bool,
    pub large_points: bool,
    pub alpha_to_one: bool,
    pub multi_viewport: bool,
    pub sampler_anisotropy: bool,
    pub texture_compression_bc: bool,
    pub pipeline_statistics_query: bool,
    pub vertex_pipeline_stores_and_atomics: bool,
    pub fragment_stores_and_atomics: bool,
    pub shader_storage_image_extended_formats: bool,
    pub shader_float64: bool,
    pub shader_int64: bool,
    pub shader_int16: bool,
    pub shader_clip_distance: bool,
    pub shader_cull_distance: bool,

    pub multi_view: bool,
    pub multi_view_geometry_shader: bool,
    pub multi_view_tessellation_shader: bool,

    pub shader_uniform_buffer_array_non_uniform_indexing: bool,
    pub shader_sampled_image_array_non_uniform_indexing: bool,
    pub shader_storage_buffer_array_non_uniform_indexing: bool,
    pub shader_storage_image_array_non_uniform_indexing: bool,
    pub descriptor_binding_uniform_buffer_update_after_bind: bool,
    pub descriptor_binding_sampled_image_update_after_bind: bool,
    pub descriptor_binding_storage_image_update_after_bind: bool,
    pub descriptor_binding_storage_buffer_update_after_bind: bool,
    pub descriptor_binding_update_unused_while_pending: bool,
    pub descriptor_binding_partially_bound: bool,
    pub descriptor_binding_variable_descriptor_count: bool,
    pub runtime_descriptor_array: bool,

    pub buffer_device_address: bool,
    pub uniform_buffer_standard_layout: bool,
    pub host_query_reset: bool,
    pub synchronization2: bool,
    pub dynamic_rendering: bool,

    pub acceleration_structures: bool,
    pub descriptor_binding_acceleration_structure_update_after_bind: bool,
    pub ray_tracing_pipeline: bool,
    pub ray_tracing_pipeline_trace_rays_indirect: bool,
    pub ray_traversal_primitive_culling: bool,
    pub ray_query: bool,
}

impl AdapterFeatures {
    pub fn uses_descriptor_indexing(&self) -> bool {
        self.shader_uniform_buffer_array_non_uniform_indexing
            || self.shader_sampled_image_array_non_uniform_indexing
            || self.shader_storage_buffer_array_non_uniform_indexing
            || self.shader_storage_image_array_non_uniform_indexing
            || self.descriptor_binding_uniform_buffer_update_after_bind
            || self.descriptor_binding_sampled_image_update_after_bind
            || self.descriptor_binding_storage_image_update_after_bind
            || self.descriptor_binding_storage_buffer_update_after_bind
            || self.descriptor_binding_update_unused_while_pending
            || self.descriptor_binding_partially_bound
            || self.descriptor_binding_variable_descriptor_count
            || self.runtime_descriptor_array
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterQueueType {
    pub flags: QueueFlags,
    pub available_queues: u32,
    pub timestamp_valid_bits: u32,
    pub min_image_transfer_granularity: Extent3D,
}

impl AdapterQueueType {
    pub fn supports_graphics(&self) -> bool {
        self.flags.contains(QueueFlags::GRAPHICS)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatProperties {
    pub linear_tiling_features: FormatFeatureFlags,
    pub optimal_tiling_features: FormatFeatureFlags,
    pub buffer_features: FormatFeatureFlags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means unbounded
    pub max_image_count: u32,
    pub current_extent: Extent2D,
    pub min_image_extent: Extent2D,
    pub max_image_extent: Extent2D,
    pub max_image_array_layers: u32,
    pub supported_transforms: SurfaceTransformFlags,
    pub current_transform: SurfaceTransformFlags,
    pub supported_composite_alpha: CompositeAlphaFlags,
    pub supported_usage_flags: TextureUsageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormat {
    pub format: Format,
    pub color_space: ColorSpace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSwapchainProperties {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}
