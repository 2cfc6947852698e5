// Pipelines - Layouts, graphics and compute pipelines
//
// A graphics pipeline defines how vertices are processed and rasterized:
// vertex input, shaders, rasterization, depth/stencil and blending. Viewport
// and scissor are always dynamic, so one pipeline serves any target size.
// Without an explicit render pass the pipeline builds a compatible one from
// its render targets and owns it.

use super::enums::{
    blend_factor_to_vk, blend_op_to_vk, color_component_flags_to_vk, compare_op_to_vk,
    cull_mode_to_vk, dynamic_state_to_vk, format_to_vk, front_face_to_vk, polygon_mode_to_vk,
    sample_count_to_vk, shader_stage_flags_to_vk, stencil_op_to_vk, topology_to_vk,
    vertex_rate_to_vk,
};
use super::render_pass::{multiview_mask, RenderPassKey};
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::{
    ComputePipelineOptions, GraphicsPipelineOptions, PipelineLayoutOptions, PushConstantRange,
    ShaderStage, SpecializationConstant, SpecializationValue, StencilOperationOptions,
};
use crate::resources::{BindGroupLayout, ComputePipeline, Device, GraphicsPipeline, PipelineLayout, RenderPass};
use crate::types::{DynamicState, ShaderStageFlags};
use anyhow::{bail, Context, Result};
use ash::vk;
use std::ffi::CString;

pub struct VulkanPipelineLayout {
    pub layout: vk::PipelineLayout,
    pub device: Handle<Device>,
    pub bind_group_layouts: Vec<Handle<BindGroupLayout>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

pub struct VulkanGraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: Handle<PipelineLayout>,
    pub device: Handle<Device>,
    pub render_pass: Handle<RenderPass>,
    /// The render pass was synthesised for this pipeline
    pub owns_render_pass: bool,
}

pub struct VulkanComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: Handle<PipelineLayout>,
    pub device: Handle<Device>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shader stages
// ─────────────────────────────────────────────────────────────────────────────

/// Pack constants into one data blob. Booleans are widened to VkBool32.
pub(crate) fn pack_specialization_constants(
    constants: &[SpecializationConstant],
) -> (Vec<u8>, Vec<vk::SpecializationMapEntry>) {
    let mut data = Vec::new();
    let mut entries = Vec::with_capacity(constants.len());
    for constant in constants {
        let offset = data.len() as u32;
        match constant.value {
            SpecializationValue::Bool(v) => {
                data.extend_from_slice(bytemuck::bytes_of(&(if v { vk::TRUE } else { vk::FALSE })))
            }
            SpecializationValue::Int32(v) => data.extend_from_slice(bytemuck::bytes_of(&v)),
            SpecializationValue::Uint32(v) => data.extend_from_slice(bytemuck::bytes_of(&v)),
            SpecializationValue::Float(v) => data.extend_from_slice(bytemuck::bytes_of(&v)),
            SpecializationValue::Double(v) => data.extend_from_slice(bytemuck::bytes_of(&v)),
        }
        entries.push(vk::SpecializationMapEntry {
            constant_id: constant.constant_id,
            offset,
            size: data.len() - offset as usize,
        });
    }
    (data, entries)
}

/// Owned data the stage create infos point into
pub(crate) struct ShaderStageStorage {
    modules: Vec<vk::ShaderModule>,
    stages: Vec<ShaderStageFlags>,
    entry_points: Vec<CString>,
    specializations: Vec<(Vec<u8>, Vec<vk::SpecializationMapEntry>)>,
}

impl ShaderStageStorage {
    pub fn new(manager: &ResourceManager, stages: &[ShaderStage]) -> Result<Self> {
        let mut storage = Self {
            modules: Vec::with_capacity(stages.len()),
            stages: Vec::with_capacity(stages.len()),
            entry_points: Vec::with_capacity(stages.len()),
            specializations: Vec::with_capacity(stages.len()),
        };
        for stage in stages {
            let module = manager
                .shader_modules
                .get(stage.shader_module)
                .with_context(|| format!("Unknown shader module {:?}", stage.shader_module))?;
            storage.modules.push(module.module);
            storage.stages.push(stage.stage);
            storage.entry_points.push(
                CString::new(stage.entry_point.as_str())
                    .with_context(|| format!("Invalid entry point {:?}", stage.entry_point))?,
            );
            storage
                .specializations
                .push(pack_specialization_constants(&stage.specialization_constants));
        }
        Ok(storage)
    }

    pub fn specialization_infos(&self) -> Vec<vk::SpecializationInfo> {
        self.specializations
            .iter()
            .map(|(data, entries)| {
                vk::SpecializationInfo::builder()
                    .map_entries(entries)
                    .data(data)
                    .build()
            })
            .collect()
    }

    /// Stage create infos; `specialization_infos` must outlive them
    pub fn create_infos(&self, specialization_infos: &[vk::SpecializationInfo]) -> Vec<vk::PipelineShaderStageCreateInfo> {
        (0..self.modules.len())
            .map(|i| {
                let mut info = vk::PipelineShaderStageCreateInfo::builder()
                    .stage(shader_stage_flags_to_vk(self.stages[i]))
                    .module(self.modules[i])
                    .name(&self.entry_points[i]);
                if !self.specializations[i].1.is_empty() {
                    info = info.specialization_info(&specialization_infos[i]);
                }
                info.build()
            })
            .collect()
    }
}

fn stencil_op_state(options: &StencilOperationOptions) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op_to_vk(options.fail_op),
        pass_op: stencil_op_to_vk(options.pass_op),
        depth_fail_op: stencil_op_to_vk(options.depth_fail_op),
        compare_op: compare_op_to_vk(options.compare_op),
        compare_mask: options.compare_mask,
        write_mask: options.write_mask,
        reference: options.reference,
    }
}

/// Viewport and scissor first, then the requested states without repeats
pub(crate) fn pipeline_dynamic_states(requested: &[DynamicState]) -> Vec<vk::DynamicState> {
    let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    for state in requested {
        let state = dynamic_state_to_vk(*state);
        if !states.contains(&state) {
            states.push(state);
        }
    }
    states
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourceManager
// ─────────────────────────────────────────────────────────────────────────────

impl ResourceManager {
    pub fn create_pipeline_layout(
        &mut self,
        device: Handle<Device>,
        options: &PipelineLayoutOptions,
    ) -> Handle<PipelineLayout> {
        match self.try_create_pipeline_layout(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create pipeline layout: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_pipeline_layout(
        &mut self,
        device_handle: Handle<Device>,
        options: &PipelineLayoutOptions,
    ) -> Result<Handle<PipelineLayout>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let set_layouts = options
            .bind_group_layouts
            .iter()
            .map(|h| {
                self.bind_group_layouts
                    .get(*h)
                    .map(|l| l.layout)
                    .with_context(|| format!("Unknown bind group layout {:?}", h))
            })
            .collect::<Result<Vec<_>>>()?;
        let push_constant_ranges: Vec<vk::PushConstantRange> = options
            .push_constant_ranges
            .iter()
            .map(|r| vk::PushConstantRange {
                stage_flags: shader_stage_flags_to_vk(r.shader_stages),
                offset: r.offset,
                size: r.size,
            })
            .collect();

        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.device.create_pipeline_layout(&create_info, None) }
            .context("vkCreatePipelineLayout failed")?;
        device.set_object_name(layout, &options.label);

        Ok(self.pipeline_layouts.emplace(VulkanPipelineLayout {
            layout,
            device: device_handle,
            bind_group_layouts: options.bind_group_layouts.clone(),
            push_constant_ranges: options.push_constant_ranges.clone(),
        }))
    }

    pub fn delete_pipeline_layout(&mut self, handle: Handle<PipelineLayout>) {
        let Some(layout) = self.pipeline_layouts.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(layout.device) {
            unsafe { device.device.destroy_pipeline_layout(layout.layout, None) };
        }
    }

    pub fn get_pipeline_layout(&self, handle: Handle<PipelineLayout>) -> Option<&VulkanPipelineLayout> {
        self.pipeline_layouts.get(handle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Graphics
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_graphics_pipeline(
        &mut self,
        device: Handle<Device>,
        options: &GraphicsPipelineOptions,
    ) -> Handle<GraphicsPipeline> {
        match self.try_create_graphics_pipeline(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create graphics pipeline: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_graphics_pipeline(
        &mut self,
        device_handle: Handle<Device>,
        options: &GraphicsPipelineOptions,
    ) -> Result<Handle<GraphicsPipeline>> {
        if !self.devices.contains(device_handle) {
            bail!("Unknown device {:?}", device_handle);
        }
        let layout = self
            .pipeline_layouts
            .get(options.layout)
            .map(|l| l.layout)
            .with_context(|| format!("Unknown pipeline layout {:?}", options.layout))?;
        let shader_storage = ShaderStageStorage::new(self, &options.shader_stages)?;

        // Step 1: Render pass to be compatible with
        let (render_pass_handle, owns_render_pass) = match options.render_pass {
            _ if options.dynamic_rendering => {
                let supported = self
                    .devices
                    .get(device_handle)
                    .is_some_and(|d| d.dynamic_rendering.is_supported());
                if !supported {
                    bail!("Dynamic rendering pipelines need the dynamic_rendering feature");
                }
                (Handle::null(), false)
            }
            Some(handle) => {
                if !self.render_passes.contains(handle) {
                    bail!("Unknown render pass {:?}", handle);
                }
                (handle, false)
            }
            None => {
                let key = RenderPassKey::from_pipeline_options(options);
                (self.create_render_pass_for_key(device_handle, &key)?, true)
            }
        };

        match self.build_graphics_pipeline(device_handle, options, layout, render_pass_handle, &shader_storage) {
            Ok(pipeline) => Ok(self.graphics_pipelines.emplace(VulkanGraphicsPipeline {
                pipeline,
                layout: options.layout,
                device: device_handle,
                render_pass: render_pass_handle,
                owns_render_pass,
            })),
            Err(e) => {
                if owns_render_pass {
                    self.delete_render_pass(render_pass_handle);
                }
                Err(e)
            }
        }
    }

    fn build_graphics_pipeline(
        &self,
        device_handle: Handle<Device>,
        options: &GraphicsPipelineOptions,
        layout: vk::PipelineLayout,
        render_pass_handle: Handle<RenderPass>,
        shader_storage: &ShaderStageStorage,
    ) -> Result<vk::Pipeline> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let render_pass = if options.dynamic_rendering {
            vk::RenderPass::null()
        } else {
            self.render_passes
                .get(render_pass_handle)
                .map(|rp| rp.render_pass)
                .with_context(|| format!("Unknown render pass {:?}", render_pass_handle))?
        };

        // Step 2: Shader stages
        let specialization_infos = shader_storage.specialization_infos();
        let stages = shader_storage.create_infos(&specialization_infos);

        // Step 3: Vertex input
        let bindings: Vec<vk::VertexInputBindingDescription> = options
            .vertex
            .buffers
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: vertex_rate_to_vk(b.input_rate),
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = options
            .vertex
            .attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: format_to_vk(a.format),
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(topology_to_vk(options.primitive.topology))
            .primitive_restart_enable(options.primitive.primitive_restart);

        let tessellation = vk::PipelineTessellationStateCreateInfo::builder()
            .patch_control_points(options.primitive.patch_control_points);

        // Viewport and scissor come from the recorder
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        // Step 4: Rasterization
        let depth_bias = options.primitive.depth_bias.unwrap_or_default();
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(options.primitive.depth_clamp_enabled)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode_to_vk(options.primitive.polygon_mode))
            .line_width(options.primitive.line_width)
            .cull_mode(cull_mode_to_vk(options.primitive.cull_mode))
            .front_face(front_face_to_vk(options.primitive.front_face))
            .depth_bias_enable(options.primitive.depth_bias.is_some())
            .depth_bias_constant_factor(depth_bias.constant_factor)
            .depth_bias_clamp(depth_bias.clamp)
            .depth_bias_slope_factor(depth_bias.slope_factor);

        // Step 5: Multisampling
        let multisampled = options.multisample.samples.is_multisampled();
        let sample_shading = multisampled && device.enabled_features.sample_rate_shading;
        let mut multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(sample_count_to_vk(options.multisample.samples))
            .sample_shading_enable(sample_shading)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(options.multisample.alpha_to_coverage_enabled)
            .alpha_to_one_enable(false);
        if !options.multisample.sample_masks.is_empty() {
            multisampling = multisampling.sample_mask(&options.multisample.sample_masks);
        }

        // Step 6: Depth and stencil
        let depth_options = options.depth_stencil.unwrap_or_default();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(options.depth_stencil.is_some() && depth_options.depth_test_enabled)
            .depth_write_enable(options.depth_stencil.is_some() && depth_options.depth_writes_enabled)
            .depth_compare_op(compare_op_to_vk(depth_options.depth_compare_operation))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(options.depth_stencil.is_some() && depth_options.stencil_test_enabled)
            .front(stencil_op_state(&depth_options.stencil_front))
            .back(stencil_op_state(&depth_options.stencil_back))
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        // Step 7: Color blending, one state per render target
        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = options
            .render_targets
            .iter()
            .map(|target| {
                let blend = &target.blending;
                vk::PipelineColorBlendAttachmentState::builder()
                    .blend_enable(blend.blending_enabled)
                    .color_blend_op(blend_op_to_vk(blend.color.operation))
                    .src_color_blend_factor(blend_factor_to_vk(blend.color.src_factor))
                    .dst_color_blend_factor(blend_factor_to_vk(blend.color.dst_factor))
                    .alpha_blend_op(blend_op_to_vk(blend.alpha.operation))
                    .src_alpha_blend_factor(blend_factor_to_vk(blend.alpha.src_factor))
                    .dst_alpha_blend_factor(blend_factor_to_vk(blend.alpha.dst_factor))
                    .color_write_mask(color_component_flags_to_vk(target.write_mask))
                    .build()
            })
            .collect();
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = pipeline_dynamic_states(&options.dynamic_states);
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        // Step 8: Create pipeline
        let formats = RenderingFormats::new(options);
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .view_mask(formats.view_mask)
            .color_attachment_formats(&formats.colors)
            .depth_attachment_format(formats.depth)
            .stencil_attachment_format(formats.stencil);
        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(options.subpass_index);
        if options.primitive.patch_control_points > 0 {
            pipeline_info = pipeline_info.tessellation_state(&tessellation);
        }
        if options.dynamic_rendering {
            pipeline_info = pipeline_info.push_next(&mut rendering_info);
        }

        let pipelines = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        }
        .map_err(|(_, e)| e)
        .context("vkCreateGraphicsPipelines failed")?;
        let pipeline = pipelines[0];
        device.set_object_name(pipeline, &options.label);

        log::debug!(
            "Created graphics pipeline {} ({} stages, {} targets)",
            options.label.as_deref().unwrap_or("unnamed"),
            stages.len(),
            options.render_targets.len()
        );
        Ok(pipeline)
    }

    /// Destroy a graphics pipeline and the render pass it owns
    pub fn delete_graphics_pipeline(&mut self, handle: Handle<GraphicsPipeline>) {
        let Some(pipeline) = self.graphics_pipelines.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(pipeline.device) {
            unsafe { device.device.destroy_pipeline(pipeline.pipeline, None) };
        }
        if pipeline.owns_render_pass {
            self.delete_render_pass(pipeline.render_pass);
        }
    }

    pub fn get_graphics_pipeline(&self, handle: Handle<GraphicsPipeline>) -> Option<&VulkanGraphicsPipeline> {
        self.graphics_pipelines.get(handle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Compute
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_compute_pipeline(
        &mut self,
        device: Handle<Device>,
        options: &ComputePipelineOptions,
    ) -> Handle<ComputePipeline> {
        match self.try_create_compute_pipeline(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create compute pipeline: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_compute_pipeline(
        &mut self,
        device_handle: Handle<Device>,
        options: &ComputePipelineOptions,
    ) -> Result<Handle<ComputePipeline>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let layout = self
            .pipeline_layouts
            .get(options.layout)
            .map(|l| l.layout)
            .with_context(|| format!("Unknown pipeline layout {:?}", options.layout))?;
        let shader_storage = ShaderStageStorage::new(self, std::slice::from_ref(&options.shader_stage))?;
        let specialization_infos = shader_storage.specialization_infos();
        let stages = shader_storage.create_infos(&specialization_infos);

        let pipeline_info = vk::ComputePipelineCreateInfo::builder()
            .stage(stages[0])
            .layout(layout);
        let pipelines = unsafe {
            device
                .device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        }
        .map_err(|(_, e)| e)
        .context("vkCreateComputePipelines failed")?;
        let pipeline = pipelines[0];
        device.set_object_name(pipeline, &options.label);

        Ok(self.compute_pipelines.emplace(VulkanComputePipeline {
            pipeline,
            layout: options.layout,
            device: device_handle,
        }))
    }

    pub fn delete_compute_pipeline(&mut self, handle: Handle<ComputePipeline>) {
        let Some(pipeline) = self.compute_pipelines.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(pipeline.device) {
            unsafe { device.device.destroy_pipeline(pipeline.pipeline, None) };
        }
    }

    pub fn get_compute_pipeline(&self, handle: Handle<ComputePipeline>) -> Option<&VulkanComputePipeline> {
        self.compute_pipelines.get(handle)
    }
}

/// Attachment formats a dynamic rendering pipeline is built against
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderingFormats {
    pub colors: Vec<vk::Format>,
    pub depth: vk::Format,
    pub stencil: vk::Format,
    pub view_mask: u32,
}

impl RenderingFormats {
    pub fn new(options: &GraphicsPipelineOptions) -> Self {
        let depth_format = options.depth_stencil.map(|d| d.format);
        Self {
            colors: options.render_targets.iter().map(|t| format_to_vk(t.format)).collect(),
            depth: depth_format
                .filter(|f| f.has_depth())
                .map_or(vk::Format::UNDEFINED, format_to_vk),
            stencil: depth_format
                .filter(|f| f.has_stencil())
                .map_or(vk::Format::UNDEFINED, format_to_vk),
            view_mask: multiview_mask(options.view_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering_formats_split_depth_and_stencil() {
        use crate::options::{DepthStencilOptions, RenderTargetOptions};
        use crate::types::Format;

        let mut options = GraphicsPipelineOptions {
            render_targets: vec![
                RenderTargetOptions {
                    format: Format::B8G8R8A8Srgb,
                    ..Default::default()
                },
                RenderTargetOptions {
                    format: Format::R32Sfloat,
                    ..Default::default()
                },
            ],
            depth_stencil: Some(DepthStencilOptions {
                format: Format::D24UnormS8Uint,
                ..Default::default()
            }),
            view_count: 2,
            dynamic_rendering: true,
            ..Default::default()
        };
        let formats = RenderingFormats::new(&options);
        assert_eq!(formats.colors, vec![vk::Format::B8G8R8A8_SRGB, vk::Format::R32_SFLOAT]);
        assert_eq!(formats.depth, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(formats.stencil, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(formats.view_mask, 0b11);

        options.depth_stencil = Some(DepthStencilOptions {
            format: Format::D32Sfloat,
            ..Default::default()
        });
        options.view_count = 1;
        let formats = RenderingFormats::new(&options);
        assert_eq!(formats.depth, vk::Format::D32_SFLOAT);
        assert_eq!(formats.stencil, vk::Format::UNDEFINED);
        assert_eq!(formats.view_mask, 0);
    }

    #[test]
    fn specialization_constants_are_packed_in_order() {
        let constants = [
            SpecializationConstant {
                constant_id: 0,
                value: SpecializationValue::Bool(true),
            },
            SpecializationConstant {
                constant_id: 3,
                value: SpecializationValue::Double(2.5),
            },
            SpecializationConstant {
                constant_id: 1,
                value: SpecializationValue::Float(0.5),
            },
        ];
        let (data, entries) = pack_specialization_constants(&constants);

        assert_eq!(data.len(), 16);
        assert_eq!((entries[0].offset, entries[0].size), (0, 4));
        assert_eq!((entries[1].offset, entries[1].size), (4, 8));
        assert_eq!((entries[2].offset, entries[2].size), (12, 4));
        assert_eq!(entries[1].constant_id, 3);
        assert_eq!(u32::from_ne_bytes(data[0..4].try_into().unwrap()), vk::TRUE);
        assert_eq!(f64::from_ne_bytes(data[4..12].try_into().unwrap()), 2.5);
        assert_eq!(f32::from_ne_bytes(data[12..16].try_into().unwrap()), 0.5);
    }

    #[test]
    fn false_is_a_zero_word() {
        let (data, entries) = pack_specialization_constants(&[SpecializationConstant {
            constant_id: 7,
            value: SpecializationValue::Bool(false),
        }]);
        assert_eq!(data, vec![0, 0, 0, 0]);
        assert_eq!(entries[0].size, 4);
    }

    #[test]
    fn viewport_and_scissor_are_always_dynamic() {
        let states = pipeline_dynamic_states(&[DynamicState::Scissor, DynamicState::DepthBias]);
        assert_eq!(
            states,
            vec![
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::DEPTH_BIAS
            ]
        );
    }

    #[test]
    fn unknown_shader_module_is_rejected() {
        let manager = ResourceManager::new();
        let stages = [ShaderStage::default()];
        assert!(ShaderStageStorage::new(&manager, &stages).is_err());
    }

    #[test]
    fn pipeline_without_device_is_null() {
        let mut manager = ResourceManager::new();
        let handle = manager.create_graphics_pipeline(Handle::null(), &GraphicsPipelineOptions::default());
        assert!(!handle.is_valid());
    }
}
