// Ray tracing pipelines and shader binding tables
//
// Group slots a shader group does not use are SHADER_UNUSED_KHR, never 0.
// The binding table is one host-visible buffer split into ray generation,
// miss and hit regions, each starting on the adapter's base alignment.

use super::align_up;
use super::enums::shader_group_type_to_vk;
use super::pipeline::ShaderStageStorage;
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::{
    BufferOptions, RayTracingPipelineOptions, RayTracingShaderBindingTableOptions,
    RayTracingShaderGroupOptions, StridedDeviceRegion,
};
use crate::resources::{Buffer, Device, PipelineLayout, RayTracingPipeline};
use crate::types::{BufferUsageFlags, DeviceSize, MemoryUsage, RayTracingShaderGroupType};
use anyhow::{bail, Context, Result};
use ash::vk;

pub struct VulkanRayTracingPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: Handle<PipelineLayout>,
    pub device: Handle<Device>,
    pub group_count: u32,
}

fn shader_group_to_vk(group: &RayTracingShaderGroupOptions) -> vk::RayTracingShaderGroupCreateInfoKHR {
    let slot = |index: Option<u32>| index.unwrap_or(vk::SHADER_UNUSED_KHR);
    let general = match group.group_type {
        RayTracingShaderGroupType::General => slot(group.general_shader_index),
        _ => vk::SHADER_UNUSED_KHR,
    };
    let intersection = match group.group_type {
        RayTracingShaderGroupType::ProceduralHit => slot(group.intersection_shader_index),
        _ => vk::SHADER_UNUSED_KHR,
    };
    let (closest_hit, any_hit) = match group.group_type {
        RayTracingShaderGroupType::General => (vk::SHADER_UNUSED_KHR, vk::SHADER_UNUSED_KHR),
        _ => (slot(group.closest_hit_shader_index), slot(group.any_hit_shader_index)),
    };
    vk::RayTracingShaderGroupCreateInfoKHR::builder()
        .ty(shader_group_type_to_vk(group.group_type))
        .general_shader(general)
        .closest_hit_shader(closest_hit)
        .any_hit_shader(any_hit)
        .intersection_shader(intersection)
        .build()
}

/// Check every group against the stage list before handing it to the driver
fn validate_shader_groups(groups: &[RayTracingShaderGroupOptions], stage_count: u32) -> Result<()> {
    for (i, group) in groups.iter().enumerate() {
        let required = match group.group_type {
            RayTracingShaderGroupType::General => group.general_shader_index,
            RayTracingShaderGroupType::ProceduralHit => group.intersection_shader_index,
            RayTracingShaderGroupType::TrianglesHit => Some(0),
        };
        if required.is_none() {
            bail!("Shader group {} of type {:?} is missing its shader", i, group.group_type);
        }
        let indices = [
            group.general_shader_index,
            group.closest_hit_shader_index,
            group.any_hit_shader_index,
            group.intersection_shader_index,
        ];
        if let Some(index) = indices.into_iter().flatten().find(|&index| index >= stage_count) {
            bail!("Shader group {} references stage {} of {}", i, index, stage_count);
        }
    }
    Ok(())
}

impl ResourceManager {
    pub fn create_ray_tracing_pipeline(
        &mut self,
        device: Handle<Device>,
        options: &RayTracingPipelineOptions,
    ) -> Handle<RayTracingPipeline> {
        match self.try_create_ray_tracing_pipeline(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create ray tracing pipeline: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_ray_tracing_pipeline(
        &mut self,
        device_handle: Handle<Device>,
        options: &RayTracingPipelineOptions,
    ) -> Result<Handle<RayTracingPipeline>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let loader = device
            .loaders
            .ray_tracing_pipeline
            .as_ref()
            .context("VK_KHR_ray_tracing_pipeline is not enabled")?;
        let layout = self
            .pipeline_layouts
            .get(options.layout)
            .map(|l| l.layout)
            .with_context(|| format!("Unknown pipeline layout {:?}", options.layout))?;
        validate_shader_groups(&options.shader_groups, options.shader_stages.len() as u32)?;

        let shader_storage = ShaderStageStorage::new(self, &options.shader_stages)?;
        let specialization_infos = shader_storage.specialization_infos();
        let stages = shader_storage.create_infos(&specialization_infos);
        let groups: Vec<vk::RayTracingShaderGroupCreateInfoKHR> =
            options.shader_groups.iter().map(shader_group_to_vk).collect();

        let max_recursion_depth = if options.max_recursion_depth == 0 {
            device.properties.ray_tracing.max_ray_recursion_depth
        } else {
            options.max_recursion_depth
        };

        let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::builder()
            .stages(&stages)
            .groups(&groups)
            .max_pipeline_ray_recursion_depth(max_recursion_depth)
            .layout(layout);
        let pipeline = unsafe {
            loader.create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                &[pipeline_info.build()],
                None,
            )
        }
        .context("vkCreateRayTracingPipelinesKHR failed")?
        .into_iter()
        .next()
        .context("No ray tracing pipeline created")?;
        device.set_object_name(pipeline, &options.label);

        log::debug!(
            "Created ray tracing pipeline with {} stages, {} groups, recursion depth {}",
            stages.len(),
            groups.len(),
            max_recursion_depth
        );
        Ok(self.ray_tracing_pipelines.emplace(VulkanRayTracingPipeline {
            pipeline,
            layout: options.layout,
            device: device_handle,
            group_count: groups.len() as u32,
        }))
    }

    pub fn delete_ray_tracing_pipeline(&mut self, handle: Handle<RayTracingPipeline>) {
        let Some(pipeline) = self.ray_tracing_pipelines.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(pipeline.device) {
            unsafe { device.device.destroy_pipeline(pipeline.pipeline, None) };
        }
    }

    pub fn get_ray_tracing_pipeline(&self, handle: Handle<RayTracingPipeline>) -> Option<&VulkanRayTracingPipeline> {
        self.ray_tracing_pipelines.get(handle)
    }

    /// Opaque handles of `count` groups starting at `first`, packed at the
    /// adapter's handle size
    pub fn ray_tracing_shader_group_handles(
        &self,
        pipeline: Handle<RayTracingPipeline>,
        first: u32,
        count: u32,
    ) -> Vec<u8> {
        let Some(vk_pipeline) = self.ray_tracing_pipelines.get(pipeline) else {
            log::error!("Unknown ray tracing pipeline {:?}", pipeline);
            return Vec::new();
        };
        let Some(device) = self.device(vk_pipeline.device) else {
            return Vec::new();
        };
        let Some(loader) = &device.loaders.ray_tracing_pipeline else {
            return Vec::new();
        };
        if first + count > vk_pipeline.group_count {
            log::error!(
                "Shader groups {}..{} out of range, pipeline has {}",
                first,
                first + count,
                vk_pipeline.group_count
            );
            return Vec::new();
        }
        let handle_size = device.properties.ray_tracing.shader_group_handle_size as usize;
        match unsafe {
            loader.get_ray_tracing_shader_group_handles(vk_pipeline.pipeline, first, count, handle_size * count as usize)
        } {
            Ok(handles) => handles,
            Err(e) => {
                log::error!("Failed to get shader group handles: {:?}", e);
                Vec::new()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shader binding table
// ─────────────────────────────────────────────────────────────────────────────

/// Byte layout of a binding table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BindingTableLayout {
    pub handle_size: DeviceSize,
    /// Handle size rounded to the handle alignment, the miss and hit stride
    pub handle_stride: DeviceSize,
    pub raygen_size: DeviceSize,
    pub miss_size: DeviceSize,
    pub hit_size: DeviceSize,
}

impl BindingTableLayout {
    pub fn new(
        handle_size: u32,
        handle_alignment: u32,
        base_alignment: u32,
        miss_count: u32,
        hit_count: u32,
    ) -> Self {
        let handle_size = DeviceSize::from(handle_size);
        let base_alignment = DeviceSize::from(base_alignment);
        let handle_stride = align_up(handle_size, DeviceSize::from(handle_alignment));
        Self {
            handle_size,
            handle_stride,
            raygen_size: align_up(handle_stride, base_alignment),
            miss_size: align_up(DeviceSize::from(miss_count) * handle_stride, base_alignment),
            hit_size: align_up(DeviceSize::from(hit_count) * handle_stride, base_alignment),
        }
    }

    pub fn total_size(&self) -> DeviceSize {
        self.raygen_size + self.miss_size + self.hit_size
    }

    pub fn miss_offset(&self, entry: u32) -> DeviceSize {
        self.raygen_size + DeviceSize::from(entry) * self.handle_stride
    }

    pub fn hit_offset(&self, entry: u32) -> DeviceSize {
        self.raygen_size + self.miss_size + DeviceSize::from(entry) * self.handle_stride
    }
}

pub struct RayTracingShaderBindingTable {
    pub buffer: Handle<Buffer>,
    layout: BindingTableLayout,
    miss_count: u32,
    hit_count: u32,
}

impl RayTracingShaderBindingTable {
    pub fn ray_gen_shader_region(&self) -> StridedDeviceRegion {
        // Ray generation stride must equal its size
        StridedDeviceRegion {
            buffer: self.buffer,
            offset: 0,
            stride: self.layout.raygen_size,
            size: self.layout.raygen_size,
        }
    }

    pub fn miss_shader_region(&self) -> StridedDeviceRegion {
        StridedDeviceRegion {
            buffer: self.buffer,
            offset: self.layout.raygen_size,
            stride: self.layout.handle_stride,
            size: self.layout.miss_size,
        }
    }

    pub fn hit_shader_region(&self) -> StridedDeviceRegion {
        StridedDeviceRegion {
            buffer: self.buffer,
            offset: self.layout.raygen_size + self.layout.miss_size,
            stride: self.layout.handle_stride,
            size: self.layout.hit_size,
        }
    }

    pub fn add_ray_gen_shader_group(
        &self,
        rm: &mut ResourceManager,
        pipeline: Handle<RayTracingPipeline>,
        shader_group_index: u32,
    ) -> bool {
        self.write_group(rm, pipeline, shader_group_index, 0)
    }

    pub fn add_miss_shader_group(
        &self,
        rm: &mut ResourceManager,
        pipeline: Handle<RayTracingPipeline>,
        shader_group_index: u32,
        entry: u32,
    ) -> bool {
        if entry >= self.miss_count {
            log::error!("Miss entry {} out of range, table has {}", entry, self.miss_count);
            return false;
        }
        self.write_group(rm, pipeline, shader_group_index, self.layout.miss_offset(entry))
    }

    pub fn add_hit_shader_group(
        &self,
        rm: &mut ResourceManager,
        pipeline: Handle<RayTracingPipeline>,
        shader_group_index: u32,
        entry: u32,
    ) -> bool {
        if entry >= self.hit_count {
            log::error!("Hit entry {} out of range, table has {}", entry, self.hit_count);
            return false;
        }
        self.write_group(rm, pipeline, shader_group_index, self.layout.hit_offset(entry))
    }

    fn write_group(
        &self,
        rm: &mut ResourceManager,
        pipeline: Handle<RayTracingPipeline>,
        shader_group_index: u32,
        offset: DeviceSize,
    ) -> bool {
        let handle = rm.ray_tracing_shader_group_handles(pipeline, shader_group_index, 1);
        if handle.is_empty() {
            return false;
        }
        rm.write_buffer(self.buffer, offset, &handle)
    }
}

impl ResourceManager {
    pub fn create_shader_binding_table(
        &mut self,
        device: Handle<Device>,
        options: &RayTracingShaderBindingTableOptions,
    ) -> Option<RayTracingShaderBindingTable> {
        let Some(vk_device) = self.device(device) else {
            return None;
        };
        let properties = vk_device.properties.ray_tracing;
        let layout = BindingTableLayout::new(
            properties.shader_group_handle_size,
            properties.shader_group_handle_alignment,
            properties.shader_group_base_alignment,
            options.miss_shader_count,
            options.hit_shader_count,
        );
        let buffer = self.create_buffer(
            device,
            &BufferOptions {
                label: options.label.clone(),
                size: layout.total_size(),
                usage: BufferUsageFlags::TRANSFER_SRC
                    | BufferUsageFlags::TRANSFER_DST
                    | BufferUsageFlags::SHADER_BINDING_TABLE
                    | BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                memory_usage: MemoryUsage::CpuToGpu,
                ..Default::default()
            },
            None,
        );
        if !buffer.is_valid() {
            return None;
        }
        Some(RayTracingShaderBindingTable {
            buffer,
            layout,
            miss_count: options.miss_shader_count,
            hit_count: options.hit_shader_count,
        })
    }

    pub fn delete_shader_binding_table(&mut self, table: RayTracingShaderBindingTable) {
        self.delete_buffer(table.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_group_slots_are_marked_unused() {
        let info = shader_group_to_vk(&RayTracingShaderGroupOptions::general(2));
        assert_eq!(info.ty, vk::RayTracingShaderGroupTypeKHR::GENERAL);
        assert_eq!(info.general_shader, 2);
        assert_eq!(info.closest_hit_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(info.any_hit_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(info.intersection_shader, vk::SHADER_UNUSED_KHR);

        let info = shader_group_to_vk(&RayTracingShaderGroupOptions::triangles_hit(Some(3), None));
        assert_eq!(info.general_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(info.closest_hit_shader, 3);
        assert_eq!(info.any_hit_shader, vk::SHADER_UNUSED_KHR);
    }

    #[test]
    fn procedural_group_keeps_intersection() {
        let info = shader_group_to_vk(&RayTracingShaderGroupOptions::procedural_hit(4, None, Some(5)));
        assert_eq!(info.ty, vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP);
        assert_eq!(info.intersection_shader, 4);
        assert_eq!(info.any_hit_shader, 5);
        assert_eq!(info.closest_hit_shader, vk::SHADER_UNUSED_KHR);
    }

    #[test]
    fn groups_must_reference_existing_stages() {
        let groups = [
            RayTracingShaderGroupOptions::general(0),
            RayTracingShaderGroupOptions::triangles_hit(Some(3), None),
        ];
        assert!(validate_shader_groups(&groups, 4).is_ok());
        assert!(validate_shader_groups(&groups, 3).is_err());

        let mut missing = RayTracingShaderGroupOptions::general(0);
        missing.general_shader_index = None;
        assert!(validate_shader_groups(&[missing], 4).is_err());
    }

    #[test]
    fn binding_table_regions_respect_alignments() {
        // Common desktop values: 32 byte handles, 32 byte handle alignment, 64 byte base
        let layout = BindingTableLayout::new(32, 32, 64, 2, 3);
        assert_eq!(layout.handle_stride, 32);
        assert_eq!(layout.raygen_size, 64);
        assert_eq!(layout.miss_size, 64);
        assert_eq!(layout.hit_size, 128);
        assert_eq!(layout.total_size(), 256);
        assert_eq!(layout.miss_offset(1), 96);
        assert_eq!(layout.hit_offset(2), 192);
    }

    #[test]
    fn handle_stride_rounds_up() {
        let layout = BindingTableLayout::new(24, 16, 64, 1, 0);
        assert_eq!(layout.handle_stride, 32);
        assert_eq!(layout.miss_size, 64);
        assert_eq!(layout.hit_size, 0);
        assert_eq!(layout.hit_offset(0), 128);
    }

    #[test]
    fn unknown_pipeline_has_no_handles() {
        let manager = ResourceManager::new();
        assert!(manager.ray_tracing_shader_group_handles(Handle::null(), 0, 1).is_empty());
    }
}
