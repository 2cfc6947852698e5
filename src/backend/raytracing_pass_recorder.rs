// Ray Tracing Pass Recorder - Trace dispatches
//
// Like compute, there is no native pass object. Binding table regions name a
// buffer and an offset; they are turned into device addresses when recorded.

use super::command_recorder::{
    record_bind_group, record_push_bind_group, record_push_constant, resolve_pipeline_layout,
    CommandRecorder,
};
use super::compute_pass_recorder::{begin_pass_label, end_pass_label};
use super::device::VulkanDevice;
use super::resource_manager::ResourceManager;
use super::PassState;
use crate::handle::Handle;
use crate::options::{
    BindGroupEntry, PushConstantRange, RayTracingCommand, RayTracingPassCommandRecorderOptions,
    StridedDeviceRegion,
};
use crate::resources::{self, BindGroup, Device, PipelineLayout, RayTracingPipeline};
use ash::vk;

pub struct VulkanRayTracingPassCommandRecorder {
    pub command_buffer: vk::CommandBuffer,
    pub device: Handle<Device>,
    pub state: PassState,
    pub pipeline: Option<Handle<RayTracingPipeline>>,
    pub(crate) pipeline_layout: Option<Handle<PipelineLayout>>,
    labelled: bool,
}

/// A region without a buffer stays all zero, which is how unused tables are
/// passed to vkCmdTraceRaysKHR
fn strided_region_to_vk(rm: &ResourceManager, region: &StridedDeviceRegion) -> vk::StridedDeviceAddressRegionKHR {
    if !region.buffer.is_valid() {
        return vk::StridedDeviceAddressRegionKHR::default();
    }
    let address = rm.buffer_device_address(region.buffer);
    if address == 0 {
        log::error!("Binding table buffer {:?} has no device address", region.buffer);
        return vk::StridedDeviceAddressRegionKHR::default();
    }
    vk::StridedDeviceAddressRegionKHR {
        device_address: address + region.offset,
        stride: region.stride,
        size: region.size,
    }
}

impl CommandRecorder<'_> {
    pub fn begin_ray_tracing_pass(
        &mut self,
        options: &RayTracingPassCommandRecorderOptions,
    ) -> RayTracingPassCommandRecorder<'_> {
        let handle = match self.target() {
            Some((device, cmd)) => {
                let labelled = begin_pass_label(device, cmd, &options.label);
                let device_handle = self.recorder().map(|r| r.device).unwrap_or_default();
                self.rm.ray_tracing_pass_recorders.emplace(VulkanRayTracingPassCommandRecorder {
                    command_buffer: cmd,
                    device: device_handle,
                    state: PassState::Active,
                    pipeline: None,
                    pipeline_layout: None,
                    labelled,
                })
            }
            None => Handle::null(),
        };
        RayTracingPassCommandRecorder {
            rm: &mut *self.rm,
            handle,
        }
    }
}

impl ResourceManager {
    pub fn get_ray_tracing_pass_command_recorder(
        &self,
        handle: Handle<resources::RayTracingPassCommandRecorder>,
    ) -> Option<&VulkanRayTracingPassCommandRecorder> {
        self.ray_tracing_pass_recorders.get(handle)
    }
}

pub struct RayTracingPassCommandRecorder<'a> {
    rm: &'a mut ResourceManager,
    handle: Handle<resources::RayTracingPassCommandRecorder>,
}

impl RayTracingPassCommandRecorder<'_> {
    pub fn handle(&self) -> Handle<resources::RayTracingPassCommandRecorder> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.rm.ray_tracing_pass_recorders.contains(self.handle)
    }

    fn active(&self) -> Option<(&VulkanDevice, &VulkanRayTracingPassCommandRecorder)> {
        let Some(pass) = self.rm.ray_tracing_pass_recorders.get(self.handle) else {
            log::error!("Unknown ray tracing pass recorder {:?}", self.handle);
            return None;
        };
        debug_assert_eq!(pass.state, PassState::Active, "ray tracing pass is not recording");
        if pass.state != PassState::Active {
            return None;
        }
        let device = self.rm.device(pass.device)?;
        Some((device, pass))
    }

    pub fn set_pipeline(&mut self, pipeline: Handle<RayTracingPipeline>) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_pipeline) = self.rm.ray_tracing_pipelines.get(pipeline) else {
            log::error!("Unknown ray tracing pipeline {:?}", pipeline);
            return;
        };
        unsafe {
            device.device.cmd_bind_pipeline(
                pass.command_buffer,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                vk_pipeline.pipeline,
            )
        };
        let layout = vk_pipeline.layout;
        if let Some(pass) = self.rm.ray_tracing_pass_recorders.get_mut(self.handle) {
            pass.pipeline = Some(pipeline);
            pass.pipeline_layout = Some(layout);
        }
    }

    pub fn set_bind_group(
        &mut self,
        group: u32,
        bind_group: Handle<BindGroup>,
        layout: Option<Handle<PipelineLayout>>,
        dynamic_offsets: &[u32],
    ) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_layout) = resolve_pipeline_layout(self.rm, layout, pass.pipeline_layout) else {
            return;
        };
        record_bind_group(
            self.rm,
            device,
            pass.command_buffer,
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            vk_layout,
            group,
            bind_group,
            dynamic_offsets,
        );
    }

    pub fn push_constant(
        &mut self,
        range: &PushConstantRange,
        data: &[u8],
        layout: Option<Handle<PipelineLayout>>,
    ) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_layout) = resolve_pipeline_layout(self.rm, layout, pass.pipeline_layout) else {
            return;
        };
        record_push_constant(device, pass.command_buffer, vk_layout, range, data);
    }

    pub fn push_bind_group(
        &mut self,
        group: u32,
        entries: &[BindGroupEntry],
        layout: Option<Handle<PipelineLayout>>,
    ) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_layout) = resolve_pipeline_layout(self.rm, layout, pass.pipeline_layout) else {
            return;
        };
        if let Err(e) = record_push_bind_group(
            self.rm,
            device,
            pass.command_buffer,
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            vk_layout,
            group,
            entries,
        ) {
            log::error!("Failed to push bind group: {:#}", e);
        }
    }

    pub fn trace_rays(&mut self, command: &RayTracingCommand) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(loader) = &device.loaders.ray_tracing_pipeline else {
            log::error!("VK_KHR_ray_tracing_pipeline is not enabled");
            return;
        };
        let raygen = strided_region_to_vk(self.rm, &command.raygen_shader_binding_table);
        let miss = strided_region_to_vk(self.rm, &command.miss_shader_binding_table);
        let hit = strided_region_to_vk(self.rm, &command.hit_shader_binding_table);
        let callable = strided_region_to_vk(self.rm, &command.callable_shader_binding_table);
        unsafe {
            loader.cmd_trace_rays(
                pass.command_buffer,
                &raygen,
                &miss,
                &hit,
                &callable,
                command.extent.width,
                command.extent.height,
                command.extent.depth,
            )
        };
    }

    pub fn end(mut self) {
        self.end_pass();
    }

    fn end_pass(&mut self) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        if pass.labelled {
            end_pass_label(device, pass.command_buffer);
        }
        if let Some(pass) = self.rm.ray_tracing_pass_recorders.get_mut(self.handle) {
            pass.state = PassState::Ended;
        }
    }
}

impl Drop for RayTracingPassCommandRecorder<'_> {
    fn drop(&mut self) {
        let active = self
            .rm
            .ray_tracing_pass_recorders
            .get(self.handle)
            .is_some_and(|p| p.state == PassState::Active);
        if active {
            log::warn!("Ray tracing pass dropped without end, ending it");
            self.end_pass();
        }
        self.rm.ray_tracing_pass_recorders.remove(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CommandRecorderOptions;

    #[test]
    fn region_without_buffer_is_zero() {
        let manager = ResourceManager::new();
        let region = strided_region_to_vk(&manager, &StridedDeviceRegion::default());
        assert_eq!(region.device_address, 0);
        assert_eq!(region.size, 0);
        assert_eq!(region.stride, 0);
    }

    #[test]
    fn pass_on_invalid_recorder_is_invalid() {
        let mut manager = ResourceManager::new();
        let mut recorder = manager.create_command_recorder(Handle::null(), &CommandRecorderOptions::default());
        let pass = recorder.begin_ray_tracing_pass(&RayTracingPassCommandRecorderOptions::default());
        assert!(!pass.is_valid());
        pass.end();
    }
}
