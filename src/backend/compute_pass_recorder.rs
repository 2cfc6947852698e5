// Compute Pass Recorder - Dispatches
//
// Vulkan has no compute pass object. The recorder only scopes pipeline and
// layout state, and wraps the dispatches in a debug label when one is given.

use super::command_recorder::{
    record_bind_group, record_push_bind_group, record_push_constant, resolve_pipeline_layout,
    CommandRecorder,
};
use super::device::VulkanDevice;
use super::resource_manager::ResourceManager;
use super::PassState;
use crate::handle::Handle;
use crate::options::{
    BindGroupEntry, ComputeCommand, ComputeCommandIndirect, ComputePassCommandRecorderOptions,
    PushConstantRange,
};
use crate::resources::{self, BindGroup, ComputePipeline, Device, PipelineLayout};
use ash::vk;

pub struct VulkanComputePassCommandRecorder {
    pub command_buffer: vk::CommandBuffer,
    pub device: Handle<Device>,
    pub state: PassState,
    pub pipeline: Option<Handle<ComputePipeline>>,
    pub(crate) pipeline_layout: Option<Handle<PipelineLayout>>,
    labelled: bool,
}

/// Begin a debug label named after the pass, if there is a name and debug
/// utils are loaded
pub(crate) fn begin_pass_label(device: &VulkanDevice, cmd: vk::CommandBuffer, label: &Option<String>) -> bool {
    let (Some(debug_utils), Some(name)) = (&device.loaders.debug_utils, super::label_cstring(label)) else {
        return false;
    };
    let info = vk::DebugUtilsLabelEXT::builder().label_name(&name);
    unsafe { debug_utils.cmd_begin_debug_utils_label(cmd, &info) };
    true
}

pub(crate) fn end_pass_label(device: &VulkanDevice, cmd: vk::CommandBuffer) {
    if let Some(debug_utils) = &device.loaders.debug_utils {
        unsafe { debug_utils.cmd_end_debug_utils_label(cmd) };
    }
}

impl CommandRecorder<'_> {
    pub fn begin_compute_pass(&mut self, options: &ComputePassCommandRecorderOptions) -> ComputePassCommandRecorder<'_> {
        let handle = match self.target() {
            Some((device, cmd)) => {
                let labelled = begin_pass_label(device, cmd, &options.label);
                let device_handle = self.recorder().map(|r| r.device).unwrap_or_default();
                self.rm.compute_pass_recorders.emplace(VulkanComputePassCommandRecorder {
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
        ComputePassCommandRecorder {
            rm: &mut *self.rm,
            handle,
        }
    }
}

impl ResourceManager {
    pub fn get_compute_pass_command_recorder(
        &self,
        handle: Handle<resources::ComputePassCommandRecorder>,
    ) -> Option<&VulkanComputePassCommandRecorder> {
        self.compute_pass_recorders.get(handle)
    }
}

pub struct ComputePassCommandRecorder<'a> {
    rm: &'a mut ResourceManager,
    handle: Handle<resources::ComputePassCommandRecorder>,
}

impl ComputePassCommandRecorder<'_> {
    pub fn handle(&self) -> Handle<resources::ComputePassCommandRecorder> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.rm.compute_pass_recorders.contains(self.handle)
    }

    fn active(&self) -> Option<(&VulkanDevice, &VulkanComputePassCommandRecorder)> {
        let Some(pass) = self.rm.compute_pass_recorders.get(self.handle) else {
            log::error!("Unknown compute pass recorder {:?}", self.handle);
            return None;
        };
        debug_assert_eq!(pass.state, PassState::Active, "compute pass is not recording");
        if pass.state != PassState::Active {
            return None;
        }
        let device = self.rm.device(pass.device)?;
        Some((device, pass))
    }

    pub fn set_pipeline(&mut self, pipeline: Handle<ComputePipeline>) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_pipeline) = self.rm.compute_pipelines.get(pipeline) else {
            log::error!("Unknown compute pipeline {:?}", pipeline);
            return;
        };
        unsafe {
            device.device.cmd_bind_pipeline(
                pass.command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                vk_pipeline.pipeline,
            )
        };
        let layout = vk_pipeline.layout;
        if let Some(pass) = self.rm.compute_pass_recorders.get_mut(self.handle) {
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
            vk::PipelineBindPoint::COMPUTE,
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
            vk::PipelineBindPoint::COMPUTE,
            vk_layout,
            group,
            entries,
        ) {
            log::error!("Failed to push bind group: {:#}", e);
        }
    }

    pub fn dispatch_compute(&mut self, command: &ComputeCommand) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        unsafe {
            device.device.cmd_dispatch(
                pass.command_buffer,
                command.work_group_x,
                command.work_group_y,
                command.work_group_z,
            )
        };
    }

    /// Dispatch once per command, in order
    pub fn dispatch_compute_indirect(&mut self, commands: &[ComputeCommandIndirect]) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        for command in commands {
            let Some(buffer) = self.rm.buffers.get(command.buffer) else {
                log::error!("Unknown indirect buffer {:?}", command.buffer);
                continue;
            };
            unsafe {
                device
                    .device
                    .cmd_dispatch_indirect(pass.command_buffer, buffer.buffer, command.offset)
            };
        }
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
        if let Some(pass) = self.rm.compute_pass_recorders.get_mut(self.handle) {
            pass.state = PassState::Ended;
        }
    }
}

impl Drop for ComputePassCommandRecorder<'_> {
    fn drop(&mut self) {
        let active = self
            .rm
            .compute_pass_recorders
            .get(self.handle)
            .is_some_and(|p| p.state == PassState::Active);
        if active {
            log::warn!("Compute pass dropped without end, ending it");
            self.end_pass();
        }
        self.rm.compute_pass_recorders.remove(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CommandRecorderOptions;

    #[test]
    fn pass_on_invalid_recorder_records_nothing() {
        let mut manager = ResourceManager::new();
        let mut recorder = manager.create_command_recorder(Handle::null(), &CommandRecorderOptions::default());
        {
            let mut pass = recorder.begin_compute_pass(&ComputePassCommandRecorderOptions::default());
            assert!(!pass.is_valid());
            pass.dispatch_compute(&ComputeCommand::default());
        }
        assert!(!recorder.finish().is_valid());
    }

    #[test]
    fn dropped_pass_leaves_no_pool_entry() {
        let mut manager = ResourceManager::new();
        // A pass entry without a device: end_pass bails, drop still cleans up
        let handle = manager.compute_pass_recorders.emplace(VulkanComputePassCommandRecorder {
            command_buffer: vk::CommandBuffer::null(),
            device: Handle::null(),
            state: PassState::Ended,
            pipeline: None,
            pipeline_layout: None,
            labelled: false,
        });
        drop(ComputePassCommandRecorder {
            rm: &mut manager,
            handle,
        });
        assert!(manager.get_compute_pass_command_recorder(handle).is_none());
    }
}
