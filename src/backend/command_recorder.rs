// Command Recorder - Recording into one command buffer
//
// CommandRecorder borrows the ResourceManager mutably while it records. Pass
// recorders reborrow it from the command recorder, so at most one pass can
// be open at a time and no resource can be deleted under a recording.
//
// Barriers go through synchronization2 when the device enabled it. Without
// it every barrier of one call shares a single stage pair, the union of the
// requested stages.

use super::device::{BarrierSupport, VulkanDevice};
use super::enums::{
    access_flags_to_vk, access_flags_to_vk2, aspect_flags_to_vk, color_clear_value_to_vk,
    extent3d_to_vk, filter_mode_to_vk, offset3d_to_vk, pipeline_stage_flags_to_vk,
    pipeline_stage_flags_to_vk2, shader_stage_flags_to_vk, subresource_range_to_vk,
    texture_layout_to_vk,
};
use super::bind_group::with_descriptor_writes;
use super::resource_manager::ResourceManager;
use super::texture::{resolve_aspect, VulkanTexture};
use crate::handle::Handle;
use crate::options::{
    BindGroupEntry, BufferClear, BufferCopy, BufferMemoryBarrierOptions, BufferTextureCopyRegion,
    BufferToTextureCopy, ClearColorTexture, ClearDepthStencilTexture, CommandBufferLevel,
    CommandRecorderOptions, DebugLabelOptions, MemoryBarrierOptions, TextureBlitOptions,
    TextureMemoryBarrierOptions, TextureResolveOptions, TextureToBufferCopy, TextureToTextureCopy,
    PushConstantRange, TimestampQueryRecorderOptions,
};
use crate::resources::{
    self, BindGroup, Buffer, CommandBuffer, Device, PipelineLayout, Texture, TimestampQueryRecorder,
};
use crate::types::{AccessFlags, DeviceSize, Format, PipelineStageFlags, TextureSubresourceLayers};
use anyhow::{bail, Context, Result};
use ash::extensions::khr;
use ash::vk;

pub struct VulkanCommandBuffer {
    pub command_buffer: vk::CommandBuffer,
    pub pool: vk::CommandPool,
    pub device: Handle<Device>,
    pub level: CommandBufferLevel,
    /// Destroyed together with the command buffer
    pub(crate) temporary_buffers: Vec<Handle<Buffer>>,
}

pub struct VulkanCommandRecorder {
    pub command_buffer: Handle<CommandBuffer>,
    pub native: vk::CommandBuffer,
    pub device: Handle<Device>,
    pub queue_type_index: u32,
    pub level: CommandBufferLevel,
    /// An acceleration structure build has been recorded
    pub(crate) acceleration_structure_writes: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Barriers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub(crate) enum BarrierTarget {
    Memory,
    Buffer {
        buffer: vk::Buffer,
        offset: DeviceSize,
        size: DeviceSize,
        src_queue: u32,
        dst_queue: u32,
    },
    Image {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        range: vk::ImageSubresourceRange,
        src_queue: u32,
        dst_queue: u32,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Barrier {
    pub src_stages: PipelineStageFlags,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStageFlags,
    pub dst_access: AccessFlags,
    pub target: BarrierTarget,
}

/// Stage pair for vkCmdPipelineBarrier: the union over all barriers, with
/// empty masks widened to the ends of the pipe
pub(crate) fn legacy_stage_masks(barriers: &[Barrier]) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
    let (src, dst) = barriers.iter().fold(
        (PipelineStageFlags::empty(), PipelineStageFlags::empty()),
        |(src, dst), b| (src | b.src_stages, dst | b.dst_stages),
    );
    let mut src = pipeline_stage_flags_to_vk(src);
    let mut dst = pipeline_stage_flags_to_vk(dst);
    if src.is_empty() {
        src = vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    if dst.is_empty() {
        dst = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }
    (src, dst)
}

fn record_legacy_barriers(device: &ash::Device, cmd: vk::CommandBuffer, barriers: &[Barrier]) {
    let mut memory = Vec::new();
    let mut buffers = Vec::new();
    let mut images = Vec::new();
    for b in barriers {
        let src_access = access_flags_to_vk(b.src_access);
        let dst_access = access_flags_to_vk(b.dst_access);
        match b.target {
            BarrierTarget::Memory => memory.push(
                vk::MemoryBarrier::builder()
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .build(),
            ),
            BarrierTarget::Buffer { buffer, offset, size, src_queue, dst_queue } => buffers.push(
                vk::BufferMemoryBarrier::builder()
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .src_queue_family_index(src_queue)
                    .dst_queue_family_index(dst_queue)
                    .buffer(buffer)
                    .offset(offset)
                    .size(size)
                    .build(),
            ),
            BarrierTarget::Image { image, old_layout, new_layout, range, src_queue, dst_queue } => images.push(
                vk::ImageMemoryBarrier::builder()
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .old_layout(old_layout)
                    .new_layout(new_layout)
                    .src_queue_family_index(src_queue)
                    .dst_queue_family_index(dst_queue)
                    .image(image)
                    .subresource_range(range)
                    .build(),
            ),
        }
    }
    let (src_stages, dst_stages) = legacy_stage_masks(barriers);
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stages,
            dst_stages,
            vk::DependencyFlags::empty(),
            &memory,
            &buffers,
            &images,
        );
    }
}

fn record_barriers2(
    device: &ash::Device,
    loader: Option<&khr::Synchronization2>,
    cmd: vk::CommandBuffer,
    barriers: &[Barrier],
) {
    let mut memory = Vec::new();
    let mut buffers = Vec::new();
    let mut images = Vec::new();
    for b in barriers {
        let src_stage = pipeline_stage_flags_to_vk2(b.src_stages);
        let dst_stage = pipeline_stage_flags_to_vk2(b.dst_stages);
        let src_access = access_flags_to_vk2(b.src_access);
        let dst_access = access_flags_to_vk2(b.dst_access);
        match b.target {
            BarrierTarget::Memory => memory.push(
                vk::MemoryBarrier2::builder()
                    .src_stage_mask(src_stage)
                    .src_access_mask(src_access)
                    .dst_stage_mask(dst_stage)
                    .dst_access_mask(dst_access)
                    .build(),
            ),
            BarrierTarget::Buffer { buffer, offset, size, src_queue, dst_queue } => buffers.push(
                vk::BufferMemoryBarrier2::builder()
                    .src_stage_mask(src_stage)
                    .src_access_mask(src_access)
                    .dst_stage_mask(dst_stage)
                    .dst_access_mask(dst_access)
                    .src_queue_family_index(src_queue)
                    .dst_queue_family_index(dst_queue)
                    .buffer(buffer)
                    .offset(offset)
                    .size(size)
                    .build(),
            ),
            BarrierTarget::Image { image, old_layout, new_layout, range, src_queue, dst_queue } => images.push(
                vk::ImageMemoryBarrier2::builder()
                    .src_stage_mask(src_stage)
                    .src_access_mask(src_access)
                    .dst_stage_mask(dst_stage)
                    .dst_access_mask(dst_access)
                    .old_layout(old_layout)
                    .new_layout(new_layout)
                    .src_queue_family_index(src_queue)
                    .dst_queue_family_index(dst_queue)
                    .image(image)
                    .subresource_range(range)
                    .build(),
            ),
        }
    }
    let dependency_info = vk::DependencyInfo::builder()
        .memory_barriers(&memory)
        .buffer_memory_barriers(&buffers)
        .image_memory_barriers(&images);
    unsafe {
        match loader {
            Some(loader) => loader.cmd_pipeline_barrier2(cmd, &dependency_info),
            None => device.cmd_pipeline_barrier2(cmd, &dependency_info),
        }
    }
}

/// Record barriers the way the device supports
pub(crate) fn record_barriers(device: &VulkanDevice, cmd: vk::CommandBuffer, barriers: &[Barrier]) {
    if barriers.is_empty() {
        return;
    }
    match &device.barriers {
        BarrierSupport::Core => record_barriers2(&device.device, None, cmd, barriers),
        BarrierSupport::Khr(loader) => record_barriers2(&device.device, Some(loader), cmd, barriers),
        BarrierSupport::Legacy => record_legacy_barriers(&device.device, cmd, barriers),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Push descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Write `entries` straight into the command buffer as set `set` of `layout`
pub(crate) fn record_push_bind_group(
    rm: &ResourceManager,
    device: &VulkanDevice,
    cmd: vk::CommandBuffer,
    bind_point: vk::PipelineBindPoint,
    layout: vk::PipelineLayout,
    set: u32,
    entries: &[BindGroupEntry],
) -> Result<()> {
    let loader = device
        .loaders
        .push_descriptor
        .as_ref()
        .context("VK_KHR_push_descriptor is not enabled")?;
    let resolved = entries
        .iter()
        .map(|entry| rm.resolve_bind_group_entry(entry))
        .collect::<Result<Vec<_>>>()?;
    with_descriptor_writes(vk::DescriptorSet::null(), &resolved, |writes| unsafe {
        loader.cmd_push_descriptor_set(cmd, bind_point, layout, set, writes);
    });
    Ok(())
}

/// Layout to bind against: the explicit one, else the bound pipeline's
pub(crate) fn resolve_pipeline_layout(
    rm: &ResourceManager,
    explicit: Option<Handle<PipelineLayout>>,
    bound: Option<Handle<PipelineLayout>>,
) -> Option<vk::PipelineLayout> {
    let layout = explicit
        .or(bound)
        .and_then(|h| rm.pipeline_layouts.get(h))
        .map(|l| l.layout);
    if layout.is_none() {
        log::error!("No pipeline layout to bind against, set a pipeline or pass one explicitly");
    }
    layout
}

pub(crate) fn record_bind_group(
    rm: &ResourceManager,
    device: &VulkanDevice,
    cmd: vk::CommandBuffer,
    bind_point: vk::PipelineBindPoint,
    layout: vk::PipelineLayout,
    group: u32,
    bind_group: Handle<BindGroup>,
    dynamic_offsets: &[u32],
) {
    let Some(set) = rm.bind_groups.get(bind_group).map(|b| b.descriptor_set) else {
        log::error!("Unknown bind group {:?}", bind_group);
        return;
    };
    unsafe {
        device
            .device
            .cmd_bind_descriptor_sets(cmd, bind_point, layout, group, &[set], dynamic_offsets)
    };
}

pub(crate) fn record_push_constant(
    device: &VulkanDevice,
    cmd: vk::CommandBuffer,
    layout: vk::PipelineLayout,
    range: &PushConstantRange,
    data: &[u8],
) {
    debug_assert!(data.len() >= range.size as usize, "push constant data shorter than its range");
    let len = (range.size as usize).min(data.len());
    unsafe {
        device.device.cmd_push_constants(
            cmd,
            layout,
            shader_stage_flags_to_vk(range.shader_stages),
            range.offset,
            &data[..len],
        )
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Copy regions
// ─────────────────────────────────────────────────────────────────────────────

fn layers_to_vk(layers: &TextureSubresourceLayers, format: Format) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect_flags_to_vk(resolve_aspect(layers.aspect_mask, format)),
        mip_level: layers.mip_level,
        base_array_layer: layers.base_array_layer,
        layer_count: layers.layer_count,
    }
}

fn buffer_image_copies(regions: &[BufferTextureCopyRegion], format: Format) -> Vec<vk::BufferImageCopy> {
    regions
        .iter()
        .map(|r| vk::BufferImageCopy {
            buffer_offset: r.buffer_offset,
            buffer_row_length: r.buffer_row_length,
            buffer_image_height: r.buffer_texture_height,
            image_subresource: layers_to_vk(&r.texture_sub_resource, format),
            image_offset: offset3d_to_vk(r.texture_offset),
            image_extent: extent3d_to_vk(r.texture_extent),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Creation and teardown
// ─────────────────────────────────────────────────────────────────────────────

impl ResourceManager {
    /// Start recording on `options.queue`, or on the device's first queue
    pub fn create_command_recorder(
        &mut self,
        device: Handle<Device>,
        options: &CommandRecorderOptions,
    ) -> CommandRecorder<'_> {
        let handle = match self.try_create_command_recorder(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create command recorder: {:#}", e);
                Handle::null()
            }
        };
        CommandRecorder { rm: self, handle }
    }

    fn try_create_command_recorder(
        &mut self,
        device_handle: Handle<Device>,
        options: &CommandRecorderOptions,
    ) -> Result<Handle<resources::CommandRecorder>> {
        let Some(device) = self.devices.get_mut(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };

        // Step 1: Resolve the queue family
        let queue_handle = match options.queue {
            Some(queue) => queue,
            None => *device.queues.first().context("Device has no queues")?,
        };
        let queue = self
            .queues
            .get(queue_handle)
            .with_context(|| format!("Unknown queue {:?}", queue_handle))?;
        if queue.device != device_handle {
            bail!("Queue {:?} belongs to another device", queue_handle);
        }
        let queue_type_index = queue.queue_type_index;

        // Step 2: Per-family pool, created on first use
        let pool = device
            .command_pool(queue_type_index)
            .context("vkCreateCommandPool failed")?;

        // Step 3: Allocate and begin
        let level = match options.level {
            CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
        };
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("vkAllocateCommandBuffers failed")?
            .into_iter()
            .next()
            .context("No command buffer allocated")?;

        let inheritance = vk::CommandBufferInheritanceInfo::builder();
        let mut begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if options.level == CommandBufferLevel::Secondary {
            begin_info = begin_info.inheritance_info(&inheritance);
        }
        if let Err(e) = unsafe { device.device.begin_command_buffer(command_buffer, &begin_info) } {
            unsafe { device.device.free_command_buffers(pool, &[command_buffer]) };
            bail!("vkBeginCommandBuffer failed: {:?}", e);
        }
        device.set_object_name(command_buffer, &options.label);

        let buffer_handle = self.command_buffers.emplace(VulkanCommandBuffer {
            command_buffer,
            pool,
            device: device_handle,
            level: options.level,
            temporary_buffers: Vec::new(),
        });
        Ok(self.command_recorders.emplace(VulkanCommandRecorder {
            command_buffer: buffer_handle,
            native: command_buffer,
            device: device_handle,
            queue_type_index,
            level: options.level,
            acceleration_structure_writes: false,
        }))
    }

    /// Drop the recording state. The command buffer is left alone.
    pub fn delete_command_recorder(&mut self, handle: Handle<resources::CommandRecorder>) {
        self.command_recorders.remove(handle);
    }

    pub fn get_command_recorder(
        &self,
        handle: Handle<resources::CommandRecorder>,
    ) -> Option<&VulkanCommandRecorder> {
        self.command_recorders.get(handle)
    }

    /// Free the command buffer and the temporary buffers it kept alive.
    /// The GPU must be done with it.
    pub fn delete_command_buffer(&mut self, handle: Handle<CommandBuffer>) {
        let Some(command_buffer) = self.command_buffers.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(command_buffer.device) {
            unsafe {
                device
                    .device
                    .free_command_buffers(command_buffer.pool, &[command_buffer.command_buffer])
            };
        }
        for buffer in command_buffer.temporary_buffers {
            self.delete_buffer(buffer);
        }
    }

    pub fn get_command_buffer(&self, handle: Handle<CommandBuffer>) -> Option<&VulkanCommandBuffer> {
        self.command_buffers.get(handle)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Front-end
// ─────────────────────────────────────────────────────────────────────────────

pub struct CommandRecorder<'rm> {
    pub(crate) rm: &'rm mut ResourceManager,
    pub(crate) handle: Handle<resources::CommandRecorder>,
}

impl<'rm> CommandRecorder<'rm> {
    pub fn handle(&self) -> Handle<resources::CommandRecorder> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.rm.command_recorders.contains(self.handle)
    }

    /// Read access to resources while recording
    pub fn resource_manager(&self) -> &ResourceManager {
        self.rm
    }

    pub(crate) fn recorder(&self) -> Option<&VulkanCommandRecorder> {
        let recorder = self.rm.command_recorders.get(self.handle);
        if recorder.is_none() {
            log::error!("Unknown command recorder {:?}", self.handle);
        }
        recorder
    }

    /// Device and native command buffer to record into
    pub(crate) fn target(&self) -> Option<(&VulkanDevice, vk::CommandBuffer)> {
        let recorder = self.recorder()?;
        let device = self.rm.device(recorder.device)?;
        Some((device, recorder.native))
    }

    fn texture(&self, handle: Handle<Texture>) -> Option<&VulkanTexture> {
        let texture = self.rm.textures.get(handle);
        if texture.is_none() {
            log::error!("Unknown texture {:?}", handle);
        }
        texture
    }

    fn buffer(&self, handle: Handle<Buffer>) -> Option<vk::Buffer> {
        match self.rm.buffers.get(handle) {
            Some(b) => Some(b.buffer),
            None => {
                log::error!("Unknown buffer {:?}", handle);
                None
            }
        }
    }

    /// Keep `buffer` alive until the command buffer is deleted
    pub(crate) fn add_temporary_buffer(&mut self, buffer: Handle<Buffer>) {
        let Some(command_buffer) = self.recorder().map(|r| r.command_buffer) else {
            return;
        };
        if let Some(cb) = self.rm.command_buffers.get_mut(command_buffer) {
            cb.temporary_buffers.push(buffer);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Copies
    // ─────────────────────────────────────────────────────────────────────────

    pub fn copy_buffer(&mut self, copy: &BufferCopy) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let (Some(src), Some(dst)) = (self.buffer(copy.src), self.buffer(copy.dst)) else {
            return;
        };
        let region = vk::BufferCopy {
            src_offset: copy.src_offset,
            dst_offset: copy.dst_offset,
            size: copy.byte_size,
        };
        unsafe { device.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
    }

    pub fn copy_buffer_to_texture(&mut self, copy: &BufferToTextureCopy) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let (Some(src), Some(dst)) = (self.buffer(copy.src_buffer), self.texture(copy.dst_texture)) else {
            return;
        };
        let regions = buffer_image_copies(&copy.regions, dst.format);
        unsafe {
            device.device.cmd_copy_buffer_to_image(
                cmd,
                src,
                dst.image,
                texture_layout_to_vk(copy.dst_texture_layout),
                &regions,
            )
        };
    }

    pub fn copy_texture_to_buffer(&mut self, copy: &TextureToBufferCopy) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let (Some(src), Some(dst)) = (self.texture(copy.src_texture), self.buffer(copy.dst_buffer)) else {
            return;
        };
        let regions = buffer_image_copies(&copy.regions, src.format);
        unsafe {
            device.device.cmd_copy_image_to_buffer(
                cmd,
                src.image,
                texture_layout_to_vk(copy.src_texture_layout),
                dst,
                &regions,
            )
        };
    }

    pub fn copy_texture_to_texture(&mut self, copy: &TextureToTextureCopy) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let (Some(src), Some(dst)) = (self.texture(copy.src_texture), self.texture(copy.dst_texture)) else {
            return;
        };
        let regions: Vec<vk::ImageCopy> = copy
            .regions
            .iter()
            .map(|r| vk::ImageCopy {
                src_subresource: layers_to_vk(&r.src_subresource, src.format),
                src_offset: offset3d_to_vk(r.src_offset),
                dst_subresource: layers_to_vk(&r.dst_subresource, dst.format),
                dst_offset: offset3d_to_vk(r.dst_offset),
                extent: extent3d_to_vk(r.extent),
            })
            .collect();
        unsafe {
            device.device.cmd_copy_image(
                cmd,
                src.image,
                texture_layout_to_vk(copy.src_layout),
                dst.image,
                texture_layout_to_vk(copy.dst_layout),
                &regions,
            )
        };
    }

    pub fn blit_texture(&mut self, options: &TextureBlitOptions) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let (Some(src), Some(dst)) = (self.texture(options.src_texture), self.texture(options.dst_texture)) else {
            return;
        };
        let regions: Vec<vk::ImageBlit> = options
            .regions
            .iter()
            .map(|r| vk::ImageBlit {
                src_subresource: layers_to_vk(&r.src_subresource, src.format),
                src_offsets: [offset3d_to_vk(r.src_offset_min), offset3d_to_vk(r.src_offset_max)],
                dst_subresource: layers_to_vk(&r.dst_subresource, dst.format),
                dst_offsets: [offset3d_to_vk(r.dst_offset_min), offset3d_to_vk(r.dst_offset_max)],
            })
            .collect();
        unsafe {
            device.device.cmd_blit_image(
                cmd,
                src.image,
                texture_layout_to_vk(options.src_layout),
                dst.image,
                texture_layout_to_vk(options.dst_layout),
                &regions,
                filter_mode_to_vk(options.scaling_filter),
            )
        };
    }

    pub fn resolve_texture(&mut self, options: &TextureResolveOptions) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let (Some(src), Some(dst)) = (self.texture(options.src_texture), self.texture(options.dst_texture)) else {
            return;
        };
        let regions: Vec<vk::ImageResolve> = options
            .regions
            .iter()
            .map(|r| vk::ImageResolve {
                src_subresource: layers_to_vk(&r.src_subresource, src.format),
                src_offset: offset3d_to_vk(r.src_offset),
                dst_subresource: layers_to_vk(&r.dst_subresource, dst.format),
                dst_offset: offset3d_to_vk(r.dst_offset),
                extent: extent3d_to_vk(r.extent),
            })
            .collect();
        unsafe {
            device.device.cmd_resolve_image(
                cmd,
                src.image,
                texture_layout_to_vk(options.src_layout),
                dst.image,
                texture_layout_to_vk(options.dst_layout),
                &regions,
            )
        };
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clears
    // ─────────────────────────────────────────────────────────────────────────

    pub fn clear_buffer(&mut self, clear: &BufferClear) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let Some(buffer) = self.buffer(clear.dst_buffer) else {
            return;
        };
        debug_assert!(
            clear.byte_size == crate::types::WHOLE_SIZE || clear.byte_size % 4 == 0,
            "buffer clears must be a multiple of 4 bytes"
        );
        unsafe {
            device
                .device
                .cmd_fill_buffer(cmd, buffer, clear.dst_offset, clear.byte_size, clear.clear_value)
        };
    }

    pub fn clear_color_texture(&mut self, clear: &ClearColorTexture) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let Some(texture) = self.texture(clear.texture) else {
            return;
        };
        let ranges = texture_ranges(&clear.ranges, texture.format);
        unsafe {
            device.device.cmd_clear_color_image(
                cmd,
                texture.image,
                texture_layout_to_vk(clear.layout),
                &color_clear_value_to_vk(clear.clear_value),
                &ranges,
            )
        };
    }

    pub fn clear_depth_stencil_texture(&mut self, clear: &ClearDepthStencilTexture) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let Some(texture) = self.texture(clear.texture) else {
            return;
        };
        let ranges = texture_ranges(&clear.ranges, texture.format);
        let value = vk::ClearDepthStencilValue {
            depth: clear.depth_clear_value,
            stencil: clear.stencil_clear_value,
        };
        unsafe {
            device.device.cmd_clear_depth_stencil_image(
                cmd,
                texture.image,
                texture_layout_to_vk(clear.layout),
                &value,
                &ranges,
            )
        };
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Barriers
    // ─────────────────────────────────────────────────────────────────────────

    pub fn memory_barrier(&mut self, options: &MemoryBarrierOptions) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let barriers: Vec<Barrier> = options
            .memory_barriers
            .iter()
            .map(|b| Barrier {
                src_stages: options.src_stages,
                src_access: b.src_mask,
                dst_stages: options.dst_stages,
                dst_access: b.dst_mask,
                target: BarrierTarget::Memory,
            })
            .collect();
        record_barriers(device, cmd, &barriers);
    }

    pub fn buffer_memory_barrier(&mut self, options: &BufferMemoryBarrierOptions) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let Some(buffer) = self.buffer(options.buffer) else {
            return;
        };
        let barrier = Barrier {
            src_stages: options.src_stages,
            src_access: options.src_mask,
            dst_stages: options.dst_stages,
            dst_access: options.dst_mask,
            target: BarrierTarget::Buffer {
                buffer,
                offset: options.offset,
                size: options.size,
                src_queue: options.src_queue_type_index,
                dst_queue: options.dst_queue_type_index,
            },
        };
        record_barriers(device, cmd, &[barrier]);
    }

    pub fn texture_memory_barrier(&mut self, options: &TextureMemoryBarrierOptions) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let Some(texture) = self.texture(options.texture) else {
            return;
        };
        let mut range = options.range;
        range.aspect_mask = resolve_aspect(range.aspect_mask, texture.format);
        let barrier = Barrier {
            src_stages: options.src_stages,
            src_access: options.src_mask,
            dst_stages: options.dst_stages,
            dst_access: options.dst_mask,
            target: BarrierTarget::Image {
                image: texture.image,
                old_layout: texture_layout_to_vk(options.old_layout),
                new_layout: texture_layout_to_vk(options.new_layout),
                range: subresource_range_to_vk(&range),
                src_queue: options.src_queue_type_index,
                dst_queue: options.dst_queue_type_index,
            },
        };
        record_barriers(device, cmd, &[barrier]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Debug labels
    // ─────────────────────────────────────────────────────────────────────────

    pub fn begin_debug_label(&mut self, options: &DebugLabelOptions) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let (Some(debug_utils), Some(name)) = (
            &device.loaders.debug_utils,
            super::label_cstring(&Some(options.label.clone())),
        ) else {
            return;
        };
        let label = vk::DebugUtilsLabelEXT::builder()
            .label_name(&name)
            .color(options.color);
        unsafe { debug_utils.cmd_begin_debug_utils_label(cmd, &label) };
    }

    pub fn end_debug_label(&mut self) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        if let Some(debug_utils) = &device.loaders.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(cmd) };
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Secondary buffers, timestamps, finish
    // ─────────────────────────────────────────────────────────────────────────

    pub fn execute_secondary_command_buffer(&mut self, secondary: Handle<CommandBuffer>) {
        let Some((device, cmd)) = self.target() else {
            return;
        };
        let Some(secondary) = self.rm.command_buffers.get(secondary) else {
            log::error!("Unknown command buffer {:?}", secondary);
            return;
        };
        debug_assert_eq!(
            secondary.level,
            CommandBufferLevel::Secondary,
            "only secondary command buffers can be executed"
        );
        if secondary.level != CommandBufferLevel::Secondary {
            log::error!("Cannot execute a primary command buffer as secondary");
            return;
        }
        unsafe { device.device.cmd_execute_commands(cmd, &[secondary.command_buffer]) };
    }

    /// Reserve timestamp queries recorded into this command buffer. The
    /// returned recorder outlives this one; delete it once its results are read.
    pub fn begin_timestamp_recording(
        &mut self,
        options: &TimestampQueryRecorderOptions,
    ) -> Handle<TimestampQueryRecorder> {
        let Some((device, cmd)) = self.recorder().map(|r| (r.device, r.native)) else {
            return Handle::null();
        };
        self.rm.create_timestamp_query_recorder(device, cmd, options)
    }

    /// End recording and hand back the command buffer for submission
    pub fn finish(self) -> Handle<CommandBuffer> {
        let Some(recorder) = self.rm.command_recorders.remove(self.handle) else {
            log::error!("Unknown command recorder {:?}", self.handle);
            return Handle::null();
        };
        let Some(device) = self.rm.device(recorder.device) else {
            return Handle::null();
        };
        if let Err(e) = unsafe { device.device.end_command_buffer(recorder.native) } {
            log::error!("vkEndCommandBuffer failed: {:?}", e);
            self.rm.delete_command_buffer(recorder.command_buffer);
            return Handle::null();
        }
        recorder.command_buffer
    }
}

impl Drop for CommandRecorder<'_> {
    fn drop(&mut self) {
        // Recorders that were finished are already gone from the pool
        if let Some(recorder) = self.rm.command_recorders.remove(self.handle) {
            log::warn!("Command recorder dropped before finish, discarding its command buffer");
            self.rm.delete_command_buffer(recorder.command_buffer);
        }
    }
}

fn texture_ranges(ranges: &[crate::types::TextureSubresourceRange], format: Format) -> Vec<vk::ImageSubresourceRange> {
    let whole = [crate::types::TextureSubresourceRange::default()];
    let ranges = if ranges.is_empty() { &whole[..] } else { ranges };
    ranges
        .iter()
        .map(|r| {
            let mut range = *r;
            range.aspect_mask = resolve_aspect(range.aspect_mask, format);
            subresource_range_to_vk(&range)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::buffer::VulkanBuffer;
    use crate::backend::memory::ResourceMemory;
    use crate::types::{BufferUsageFlags, MemoryHandle, MemoryUsage, TextureSubresourceRange};

    // Objects without a device never reach the driver when deleted
    fn detached_buffer(manager: &mut ResourceManager) -> Handle<Buffer> {
        manager.buffers.emplace(VulkanBuffer {
            buffer: vk::Buffer::null(),
            device: Handle::null(),
            size: 256,
            usage: BufferUsageFlags::TRANSFER_SRC,
            memory_usage: MemoryUsage::CpuToGpu,
            device_address: None,
            external_memory_handle: MemoryHandle::default(),
            memory: ResourceMemory::None,
        })
    }

    fn detached_command_buffer(manager: &mut ResourceManager, temporary: Vec<Handle<Buffer>>) -> Handle<CommandBuffer> {
        manager.command_buffers.emplace(VulkanCommandBuffer {
            command_buffer: vk::CommandBuffer::null(),
            pool: vk::CommandPool::null(),
            device: Handle::null(),
            level: CommandBufferLevel::Primary,
            temporary_buffers: temporary,
        })
    }

    #[test]
    fn deleting_command_buffer_frees_its_temporary_buffers() {
        let mut manager = ResourceManager::new();
        let staging = [detached_buffer(&mut manager), detached_buffer(&mut manager)];
        let kept = detached_buffer(&mut manager);
        let command_buffer = detached_command_buffer(&mut manager, staging.to_vec());

        manager.delete_command_buffer(command_buffer);
        assert!(manager.get_command_buffer(command_buffer).is_none());
        assert!(staging.iter().all(|b| manager.get_buffer(*b).is_none()));
        assert!(manager.get_buffer(kept).is_some());
    }

    #[test]
    fn discarded_recorder_frees_buffers_it_kept_alive() {
        let mut manager = ResourceManager::new();
        let staging = detached_buffer(&mut manager);
        let command_buffer = detached_command_buffer(&mut manager, Vec::new());
        let handle = manager.command_recorders.emplace(VulkanCommandRecorder {
            command_buffer,
            native: vk::CommandBuffer::null(),
            device: Handle::null(),
            queue_type_index: 0,
            level: CommandBufferLevel::Primary,
            acceleration_structure_writes: false,
        });

        {
            let mut recorder = CommandRecorder { rm: &mut manager, handle };
            recorder.add_temporary_buffer(staging);
            let kept = &recorder.rm.command_buffers.get(command_buffer).unwrap().temporary_buffers;
            assert_eq!(kept, &vec![staging]);
        }

        assert!(manager.get_command_buffer(command_buffer).is_none());
        assert!(manager.get_buffer(staging).is_none());
    }

    fn memory_barrier(src: PipelineStageFlags, dst: PipelineStageFlags) -> Barrier {
        Barrier {
            src_stages: src,
            src_access: AccessFlags::empty(),
            dst_stages: dst,
            dst_access: AccessFlags::empty(),
            target: BarrierTarget::Memory,
        }
    }

    #[test]
    fn legacy_masks_union_every_barrier() {
        let barriers = [
            memory_barrier(PipelineStageFlags::TRANSFER, PipelineStageFlags::VERTEX_SHADER),
            memory_barrier(PipelineStageFlags::COMPUTE_SHADER, PipelineStageFlags::FRAGMENT_SHADER),
        ];
        let (src, dst) = legacy_stage_masks(&barriers);
        assert_eq!(src, vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(dst, vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn empty_legacy_masks_widen_to_pipe_ends() {
        let (src, dst) = legacy_stage_masks(&[memory_barrier(
            PipelineStageFlags::empty(),
            PipelineStageFlags::empty(),
        )]);
        assert_eq!(src, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn sync2_only_stages_fold_into_transfer() {
        let (src, _) = legacy_stage_masks(&[memory_barrier(PipelineStageFlags::COPY, PipelineStageFlags::HOST)]);
        assert_eq!(src, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn clear_ranges_default_to_whole_texture() {
        let ranges = texture_ranges(&[], Format::D32Sfloat);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(ranges[0].level_count, vk::REMAINING_MIP_LEVELS);

        let explicit = TextureSubresourceRange {
            base_mip_level: 2,
            level_count: 1,
            ..Default::default()
        };
        let ranges = texture_ranges(&[explicit], Format::R8G8B8A8Unorm);
        assert_eq!(ranges[0].aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(ranges[0].base_mip_level, 2);
    }

    #[test]
    fn copy_regions_take_format_aspects() {
        let region = BufferTextureCopyRegion {
            texture_sub_resource: TextureSubresourceLayers {
                aspect_mask: crate::types::TextureAspectFlags::empty(),
                ..Default::default()
            },
            texture_extent: crate::types::Extent3D {
                width: 4,
                height: 4,
                depth: 1,
            },
            ..Default::default()
        };
        let copies = buffer_image_copies(&[region], Format::D24UnormS8Uint);
        assert_eq!(
            copies[0].image_subresource.aspect_mask,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(copies[0].image_extent.width, 4);
    }

    #[test]
    fn invalid_recorder_records_nothing() {
        let mut manager = ResourceManager::new();
        let mut recorder = manager.create_command_recorder(Handle::null(), &CommandRecorderOptions::default());
        assert!(!recorder.is_valid());
        recorder.copy_buffer(&BufferCopy::default());
        assert!(!recorder.finish().is_valid());
    }
}
