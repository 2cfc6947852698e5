// Command recording options
//
// Copies, clears, barriers, draws, dispatches and queue submission.

use crate::handle::Handle;
use crate::resources::{Buffer, CommandBuffer, Fence, GpuSemaphore, Queue, Swapchain, Texture};
use crate::types::{
    AccessFlags, ColorClearValue, DeviceSize, Extent3D, FilterMode, Offset3D, PipelineStageFlags,
    TextureLayout, TextureSubresourceLayers, TextureSubresourceRange, IGNORE_QUEUE_TYPE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandBufferLevel {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Default)]
pub struct CommandRecorderOptions {
    pub label: Option<String>,
    /// None records for the device's first queue
    pub queue: Option<Handle<Queue>>,
    pub level: CommandBufferLevel,
}

// ─────────────────────────────────────────────────────────────────────────────
// Copies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCopy {
    pub src: Handle<Buffer>,
    pub src_offset: DeviceSize,
    pub dst: Handle<Buffer>,
    pub dst_offset: DeviceSize,
    pub byte_size: DeviceSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferTextureCopyRegion {
    pub buffer_offset: DeviceSize,
    /// 0 means tightly packed
    pub buffer_row_length: u32,
    pub buffer_texture_height: u32,
    pub texture_sub_resource: TextureSubresourceLayers,
    pub texture_offset: Offset3D,
    pub texture_extent: Extent3D,
}

#[derive(Debug, Clone, Default)]
pub struct BufferToTextureCopy {
    pub src_buffer: Handle<Buffer>,
    pub dst_texture: Handle<Texture>,
    pub dst_texture_layout: TextureLayout,
    pub regions: Vec<BufferTextureCopyRegion>,
}

#[derive(Debug, Clone, Default)]
pub struct TextureToBufferCopy {
    pub src_texture: Handle<Texture>,
    pub src_texture_layout: TextureLayout,
    pub dst_buffer: Handle<Buffer>,
    pub regions: Vec<BufferTextureCopyRegion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureCopyRegion {
    pub src_subresource: TextureSubresourceLayers,
    pub src_offset: Offset3D,
    pub dst_subresource: TextureSubresourceLayers,
    pub dst_offset: Offset3D,
    pub extent: Extent3D,
}

#[derive(Debug, Clone, Default)]
pub struct TextureToTextureCopy {
    pub src_texture: Handle<Texture>,
    pub src_layout: TextureLayout,
    pub dst_texture: Handle<Texture>,
    pub dst_layout: TextureLayout,
    pub regions: Vec<TextureCopyRegion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureBlitRegion {
    pub src_subresource: TextureSubresourceLayers,
    pub src_offset_min: Offset3D,
    pub src_offset_max: Offset3D,
    pub dst_subresource: TextureSubresourceLayers,
    pub dst_offset_min: Offset3D,
    pub dst_offset_max: Offset3D,
}

#[derive(Debug, Clone, Default)]
pub struct TextureBlitOptions {
    pub src_texture: Handle<Texture>,
    pub src_layout: TextureLayout,
    pub dst_texture: Handle<Texture>,
    pub dst_layout: TextureLayout,
    pub regions: Vec<TextureBlitRegion>,
    pub scaling_filter: FilterMode,
}

#[derive(Debug, Clone, Default)]
pub struct TextureResolveOptions {
    pub src_texture: Handle<Texture>,
    pub src_layout: TextureLayout,
    pub dst_texture: Handle<Texture>,
    pub dst_layout: TextureLayout,
    pub regions: Vec<TextureCopyRegion>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Clears
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferClear {
    pub dst_buffer: Handle<Buffer>,
    pub dst_offset: DeviceSize,
    /// Multiple of 4, or WHOLE_SIZE
    pub byte_size: DeviceSize,
    pub clear_value: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ClearColorTexture {
    pub texture: Handle<Texture>,
    pub layout: TextureLayout,
    pub clear_value: ColorClearValue,
    pub ranges: Vec<TextureSubresourceRange>,
}

#[derive(Debug, Clone, Default)]
pub struct ClearDepthStencilTexture {
    pub texture: Handle<Texture>,
    pub layout: TextureLayout,
    pub depth_clear_value: f32,
    pub stencil_clear_value: u32,
    pub ranges: Vec<TextureSubresourceRange>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Barriers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryBarrier {
    pub src_mask: AccessFlags,
    pub dst_mask: AccessFlags,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBarrierOptions {
    pub src_stages: PipelineStageFlags,
    pub dst_stages: PipelineStageFlags,
    pub memory_barriers: Vec<MemoryBarrier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMemoryBarrierOptions {
    pub src_stages: PipelineStageFlags,
    pub src_mask: AccessFlags,
    pub dst_stages: PipelineStageFlags,
    pub dst_mask: AccessFlags,
    /// IGNORE_QUEUE_TYPE on both sides means no ownership transfer
    pub src_queue_type_index: u32,
    pub dst_queue_type_index: u32,
    pub buffer: Handle<Buffer>,
    pub offset: DeviceSize,
    pub size: DeviceSize,
}

impl Default for BufferMemoryBarrierOptions {
    fn default() -> Self {
        Self {
            src_stages: PipelineStageFlags::empty(),
            src_mask: AccessFlags::empty(),
            dst_stages: PipelineStageFlags::empty(),
            dst_mask: AccessFlags::empty(),
            src_queue_type_index: IGNORE_QUEUE_TYPE,
            dst_queue_type_index: IGNORE_QUEUE_TYPE,
            buffer: Handle::null(),
            offset: 0,
            size: crate::types::WHOLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureMemoryBarrierOptions {
    pub src_stages: PipelineStageFlags,
    pub src_mask: AccessFlags,
    pub dst_stages: PipelineStageFlags,
    pub dst_mask: AccessFlags,
    pub old_layout: TextureLayout,
    pub new_layout: TextureLayout,
    pub src_queue_type_index: u32,
    pub dst_queue_type_index: u32,
    pub texture: Handle<Texture>,
    /// An empty aspect mask is derived from the texture format
    pub range: TextureSubresourceRange,
}

impl Default for TextureMemoryBarrierOptions {
    fn default() -> Self {
        Self {
            src_stages: PipelineStageFlags::empty(),
            src_mask: AccessFlags::empty(),
            dst_stages: PipelineStageFlags::empty(),
            dst_mask: AccessFlags::empty(),
            old_layout: TextureLayout::Undefined,
            new_layout: TextureLayout::Undefined,
            src_queue_type_index: IGNORE_QUEUE_TYPE,
            dst_queue_type_index: IGNORE_QUEUE_TYPE,
            texture: Handle::null(),
            range: TextureSubresourceRange::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DebugLabelOptions {
    pub label: String,
    pub color: [f32; 4],
}

// ─────────────────────────────────────────────────────────────────────────────
// Draws and dispatches
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl Default for DrawCommand {
    fn default() -> Self {
        Self {
            vertex_count: 0,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIndexedCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

impl Default for DrawIndexedCommand {
    fn default() -> Self {
        Self {
            index_count: 0,
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawIndirectCommand {
    pub buffer: Handle<Buffer>,
    pub offset: DeviceSize,
    pub draw_count: u32,
    pub stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeCommand {
    pub work_group_x: u32,
    pub work_group_y: u32,
    pub work_group_z: u32,
}

impl Default for ComputeCommand {
    fn default() -> Self {
        Self {
            work_group_x: 1,
            work_group_y: 1,
            work_group_z: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputeCommandIndirect {
    pub buffer: Handle<Buffer>,
    pub offset: DeviceSize,
}

/// Shader binding table region, resolved to a device address when recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StridedDeviceRegion {
    pub buffer: Handle<Buffer>,
    pub offset: DeviceSize,
    pub stride: DeviceSize,
    pub size: DeviceSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RayTracingCommand {
    pub raygen_shader_binding_table: StridedDeviceRegion,
    pub miss_shader_binding_table: StridedDeviceRegion,
    pub hit_shader_binding_table: StridedDeviceRegion,
    pub callable_shader_binding_table: StridedDeviceRegion,
    pub extent: Extent3D,
}

#[derive(Debug, Clone, Default)]
pub struct ComputePassCommandRecorderOptions {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RayTracingPassCommandRecorderOptions {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampQueryRecorderOptions {
    pub query_count: u32,
}

impl Default for TimestampQueryRecorderOptions {
    fn default() -> Self {
        Self { query_count: 32 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Submission
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub command_buffers: Vec<Handle<CommandBuffer>>,
    /// Waited on at the top of the pipe
    pub wait_semaphores: Vec<Handle<GpuSemaphore>>,
    pub signal_semaphores: Vec<Handle<GpuSemaphore>>,
    pub signal_fence: Option<Handle<Fence>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub swapchain: Handle<Swapchain>,
    pub image_index: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PresentOptions {
    pub wait_semaphores: Vec<Handle<GpuSemaphore>>,
    pub swapchain_images: Vec<SwapchainImage>,
}
