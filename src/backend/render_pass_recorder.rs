// Render Pass Recorder - Draw commands inside one render pass
//
// Beginning a pass looks up (or creates) the render pass and framebuffer for
// the attachments in the device caches, then records vkCmdBeginRenderPass
// over the whole framebuffer. Dynamic rendering passes skip both caches and
// record vkCmdBeginRendering over the attachment views directly. The first
// pipeline bound also sets viewport and scissor to the render area.

use super::command_recorder::{
    record_bind_group, record_push_bind_group, record_push_constant, resolve_pipeline_layout,
    CommandRecorder,
};
use super::device::VulkanDevice;
use super::enums::{
    color_clear_value_to_vk, index_type_to_vk, load_op_to_vk, rect2d_to_vk, resolve_mode_to_vk,
    stencil_face_flags_to_vk, store_op_to_vk, texture_layout_to_vk, viewport_to_vk,
};
use super::render_pass::{multiview_mask, FramebufferKey, RenderPassKey};
use super::resource_manager::ResourceManager;
use super::PassState;
use crate::handle::Handle;
use crate::options::{
    AttachmentClearValue, BindGroupEntry, DrawCommand, DrawIndexedCommand, DrawIndirectCommand,
    FramebufferAttachment, PushConstantRange, RenderPassCommandRecorderOptions,
    RenderPassCommandRecorderWithDynamicRenderingOptions, RenderPassCommandRecorderWithRenderPassOptions,
};
use crate::resources::{
    self, BindGroup, Buffer, CommandRecorder as CommandRecorderTag, Device, Framebuffer, GraphicsPipeline,
    PipelineLayout, RenderPass, TextureView,
};
use crate::types::{
    AttachmentLoadOperation, AttachmentStoreOperation, ColorClearValue, DepthStencilClearValue, DeviceSize,
    Format, IndexType, Rect2D, ResolveMode, StencilFaceFlags, Viewport,
};
use anyhow::{bail, Context, Result};
use ash::vk;

pub struct VulkanRenderPassCommandRecorder {
    pub command_buffer: vk::CommandBuffer,
    pub device: Handle<Device>,
    pub render_pass: Handle<RenderPass>,
    pub framebuffer: Handle<Framebuffer>,
    pub render_area: vk::Rect2D,
    pub state: PassState,
    pub pipeline: Option<Handle<GraphicsPipeline>>,
    pub(crate) pipeline_layout: Option<Handle<PipelineLayout>>,
    pub(crate) subpass: u32,
    pub(crate) subpass_count: u32,
    /// Begun with vkCmdBeginRendering; render pass and framebuffer are null
    pub(crate) dynamic_rendering: bool,
}

/// Framebuffer attachments in the order the synthesised render pass declares
/// them: colors, color resolves, depth, depth resolve. Attachments that are
/// not cleared on load carry a zero clear value.
pub(crate) fn recorder_attachments(options: &RenderPassCommandRecorderOptions) -> Vec<FramebufferAttachment> {
    let mut attachments = Vec::new();
    let color_clear = |load: AttachmentLoadOperation, value: ColorClearValue| {
        let value = if load == AttachmentLoadOperation::Clear {
            value
        } else {
            ColorClearValue::default()
        };
        AttachmentClearValue::Color(value)
    };

    for color in &options.color_attachments {
        attachments.push(FramebufferAttachment {
            view: color.view,
            clear: color_clear(color.load_operation, color.clear_value),
        });
    }

    // Resolves only exist when multisampling, one per color that asked for it
    if options.samples.is_multisampled() {
        for color in &options.color_attachments {
            if let Some(view) = color.resolve_view {
                attachments.push(FramebufferAttachment {
                    view,
                    clear: color_clear(color.load_operation, color.clear_value),
                });
            }
        }
    }

    if let Some(depth) = &options.depth_stencil_attachment {
        let cleared = depth.depth_load_operation == AttachmentLoadOperation::Clear
            || depth.stencil_load_operation == AttachmentLoadOperation::Clear;
        let clear = AttachmentClearValue::DepthStencil(if cleared {
            depth.clear_value
        } else {
            DepthStencilClearValue { depth: 0.0, stencil: 0 }
        });
        attachments.push(FramebufferAttachment { view: depth.view, clear });
        if let Some(view) = depth.resolve_view.filter(|_| options.samples.is_multisampled()) {
            attachments.push(FramebufferAttachment { view, clear });
        }
    }

    attachments
}

/// Attachment infos of a dynamic rendering pass. Depth and stencil share the
/// depth view and are only present for the aspects its format has.
#[derive(Clone, Default)]
pub(crate) struct RenderingAttachments {
    pub colors: Vec<vk::RenderingAttachmentInfo>,
    pub depth: Option<vk::RenderingAttachmentInfo>,
    pub stencil: Option<vk::RenderingAttachmentInfo>,
}

/// `view_info` resolves a view handle to its native view and format
pub(crate) fn rendering_attachments<F>(
    options: &RenderPassCommandRecorderWithDynamicRenderingOptions,
    view_info: F,
) -> Result<RenderingAttachments>
where
    F: Fn(Handle<TextureView>) -> Option<(vk::ImageView, Format)>,
{
    let lookup = |view: Handle<TextureView>| {
        view_info(view).with_context(|| format!("Unknown attachment view {:?}", view))
    };
    let multisampled = options.samples.is_multisampled();
    let mut attachments = RenderingAttachments::default();

    for color in &options.color_attachments {
        let (image_view, _) = lookup(color.view)?;
        let mut info = vk::RenderingAttachmentInfo::builder()
            .image_view(image_view)
            .image_layout(texture_layout_to_vk(color.layout))
            .load_op(load_op_to_vk(color.load_operation))
            .store_op(store_op_to_vk(color.store_operation))
            .clear_value(clear_value_to_vk(AttachmentClearValue::Color(color.clear_value)));
        if let Some(resolve) = color.resolve_view.filter(|_| multisampled) {
            info = info
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(lookup(resolve)?.0)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }
        attachments.colors.push(info.build());
    }

    if let Some(depth) = &options.depth_stencil_attachment {
        let (image_view, format) = lookup(depth.view)?;
        let resolve_view = match depth.resolve_view.filter(|_| multisampled) {
            Some(view) => Some(lookup(view)?.0),
            None => None,
        };
        let clear = clear_value_to_vk(AttachmentClearValue::DepthStencil(depth.clear_value));
        let aspect = |load: AttachmentLoadOperation, store: AttachmentStoreOperation, mode: ResolveMode| {
            let mut info = vk::RenderingAttachmentInfo::builder()
                .image_view(image_view)
                .image_layout(texture_layout_to_vk(depth.layout))
                .load_op(load_op_to_vk(load))
                .store_op(store_op_to_vk(store))
                .clear_value(clear);
            if let Some(resolve) = resolve_view {
                info = info
                    .resolve_mode(resolve_mode_to_vk(mode))
                    .resolve_image_view(resolve)
                    .resolve_image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
            }
            info.build()
        };
        if format.has_depth() {
            attachments.depth = Some(aspect(
                depth.depth_load_operation,
                depth.depth_store_operation,
                depth.depth_resolve_mode,
            ));
        }
        if format.has_stencil() {
            attachments.stencil = Some(aspect(
                depth.stencil_load_operation,
                depth.stencil_store_operation,
                depth.stencil_resolve_mode,
            ));
        }
    }

    Ok(attachments)
}

fn clear_value_to_vk(value: AttachmentClearValue) -> vk::ClearValue {
    match value {
        AttachmentClearValue::Color(color) => vk::ClearValue {
            color: color_clear_value_to_vk(color),
        },
        AttachmentClearValue::DepthStencil(ds) => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: ds.depth,
                stencil: ds.stencil,
            },
        },
    }
}

impl ResourceManager {
    fn try_begin_render_pass(
        &mut self,
        recorder: Handle<CommandRecorderTag>,
        options: &RenderPassCommandRecorderOptions,
    ) -> Result<Handle<resources::RenderPassCommandRecorder>> {
        let (device, cmd) = self
            .command_recorders
            .get(recorder)
            .map(|r| (r.device, r.native))
            .with_context(|| format!("Unknown command recorder {:?}", recorder))?;

        // Step 1: Render pass for these attachment formats and ops
        let key = RenderPassKey::from_recorder_options(options, |view| {
            self.texture_views.get(view).map(|v| v.format)
        })?;
        if key.color_attachments.is_empty() && key.depth_attachment.is_none() {
            bail!("Render pass needs at least one attachment");
        }
        let render_pass = self.cached_render_pass(device, &key)?;

        // Step 2: Framebuffer over the views, in attachment order
        let attachments = recorder_attachments(options);
        let first_view = attachments[0].view;
        let (width, height, layers) = self.framebuffer_dimensions(
            first_view,
            (
                options.framebuffer_width,
                options.framebuffer_height,
                options.framebuffer_array_layers,
            ),
            key.view_count,
        )?;
        let framebuffer_key = FramebufferKey {
            render_pass,
            attachments: attachments.iter().map(|a| a.view).collect(),
            width,
            height,
            layers,
            view_count: key.view_count,
        };
        let framebuffer = self.cached_framebuffer(device, &framebuffer_key)?;

        // Step 3: Begin
        self.record_begin_render_pass(device, cmd, render_pass, framebuffer, &attachments)
    }

    fn try_begin_render_pass_with_render_pass(
        &mut self,
        recorder: Handle<CommandRecorderTag>,
        options: &RenderPassCommandRecorderWithRenderPassOptions,
    ) -> Result<Handle<resources::RenderPassCommandRecorder>> {
        let (device, cmd) = self
            .command_recorders
            .get(recorder)
            .map(|r| (r.device, r.native))
            .with_context(|| format!("Unknown command recorder {:?}", recorder))?;
        let render_pass = self
            .render_passes
            .get(options.render_pass)
            .with_context(|| format!("Unknown render pass {:?}", options.render_pass))?;
        if render_pass.device != device {
            bail!("Render pass {:?} belongs to another device", options.render_pass);
        }
        let first_view = options
            .attachments
            .first()
            .map(|a| a.view)
            .context("Render pass needs at least one attachment")?;
        let view_count = if options.view_count == 0 {
            render_pass.view_count
        } else {
            options.view_count
        };

        let (width, height, layers) = self.framebuffer_dimensions(
            first_view,
            (
                options.framebuffer_width,
                options.framebuffer_height,
                options.framebuffer_array_layers,
            ),
            view_count,
        )?;
        let framebuffer_key = FramebufferKey {
            render_pass: options.render_pass,
            attachments: options.attachments.iter().map(|a| a.view).collect(),
            width,
            height,
            layers,
            view_count,
        };
        let framebuffer = self.cached_framebuffer(device, &framebuffer_key)?;

        self.record_begin_render_pass(device, cmd, options.render_pass, framebuffer, &options.attachments)
    }

    fn record_begin_render_pass(
        &mut self,
        device_handle: Handle<Device>,
        cmd: vk::CommandBuffer,
        render_pass: Handle<RenderPass>,
        framebuffer: Handle<Framebuffer>,
        attachments: &[FramebufferAttachment],
    ) -> Result<Handle<resources::RenderPassCommandRecorder>> {
        let device = self
            .devices
            .get(device_handle)
            .with_context(|| format!("Unknown device {:?}", device_handle))?;
        let pass = self
            .render_passes
            .get(render_pass)
            .with_context(|| format!("Unknown render pass {:?}", render_pass))?;
        let fb = self
            .framebuffers
            .get(framebuffer)
            .with_context(|| format!("Unknown framebuffer {:?}", framebuffer))?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: fb.extent.width,
                height: fb.extent.height,
            },
        };
        let clear_values: Vec<vk::ClearValue> = attachments.iter().map(|a| clear_value_to_vk(a.clear)).collect();
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(pass.render_pass)
            .framebuffer(fb.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        unsafe {
            device
                .device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE)
        };
        let subpass_count = pass.subpass_count.max(1);

        Ok(self.render_pass_recorders.emplace(VulkanRenderPassCommandRecorder {
            command_buffer: cmd,
            device: device_handle,
            render_pass,
            framebuffer,
            render_area,
            state: PassState::Active,
            pipeline: None,
            pipeline_layout: None,
            subpass: 0,
            subpass_count,
            dynamic_rendering: false,
        }))
    }

    fn try_begin_render_pass_with_dynamic_rendering(
        &mut self,
        recorder: Handle<CommandRecorderTag>,
        options: &RenderPassCommandRecorderWithDynamicRenderingOptions,
    ) -> Result<Handle<resources::RenderPassCommandRecorder>> {
        let (device_handle, cmd) = self
            .command_recorders
            .get(recorder)
            .map(|r| (r.device, r.native))
            .with_context(|| format!("Unknown command recorder {:?}", recorder))?;

        // Step 1: Attachment infos over the views
        let attachments = rendering_attachments(options, |view| {
            self.texture_views.get(view).map(|v| (v.view, v.format))
        })?;
        let first_view = options
            .color_attachments
            .first()
            .map(|c| c.view)
            .or(options.depth_stencil_attachment.map(|d| d.view))
            .context("Render pass needs at least one attachment")?;

        // Step 2: Render area from the first attachment
        let view_count = options.view_count.max(1);
        let (width, height, layers) = self.framebuffer_dimensions(
            first_view,
            (
                options.framebuffer_width,
                options.framebuffer_height,
                options.framebuffer_array_layers,
            ),
            view_count,
        )?;
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        };

        // Step 3: Begin
        let device = self
            .devices
            .get(device_handle)
            .with_context(|| format!("Unknown device {:?}", device_handle))?;
        if !device.dynamic_rendering.is_supported() {
            bail!("Dynamic rendering is not enabled on device {:?}", device_handle);
        }
        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(render_area)
            .layer_count(layers)
            .view_mask(multiview_mask(view_count))
            .color_attachments(&attachments.colors);
        if let Some(depth) = attachments.depth.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = attachments.stencil.as_ref() {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }
        unsafe { device.dynamic_rendering.begin(&device.device, cmd, &rendering_info) };
        log::trace!(
            "Began dynamic rendering {}x{} with {} color attachments",
            width,
            height,
            attachments.colors.len()
        );

        Ok(self.render_pass_recorders.emplace(VulkanRenderPassCommandRecorder {
            command_buffer: cmd,
            device: device_handle,
            render_pass: Handle::null(),
            framebuffer: Handle::null(),
            render_area,
            state: PassState::Active,
            pipeline: None,
            pipeline_layout: None,
            subpass: 0,
            subpass_count: 1,
            dynamic_rendering: true,
        }))
    }

    pub fn get_render_pass_command_recorder(
        &self,
        handle: Handle<resources::RenderPassCommandRecorder>,
    ) -> Option<&VulkanRenderPassCommandRecorder> {
        self.render_pass_recorders.get(handle)
    }
}

impl CommandRecorder<'_> {
    /// Begin a render pass derived from the attachments. Render pass and
    /// framebuffer come from the device caches.
    pub fn begin_render_pass(&mut self, options: &RenderPassCommandRecorderOptions) -> RenderPassCommandRecorder<'_> {
        let handle = match self.rm.try_begin_render_pass(self.handle, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to begin render pass: {:#}", e);
                Handle::null()
            }
        };
        RenderPassCommandRecorder {
            rm: &mut *self.rm,
            handle,
        }
    }

    /// Begin a pass without a render pass object. Pipelines bound inside must
    /// have been created with `dynamic_rendering` set.
    pub fn begin_render_pass_with_dynamic_rendering(
        &mut self,
        options: &RenderPassCommandRecorderWithDynamicRenderingOptions,
    ) -> RenderPassCommandRecorder<'_> {
        let handle = match self.rm.try_begin_render_pass_with_dynamic_rendering(self.handle, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to begin dynamic rendering: {:#}", e);
                Handle::null()
            }
        };
        RenderPassCommandRecorder {
            rm: &mut *self.rm,
            handle,
        }
    }

    /// Begin an explicitly created render pass. Attachments must follow the
    /// render pass's attachment order.
    pub fn begin_render_pass_with_render_pass(
        &mut self,
        options: &RenderPassCommandRecorderWithRenderPassOptions,
    ) -> RenderPassCommandRecorder<'_> {
        let handle = match self.rm.try_begin_render_pass_with_render_pass(self.handle, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to begin render pass: {:#}", e);
                Handle::null()
            }
        };
        RenderPassCommandRecorder {
            rm: &mut *self.rm,
            handle,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Front-end
// ─────────────────────────────────────────────────────────────────────────────

pub struct RenderPassCommandRecorder<'a> {
    rm: &'a mut ResourceManager,
    handle: Handle<resources::RenderPassCommandRecorder>,
}

impl RenderPassCommandRecorder<'_> {
    pub fn handle(&self) -> Handle<resources::RenderPassCommandRecorder> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.rm.render_pass_recorders.contains(self.handle)
    }

    fn active(&self) -> Option<(&VulkanDevice, &VulkanRenderPassCommandRecorder)> {
        let Some(pass) = self.rm.render_pass_recorders.get(self.handle) else {
            log::error!("Unknown render pass recorder {:?}", self.handle);
            return None;
        };
        debug_assert_eq!(pass.state, PassState::Active, "render pass is not recording");
        if pass.state != PassState::Active {
            return None;
        }
        let device = self.rm.device(pass.device)?;
        Some((device, pass))
    }

    pub fn set_pipeline(&mut self, pipeline: Handle<GraphicsPipeline>) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_pipeline) = self.rm.graphics_pipelines.get(pipeline) else {
            log::error!("Unknown graphics pipeline {:?}", pipeline);
            return;
        };
        let cmd = pass.command_buffer;
        unsafe {
            device
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, vk_pipeline.pipeline)
        };

        if pass.pipeline.is_none() {
            let area = pass.render_area;
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: area.extent.width as f32,
                height: area.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            unsafe {
                device.device.cmd_set_viewport(cmd, 0, &[viewport]);
                device.device.cmd_set_scissor(cmd, 0, &[area]);
            }
        }

        let layout = vk_pipeline.layout;
        if let Some(pass) = self.rm.render_pass_recorders.get_mut(self.handle) {
            pass.pipeline = Some(pipeline);
            pass.pipeline_layout = Some(layout);
        }
    }

    /// Bind `bind_group` as set `group`. Without `layout` the bound
    /// pipeline's layout is used.
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
            vk::PipelineBindPoint::GRAPHICS,
            vk_layout,
            group,
            bind_group,
            dynamic_offsets,
        );
    }

    pub fn set_vertex_buffer(&mut self, index: u32, buffer: Handle<Buffer>, offset: DeviceSize) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_buffer) = self.rm.buffers.get(buffer) else {
            log::error!("Unknown vertex buffer {:?}", buffer);
            return;
        };
        unsafe {
            device
                .device
                .cmd_bind_vertex_buffers(pass.command_buffer, index, &[vk_buffer.buffer], &[offset])
        };
    }

    pub fn set_index_buffer(&mut self, buffer: Handle<Buffer>, offset: DeviceSize, index_type: IndexType) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(vk_buffer) = self.rm.buffers.get(buffer) else {
            log::error!("Unknown index buffer {:?}", buffer);
            return;
        };
        unsafe {
            device.device.cmd_bind_index_buffer(
                pass.command_buffer,
                vk_buffer.buffer,
                offset,
                index_type_to_vk(index_type),
            )
        };
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        unsafe {
            device
                .device
                .cmd_set_viewport(pass.command_buffer, 0, &[viewport_to_vk(viewport)])
        };
    }

    pub fn set_scissor(&mut self, scissor: &Rect2D) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        unsafe {
            device
                .device
                .cmd_set_scissor(pass.command_buffer, 0, &[rect2d_to_vk(*scissor)])
        };
    }

    pub fn set_stencil_reference(&mut self, faces: StencilFaceFlags, reference: u32) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        unsafe {
            device.device.cmd_set_stencil_reference(
                pass.command_buffer,
                stencil_face_flags_to_vk(faces),
                reference,
            )
        };
    }

    pub fn draw(&mut self, draw: &DrawCommand) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        unsafe {
            device.device.cmd_draw(
                pass.command_buffer,
                draw.vertex_count,
                draw.instance_count,
                draw.first_vertex,
                draw.first_instance,
            )
        };
    }

    pub fn draw_indexed(&mut self, draw: &DrawIndexedCommand) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        unsafe {
            device.device.cmd_draw_indexed(
                pass.command_buffer,
                draw.index_count,
                draw.instance_count,
                draw.first_index,
                draw.vertex_offset,
                draw.first_instance,
            )
        };
    }

    pub fn draw_indirect(&mut self, draw: &DrawIndirectCommand) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(buffer) = self.rm.buffers.get(draw.buffer) else {
            log::error!("Unknown indirect buffer {:?}", draw.buffer);
            return;
        };
        unsafe {
            device.device.cmd_draw_indirect(
                pass.command_buffer,
                buffer.buffer,
                draw.offset,
                draw.draw_count,
                draw.stride,
            )
        };
    }

    pub fn draw_indexed_indirect(&mut self, draw: &DrawIndirectCommand) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        let Some(buffer) = self.rm.buffers.get(draw.buffer) else {
            log::error!("Unknown indirect buffer {:?}", draw.buffer);
            return;
        };
        unsafe {
            device.device.cmd_draw_indexed_indirect(
                pass.command_buffer,
                buffer.buffer,
                draw.offset,
                draw.draw_count,
                draw.stride,
            )
        };
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

    /// Write bindings straight into the command buffer, no bind group needed.
    /// The set layout must have been created for push descriptors.
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
            vk::PipelineBindPoint::GRAPHICS,
            vk_layout,
            group,
            entries,
        ) {
            log::error!("Failed to push bind group: {:#}", e);
        }
    }

    pub fn next_subpass(&mut self) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        if pass.subpass + 1 >= pass.subpass_count {
            log::error!("Render pass has no subpass after {}", pass.subpass);
            return;
        }
        unsafe {
            device
                .device
                .cmd_next_subpass(pass.command_buffer, vk::SubpassContents::INLINE)
        };
        if let Some(pass) = self.rm.render_pass_recorders.get_mut(self.handle) {
            pass.subpass += 1;
        }
    }

    /// Record vkCmdEndRenderPass (vkCmdEndRendering for dynamic rendering)
    /// and hand the command recorder back
    pub fn end(mut self) {
        self.end_pass();
    }

    fn end_pass(&mut self) {
        let Some((device, pass)) = self.active() else {
            return;
        };
        if pass.dynamic_rendering {
            unsafe { device.dynamic_rendering.end(&device.device, pass.command_buffer) };
        } else {
            unsafe { device.device.cmd_end_render_pass(pass.command_buffer) };
        }
        if let Some(pass) = self.rm.render_pass_recorders.get_mut(self.handle) {
            pass.state = PassState::Ended;
        }
    }
}

impl Drop for RenderPassCommandRecorder<'_> {
    fn drop(&mut self) {
        let active = self
            .rm
            .render_pass_recorders
            .get(self.handle)
            .is_some_and(|p| p.state == PassState::Active);
        if active {
            log::warn!("Render pass dropped without end, ending it");
            self.end_pass();
        }
        self.rm.render_pass_recorders.remove(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ColorAttachment, CommandRecorderOptions, DepthStencilAttachment};
    use crate::types::SampleCount;

    fn view(index: u32) -> Handle<TextureView> {
        Handle::new(index, 1)
    }

    fn red() -> ColorClearValue {
        ColorClearValue::Float([1.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn attachments_follow_render_pass_order() {
        let options = RenderPassCommandRecorderOptions {
            color_attachments: vec![
                ColorAttachment {
                    view: view(0),
                    resolve_view: Some(view(1)),
                    clear_value: red(),
                    ..Default::default()
                },
                ColorAttachment {
                    view: view(2),
                    ..Default::default()
                },
            ],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: view(3),
                resolve_view: Some(view(4)),
                ..Default::default()
            }),
            samples: SampleCount::Samples4,
            ..Default::default()
        };

        let attachments = recorder_attachments(&options);
        let views: Vec<_> = attachments.iter().map(|a| a.view).collect();
        assert_eq!(views, vec![view(0), view(2), view(1), view(3), view(4)]);
        // Resolve carries its color's clear value
        assert_eq!(attachments[2].clear, AttachmentClearValue::Color(red()));
        assert_eq!(attachments[3].clear, attachments[4].clear);
    }

    #[test]
    fn resolve_views_ignored_without_multisampling() {
        let options = RenderPassCommandRecorderOptions {
            color_attachments: vec![ColorAttachment {
                view: view(0),
                resolve_view: Some(view(1)),
                ..Default::default()
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: view(2),
                resolve_view: Some(view(3)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let views: Vec<_> = recorder_attachments(&options).iter().map(|a| a.view).collect();
        assert_eq!(views, vec![view(0), view(2)]);
    }

    #[test]
    fn only_cleared_attachments_carry_clear_values() {
        let options = RenderPassCommandRecorderOptions {
            color_attachments: vec![ColorAttachment {
                view: view(0),
                load_operation: AttachmentLoadOperation::Load,
                store_operation: AttachmentStoreOperation::Store,
                clear_value: red(),
                ..Default::default()
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: view(1),
                depth_load_operation: AttachmentLoadOperation::Load,
                stencil_load_operation: AttachmentLoadOperation::DontCare,
                clear_value: DepthStencilClearValue { depth: 0.5, stencil: 7 },
                ..Default::default()
            }),
            ..Default::default()
        };
        let attachments = recorder_attachments(&options);
        assert_eq!(
            attachments[0].clear,
            AttachmentClearValue::Color(ColorClearValue::Float([0.0; 4]))
        );
        assert_eq!(
            attachments[1].clear,
            AttachmentClearValue::DepthStencil(DepthStencilClearValue { depth: 0.0, stencil: 0 })
        );
    }

    #[test]
    fn stencil_clear_keeps_depth_stencil_value() {
        let options = RenderPassCommandRecorderOptions {
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: view(0),
                depth_load_operation: AttachmentLoadOperation::Load,
                stencil_load_operation: AttachmentLoadOperation::Clear,
                clear_value: DepthStencilClearValue { depth: 1.0, stencil: 3 },
                ..Default::default()
            }),
            ..Default::default()
        };
        let attachments = recorder_attachments(&options);
        assert_eq!(
            attachments[0].clear,
            AttachmentClearValue::DepthStencil(DepthStencilClearValue { depth: 1.0, stencil: 3 })
        );
    }

    fn native_views(view: Handle<TextureView>) -> Option<(vk::ImageView, Format)> {
        use ash::vk::Handle as _;
        let format = match view.index() {
            0..=2 => Format::B8G8R8A8Unorm,
            3 => Format::D24UnormS8Uint,
            4 => Format::D32Sfloat,
            _ => return None,
        };
        Some((vk::ImageView::from_raw(100 + view.index() as u64), format))
    }

    #[test]
    fn dynamic_rendering_uses_in_pass_layouts_and_resolves() {
        use ash::vk::Handle as _;
        let options = RenderPassCommandRecorderWithDynamicRenderingOptions {
            color_attachments: vec![ColorAttachment {
                view: view(0),
                resolve_view: Some(view(1)),
                layout: crate::types::TextureLayout::General,
                ..Default::default()
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: view(3),
                ..Default::default()
            }),
            samples: SampleCount::Samples4,
            ..Default::default()
        };
        let attachments = rendering_attachments(&options, native_views).unwrap();

        let color = attachments.colors[0];
        assert_eq!(color.image_view.as_raw(), 100);
        assert_eq!(color.image_layout, vk::ImageLayout::GENERAL);
        assert_eq!(color.resolve_mode, vk::ResolveModeFlags::AVERAGE);
        assert_eq!(color.resolve_image_view.as_raw(), 101);

        let depth = attachments.depth.unwrap();
        let stencil = attachments.stencil.unwrap();
        assert_eq!(depth.image_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(stencil.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(depth.image_view, stencil.image_view);
    }

    #[test]
    fn dynamic_rendering_skips_missing_aspects_and_single_sample_resolves() {
        let options = RenderPassCommandRecorderWithDynamicRenderingOptions {
            color_attachments: vec![ColorAttachment {
                view: view(0),
                resolve_view: Some(view(1)),
                ..Default::default()
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: view(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let attachments = rendering_attachments(&options, native_views).unwrap();
        assert_eq!(attachments.colors[0].resolve_mode, vk::ResolveModeFlags::NONE);
        assert!(attachments.depth.is_some());
        assert!(attachments.stencil.is_none());
    }

    #[test]
    fn dynamic_rendering_rejects_unknown_views() {
        let options = RenderPassCommandRecorderWithDynamicRenderingOptions {
            color_attachments: vec![ColorAttachment {
                view: view(9),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(rendering_attachments(&options, native_views).is_err());
    }

    #[test]
    fn invalid_recorder_gives_invalid_pass() {
        let mut manager = ResourceManager::new();
        let mut recorder = manager.create_command_recorder(Handle::null(), &CommandRecorderOptions::default());
        let mut pass = recorder.begin_render_pass(&RenderPassCommandRecorderOptions::default());
        assert!(!pass.is_valid());
        pass.draw(&DrawCommand::default());
        pass.end();
        assert!(!recorder.finish().is_valid());
    }
}
