// Render pass options
//
// Two ways to describe render targets:
// - RenderPassCommandRecorderOptions: per-recording attachments, the render
//   pass and framebuffer are derived and cached on the device.
// - RenderPassOptions: an explicit multi-subpass render pass created up front
//   and used with RenderPassCommandRecorderWithRenderPassOptions.

use crate::handle::Handle;
use crate::resources::{RenderPass, TextureView};
use crate::types::{
    AccessFlags, AttachmentLoadOperation, AttachmentStoreOperation, ColorClearValue,
    DependencyFlags, DepthStencilClearValue, Format, PipelineStageFlags, ResolveMode, SampleCount,
    TextureAspectFlags, TextureLayout, EXTERNAL_SUBPASS,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub view: Handle<TextureView>,
    pub resolve_view: Option<Handle<TextureView>>,
    pub load_operation: AttachmentLoadOperation,
    pub store_operation: AttachmentStoreOperation,
    pub clear_value: ColorClearValue,
    pub initial_layout: TextureLayout,
    /// Layout the view is in while the pass runs
    pub layout: TextureLayout,
    pub final_layout: TextureLayout,
}

impl Default for ColorAttachment {
    fn default() -> Self {
        Self {
            view: Handle::null(),
            resolve_view: None,
            load_operation: AttachmentLoadOperation::Clear,
            store_operation: AttachmentStoreOperation::Store,
            clear_value: ColorClearValue::default(),
            initial_layout: TextureLayout::Undefined,
            layout: TextureLayout::ColorAttachmentOptimal,
            final_layout: TextureLayout::PresentSrc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilAttachment {
    pub view: Handle<TextureView>,
    pub resolve_view: Option<Handle<TextureView>>,
    pub depth_resolve_mode: ResolveMode,
    pub stencil_resolve_mode: ResolveMode,
    pub depth_load_operation: AttachmentLoadOperation,
    pub depth_store_operation: AttachmentStoreOperation,
    pub stencil_load_operation: AttachmentLoadOperation,
    pub stencil_store_operation: AttachmentStoreOperation,
    pub clear_value: DepthStencilClearValue,
    pub initial_layout: TextureLayout,
    pub layout: TextureLayout,
    pub final_layout: TextureLayout,
}

impl Default for DepthStencilAttachment {
    fn default() -> Self {
        Self {
            view: Handle::null(),
            resolve_view: None,
            depth_resolve_mode: ResolveMode::SampleZero,
            stencil_resolve_mode: ResolveMode::SampleZero,
            depth_load_operation: AttachmentLoadOperation::Clear,
            depth_store_operation: AttachmentStoreOperation::Store,
            stencil_load_operation: AttachmentLoadOperation::DontCare,
            stencil_store_operation: AttachmentStoreOperation::DontCare,
            clear_value: DepthStencilClearValue::default(),
            initial_layout: TextureLayout::Undefined,
            layout: TextureLayout::DepthStencilAttachmentOptimal,
            final_layout: TextureLayout::DepthStencilAttachmentOptimal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPassCommandRecorderOptions {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
    pub samples: SampleCount,
    pub view_count: u32,
    /// 0 takes the size from the first color attachment's texture
    pub framebuffer_width: u32,
    pub framebuffer_height: u32,
    pub framebuffer_array_layers: u32,
}

impl Default for RenderPassCommandRecorderOptions {
    fn default() -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_stencil_attachment: None,
            samples: SampleCount::Samples1,
            view_count: 1,
            framebuffer_width: 0,
            framebuffer_height: 0,
            framebuffer_array_layers: 0,
        }
    }
}

/// Attachments of a pass recorded with vkCmdBeginRendering. Each view stays in
/// its `layout` for the whole pass. `initial_layout` and `final_layout` are
/// not used, so transitions in and out of the pass are recorded as barriers.
pub type RenderPassCommandRecorderWithDynamicRenderingOptions = RenderPassCommandRecorderOptions;

// ─────────────────────────────────────────────────────────────────────────────
// Explicit render passes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDescription {
    pub format: Format,
    pub samples: SampleCount,
    pub load_operation: AttachmentLoadOperation,
    pub store_operation: AttachmentStoreOperation,
    pub stencil_load_operation: AttachmentLoadOperation,
    pub stencil_store_operation: AttachmentStoreOperation,
    pub initial_layout: TextureLayout,
    pub final_layout: TextureLayout,
}

impl Default for AttachmentDescription {
    fn default() -> Self {
        Self {
            format: Format::R8G8B8A8Unorm,
            samples: SampleCount::Samples1,
            load_operation: AttachmentLoadOperation::Clear,
            store_operation: AttachmentStoreOperation::Store,
            stencil_load_operation: AttachmentLoadOperation::DontCare,
            stencil_store_operation: AttachmentStoreOperation::DontCare,
            initial_layout: TextureLayout::Undefined,
            final_layout: TextureLayout::ShaderReadOnlyOptimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentReference {
    pub attachment: u32,
    /// None infers the layout (input attachments) or uses the attachment
    /// optimal layout for the reference kind
    pub layout: Option<TextureLayout>,
    /// Empty takes the aspects of the attachment format
    pub aspect_enabled: TextureAspectFlags,
}

impl AttachmentReference {
    pub fn new(attachment: u32) -> Self {
        Self {
            attachment,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpassDescription {
    pub input_attachment_references: Vec<AttachmentReference>,
    pub color_attachment_references: Vec<AttachmentReference>,
    pub resolve_attachment_references: Vec<AttachmentReference>,
    pub depth_attachment_reference: Option<AttachmentReference>,
    pub depth_resolve_attachment_reference: Option<AttachmentReference>,
    pub depth_resolve_mode: ResolveMode,
    pub stencil_resolve_mode: ResolveMode,
    pub preserve_attachment_indices: Vec<u32>,
    /// Must be non-zero when the render pass uses multiview
    pub view_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: PipelineStageFlags,
    pub dst_stage_mask: PipelineStageFlags,
    pub src_access_mask: AccessFlags,
    pub dst_access_mask: AccessFlags,
    pub dependency_flags: DependencyFlags,
    pub view_offset: i32,
}

impl Default for SubpassDependency {
    fn default() -> Self {
        Self {
            src_subpass: EXTERNAL_SUBPASS,
            dst_subpass: 0,
            src_stage_mask: PipelineStageFlags::empty(),
            dst_stage_mask: PipelineStageFlags::empty(),
            src_access_mask: AccessFlags::empty(),
            dst_access_mask: AccessFlags::empty(),
            dependency_flags: DependencyFlags::empty(),
            view_offset: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassOptions {
    pub label: Option<String>,
    pub attachments: Vec<AttachmentDescription>,
    pub subpasses: Vec<SubpassDescription>,
    pub dependencies: Vec<SubpassDependency>,
    /// Non-empty enables multiview
    pub correlated_view_masks: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentClearValue {
    Color(ColorClearValue),
    DepthStencil(DepthStencilClearValue),
}

impl Default for AttachmentClearValue {
    fn default() -> Self {
        AttachmentClearValue::Color(ColorClearValue::default())
    }
}

/// One framebuffer attachment, in the render pass's attachment order
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FramebufferAttachment {
    pub view: Handle<TextureView>,
    pub clear: AttachmentClearValue,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassCommandRecorderWithRenderPassOptions {
    pub render_pass: Handle<RenderPass>,
    pub attachments: Vec<FramebufferAttachment>,
    pub view_count: u32,
    pub framebuffer_width: u32,
    pub framebuffer_height: u32,
    pub framebuffer_array_layers: u32,
}
