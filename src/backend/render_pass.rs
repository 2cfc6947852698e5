// Render passes and framebuffers
//
// Render passes come from two places:
// - Synthesised from a RenderPassKey, built from the attachments given to a
//   render pass recorder (or a pipeline's render targets). Recorder passes are
//   cached per device, keyed on everything that affects compatibility and
//   load/store behaviour.
// - Created explicitly from RenderPassOptions, with any number of subpasses.
//
// Attachment order inside a synthesised pass is fixed: colors, color
// resolves, depth, depth resolve. Framebuffers follow the same order.

use super::enums::{
    access_flags_to_vk, dependency_flags_to_vk, format_to_vk, load_op_to_vk,
    pipeline_stage_flags_to_vk, resolve_mode_to_vk, sample_count_to_vk, store_op_to_vk,
    texture_layout_to_vk, aspect_flags_to_vk,
};
use super::device::VulkanDevice;
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::{
    AttachmentDescription, AttachmentReference, GraphicsPipelineOptions, RenderPassCommandRecorderOptions,
    RenderPassOptions, SubpassDescription,
};
use crate::resources::{Device, Framebuffer, RenderPass, TextureView};
use crate::types::{
    AttachmentLoadOperation, AttachmentStoreOperation, Extent2D, Format, ResolveMode, SampleCount,
    TextureLayout, REMAINING_ARRAY_LAYERS,
};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use ash::vk;

// ─────────────────────────────────────────────────────────────────────────────
// Cache keys
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachmentKey {
    pub format: Format,
    pub samples: SampleCount,
    pub load_operation: AttachmentLoadOperation,
    pub store_operation: AttachmentStoreOperation,
    pub initial_layout: TextureLayout,
    pub layout: TextureLayout,
    pub final_layout: TextureLayout,
    pub resolve_format: Option<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthAttachmentKey {
    pub format: Format,
    pub samples: SampleCount,
    pub depth_load_operation: AttachmentLoadOperation,
    pub depth_store_operation: AttachmentStoreOperation,
    pub stencil_load_operation: AttachmentLoadOperation,
    pub stencil_store_operation: AttachmentStoreOperation,
    pub initial_layout: TextureLayout,
    pub layout: TextureLayout,
    pub final_layout: TextureLayout,
    pub resolve_format: Option<Format>,
    pub depth_resolve_mode: ResolveMode,
    pub stencil_resolve_mode: ResolveMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassKey {
    pub color_attachments: Vec<ColorAttachmentKey>,
    pub depth_attachment: Option<DepthAttachmentKey>,
    pub view_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferKey {
    pub render_pass: Handle<RenderPass>,
    pub attachments: Vec<Handle<TextureView>>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub view_count: u32,
}

impl RenderPassKey {
    /// Key for a recorder's attachments. `view_format` resolves a view handle
    /// to the format it was created with.
    pub fn from_recorder_options<F>(options: &RenderPassCommandRecorderOptions, view_format: F) -> Result<Self>
    where
        F: Fn(Handle<TextureView>) -> Option<Format>,
    {
        let format_of = |view: Handle<TextureView>| {
            view_format(view).with_context(|| format!("Unknown attachment view {:?}", view))
        };

        let mut color_attachments = Vec::with_capacity(options.color_attachments.len());
        for attachment in &options.color_attachments {
            let resolve_format = match attachment.resolve_view {
                Some(view) if options.samples.is_multisampled() => Some(format_of(view)?),
                _ => None,
            };
            color_attachments.push(ColorAttachmentKey {
                format: format_of(attachment.view)?,
                samples: options.samples,
                load_operation: attachment.load_operation,
                store_operation: attachment.store_operation,
                initial_layout: attachment.initial_layout,
                layout: attachment.layout,
                final_layout: attachment.final_layout,
                resolve_format,
            });
        }

        let depth_attachment = match &options.depth_stencil_attachment {
            Some(depth) => {
                let resolve_format = match depth.resolve_view {
                    Some(view) if options.samples.is_multisampled() => Some(format_of(view)?),
                    _ => None,
                };
                Some(DepthAttachmentKey {
                    format: format_of(depth.view)?,
                    samples: options.samples,
                    depth_load_operation: depth.depth_load_operation,
                    depth_store_operation: depth.depth_store_operation,
                    stencil_load_operation: depth.stencil_load_operation,
                    stencil_store_operation: depth.stencil_store_operation,
                    initial_layout: depth.initial_layout,
                    layout: depth.layout,
                    final_layout: depth.final_layout,
                    resolve_format,
                    depth_resolve_mode: depth.depth_resolve_mode,
                    stencil_resolve_mode: depth.stencil_resolve_mode,
                })
            }
            None => None,
        };

        Ok(Self {
            color_attachments,
            depth_attachment,
            view_count: options.view_count.max(1),
        })
    }

    /// Key for a render pass compatible with a pipeline's render targets
    pub fn from_pipeline_options(options: &GraphicsPipelineOptions) -> Self {
        let samples = options.multisample.samples;
        let color_attachments = options
            .render_targets
            .iter()
            .map(|target| ColorAttachmentKey {
                format: target.format,
                samples,
                load_operation: AttachmentLoadOperation::Clear,
                store_operation: AttachmentStoreOperation::Store,
                initial_layout: TextureLayout::Undefined,
                layout: TextureLayout::ColorAttachmentOptimal,
                final_layout: TextureLayout::PresentSrc,
                resolve_format: samples.is_multisampled().then_some(target.format),
            })
            .collect();

        let depth_attachment = options.depth_stencil.as_ref().map(|depth| DepthAttachmentKey {
            format: depth.format,
            samples,
            depth_load_operation: AttachmentLoadOperation::Clear,
            depth_store_operation: AttachmentStoreOperation::Store,
            stencil_load_operation: AttachmentLoadOperation::DontCare,
            stencil_store_operation: AttachmentStoreOperation::DontCare,
            initial_layout: TextureLayout::Undefined,
            layout: TextureLayout::DepthStencilAttachmentOptimal,
            final_layout: TextureLayout::DepthStencilAttachmentOptimal,
            resolve_format: (depth.resolve_depth_stencil && samples.is_multisampled())
                .then_some(depth.format),
            depth_resolve_mode: ResolveMode::SampleZero,
            stencil_resolve_mode: ResolveMode::SampleZero,
        });

        Self {
            color_attachments,
            depth_attachment,
            view_count: options.view_count.max(1),
        }
    }

    /// Number of framebuffer attachments the synthesised pass expects
    pub fn attachment_count(&self) -> usize {
        let colors = self.color_attachments.len();
        let resolves = self
            .color_attachments
            .iter()
            .filter(|c| c.resolve_format.is_some())
            .count();
        let depth = self.depth_attachment.map_or(0, |d| 1 + d.resolve_format.is_some() as usize);
        colors + resolves + depth
    }

    /// Subpass view mask, 0 without multiview
    pub fn view_mask(&self) -> u32 {
        multiview_mask(self.view_count)
    }
}

/// All views `0..view_count` enabled, 0 for a single view
pub(crate) fn multiview_mask(view_count: u32) -> u32 {
    if view_count <= 1 {
        0
    } else if view_count >= 32 {
        u32::MAX
    } else {
        (1u32 << view_count) - 1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Native objects
// ─────────────────────────────────────────────────────────────────────────────

pub struct VulkanRenderPass {
    pub render_pass: vk::RenderPass,
    pub device: Handle<Device>,
    /// None for explicitly created passes
    pub key: Option<RenderPassKey>,
    pub attachment_count: usize,
    pub subpass_count: u32,
    pub view_count: u32,
}

pub struct VulkanFramebuffer {
    pub framebuffer: vk::Framebuffer,
    pub device: Handle<Device>,
    pub render_pass: Handle<RenderPass>,
    pub attachments: Vec<Handle<TextureView>>,
    pub extent: Extent2D,
    pub layers: u32,
}

/// References and resolve state of one subpass, kept alive while the
/// create info points into it
#[derive(Debug, Clone, Default)]
pub(crate) struct SubpassRefs {
    pub inputs: Vec<vk::AttachmentReference2>,
    pub colors: Vec<vk::AttachmentReference2>,
    pub resolves: Vec<vk::AttachmentReference2>,
    pub depth: Option<vk::AttachmentReference2>,
    pub depth_resolve: Option<vk::AttachmentReference2>,
    pub depth_resolve_mode: vk::ResolveModeFlags,
    pub stencil_resolve_mode: vk::ResolveModeFlags,
    pub preserve: Vec<u32>,
    pub view_mask: u32,
}

fn attachment_reference(index: usize, layout: TextureLayout) -> vk::AttachmentReference2 {
    vk::AttachmentReference2::builder()
        .attachment(index as u32)
        .layout(texture_layout_to_vk(layout))
        .build()
}

fn unused_reference() -> vk::AttachmentReference2 {
    vk::AttachmentReference2::builder()
        .attachment(vk::ATTACHMENT_UNUSED)
        .layout(vk::ImageLayout::UNDEFINED)
        .build()
}

#[allow(clippy::too_many_arguments)]
fn attachment_description(
    format: Format,
    samples: SampleCount,
    load: AttachmentLoadOperation,
    store: AttachmentStoreOperation,
    stencil_load: AttachmentLoadOperation,
    stencil_store: AttachmentStoreOperation,
    initial_layout: TextureLayout,
    final_layout: TextureLayout,
) -> vk::AttachmentDescription2 {
    vk::AttachmentDescription2::builder()
        .format(format_to_vk(format))
        .samples(sample_count_to_vk(samples))
        .load_op(load_op_to_vk(load))
        .store_op(store_op_to_vk(store))
        .stencil_load_op(load_op_to_vk(stencil_load))
        .stencil_store_op(store_op_to_vk(stencil_store))
        .initial_layout(texture_layout_to_vk(initial_layout))
        .final_layout(texture_layout_to_vk(final_layout))
        .build()
}

/// Write-after-write dependencies on the color and depth attachments, added
/// to every synthesised pass
pub(crate) fn implicit_dependencies() -> [vk::SubpassDependency2; 2] {
    let fragment_tests =
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    [
        vk::SubpassDependency2::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build(),
        vk::SubpassDependency2::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(fragment_tests)
            .dst_stage_mask(fragment_tests)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_access_mask(
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build(),
    ]
}

/// Attachment descriptions and the single subpass of a synthesised pass
pub(crate) fn describe_key(key: &RenderPassKey) -> (Vec<vk::AttachmentDescription2>, SubpassRefs) {
    let mut attachments = Vec::with_capacity(key.attachment_count());
    let mut refs = SubpassRefs {
        view_mask: key.view_mask(),
        ..Default::default()
    };

    for color in &key.color_attachments {
        refs.colors.push(attachment_reference(attachments.len(), color.layout));
        attachments.push(attachment_description(
            color.format,
            color.samples,
            color.load_operation,
            color.store_operation,
            AttachmentLoadOperation::DontCare,
            AttachmentStoreOperation::DontCare,
            color.initial_layout,
            color.final_layout,
        ));
    }

    // Resolve references pair up with colors, so the array is all or nothing
    if key.color_attachments.iter().any(|c| c.resolve_format.is_some()) {
        for color in &key.color_attachments {
            let Some(format) = color.resolve_format else {
                refs.resolves.push(unused_reference());
                continue;
            };
            refs.resolves
                .push(attachment_reference(attachments.len(), TextureLayout::ColorAttachmentOptimal));
            attachments.push(attachment_description(
                format,
                SampleCount::Samples1,
                AttachmentLoadOperation::DontCare,
                AttachmentStoreOperation::Store,
                AttachmentLoadOperation::DontCare,
                AttachmentStoreOperation::DontCare,
                TextureLayout::Undefined,
                color.final_layout,
            ));
        }
    }

    if let Some(depth) = &key.depth_attachment {
        refs.depth = Some(attachment_reference(attachments.len(), depth.layout));
        attachments.push(attachment_description(
            depth.format,
            depth.samples,
            depth.depth_load_operation,
            depth.depth_store_operation,
            depth.stencil_load_operation,
            depth.stencil_store_operation,
            depth.initial_layout,
            depth.final_layout,
        ));

        if let Some(format) = depth.resolve_format {
            refs.depth_resolve = Some(attachment_reference(
                attachments.len(),
                TextureLayout::DepthStencilAttachmentOptimal,
            ));
            refs.depth_resolve_mode = resolve_mode_to_vk(depth.depth_resolve_mode);
            refs.stencil_resolve_mode = if format.has_stencil() {
                resolve_mode_to_vk(depth.stencil_resolve_mode)
            } else {
                vk::ResolveModeFlags::NONE
            };
            attachments.push(attachment_description(
                format,
                SampleCount::Samples1,
                AttachmentLoadOperation::DontCare,
                AttachmentStoreOperation::Store,
                AttachmentLoadOperation::DontCare,
                AttachmentStoreOperation::Store,
                TextureLayout::Undefined,
                depth.final_layout,
            ));
        }
    }

    (attachments, refs)
}

/// Layout an input attachment is read in, derived from the attachment's final
/// layout and format
pub(crate) fn infer_input_attachment_layout(final_layout: TextureLayout, format: Format) -> TextureLayout {
    match final_layout {
        TextureLayout::ReadOnlyOptimal | TextureLayout::AttachmentOptimal => final_layout,
        TextureLayout::DepthAttachmentOptimal | TextureLayout::DepthReadOnlyOptimal => {
            TextureLayout::DepthReadOnlyOptimal
        }
        TextureLayout::StencilAttachmentOptimal | TextureLayout::StencilReadOnlyOptimal => {
            TextureLayout::StencilReadOnlyOptimal
        }
        TextureLayout::DepthStencilAttachmentOptimal
        | TextureLayout::DepthStencilReadOnlyOptimal
        | TextureLayout::DepthReadOnlyStencilAttachmentOptimal
        | TextureLayout::DepthAttachmentStencilReadOnlyOptimal => TextureLayout::DepthStencilReadOnlyOptimal,
        _ => match (format.has_depth(), format.has_stencil()) {
            (true, true) => TextureLayout::DepthStencilReadOnlyOptimal,
            (true, false) => TextureLayout::DepthReadOnlyOptimal,
            (false, true) => TextureLayout::StencilReadOnlyOptimal,
            (false, false) => TextureLayout::ShaderReadOnlyOptimal,
        },
    }
}

/// References of one explicit subpass. Missing layouts fall back to the
/// optimal layout for the reference kind; input layouts are inferred.
pub(crate) fn describe_subpass(
    subpass: &SubpassDescription,
    attachments: &[AttachmentDescription],
) -> Result<SubpassRefs> {
    let attachment = |reference: &AttachmentReference| {
        attachments
            .get(reference.attachment as usize)
            .with_context(|| format!("Attachment index {} out of range", reference.attachment))
    };
    let plain = |reference: &AttachmentReference, fallback: TextureLayout| {
        attachment(reference)?;
        Ok::<_, anyhow::Error>(attachment_reference(
            reference.attachment as usize,
            reference.layout.unwrap_or(fallback),
        ))
    };

    let mut refs = SubpassRefs {
        view_mask: subpass.view_mask,
        preserve: subpass.preserve_attachment_indices.clone(),
        ..Default::default()
    };

    for reference in &subpass.input_attachment_references {
        let description = attachment(reference)?;
        let layout = reference
            .layout
            .unwrap_or_else(|| infer_input_attachment_layout(description.final_layout, description.format));
        let aspects = if reference.aspect_enabled.is_empty() {
            description.format.default_aspects()
        } else {
            reference.aspect_enabled
        };
        refs.inputs.push(
            vk::AttachmentReference2::builder()
                .attachment(reference.attachment)
                .layout(texture_layout_to_vk(layout))
                .aspect_mask(aspect_flags_to_vk(aspects))
                .build(),
        );
    }
    for reference in &subpass.color_attachment_references {
        refs.colors.push(plain(reference, TextureLayout::ColorAttachmentOptimal)?);
    }
    if !subpass.resolve_attachment_references.is_empty() {
        if subpass.resolve_attachment_references.len() != subpass.color_attachment_references.len() {
            bail!(
                "{} resolve references for {} color references",
                subpass.resolve_attachment_references.len(),
                subpass.color_attachment_references.len()
            );
        }
        for reference in &subpass.resolve_attachment_references {
            refs.resolves.push(plain(reference, TextureLayout::ColorAttachmentOptimal)?);
        }
    }
    if let Some(reference) = &subpass.depth_attachment_reference {
        refs.depth = Some(plain(reference, TextureLayout::DepthStencilAttachmentOptimal)?);
    }
    if let Some(reference) = &subpass.depth_resolve_attachment_reference {
        refs.depth_resolve = Some(plain(reference, TextureLayout::DepthStencilAttachmentOptimal)?);
        refs.depth_resolve_mode = resolve_mode_to_vk(subpass.depth_resolve_mode);
        refs.stencil_resolve_mode = resolve_mode_to_vk(subpass.stencil_resolve_mode);
    }
    Ok(refs)
}

/// Every subpass needs a view mask once correlated masks enable multiview
pub(crate) fn multiview_masks_valid(options: &RenderPassOptions) -> bool {
    options.correlated_view_masks.is_empty() || options.subpasses.iter().all(|s| s.view_mask != 0)
}

fn create_native_render_pass(
    device: &VulkanDevice,
    attachments: &[vk::AttachmentDescription2],
    subpass_refs: &[SubpassRefs],
    dependencies: &[vk::SubpassDependency2],
    correlated_view_masks: &[u32],
) -> Result<vk::RenderPass> {
    let mut depth_resolves: Vec<Option<vk::SubpassDescriptionDepthStencilResolve>> = subpass_refs
        .iter()
        .map(|refs| {
            refs.depth_resolve.as_ref().map(|reference| {
                vk::SubpassDescriptionDepthStencilResolve::builder()
                    .depth_resolve_mode(refs.depth_resolve_mode)
                    .stencil_resolve_mode(refs.stencil_resolve_mode)
                    .depth_stencil_resolve_attachment(reference)
                    .build()
            })
        })
        .collect();

    let subpasses: Vec<vk::SubpassDescription2> = subpass_refs
        .iter()
        .zip(depth_resolves.iter_mut())
        .map(|(refs, depth_resolve)| {
            let mut subpass = vk::SubpassDescription2::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .view_mask(refs.view_mask)
                .input_attachments(&refs.inputs)
                .color_attachments(&refs.colors)
                .preserve_attachments(&refs.preserve);
            if !refs.resolves.is_empty() {
                subpass = subpass.resolve_attachments(&refs.resolves);
            }
            if let Some(depth) = &refs.depth {
                subpass = subpass.depth_stencil_attachment(depth);
            }
            if let Some(resolve) = depth_resolve {
                subpass = subpass.push_next(resolve);
            }
            subpass.build()
        })
        .collect();

    let create_info = vk::RenderPassCreateInfo2::builder()
        .attachments(attachments)
        .subpasses(&subpasses)
        .dependencies(dependencies)
        .correlated_view_masks(correlated_view_masks);

    device
        .create_render_pass2(&create_info)
        .context("vkCreateRenderPass2 failed")
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourceManager
// ─────────────────────────────────────────────────────────────────────────────

impl ResourceManager {
    /// Create an explicit multi-subpass render pass
    pub fn create_render_pass(&mut self, device: Handle<Device>, options: &RenderPassOptions) -> Handle<RenderPass> {
        match self.try_create_render_pass(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create render pass: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_render_pass(
        &mut self,
        device_handle: Handle<Device>,
        options: &RenderPassOptions,
    ) -> Result<Handle<RenderPass>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        if options.subpasses.is_empty() {
            bail!("A render pass needs at least one subpass");
        }
        let masks_valid = multiview_masks_valid(options);
        debug_assert!(masks_valid, "multiview render pass with a zero subpass view mask");
        if !masks_valid {
            bail!("Multiview is enabled but a subpass has a zero view mask");
        }

        let attachments: Vec<vk::AttachmentDescription2> = options
            .attachments
            .iter()
            .map(|a| {
                attachment_description(
                    a.format,
                    a.samples,
                    a.load_operation,
                    a.store_operation,
                    a.stencil_load_operation,
                    a.stencil_store_operation,
                    a.initial_layout,
                    a.final_layout,
                )
            })
            .collect();
        let subpass_refs = options
            .subpasses
            .iter()
            .enumerate()
            .map(|(i, subpass)| {
                describe_subpass(subpass, &options.attachments).with_context(|| format!("Subpass {}", i))
            })
            .collect::<Result<Vec<_>>>()?;
        let dependencies: Vec<vk::SubpassDependency2> = options
            .dependencies
            .iter()
            .map(|d| {
                vk::SubpassDependency2::builder()
                    .src_subpass(d.src_subpass)
                    .dst_subpass(d.dst_subpass)
                    .src_stage_mask(pipeline_stage_flags_to_vk(d.src_stage_mask))
                    .dst_stage_mask(pipeline_stage_flags_to_vk(d.dst_stage_mask))
                    .src_access_mask(access_flags_to_vk(d.src_access_mask))
                    .dst_access_mask(access_flags_to_vk(d.dst_access_mask))
                    .dependency_flags(dependency_flags_to_vk(d.dependency_flags))
                    .view_offset(d.view_offset)
                    .build()
            })
            .collect();

        let render_pass = create_native_render_pass(
            device,
            &attachments,
            &subpass_refs,
            &dependencies,
            &options.correlated_view_masks,
        )?;
        device.set_object_name(render_pass, &options.label);

        let view_count = options
            .subpasses
            .iter()
            .map(|s| 32 - s.view_mask.leading_zeros())
            .max()
            .unwrap_or(0)
            .max(1);
        Ok(self.render_passes.emplace(VulkanRenderPass {
            render_pass,
            device: device_handle,
            key: None,
            attachment_count: options.attachments.len(),
            subpass_count: options.subpasses.len() as u32,
            view_count,
        }))
    }

    /// Create an uncached render pass for a key
    pub(crate) fn create_render_pass_for_key(
        &mut self,
        device_handle: Handle<Device>,
        key: &RenderPassKey,
    ) -> Result<Handle<RenderPass>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let (attachments, refs) = describe_key(key);
        let view_mask = key.view_mask();
        let correlated: &[u32] = if view_mask != 0 { &[view_mask] } else { &[] };
        let render_pass = create_native_render_pass(
            device,
            &attachments,
            std::slice::from_ref(&refs),
            &implicit_dependencies(),
            correlated,
        )?;
        log::debug!(
            "Created render pass with {} attachments ({} views)",
            attachments.len(),
            key.view_count
        );
        Ok(self.render_passes.emplace(VulkanRenderPass {
            render_pass,
            device: device_handle,
            key: Some(key.clone()),
            attachment_count: attachments.len(),
            subpass_count: 1,
            view_count: key.view_count,
        }))
    }

    /// Find or create the render pass for a key in the device cache
    pub(crate) fn cached_render_pass(
        &mut self,
        device_handle: Handle<Device>,
        key: &RenderPassKey,
    ) -> Result<Handle<RenderPass>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        if let Some(handle) = device.render_pass_cache.get(key) {
            if self.render_passes.contains(*handle) {
                return Ok(*handle);
            }
        }
        let handle = self.create_render_pass_for_key(device_handle, key)?;
        if let Some(device) = self.devices.get_mut(device_handle) {
            device.render_pass_cache.insert(key.clone(), handle);
        }
        Ok(handle)
    }

    /// Find or create the framebuffer for a key in the device cache
    pub(crate) fn cached_framebuffer(
        &mut self,
        device_handle: Handle<Device>,
        key: &FramebufferKey,
    ) -> Result<Handle<Framebuffer>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        if let Some(handle) = device.framebuffer_cache.get(key) {
            if self.framebuffers.contains(*handle) {
                return Ok(*handle);
            }
        }

        let Some(render_pass) = self.render_passes.get(key.render_pass) else {
            bail!("Unknown render pass {:?}", key.render_pass);
        };
        if render_pass.attachment_count != key.attachments.len() {
            bail!(
                "Render pass expects {} attachments, {} given",
                render_pass.attachment_count,
                key.attachments.len()
            );
        }
        let views = key
            .attachments
            .iter()
            .map(|h| {
                self.texture_views
                    .get(*h)
                    .map(|v| v.view)
                    .with_context(|| format!("Unknown attachment view {:?}", h))
            })
            .collect::<Result<Vec<_>>>()?;

        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.render_pass)
            .attachments(&views)
            .width(key.width)
            .height(key.height)
            .layers(key.layers.max(1));
        let framebuffer = unsafe { device.device.create_framebuffer(&create_info, None) }
            .context("vkCreateFramebuffer failed")?;

        log::debug!(
            "Created framebuffer {}x{}x{} with {} attachments",
            key.width,
            key.height,
            key.layers,
            views.len()
        );
        let handle = self.framebuffers.emplace(VulkanFramebuffer {
            framebuffer,
            device: device_handle,
            render_pass: key.render_pass,
            attachments: key.attachments.clone(),
            extent: Extent2D {
                width: key.width,
                height: key.height,
            },
            layers: key.layers.max(1),
        });
        if let Some(device) = self.devices.get_mut(device_handle) {
            device.framebuffer_cache.insert(key.clone(), handle);
        }
        Ok(handle)
    }

    /// Framebuffer size from the first attachment, where the caller left it 0.
    /// Multiview framebuffers always have one layer.
    pub(crate) fn framebuffer_dimensions(
        &self,
        first_view: Handle<TextureView>,
        requested: (u32, u32, u32),
        view_count: u32,
    ) -> Result<(u32, u32, u32)> {
        let (width, height, layers) = requested;
        let view = self
            .texture_views
            .get(first_view)
            .with_context(|| format!("Unknown attachment view {:?}", first_view))?;
        let texture = self
            .textures
            .get(view.texture)
            .with_context(|| format!("Attachment view {:?} has no texture", first_view))?;

        let mip = view.range.base_mip_level;
        let width = if width == 0 { (texture.extent.width >> mip).max(1) } else { width };
        let height = if height == 0 { (texture.extent.height >> mip).max(1) } else { height };
        let layers = if view_count > 1 {
            1
        } else if layers != 0 {
            layers
        } else if view.range.layer_count == REMAINING_ARRAY_LAYERS {
            texture.array_layers.saturating_sub(view.range.base_array_layer).max(1)
        } else {
            view.range.layer_count.max(1)
        };
        Ok((width, height, layers))
    }

    /// Drop cached framebuffers that reference a view about to be destroyed
    pub(crate) fn evict_framebuffers_using(&mut self, view: Handle<TextureView>) {
        let stale: Vec<Handle<Framebuffer>> = self
            .framebuffers
            .iter()
            .filter(|(_, fb)| fb.attachments.contains(&view))
            .map(|(h, _)| h)
            .collect();
        for handle in stale {
            let Some(fb) = self.framebuffers.remove(handle) else {
                continue;
            };
            if let Some(device) = self.devices.get_mut(fb.device) {
                let forgotten = take_framebuffers_using(&mut device.framebuffer_cache, view);
                log::trace!("Evicted {} cached framebuffers using {:?}", forgotten.len(), view);
                unsafe { device.device.destroy_framebuffer(fb.framebuffer, None) };
            }
        }
    }

    /// Destroy a render pass and every framebuffer built against it
    pub fn delete_render_pass(&mut self, handle: Handle<RenderPass>) {
        let Some(render_pass) = self.render_passes.remove(handle) else {
            return;
        };
        let framebuffers: Vec<Handle<Framebuffer>> = self
            .framebuffers
            .iter()
            .filter(|(_, fb)| fb.render_pass == handle)
            .map(|(h, _)| h)
            .collect();
        let Some(device) = self.devices.get_mut(render_pass.device) else {
            log::error!("Render pass {:?} outlived its device", handle);
            return;
        };
        for fb_handle in framebuffers {
            if let Some(fb) = self.framebuffers.remove(fb_handle) {
                unsafe { device.device.destroy_framebuffer(fb.framebuffer, None) };
            }
        }
        device.framebuffer_cache.retain(|key, _| key.render_pass != handle);
        device.render_pass_cache.retain(|_, h| *h != handle);
        unsafe { device.device.destroy_render_pass(render_pass.render_pass, None) };
    }

    pub fn get_render_pass(&self, handle: Handle<RenderPass>) -> Option<&VulkanRenderPass> {
        self.render_passes.get(handle)
    }

    pub fn get_framebuffer(&self, handle: Handle<Framebuffer>) -> Option<&VulkanFramebuffer> {
        self.framebuffers.get(handle)
    }

    /// Render passes currently held in a device's cache
    pub fn cached_render_pass_count(&self, device: Handle<Device>) -> usize {
        self.devices.get(device).map_or(0, |d| d.render_pass_cache.len())
    }

    /// Framebuffers currently held in a device's cache
    pub fn cached_framebuffer_count(&self, device: Handle<Device>) -> usize {
        self.devices.get(device).map_or(0, |d| d.framebuffer_cache.len())
    }
}

/// Remove every cache entry whose attachments include `view`, returning the
/// framebuffers those entries pointed at
pub(crate) fn take_framebuffers_using(
    cache: &mut HashMap<FramebufferKey, Handle<Framebuffer>>,
    view: Handle<TextureView>,
) -> Vec<Handle<Framebuffer>> {
    let mut taken = Vec::new();
    cache.retain(|key, framebuffer| {
        let uses_view = key.attachments.contains(&view);
        if uses_view {
            taken.push(*framebuffer);
        }
        !uses_view
    });
    taken.sort();
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ColorAttachment, DepthStencilAttachment, DepthStencilOptions, RenderTargetOptions};

    fn view(index: u32) -> Handle<TextureView> {
        Handle::new(index, 1)
    }

    fn formats(h: Handle<TextureView>) -> Option<Format> {
        match h.index() {
            1 | 2 => Some(Format::B8G8R8A8Unorm),
            3 => Some(Format::D24UnormS8Uint),
            _ => None,
        }
    }

    fn msaa_options() -> RenderPassCommandRecorderOptions {
        RenderPassCommandRecorderOptions {
            color_attachments: vec![ColorAttachment {
                view: view(1),
                resolve_view: Some(view(2)),
                ..Default::default()
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: view(3),
                ..Default::default()
            }),
            samples: SampleCount::Samples4,
            ..Default::default()
        }
    }

    fn framebuffer_key(attachments: &[u32], view_count: u32) -> FramebufferKey {
        FramebufferKey {
            render_pass: Handle::new(0, 1),
            attachments: attachments.iter().map(|i| view(*i)).collect(),
            width: 64,
            height: 64,
            layers: 1,
            view_count,
        }
    }

    #[test]
    fn eviction_forgets_only_framebuffers_using_the_view() {
        let mut cache = HashMap::new();
        cache.insert(framebuffer_key(&[1, 2], 1), Handle::<Framebuffer>::new(0, 1));
        cache.insert(framebuffer_key(&[3], 1), Handle::new(1, 1));
        cache.insert(framebuffer_key(&[4, 1], 1), Handle::new(2, 1));

        let taken = take_framebuffers_using(&mut cache, view(1));
        assert_eq!(taken, vec![Handle::new(0, 1), Handle::new(2, 1)]);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key(&framebuffer_key(&[3], 1)));

        assert!(take_framebuffers_using(&mut cache, view(1)).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn framebuffer_keys_differ_by_view_count() {
        let mut cache = HashMap::new();
        cache.insert(framebuffer_key(&[1], 1), Handle::<Framebuffer>::new(0, 1));
        cache.insert(framebuffer_key(&[1], 2), Handle::new(1, 1));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[&framebuffer_key(&[1], 2)], Handle::new(1, 1));
    }

    #[test]
    fn equal_options_give_equal_keys() {
        let a = RenderPassKey::from_recorder_options(&msaa_options(), formats).unwrap();
        let b = RenderPassKey::from_recorder_options(&msaa_options(), formats).unwrap();
        assert_eq!(a, b);

        let mut other = msaa_options();
        other.color_attachments[0].load_operation = AttachmentLoadOperation::Load;
        let c = RenderPassKey::from_recorder_options(&other, formats).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn resolve_only_counts_when_multisampled() {
        let key = RenderPassKey::from_recorder_options(&msaa_options(), formats).unwrap();
        assert_eq!(key.color_attachments[0].resolve_format, Some(Format::B8G8R8A8Unorm));
        assert_eq!(key.attachment_count(), 3);

        let mut single = msaa_options();
        single.samples = SampleCount::Samples1;
        let key = RenderPassKey::from_recorder_options(&single, formats).unwrap();
        assert_eq!(key.color_attachments[0].resolve_format, None);
        assert_eq!(key.attachment_count(), 2);
    }

    #[test]
    fn unknown_view_is_an_error() {
        let mut options = msaa_options();
        options.color_attachments[0].view = view(9);
        assert!(RenderPassKey::from_recorder_options(&options, formats).is_err());
    }

    #[test]
    fn synthesised_attachment_order() {
        let mut options = msaa_options();
        options.depth_stencil_attachment.as_mut().unwrap().resolve_view = Some(view(3));
        let key = RenderPassKey::from_recorder_options(&options, formats).unwrap();
        let (attachments, refs) = describe_key(&key);

        assert_eq!(attachments.len(), 4);
        assert_eq!(attachments[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[1].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments[2].format, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(refs.colors[0].attachment, 0);
        assert_eq!(refs.resolves[0].attachment, 1);
        assert_eq!(refs.depth.unwrap().attachment, 2);
        assert_eq!(refs.depth_resolve.unwrap().attachment, 3);
        assert_eq!(refs.depth_resolve_mode, vk::ResolveModeFlags::SAMPLE_ZERO);
        assert_eq!(refs.view_mask, 0);
    }

    #[test]
    fn references_use_in_pass_layouts() {
        let (_, refs) = describe_key(&RenderPassKey::from_recorder_options(&msaa_options(), formats).unwrap());
        assert_eq!(refs.colors[0].layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(refs.depth.unwrap().layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let mut options = msaa_options();
        options.color_attachments[0].layout = TextureLayout::General;
        if let Some(depth) = options.depth_stencil_attachment.as_mut() {
            depth.layout = TextureLayout::DepthStencilReadOnlyOptimal;
        }
        let key = RenderPassKey::from_recorder_options(&options, formats).unwrap();
        assert_ne!(key, RenderPassKey::from_recorder_options(&msaa_options(), formats).unwrap());
        let (_, refs) = describe_key(&key);
        assert_eq!(refs.colors[0].layout, vk::ImageLayout::GENERAL);
        assert_eq!(refs.resolves[0].layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(refs.depth.unwrap().layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn partial_resolves_use_unused_references() {
        let key = RenderPassKey {
            color_attachments: vec![
                ColorAttachmentKey {
                    format: Format::R8G8B8A8Unorm,
                    samples: SampleCount::Samples4,
                    load_operation: AttachmentLoadOperation::Clear,
                    store_operation: AttachmentStoreOperation::Store,
                    initial_layout: TextureLayout::Undefined,
                    layout: TextureLayout::ColorAttachmentOptimal,
                    final_layout: TextureLayout::ShaderReadOnlyOptimal,
                    resolve_format: None,
                },
                ColorAttachmentKey {
                    format: Format::R8G8B8A8Unorm,
                    samples: SampleCount::Samples4,
                    load_operation: AttachmentLoadOperation::Clear,
                    store_operation: AttachmentStoreOperation::Store,
                    initial_layout: TextureLayout::Undefined,
                    layout: TextureLayout::ColorAttachmentOptimal,
                    final_layout: TextureLayout::ShaderReadOnlyOptimal,
                    resolve_format: Some(Format::R8G8B8A8Unorm),
                },
            ],
            depth_attachment: None,
            view_count: 1,
        };
        let (attachments, refs) = describe_key(&key);
        assert_eq!(attachments.len(), 3);
        assert_eq!(refs.resolves.len(), 2);
        assert_eq!(refs.resolves[0].attachment, vk::ATTACHMENT_UNUSED);
        assert_eq!(refs.resolves[1].attachment, 2);
    }

    #[test]
    fn multiview_mask_covers_all_views() {
        assert_eq!(multiview_mask(1), 0);
        assert_eq!(multiview_mask(2), 0b11);
        assert_eq!(multiview_mask(6), 0b11_1111);
        let key = RenderPassKey {
            view_count: 2,
            ..Default::default()
        };
        assert_eq!(key.view_mask(), 0b11);
    }

    #[test]
    fn implicit_dependencies_are_write_after_write() {
        let [color, depth] = implicit_dependencies();
        assert_eq!(color.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(color.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert!(color.dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(depth.src_access_mask, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);
        assert!(depth
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn pipeline_key_matches_render_targets() {
        let options = GraphicsPipelineOptions {
            render_targets: vec![RenderTargetOptions {
                format: Format::B8G8R8A8Srgb,
                ..Default::default()
            }],
            depth_stencil: Some(DepthStencilOptions {
                format: Format::D32Sfloat,
                ..Default::default()
            }),
            view_count: 2,
            ..Default::default()
        };
        let key = RenderPassKey::from_pipeline_options(&options);
        assert_eq!(key.color_attachments[0].format, Format::B8G8R8A8Srgb);
        assert_eq!(key.color_attachments[0].resolve_format, None);
        assert_eq!(key.depth_attachment.unwrap().format, Format::D32Sfloat);
        assert_eq!(key.view_mask(), 0b11);
    }

    #[test]
    fn input_layouts_follow_final_layout_then_format() {
        use TextureLayout::*;
        assert_eq!(infer_input_attachment_layout(ColorAttachmentOptimal, Format::R8G8B8A8Unorm), ShaderReadOnlyOptimal);
        assert_eq!(infer_input_attachment_layout(DepthAttachmentOptimal, Format::D32Sfloat), DepthReadOnlyOptimal);
        assert_eq!(infer_input_attachment_layout(StencilAttachmentOptimal, Format::S8Uint), StencilReadOnlyOptimal);
        assert_eq!(
            infer_input_attachment_layout(DepthStencilAttachmentOptimal, Format::D24UnormS8Uint),
            DepthStencilReadOnlyOptimal
        );
        assert_eq!(infer_input_attachment_layout(ReadOnlyOptimal, Format::D32Sfloat), ReadOnlyOptimal);
        assert_eq!(infer_input_attachment_layout(AttachmentOptimal, Format::R8G8B8A8Unorm), AttachmentOptimal);
        assert_eq!(infer_input_attachment_layout(General, Format::D32Sfloat), DepthReadOnlyOptimal);
        assert_eq!(infer_input_attachment_layout(General, Format::D24UnormS8Uint), DepthStencilReadOnlyOptimal);
    }

    #[test]
    fn explicit_input_layout_wins() {
        let attachments = [AttachmentDescription {
            format: Format::D32Sfloat,
            final_layout: TextureLayout::DepthAttachmentOptimal,
            ..Default::default()
        }];
        let subpass = SubpassDescription {
            input_attachment_references: vec![
                AttachmentReference::new(0),
                AttachmentReference {
                    attachment: 0,
                    layout: Some(TextureLayout::General),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let refs = describe_subpass(&subpass, &attachments).unwrap();
        assert_eq!(refs.inputs[0].layout, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
        assert_eq!(refs.inputs[0].aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(refs.inputs[1].layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn out_of_range_reference_is_rejected() {
        let subpass = SubpassDescription {
            color_attachment_references: vec![AttachmentReference::new(3)],
            ..Default::default()
        };
        assert!(describe_subpass(&subpass, &[AttachmentDescription::default()]).is_err());
    }

    #[test]
    fn multiview_requires_subpass_masks() {
        let mut options = RenderPassOptions {
            subpasses: vec![SubpassDescription::default()],
            correlated_view_masks: vec![0b11],
            ..Default::default()
        };
        assert!(!multiview_masks_valid(&options));
        options.subpasses[0].view_mask = 0b11;
        assert!(multiview_masks_valid(&options));
        options.correlated_view_masks.clear();
        options.subpasses[0].view_mask = 0;
        assert!(multiview_masks_valid(&options));
    }
}
