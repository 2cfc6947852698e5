// Render pass and framebuffer caching

mod common;

use gpu_forge::resources::{Texture, TextureView};
use gpu_forge::{
    AttachmentLoadOperation, ColorAttachment, ColorClearValue, CommandRecorderOptions, Extent3D, Format, Handle,
    RenderPassCommandRecorderOptions, TextureLayout, TextureOptions, TextureUsageFlags, TextureViewOptions,
};

fn color_target(gpu: &mut common::Gpu, width: u32, format: Format) -> (Handle<Texture>, Handle<TextureView>) {
    let texture = gpu.rm.create_texture(
        gpu.device,
        &TextureOptions {
            label: Some("color target".to_string()),
            format,
            extent: Extent3D {
                width,
                height: 32,
                depth: 1,
            },
            usage: TextureUsageFlags::COLOR_ATTACHMENT,
            ..Default::default()
        },
        None,
    );
    let view = gpu.rm.create_texture_view(texture, &TextureViewOptions::default());
    assert!(view.is_valid());
    (texture, view)
}

fn pass_options(view: Handle<TextureView>) -> RenderPassCommandRecorderOptions {
    RenderPassCommandRecorderOptions {
        color_attachments: vec![ColorAttachment {
            view,
            load_operation: AttachmentLoadOperation::Clear,
            clear_value: ColorClearValue::Float([0.0, 0.0, 0.0, 1.0]),
            initial_layout: TextureLayout::Undefined,
            final_layout: TextureLayout::ColorAttachmentOptimal,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn record_empty_pass(gpu: &mut common::Gpu, view: Handle<TextureView>) {
    let device = gpu.device;
    let mut recorder = gpu.rm.create_command_recorder(device, &CommandRecorderOptions::default());
    {
        let pass = recorder.begin_render_pass(&pass_options(view));
        assert!(pass.is_valid());
        pass.end();
    }
    let command_buffer = recorder.finish();
    gpu.rm.delete_command_buffer(command_buffer);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn identical_passes_share_cache_entries() {
    let Some(mut gpu) = common::gpu() else { return };
    let (_, view) = color_target(&mut gpu, 32, Format::R8G8B8A8Unorm);

    record_empty_pass(&mut gpu, view);
    record_empty_pass(&mut gpu, view);

    assert_eq!(gpu.rm.cached_render_pass_count(gpu.device), 1);
    assert_eq!(gpu.rm.cached_framebuffer_count(gpu.device), 1);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn new_view_reuses_render_pass_but_not_framebuffer() {
    let Some(mut gpu) = common::gpu() else { return };
    let (_, first) = color_target(&mut gpu, 32, Format::R8G8B8A8Unorm);
    let (_, second) = color_target(&mut gpu, 64, Format::R8G8B8A8Unorm);

    record_empty_pass(&mut gpu, first);
    record_empty_pass(&mut gpu, second);

    // Same formats and load/store operations, different attachments
    assert_eq!(gpu.rm.cached_render_pass_count(gpu.device), 1);
    assert_eq!(gpu.rm.cached_framebuffer_count(gpu.device), 2);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn deleting_a_view_evicts_its_framebuffers() {
    let Some(mut gpu) = common::gpu() else { return };
    let (texture, view) = color_target(&mut gpu, 32, Format::R8G8B8A8Unorm);

    record_empty_pass(&mut gpu, view);
    assert_eq!(gpu.rm.cached_framebuffer_count(gpu.device), 1);

    gpu.rm.delete_texture_view(view);
    gpu.rm.delete_texture(texture);
    assert_eq!(gpu.rm.cached_framebuffer_count(gpu.device), 0);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn different_format_gets_its_own_render_pass() {
    let Some(mut gpu) = common::gpu() else { return };
    let (_, rgba) = color_target(&mut gpu, 32, Format::R8G8B8A8Unorm);
    let (_, bgra) = color_target(&mut gpu, 32, Format::B8G8R8A8Unorm);

    record_empty_pass(&mut gpu, rgba);
    record_empty_pass(&mut gpu, bgra);

    assert_eq!(gpu.rm.cached_render_pass_count(gpu.device), 2);
}
