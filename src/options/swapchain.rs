// Swapchain options

use crate::handle::Handle;
use crate::resources::{Surface, Swapchain};
use crate::types::{
    ColorSpace, CompositeAlphaFlags, Extent2D, Format, PresentMode, SurfaceTransformFlags,
    TextureUsageFlags,
};

#[derive(Debug, Clone)]
pub struct SwapchainOptions {
    pub label: Option<String>,
    pub surface: Handle<Surface>,
    pub format: Format,
    pub color_space: ColorSpace,
    pub min_image_count: u32,
    pub image_extent: Extent2D,
    pub image_layers: u32,
    pub image_usage: TextureUsageFlags,
    pub queue_type_indices: Vec<u32>,
    pub transform: SurfaceTransformFlags,
    pub composite_alpha: CompositeAlphaFlags,
    pub present_mode: PresentMode,
    pub clipped: bool,
    pub old_swapchain: Option<Handle<Swapchain>>,
}

impl Default for SwapchainOptions {
    fn default() -> Self {
        Self {
            label: None,
            surface: Handle::null(),
            format: Format::B8G8R8A8Unorm,
            color_space: ColorSpace::SRgbNonlinear,
            min_image_count: 3,
            image_extent: Extent2D::default(),
            image_layers: 1,
            image_usage: TextureUsageFlags::COLOR_ATTACHMENT,
            queue_type_indices: Vec::new(),
            transform: SurfaceTransformFlags::IDENTITY,
            composite_alpha: CompositeAlphaFlags::OPAQUE,
            present_mode: PresentMode::Fifo,
            clipped: true,
            old_swapchain: None,
        }
    }
}
