// Buffer, texture, texture view and sampler options

use crate::types::{
    AddressMode, BorderColor, BufferUsageFlags, CompareOperation, DeviceSize, Extent3D,
    ExternalMemoryHandleType, FilterMode, Format, MemoryUsage, MipmapFilterMode, SampleCount,
    TextureLayout, TextureSubresourceRange, TextureTiling, TextureType, TextureUsageFlags,
    ViewType,
};

#[derive(Debug, Clone, Default)]
pub struct BufferOptions {
    pub label: Option<String>,
    pub size: DeviceSize,
    pub usage: BufferUsageFlags,
    pub memory_usage: MemoryUsage,
    /// Queue types sharing the buffer; fewer than two means exclusive
    pub queue_type_indices: Vec<u32>,
    /// Redirects the allocation to the external memory allocator
    pub external_memory_handle_type: Option<ExternalMemoryHandleType>,
}

#[derive(Debug, Clone)]
pub struct TextureOptions {
    pub label: Option<String>,
    pub texture_type: TextureType,
    pub format: Format,
    pub extent: Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: SampleCount,
    pub tiling: TextureTiling,
    pub usage: TextureUsageFlags,
    pub memory_usage: MemoryUsage,
    pub initial_layout: TextureLayout,
    pub queue_type_indices: Vec<u32>,
    pub external_memory_handle_type: Option<ExternalMemoryHandleType>,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            label: None,
            texture_type: TextureType::TextureType2D,
            format: Format::R8G8B8A8Unorm,
            extent: Extent3D::default(),
            mip_levels: 1,
            array_layers: 1,
            samples: SampleCount::Samples1,
            tiling: TextureTiling::Optimal,
            usage: TextureUsageFlags::empty(),
            memory_usage: MemoryUsage::GpuOnly,
            initial_layout: TextureLayout::Undefined,
            queue_type_indices: Vec::new(),
            external_memory_handle_type: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureViewOptions {
    pub label: Option<String>,
    pub view_type: ViewType,
    /// Undefined uses the texture's format
    pub format: Format,
    /// An empty aspect mask is derived from the view format
    pub range: TextureSubresourceRange,
}

impl Default for TextureViewOptions {
    fn default() -> Self {
        Self {
            label: None,
            view_type: ViewType::ViewType2D,
            format: Format::Undefined,
            range: TextureSubresourceRange {
                aspect_mask: Default::default(),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    pub label: Option<String>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: MipmapFilterMode,
    pub u: AddressMode,
    pub v: AddressMode,
    pub w: AddressMode,
    pub lod_min_clamp: f32,
    /// None removes the upper clamp
    pub lod_max_clamp: Option<f32>,
    pub mip_lod_bias: f32,
    /// Anisotropic filtering is enabled above 1.0
    pub max_anisotropy: f32,
    pub compare: Option<CompareOperation>,
    pub border_color: BorderColor,
    pub normalized: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: MipmapFilterMode::Nearest,
            u: AddressMode::Repeat,
            v: AddressMode::Repeat,
            w: AddressMode::Repeat,
            lod_min_clamp: 0.0,
            lod_max_clamp: None,
            mip_lod_bias: 0.0,
            max_anisotropy: 1.0,
            compare: None,
            border_color: BorderColor::FloatTransparentBlack,
            normalized: true,
        }
    }
}
