// Enum translation - API types to and from ash::vk
//
// Pure functions, no state. Flags whose bits already follow the Vulkan
// numbering are re-interpreted; enums go through explicit match tables.

use crate::options::AdapterDeviceType;
use crate::types::*;
use ash::vk;
use gpu_allocator::MemoryLocation;

// ─────────────────────────────────────────────────────────────────────────────
// Formats
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! format_table {
    ($($api:ident => $native:ident),* $(,)?) => {
        pub fn format_to_vk(format: Format) -> vk::Format {
            match format {
                $(Format::$api => vk::Format::$native,)*
            }
        }

        /// Unknown native formats map to Undefined
        pub fn vk_to_format(format: vk::Format) -> Format {
            match format {
                $(vk::Format::$native => Format::$api,)*
                _ => Format::Undefined,
            }
        }
    };
}

format_table! {
    Undefined => UNDEFINED,
    R8Unorm => R8_UNORM,
    R8Snorm => R8_SNORM,
    R8Uint => R8_UINT,
    R8Sint => R8_SINT,
    R8G8Unorm => R8G8_UNORM,
    R8G8Uint => R8G8_UINT,
    R8G8B8A8Unorm => R8G8B8A8_UNORM,
    R8G8B8A8Snorm => R8G8B8A8_SNORM,
    R8G8B8A8Uint => R8G8B8A8_UINT,
    R8G8B8A8Sint => R8G8B8A8_SINT,
    R8G8B8A8Srgb => R8G8B8A8_SRGB,
    B8G8R8A8Unorm => B8G8R8A8_UNORM,
    B8G8R8A8Srgb => B8G8R8A8_SRGB,
    A2B10G10R10UnormPack32 => A2B10G10R10_UNORM_PACK32,
    R16Uint => R16_UINT,
    R16Sint => R16_SINT,
    R16Sfloat => R16_SFLOAT,
    R16G16Sfloat => R16G16_SFLOAT,
    R16G16B16A16Unorm => R16G16B16A16_UNORM,
    R16G16B16A16Uint => R16G16B16A16_UINT,
    R16G16B16A16Sfloat => R16G16B16A16_SFLOAT,
    R32Uint => R32_UINT,
    R32Sint => R32_SINT,
    R32Sfloat => R32_SFLOAT,
    R32G32Uint => R32G32_UINT,
    R32G32Sfloat => R32G32_SFLOAT,
    R32G32B32Uint => R32G32B32_UINT,
    R32G32B32Sfloat => R32G32B32_SFLOAT,
    R32G32B32A32Uint => R32G32B32A32_UINT,
    R32G32B32A32Sint => R32G32B32A32_SINT,
    R32G32B32A32Sfloat => R32G32B32A32_SFLOAT,
    B10G11R11UfloatPack32 => B10G11R11_UFLOAT_PACK32,
    D16Unorm => D16_UNORM,
    X8D24UnormPack32 => X8_D24_UNORM_PACK32,
    D32Sfloat => D32_SFLOAT,
    S8Uint => S8_UINT,
    D16UnormS8Uint => D16_UNORM_S8_UINT,
    D24UnormS8Uint => D24_UNORM_S8_UINT,
    D32SfloatS8Uint => D32_SFLOAT_S8_UINT,
    Bc1RgbaUnorm => BC1_RGBA_UNORM_BLOCK,
    Bc1RgbaSrgb => BC1_RGBA_SRGB_BLOCK,
    Bc3Unorm => BC3_UNORM_BLOCK,
    Bc3Srgb => BC3_SRGB_BLOCK,
    Bc5Unorm => BC5_UNORM_BLOCK,
    Bc7Unorm => BC7_UNORM_BLOCK,
    Bc7Srgb => BC7_SRGB_BLOCK,
    Etc2R8G8B8A8Unorm => ETC2_R8G8B8A8_UNORM_BLOCK,
    Astc4x4Unorm => ASTC_4X4_UNORM_BLOCK,
}

// ─────────────────────────────────────────────────────────────────────────────
// Layouts, samples, attachments
// ─────────────────────────────────────────────────────────────────────────────

pub fn texture_layout_to_vk(layout: TextureLayout) -> vk::ImageLayout {
    match layout {
        TextureLayout::Undefined => vk::ImageLayout::UNDEFINED,
        TextureLayout::General => vk::ImageLayout::GENERAL,
        TextureLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        TextureLayout::DepthStencilAttachmentOptimal => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        TextureLayout::DepthStencilReadOnlyOptimal => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        TextureLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        TextureLayout::TransferSrcOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        TextureLayout::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        TextureLayout::Preinitialized => vk::ImageLayout::PREINITIALIZED,
        TextureLayout::DepthReadOnlyStencilAttachmentOptimal => {
            vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL
        }
        TextureLayout::DepthAttachmentStencilReadOnlyOptimal => {
            vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL
        }
        TextureLayout::DepthAttachmentOptimal => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        TextureLayout::DepthReadOnlyOptimal => vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
        TextureLayout::StencilAttachmentOptimal => vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL,
        TextureLayout::StencilReadOnlyOptimal => vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL,
        TextureLayout::ReadOnlyOptimal => vk::ImageLayout::READ_ONLY_OPTIMAL,
        TextureLayout::AttachmentOptimal => vk::ImageLayout::ATTACHMENT_OPTIMAL,
        TextureLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn sample_count_to_vk(samples: SampleCount) -> vk::SampleCountFlags {
    match samples {
        SampleCount::Samples1 => vk::SampleCountFlags::TYPE_1,
        SampleCount::Samples2 => vk::SampleCountFlags::TYPE_2,
        SampleCount::Samples4 => vk::SampleCountFlags::TYPE_4,
        SampleCount::Samples8 => vk::SampleCountFlags::TYPE_8,
        SampleCount::Samples16 => vk::SampleCountFlags::TYPE_16,
        SampleCount::Samples32 => vk::SampleCountFlags::TYPE_32,
        SampleCount::Samples64 => vk::SampleCountFlags::TYPE_64,
    }
}

/// Every sample count contained in a native mask
pub fn vk_to_sample_counts(flags: vk::SampleCountFlags) -> Vec<SampleCount> {
    [
        SampleCount::Samples1,
        SampleCount::Samples2,
        SampleCount::Samples4,
        SampleCount::Samples8,
        SampleCount::Samples16,
        SampleCount::Samples32,
        SampleCount::Samples64,
    ]
    .into_iter()
    .filter(|&s| flags.contains(sample_count_to_vk(s)))
    .collect()
}

pub fn load_op_to_vk(op: AttachmentLoadOperation) -> vk::AttachmentLoadOp {
    match op {
        AttachmentLoadOperation::Load => vk::AttachmentLoadOp::LOAD,
        AttachmentLoadOperation::Clear => vk::AttachmentLoadOp::CLEAR,
        AttachmentLoadOperation::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn store_op_to_vk(op: AttachmentStoreOperation) -> vk::AttachmentStoreOp {
    match op {
        AttachmentStoreOperation::Store => vk::AttachmentStoreOp::STORE,
        AttachmentStoreOperation::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn resolve_mode_to_vk(mode: ResolveMode) -> vk::ResolveModeFlags {
    match mode {
        ResolveMode::None => vk::ResolveModeFlags::NONE,
        ResolveMode::SampleZero => vk::ResolveModeFlags::SAMPLE_ZERO,
        ResolveMode::Average => vk::ResolveModeFlags::AVERAGE,
        ResolveMode::Min => vk::ResolveModeFlags::MIN,
        ResolveMode::Max => vk::ResolveModeFlags::MAX,
    }
}

pub fn vk_to_resolve_modes(flags: vk::ResolveModeFlags) -> Vec<ResolveMode> {
    [
        ResolveMode::SampleZero,
        ResolveMode::Average,
        ResolveMode::Min,
        ResolveMode::Max,
    ]
    .into_iter()
    .filter(|&m| flags.contains(resolve_mode_to_vk(m)))
    .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixed-function state
// ─────────────────────────────────────────────────────────────────────────────

pub fn compare_op_to_vk(op: CompareOperation) -> vk::CompareOp {
    match op {
        CompareOperation::Never => vk::CompareOp::NEVER,
        CompareOperation::Less => vk::CompareOp::LESS,
        CompareOperation::Equal => vk::CompareOp::EQUAL,
        CompareOperation::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOperation::Greater => vk::CompareOp::GREATER,
        CompareOperation::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOperation::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOperation::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn stencil_op_to_vk(op: StencilOperation) -> vk::StencilOp {
    match op {
        StencilOperation::Keep => vk::StencilOp::KEEP,
        StencilOperation::Zero => vk::StencilOp::ZERO,
        StencilOperation::Replace => vk::StencilOp::REPLACE,
        StencilOperation::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOperation::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOperation::Invert => vk::StencilOp::INVERT,
        StencilOperation::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOperation::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => vk::BlendFactor::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
    }
}

pub fn blend_op_to_vk(op: BlendOperation) -> vk::BlendOp {
    match op {
        BlendOperation::Add => vk::BlendOp::ADD,
        BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
        BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOperation::Min => vk::BlendOp::MIN,
        BlendOperation::Max => vk::BlendOp::MAX,
    }
}

pub fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
    }
}

pub fn polygon_mode_to_vk(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn cull_mode_to_vk(mode: CullModeFlags) -> vk::CullModeFlags {
    vk::CullModeFlags::from_raw(mode.bits())
}

pub fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn vertex_rate_to_vk(rate: VertexRate) -> vk::VertexInputRate {
    match rate {
        VertexRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::Uint16 => vk::IndexType::UINT16,
        IndexType::Uint32 => vk::IndexType::UINT32,
    }
}

pub fn color_component_flags_to_vk(flags: ColorComponentFlags) -> vk::ColorComponentFlags {
    vk::ColorComponentFlags::from_raw(flags.bits())
}

pub fn dynamic_state_to_vk(state: DynamicState) -> vk::DynamicState {
    match state {
        DynamicState::Viewport => vk::DynamicState::VIEWPORT,
        DynamicState::Scissor => vk::DynamicState::SCISSOR,
        DynamicState::LineWidth => vk::DynamicState::LINE_WIDTH,
        DynamicState::DepthBias => vk::DynamicState::DEPTH_BIAS,
        DynamicState::BlendConstants => vk::DynamicState::BLEND_CONSTANTS,
        DynamicState::DepthBounds => vk::DynamicState::DEPTH_BOUNDS,
        DynamicState::StencilCompareMask => vk::DynamicState::STENCIL_COMPARE_MASK,
        DynamicState::StencilWriteMask => vk::DynamicState::STENCIL_WRITE_MASK,
        DynamicState::StencilReference => vk::DynamicState::STENCIL_REFERENCE,
        DynamicState::CullMode => vk::DynamicState::CULL_MODE,
        DynamicState::FrontFace => vk::DynamicState::FRONT_FACE,
        DynamicState::PrimitiveTopology => vk::DynamicState::PRIMITIVE_TOPOLOGY,
        DynamicState::DepthTestEnable => vk::DynamicState::DEPTH_TEST_ENABLE,
        DynamicState::DepthWriteEnable => vk::DynamicState::DEPTH_WRITE_ENABLE,
        DynamicState::DepthCompareOp => vk::DynamicState::DEPTH_COMPARE_OP,
        DynamicState::StencilTestEnable => vk::DynamicState::STENCIL_TEST_ENABLE,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Textures and samplers
// ─────────────────────────────────────────────────────────────────────────────

pub fn texture_type_to_vk(texture_type: TextureType) -> vk::ImageType {
    match texture_type {
        TextureType::TextureType1D => vk::ImageType::TYPE_1D,
        TextureType::TextureType2D | TextureType::TextureTypeCube => vk::ImageType::TYPE_2D,
        TextureType::TextureType3D => vk::ImageType::TYPE_3D,
    }
}

pub fn view_type_to_vk(view_type: ViewType) -> vk::ImageViewType {
    match view_type {
        ViewType::ViewType1D => vk::ImageViewType::TYPE_1D,
        ViewType::ViewType2D => vk::ImageViewType::TYPE_2D,
        ViewType::ViewType3D => vk::ImageViewType::TYPE_3D,
        ViewType::ViewTypeCube => vk::ImageViewType::CUBE,
        ViewType::ViewType1DArray => vk::ImageViewType::TYPE_1D_ARRAY,
        ViewType::ViewType2DArray => vk::ImageViewType::TYPE_2D_ARRAY,
        ViewType::ViewTypeCubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

pub fn tiling_to_vk(tiling: TextureTiling) -> vk::ImageTiling {
    match tiling {
        TextureTiling::Optimal => vk::ImageTiling::OPTIMAL,
        TextureTiling::Linear => vk::ImageTiling::LINEAR,
    }
}

pub fn filter_mode_to_vk(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_filter_mode_to_vk(mode: MipmapFilterMode) -> vk::SamplerMipmapMode {
    match mode {
        MipmapFilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        MipmapFilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        AddressMode::MirrorClampToEdge => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

pub fn border_color_to_vk(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::FloatTransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::IntTransparentBlack => vk::BorderColor::INT_TRANSPARENT_BLACK,
        BorderColor::FloatOpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::IntOpaqueBlack => vk::BorderColor::INT_OPAQUE_BLACK,
        BorderColor::FloatOpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
        BorderColor::IntOpaqueWhite => vk::BorderColor::INT_OPAQUE_WHITE,
    }
}

pub fn aspect_flags_to_vk(flags: TextureAspectFlags) -> vk::ImageAspectFlags {
    vk::ImageAspectFlags::from_raw(flags.bits())
}

pub fn texture_usage_to_vk(flags: TextureUsageFlags) -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::from_raw(flags.bits())
}

pub fn vk_to_texture_usage(flags: vk::ImageUsageFlags) -> TextureUsageFlags {
    TextureUsageFlags::from_bits_truncate(flags.as_raw())
}

pub fn buffer_usage_to_vk(flags: BufferUsageFlags) -> vk::BufferUsageFlags {
    vk::BufferUsageFlags::from_raw(flags.bits())
}

pub fn subresource_range_to_vk(range: &TextureSubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect_flags_to_vk(range.aspect_mask),
        base_mip_level: range.base_mip_level,
        level_count: range.level_count,
        base_array_layer: range.base_array_layer,
        layer_count: range.layer_count,
    }
}

pub fn subresource_layers_to_vk(layers: &TextureSubresourceLayers) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect_flags_to_vk(layers.aspect_mask),
        mip_level: layers.mip_level,
        base_array_layer: layers.base_array_layer,
        layer_count: layers.layer_count,
    }
}

pub fn extent3d_to_vk(extent: Extent3D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}

pub fn vk_to_extent3d(extent: vk::Extent3D) -> Extent3D {
    Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}

pub fn vk_to_extent2d(extent: vk::Extent2D) -> Extent2D {
    Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

pub fn offset3d_to_vk(offset: Offset3D) -> vk::Offset3D {
    vk::Offset3D {
        x: offset.x,
        y: offset.y,
        z: offset.z,
    }
}

pub fn rect2d_to_vk(rect: Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.offset.x,
            y: rect.offset.y,
        },
        extent: vk::Extent2D {
            width: rect.extent.width,
            height: rect.extent.height,
        },
    }
}

pub fn viewport_to_vk(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub fn color_clear_value_to_vk(value: ColorClearValue) -> vk::ClearColorValue {
    match value {
        ColorClearValue::Float(float32) => vk::ClearColorValue { float32 },
        ColorClearValue::Int(int32) => vk::ClearColorValue { int32 },
        ColorClearValue::Uint(uint32) => vk::ClearColorValue { uint32 },
    }
}

pub fn depth_stencil_clear_value_to_vk(value: DepthStencilClearValue) -> vk::ClearDepthStencilValue {
    vk::ClearDepthStencilValue {
        depth: value.depth,
        stencil: value.stencil,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

pub fn memory_usage_to_location(usage: MemoryUsage) -> MemoryLocation {
    match usage {
        MemoryUsage::GpuOnly | MemoryUsage::GpuLazilyAllocated => MemoryLocation::GpuOnly,
        MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryUsage::GpuToCpu | MemoryUsage::CpuCopy => MemoryLocation::GpuToCpu,
        MemoryUsage::CpuOnly => MemoryLocation::CpuToGpu,
    }
}

/// Property flags used when memory is allocated outside the allocator
pub fn memory_usage_to_property_flags(usage: MemoryUsage) -> vk::MemoryPropertyFlags {
    match usage {
        MemoryUsage::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryUsage::GpuLazilyAllocated => {
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::LAZILY_ALLOCATED
        }
        MemoryUsage::CpuOnly | MemoryUsage::CpuToGpu => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
        MemoryUsage::GpuToCpu | MemoryUsage::CpuCopy => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED
        }
    }
}

pub fn external_memory_handle_type_to_vk(
    handle_type: ExternalMemoryHandleType,
) -> vk::ExternalMemoryHandleTypeFlags {
    match handle_type {
        ExternalMemoryHandleType::OpaqueFd => vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD,
        ExternalMemoryHandleType::OpaqueWin32 => vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32,
        ExternalMemoryHandleType::OpaqueWin32Kmt => vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32_KMT,
        ExternalMemoryHandleType::DmaBuf => vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT,
    }
}

pub fn external_semaphore_handle_type_to_vk(
    handle_type: ExternalSemaphoreHandleType,
) -> vk::ExternalSemaphoreHandleTypeFlags {
    match handle_type {
        ExternalSemaphoreHandleType::OpaqueFd => vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_FD,
        ExternalSemaphoreHandleType::OpaqueWin32 => vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_WIN32,
        ExternalSemaphoreHandleType::SyncFd => vk::ExternalSemaphoreHandleTypeFlags::SYNC_FD,
    }
}

pub fn external_fence_handle_type_to_vk(
    handle_type: ExternalFenceHandleType,
) -> vk::ExternalFenceHandleTypeFlags {
    match handle_type {
        ExternalFenceHandleType::OpaqueFd => vk::ExternalFenceHandleTypeFlags::OPAQUE_FD,
        ExternalFenceHandleType::OpaqueWin32 => vk::ExternalFenceHandleTypeFlags::OPAQUE_WIN32,
        ExternalFenceHandleType::SyncFd => vk::ExternalFenceHandleTypeFlags::SYNC_FD,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bindings and stages
// ─────────────────────────────────────────────────────────────────────────────

pub fn resource_binding_type_to_vk(binding_type: ResourceBindingType) -> vk::DescriptorType {
    match binding_type {
        ResourceBindingType::Sampler => vk::DescriptorType::SAMPLER,
        ResourceBindingType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ResourceBindingType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        ResourceBindingType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        ResourceBindingType::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        ResourceBindingType::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        ResourceBindingType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceBindingType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        ResourceBindingType::DynamicUniformBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        ResourceBindingType::DynamicStorageBuffer => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        ResourceBindingType::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        ResourceBindingType::AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
    }
}

pub fn resource_binding_flags_to_vk(flags: ResourceBindingFlags) -> vk::DescriptorBindingFlags {
    vk::DescriptorBindingFlags::from_raw(flags.bits())
}

pub fn shader_stage_flags_to_vk(flags: ShaderStageFlags) -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::from_raw(flags.bits())
}

pub fn stencil_face_flags_to_vk(flags: StencilFaceFlags) -> vk::StencilFaceFlags {
    vk::StencilFaceFlags::from_raw(flags.bits())
}

pub fn dependency_flags_to_vk(flags: DependencyFlags) -> vk::DependencyFlags {
    vk::DependencyFlags::from_raw(flags.bits())
}

/// Synchronization2 stage mask
pub fn pipeline_stage_flags_to_vk2(flags: PipelineStageFlags) -> vk::PipelineStageFlags2 {
    vk::PipelineStageFlags2::from_raw(flags.bits())
}

/// Synchronization2 access mask
pub fn access_flags_to_vk2(flags: AccessFlags) -> vk::AccessFlags2 {
    vk::AccessFlags2::from_raw(flags.bits())
}

/// Legacy stage mask. Stages that only exist in synchronization2 are widened
/// to the legacy stage that contains them.
pub fn pipeline_stage_flags_to_vk(flags: PipelineStageFlags) -> vk::PipelineStageFlags {
    let mut legacy = vk::PipelineStageFlags::from_raw((flags.bits() & 0xFFFF_FFFF) as u32);
    if flags.intersects(
        PipelineStageFlags::COPY
            | PipelineStageFlags::RESOLVE
            | PipelineStageFlags::BLIT
            | PipelineStageFlags::CLEAR,
    ) {
        legacy |= vk::PipelineStageFlags::TRANSFER;
    }
    if flags.intersects(PipelineStageFlags::INDEX_INPUT | PipelineStageFlags::VERTEX_ATTRIBUTE_INPUT) {
        legacy |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if flags.contains(PipelineStageFlags::PRE_RASTERIZATION_SHADERS) {
        legacy |= vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER
            | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER
            | vk::PipelineStageFlags::GEOMETRY_SHADER;
    }
    legacy
}

/// Legacy access mask, widening synchronization2-only bits
pub fn access_flags_to_vk(flags: AccessFlags) -> vk::AccessFlags {
    let mut legacy = vk::AccessFlags::from_raw((flags.bits() & 0xFFFF_FFFF) as u32);
    if flags.intersects(AccessFlags::SHADER_SAMPLED_READ | AccessFlags::SHADER_STORAGE_READ) {
        legacy |= vk::AccessFlags::SHADER_READ;
    }
    if flags.contains(AccessFlags::SHADER_STORAGE_WRITE) {
        legacy |= vk::AccessFlags::SHADER_WRITE;
    }
    legacy
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter and presentation
// ─────────────────────────────────────────────────────────────────────────────

pub fn vk_to_adapter_device_type(device_type: vk::PhysicalDeviceType) -> AdapterDeviceType {
    match device_type {
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterDeviceType::IntegratedGpu,
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterDeviceType::DiscreteGpu,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterDeviceType::VirtualGpu,
        vk::PhysicalDeviceType::CPU => AdapterDeviceType::Cpu,
        _ => AdapterDeviceType::Other,
    }
}

pub fn vk_to_queue_flags(flags: vk::QueueFlags) -> QueueFlags {
    QueueFlags::from_bits_truncate(flags.as_raw())
}

pub fn vk_to_format_feature_flags(flags: vk::FormatFeatureFlags) -> FormatFeatureFlags {
    FormatFeatureFlags::from_bits_truncate(flags.as_raw())
}

pub fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub fn vk_to_present_mode(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

pub fn color_space_to_vk(color_space: ColorSpace) -> vk::ColorSpaceKHR {
    match color_space {
        ColorSpace::SRgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::ExtendedSRgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        ColorSpace::DisplayP3Nonlinear => vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        ColorSpace::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        ColorSpace::PassThrough => vk::ColorSpaceKHR::PASS_THROUGH_EXT,
    }
}

pub fn vk_to_color_space(color_space: vk::ColorSpaceKHR) -> Option<ColorSpace> {
    match color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => Some(ColorSpace::SRgbNonlinear),
        vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => Some(ColorSpace::ExtendedSRgbLinear),
        vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT => Some(ColorSpace::DisplayP3Nonlinear),
        vk::ColorSpaceKHR::HDR10_ST2084_EXT => Some(ColorSpace::Hdr10St2084),
        vk::ColorSpaceKHR::PASS_THROUGH_EXT => Some(ColorSpace::PassThrough),
        _ => None,
    }
}

pub fn composite_alpha_to_vk(flags: CompositeAlphaFlags) -> vk::CompositeAlphaFlagsKHR {
    vk::CompositeAlphaFlagsKHR::from_raw(flags.bits())
}

pub fn vk_to_composite_alpha(flags: vk::CompositeAlphaFlagsKHR) -> CompositeAlphaFlags {
    CompositeAlphaFlags::from_bits_truncate(flags.as_raw())
}

pub fn surface_transform_to_vk(flags: SurfaceTransformFlags) -> vk::SurfaceTransformFlagsKHR {
    vk::SurfaceTransformFlagsKHR::from_raw(flags.bits())
}

pub fn vk_to_surface_transform(flags: vk::SurfaceTransformFlagsKHR) -> SurfaceTransformFlags {
    SurfaceTransformFlags::from_bits_truncate(flags.as_raw())
}

/// Suboptimal still counts as success
pub fn vk_result_to_acquire_result(result: vk::Result) -> AcquireImageResult {
    match result {
        vk::Result::SUCCESS | vk::Result::SUBOPTIMAL_KHR => AcquireImageResult::Success,
        vk::Result::ERROR_OUT_OF_DATE_KHR => AcquireImageResult::OutOfDate,
        vk::Result::ERROR_SURFACE_LOST_KHR => AcquireImageResult::SurfaceLost,
        vk::Result::ERROR_DEVICE_LOST => AcquireImageResult::DeviceLost,
        _ => AcquireImageResult::OutOfMemory,
    }
}

pub fn vk_result_to_present_result(result: vk::Result) -> PresentResult {
    match result {
        vk::Result::SUCCESS | vk::Result::SUBOPTIMAL_KHR => PresentResult::Success,
        vk::Result::ERROR_OUT_OF_DATE_KHR => PresentResult::OutOfDate,
        vk::Result::ERROR_SURFACE_LOST_KHR => PresentResult::SurfaceLost,
        vk::Result::ERROR_DEVICE_LOST => PresentResult::DeviceLost,
        _ => PresentResult::OutOfMemory,
    }
}

pub fn vk_result_to_fence_status(result: vk::Result) -> FenceStatus {
    match result {
        vk::Result::SUCCESS => FenceStatus::Signalled,
        vk::Result::NOT_READY => FenceStatus::Unsignalled,
        _ => FenceStatus::Error,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ray tracing
// ─────────────────────────────────────────────────────────────────────────────

pub fn acceleration_structure_type_to_vk(
    structure_type: AccelerationStructureType,
) -> vk::AccelerationStructureTypeKHR {
    match structure_type {
        AccelerationStructureType::TopLevel => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
        AccelerationStructureType::BottomLevel => vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
    }
}

pub fn build_mode_to_vk(mode: BuildAccelerationStructureMode) -> vk::BuildAccelerationStructureModeKHR {
    match mode {
        BuildAccelerationStructureMode::Build => vk::BuildAccelerationStructureModeKHR::BUILD,
        BuildAccelerationStructureMode::Update => vk::BuildAccelerationStructureModeKHR::UPDATE,
    }
}

pub fn acceleration_structure_flags_to_vk(
    flags: AccelerationStructureFlags,
) -> vk::BuildAccelerationStructureFlagsKHR {
    vk::BuildAccelerationStructureFlagsKHR::from_raw(flags.bits())
}

pub fn geometry_flags_to_vk(flags: GeometryFlags) -> vk::GeometryFlagsKHR {
    vk::GeometryFlagsKHR::from_raw(flags.bits())
}

pub fn geometry_instance_flags_to_vk(flags: GeometryInstanceFlags) -> vk::GeometryInstanceFlagsKHR {
    vk::GeometryInstanceFlagsKHR::from_raw(flags.bits())
}

pub fn shader_group_type_to_vk(
    group_type: RayTracingShaderGroupType,
) -> vk::RayTracingShaderGroupTypeKHR {
    match group_type {
        RayTracingShaderGroupType::General => vk::RayTracingShaderGroupTypeKHR::GENERAL,
        RayTracingShaderGroupType::TrianglesHit => {
            vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP
        }
        RayTracingShaderGroupType::ProceduralHit => {
            vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_round_trip_through_native_table() {
        for format in [
            Format::R8G8B8A8Unorm,
            Format::B8G8R8A8Srgb,
            Format::R32G32B32Sfloat,
            Format::D24UnormS8Uint,
            Format::Bc7Srgb,
        ] {
            assert_eq!(vk_to_format(format_to_vk(format)), format);
        }
        assert_eq!(vk_to_format(vk::Format::R64_SFLOAT), Format::Undefined);
    }

    #[test]
    fn flag_bits_match_native_numbering() {
        assert_eq!(
            buffer_usage_to_vk(BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE | BufferUsageFlags::SHADER_DEVICE_ADDRESS),
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
        );
        assert_eq!(
            texture_usage_to_vk(TextureUsageFlags::INPUT_ATTACHMENT),
            vk::ImageUsageFlags::INPUT_ATTACHMENT
        );
        assert_eq!(
            shader_stage_flags_to_vk(ShaderStageFlags::RAYGEN | ShaderStageFlags::CLOSEST_HIT),
            vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::CLOSEST_HIT_KHR
        );
        assert_eq!(
            pipeline_stage_flags_to_vk2(PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD),
            vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR
        );
        assert_eq!(
            access_flags_to_vk2(AccessFlags::SHADER_STORAGE_WRITE),
            vk::AccessFlags2::SHADER_STORAGE_WRITE
        );
    }

    #[test]
    fn legacy_stage_mask_widens_sync2_only_stages() {
        let legacy = pipeline_stage_flags_to_vk(PipelineStageFlags::COPY | PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(
            legacy,
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::FRAGMENT_SHADER
        );

        let legacy = pipeline_stage_flags_to_vk(PipelineStageFlags::INDEX_INPUT);
        assert_eq!(legacy, vk::PipelineStageFlags::VERTEX_INPUT);

        let legacy = pipeline_stage_flags_to_vk(PipelineStageFlags::PRE_RASTERIZATION_SHADERS);
        assert!(legacy.contains(vk::PipelineStageFlags::VERTEX_SHADER));
        assert!(legacy.contains(vk::PipelineStageFlags::GEOMETRY_SHADER));
    }

    #[test]
    fn legacy_access_mask_widens_sync2_only_access() {
        assert_eq!(
            access_flags_to_vk(AccessFlags::SHADER_SAMPLED_READ),
            vk::AccessFlags::SHADER_READ
        );
        assert_eq!(
            access_flags_to_vk(AccessFlags::SHADER_STORAGE_WRITE | AccessFlags::TRANSFER_READ),
            vk::AccessFlags::SHADER_WRITE | vk::AccessFlags::TRANSFER_READ
        );
        assert_eq!(
            access_flags_to_vk(AccessFlags::ACCELERATION_STRUCTURE_WRITE),
            vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR
        );
    }

    #[test]
    fn cube_textures_are_2d_images() {
        assert_eq!(texture_type_to_vk(TextureType::TextureTypeCube), vk::ImageType::TYPE_2D);
        assert_eq!(view_type_to_vk(ViewType::ViewTypeCubeArray), vk::ImageViewType::CUBE_ARRAY);
    }

    #[test]
    fn suboptimal_counts_as_success() {
        assert_eq!(vk_result_to_present_result(vk::Result::SUBOPTIMAL_KHR), PresentResult::Success);
        assert_eq!(
            vk_result_to_present_result(vk::Result::ERROR_OUT_OF_DATE_KHR),
            PresentResult::OutOfDate
        );
        assert_eq!(
            vk_result_to_acquire_result(vk::Result::ERROR_SURFACE_LOST_KHR),
            AcquireImageResult::SurfaceLost
        );
        assert_eq!(
            vk_result_to_present_result(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            PresentResult::OutOfMemory
        );
    }

    #[test]
    fn fence_status_from_result() {
        assert_eq!(vk_result_to_fence_status(vk::Result::SUCCESS), FenceStatus::Signalled);
        assert_eq!(vk_result_to_fence_status(vk::Result::NOT_READY), FenceStatus::Unsignalled);
        assert_eq!(vk_result_to_fence_status(vk::Result::ERROR_DEVICE_LOST), FenceStatus::Error);
    }

    #[test]
    fn sample_count_masks() {
        let counts = vk_to_sample_counts(vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4);
        assert_eq!(counts, vec![SampleCount::Samples1, SampleCount::Samples4]);
    }

    #[test]
    fn memory_usage_locations() {
        assert_eq!(memory_usage_to_location(MemoryUsage::CpuToGpu), MemoryLocation::CpuToGpu);
        assert_eq!(memory_usage_to_location(MemoryUsage::GpuToCpu), MemoryLocation::GpuToCpu);
        assert_eq!(memory_usage_to_location(MemoryUsage::GpuOnly), MemoryLocation::GpuOnly);
    }
}
