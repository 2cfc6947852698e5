// Core API types
//
// Backend-agnostic enums, flags and small value types shared by every options
// struct. Flag bit values follow the Vulkan numbering so translation is a
// cheap re-interpretation; enums are translated through explicit tables in
// backend::enums.

use bitflags::bitflags;

pub type DeviceSize = u64;
pub type DeviceAddress = u64;

/// Use the rest of the buffer from the given offset
pub const WHOLE_SIZE: DeviceSize = u64::MAX;
pub const REMAINING_MIP_LEVELS: u32 = u32::MAX;
pub const REMAINING_ARRAY_LAYERS: u32 = u32::MAX;
/// No queue family ownership transfer
pub const IGNORE_QUEUE_TYPE: u32 = u32::MAX;
pub const EXTERNAL_SUBPASS: u32 = u32::MAX;

// ─────────────────────────────────────────────────────────────────────────────
// Formats
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Format {
    #[default]
    Undefined,
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    R8G8Unorm,
    R8G8Uint,
    R8G8B8A8Unorm,
    R8G8B8A8Snorm,
    R8G8B8A8Uint,
    R8G8B8A8Sint,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    A2B10G10R10UnormPack32,
    R16Uint,
    R16Sint,
    R16Sfloat,
    R16G16Sfloat,
    R16G16B16A16Unorm,
    R16G16B16A16Uint,
    R16G16B16A16Sfloat,
    R32Uint,
    R32Sint,
    R32Sfloat,
    R32G32Uint,
    R32G32Sfloat,
    R32G32B32Uint,
    R32G32B32Sfloat,
    R32G32B32A32Uint,
    R32G32B32A32Sint,
    R32G32B32A32Sfloat,
    B10G11R11UfloatPack32,
    D16Unorm,
    X8D24UnormPack32,
    D32Sfloat,
    S8Uint,
    D16UnormS8Uint,
    D24UnormS8Uint,
    D32SfloatS8Uint,
    Bc1RgbaUnorm,
    Bc1RgbaSrgb,
    Bc3Unorm,
    Bc3Srgb,
    Bc5Unorm,
    Bc7Unorm,
    Bc7Srgb,
    Etc2R8G8B8A8Unorm,
    Astc4x4Unorm,
}

impl Format {
    pub fn has_depth(self) -> bool {
        matches!(
            self,
            Format::D16Unorm
                | Format::X8D24UnormPack32
                | Format::D32Sfloat
                | Format::D16UnormS8Uint
                | Format::D24UnormS8Uint
                | Format::D32SfloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            Format::S8Uint | Format::D16UnormS8Uint | Format::D24UnormS8Uint | Format::D32SfloatS8Uint
        )
    }

    pub fn is_depth_or_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    /// Aspects a view of this format covers when none are requested
    pub fn default_aspects(self) -> TextureAspectFlags {
        let mut aspects = TextureAspectFlags::empty();
        if self.has_depth() {
            aspects |= TextureAspectFlags::DEPTH;
        }
        if self.has_stencil() {
            aspects |= TextureAspectFlags::STENCIL;
        }
        if aspects.is_empty() {
            aspects = TextureAspectFlags::COLOR;
        }
        aspects
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layouts and attachments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TextureLayout {
    #[default]
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    Preinitialized,
    DepthReadOnlyStencilAttachmentOptimal,
    DepthAttachmentStencilReadOnlyOptimal,
    DepthAttachmentOptimal,
    DepthReadOnlyOptimal,
    StencilAttachmentOptimal,
    StencilReadOnlyOptimal,
    /// Generic read-only layout (synchronization2)
    ReadOnlyOptimal,
    /// Generic attachment layout (synchronization2)
    AttachmentOptimal,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SampleCount {
    #[default]
    Samples1,
    Samples2,
    Samples4,
    Samples8,
    Samples16,
    Samples32,
    Samples64,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        match self {
            SampleCount::Samples1 => 1,
            SampleCount::Samples2 => 2,
            SampleCount::Samples4 => 4,
            SampleCount::Samples8 => 8,
            SampleCount::Samples16 => 16,
            SampleCount::Samples32 => 32,
            SampleCount::Samples64 => 64,
        }
    }

    pub fn is_multisampled(self) -> bool {
        self != SampleCount::Samples1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AttachmentLoadOperation {
    Load,
    #[default]
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AttachmentStoreOperation {
    #[default]
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ResolveMode {
    #[default]
    None,
    SampleZero,
    Average,
    Min,
    Max,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixed-function state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOperation {
    #[default]
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    PatchList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexRate {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    Uint16,
    Uint32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicState {
    Viewport,
    Scissor,
    LineWidth,
    DepthBias,
    BlendConstants,
    DepthBounds,
    StencilCompareMask,
    StencilWriteMask,
    StencilReference,
    CullMode,
    FrontFace,
    PrimitiveTopology,
    DepthTestEnable,
    DepthWriteEnable,
    DepthCompareOp,
    StencilTestEnable,
}

// ─────────────────────────────────────────────────────────────────────────────
// Textures and samplers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    TextureType1D,
    #[default]
    TextureType2D,
    TextureType3D,
    TextureTypeCube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewType {
    ViewType1D,
    #[default]
    ViewType2D,
    ViewType3D,
    ViewTypeCube,
    ViewType1DArray,
    ViewType2DArray,
    ViewTypeCubeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTiling {
    #[default]
    Optimal,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipmapFilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
    MirrorClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    #[default]
    FloatTransparentBlack,
    IntTransparentBlack,
    FloatOpaqueBlack,
    IntOpaqueBlack,
    FloatOpaqueWhite,
    IntOpaqueWhite,
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory and external handles
// ─────────────────────────────────────────────────────────────────────────────

/// Where the allocator should place a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    #[default]
    GpuOnly,
    CpuOnly,
    /// CPU-visible upload memory
    CpuToGpu,
    /// CPU-visible readback memory
    GpuToCpu,
    CpuCopy,
    GpuLazilyAllocated,
}

impl MemoryUsage {
    pub fn is_host_visible(self) -> bool {
        matches!(
            self,
            MemoryUsage::CpuOnly | MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu | MemoryUsage::CpuCopy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalMemoryHandleType {
    OpaqueFd,
    OpaqueWin32,
    OpaqueWin32Kmt,
    DmaBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalSemaphoreHandleType {
    OpaqueFd,
    OpaqueWin32,
    SyncFd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalFenceHandleType {
    OpaqueFd,
    OpaqueWin32,
    SyncFd,
}

/// OS-level handle exported from a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandleOrFd {
    #[default]
    None,
    Fd(i32),
    /// Win32 HANDLE value
    Handle(usize),
}

impl HandleOrFd {
    pub fn is_none(&self) -> bool {
        matches!(self, HandleOrFd::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryHandle {
    pub handle: HandleOrFd,
    pub allocation_size: DeviceSize,
    pub allocation_offset: DeviceSize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bindings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBindingType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    DynamicUniformBuffer,
    DynamicStorageBuffer,
    InputAttachment,
    AccelerationStructure,
}

// ─────────────────────────────────────────────────────────────────────────────
// Presentation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    #[default]
    Fifo,
    FifoRelaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    SRgbNonlinear,
    ExtendedSRgbLinear,
    DisplayP3Nonlinear,
    Hdr10St2084,
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireImageResult {
    Success,
    OutOfDate,
    SurfaceLost,
    OutOfMemory,
    DeviceLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentResult {
    Success,
    OutOfDate,
    SurfaceLost,
    OutOfMemory,
    DeviceLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    Signalled,
    Unsignalled,
    Error,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ray tracing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccelerationStructureType {
    #[default]
    TopLevel,
    BottomLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildAccelerationStructureMode {
    #[default]
    Build,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RayTracingShaderGroupType {
    General,
    TrianglesHit,
    ProceduralHit,
}

// ─────────────────────────────────────────────────────────────────────────────
// Flags
// ─────────────────────────────────────────────────────────────────────────────

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct TextureAspectFlags: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
        const STENCIL = 0x4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsageFlags: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const SAMPLED = 0x4;
        const STORAGE = 0x8;
        const COLOR_ATTACHMENT = 0x10;
        const DEPTH_STENCIL_ATTACHMENT = 0x20;
        const TRANSIENT_ATTACHMENT = 0x40;
        const INPUT_ATTACHMENT = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsageFlags: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const UNIFORM_TEXEL_BUFFER = 0x4;
        const STORAGE_TEXEL_BUFFER = 0x8;
        const UNIFORM_BUFFER = 0x10;
        const STORAGE_BUFFER = 0x20;
        const INDEX_BUFFER = 0x40;
        const VERTEX_BUFFER = 0x80;
        const INDIRECT_BUFFER = 0x100;
        const SHADER_BINDING_TABLE = 0x400;
        const SHADER_DEVICE_ADDRESS = 0x2_0000;
        const ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY = 0x8_0000;
        const ACCELERATION_STRUCTURE_STORAGE = 0x10_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x1;
        const TESSELLATION_CONTROL = 0x2;
        const TESSELLATION_EVALUATION = 0x4;
        const GEOMETRY = 0x8;
        const FRAGMENT = 0x10;
        const COMPUTE = 0x20;
        const ALL_GRAPHICS = 0x1F;
        const RAYGEN = 0x100;
        const ANY_HIT = 0x200;
        const CLOSEST_HIT = 0x400;
        const MISS = 0x800;
        const INTERSECTION = 0x1000;
        const CALLABLE = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StencilFaceFlags: u32 {
        const FRONT = 0x1;
        const BACK = 0x2;
        const FRONT_AND_BACK = 0x3;
    }
}

bitflags! {
    /// Pipeline stages, synchronization2 numbering
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStageFlags: u64 {
        const TOP_OF_PIPE = 0x1;
        const DRAW_INDIRECT = 0x2;
        const VERTEX_INPUT = 0x4;
        const VERTEX_SHADER = 0x8;
        const TESSELLATION_CONTROL_SHADER = 0x10;
        const TESSELLATION_EVALUATION_SHADER = 0x20;
        const GEOMETRY_SHADER = 0x40;
        const FRAGMENT_SHADER = 0x80;
        const EARLY_FRAGMENT_TESTS = 0x100;
        const LATE_FRAGMENT_TESTS = 0x200;
        const COLOR_ATTACHMENT_OUTPUT = 0x400;
        const COMPUTE_SHADER = 0x800;
        const TRANSFER = 0x1000;
        const BOTTOM_OF_PIPE = 0x2000;
        const HOST = 0x4000;
        const ALL_GRAPHICS = 0x8000;
        const ALL_COMMANDS = 0x1_0000;
        const RAY_TRACING_SHADER = 0x20_0000;
        const ACCELERATION_STRUCTURE_BUILD = 0x200_0000;
        const COPY = 0x1_0000_0000;
        const RESOLVE = 0x2_0000_0000;
        const BLIT = 0x4_0000_0000;
        const CLEAR = 0x8_0000_0000;
        const INDEX_INPUT = 0x10_0000_0000;
        const VERTEX_ATTRIBUTE_INPUT = 0x20_0000_0000;
        const PRE_RASTERIZATION_SHADERS = 0x40_0000_0000;
    }
}

bitflags! {
    /// Memory access types, synchronization2 numbering
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u64 {
        const INDIRECT_COMMAND_READ = 0x1;
        const INDEX_READ = 0x2;
        const VERTEX_ATTRIBUTE_READ = 0x4;
        const UNIFORM_READ = 0x8;
        const INPUT_ATTACHMENT_READ = 0x10;
        const SHADER_READ = 0x20;
        const SHADER_WRITE = 0x40;
        const COLOR_ATTACHMENT_READ = 0x80;
        const COLOR_ATTACHMENT_WRITE = 0x100;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0x200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x400;
        const TRANSFER_READ = 0x800;
        const TRANSFER_WRITE = 0x1000;
        const HOST_READ = 0x2000;
        const HOST_WRITE = 0x4000;
        const MEMORY_READ = 0x8000;
        const MEMORY_WRITE = 0x1_0000;
        const ACCELERATION_STRUCTURE_READ = 0x20_0000;
        const ACCELERATION_STRUCTURE_WRITE = 0x40_0000;
        const SHADER_SAMPLED_READ = 0x1_0000_0000;
        const SHADER_STORAGE_READ = 0x2_0000_0000;
        const SHADER_STORAGE_WRITE = 0x4_0000_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DependencyFlags: u32 {
        const BY_REGION = 0x1;
        const DEVICE_GROUP = 0x4;
        const VIEW_LOCAL = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorComponentFlags: u32 {
        const R = 0x1;
        const G = 0x2;
        const B = 0x4;
        const A = 0x8;
        const ALL = 0xF;
    }
}

impl Default for ColorComponentFlags {
    fn default() -> Self {
        ColorComponentFlags::ALL
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CullModeFlags: u32 {
        const FRONT = 0x1;
        const BACK = 0x2;
        const FRONT_AND_BACK = 0x3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueFlags: u32 {
        const GRAPHICS = 0x1;
        const COMPUTE = 0x2;
        const TRANSFER = 0x4;
        const SPARSE_BINDING = 0x8;
        const PROTECTED = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatFeatureFlags: u32 {
        const SAMPLED_IMAGE = 0x1;
        const STORAGE_IMAGE = 0x2;
        const STORAGE_IMAGE_ATOMIC = 0x4;
        const UNIFORM_TEXEL_BUFFER = 0x8;
        const STORAGE_TEXEL_BUFFER = 0x10;
        const STORAGE_TEXEL_BUFFER_ATOMIC = 0x20;
        const VERTEX_BUFFER = 0x40;
        const COLOR_ATTACHMENT = 0x80;
        const COLOR_ATTACHMENT_BLEND = 0x100;
        const DEPTH_STENCIL_ATTACHMENT = 0x200;
        const BLIT_SRC = 0x400;
        const BLIT_DST = 0x800;
        const SAMPLED_IMAGE_FILTER_LINEAR = 0x1000;
        const TRANSFER_SRC = 0x4000;
        const TRANSFER_DST = 0x8000;
    }
}

bitflags! {
    /// Per-binding flags of a bind group layout entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceBindingFlags: u32 {
        const UPDATE_AFTER_BIND = 0x1;
        const UPDATE_UNUSED_WHILE_PENDING = 0x2;
        const PARTIALLY_BOUND = 0x4;
        const VARIABLE_BIND_GROUP_ENTRIES_COUNT = 0x8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindGroupLayoutFlags: u32 {
        const PUSH_BIND_GROUP = 0x1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccelerationStructureFlags: u32 {
        const ALLOW_UPDATE = 0x1;
        const ALLOW_COMPACTION = 0x2;
        const PREFER_FAST_TRACE = 0x4;
        const PREFER_FAST_BUILD = 0x8;
        const LOW_MEMORY = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GeometryFlags: u32 {
        const OPAQUE = 0x1;
        const NO_DUPLICATE_ANY_HIT_INVOCATION = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GeometryInstanceFlags: u32 {
        const TRIANGLE_FACING_CULL_DISABLE = 0x1;
        const TRIANGLE_FLIP_FACING = 0x2;
        const FORCE_OPAQUE = 0x4;
        const FORCE_NO_OPAQUE = 0x8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompositeAlphaFlags: u32 {
        const OPAQUE = 0x1;
        const PRE_MULTIPLIED = 0x2;
        const POST_MULTIPLIED = 0x4;
        const INHERIT = 0x8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceTransformFlags: u32 {
        const IDENTITY = 0x1;
        const ROTATE_90 = 0x2;
        const ROTATE_180 = 0x4;
        const ROTATE_270 = 0x8;
        const HORIZONTAL_MIRROR = 0x10;
        const HORIZONTAL_MIRROR_ROTATE_90 = 0x20;
        const HORIZONTAL_MIRROR_ROTATE_180 = 0x40;
        const HORIZONTAL_MIRROR_ROTATE_270 = 0x80;
        const INHERIT = 0x100;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Geometry and clear values
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Default for Extent3D {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset2D {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub offset: Offset2D,
    pub extent: Extent2D,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorClearValue {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
}

impl Default for ColorClearValue {
    fn default() -> Self {
        ColorClearValue::Float([0.0; 4])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilClearValue {
    pub depth: f32,
    pub stencil: u32,
}

impl Default for DepthStencilClearValue {
    fn default() -> Self {
        Self {
            depth: 1.0,
            stencil: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSubresourceRange {
    /// Empty means "infer from the texture format"
    pub aspect_mask: TextureAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl Default for TextureSubresourceRange {
    fn default() -> Self {
        Self {
            aspect_mask: TextureAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: REMAINING_ARRAY_LAYERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSubresourceLayers {
    pub aspect_mask: TextureAspectFlags,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl Default for TextureSubresourceLayers {
    fn default() -> Self {
        Self {
            aspect_mask: TextureAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_aspects_follow_format() {
        assert_eq!(Format::R8G8B8A8Unorm.default_aspects(), TextureAspectFlags::COLOR);
        assert_eq!(Format::D32Sfloat.default_aspects(), TextureAspectFlags::DEPTH);
        assert_eq!(Format::S8Uint.default_aspects(), TextureAspectFlags::STENCIL);
        assert_eq!(
            Format::D24UnormS8Uint.default_aspects(),
            TextureAspectFlags::DEPTH | TextureAspectFlags::STENCIL
        );
    }

    #[test]
    fn host_visible_memory_usages() {
        assert!(MemoryUsage::CpuToGpu.is_host_visible());
        assert!(MemoryUsage::GpuToCpu.is_host_visible());
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
        assert!(!MemoryUsage::GpuLazilyAllocated.is_host_visible());
    }
}
