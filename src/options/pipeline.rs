// Shader module, pipeline layout and pipeline options

use crate::handle::Handle;
use crate::resources::{BindGroupLayout, PipelineLayout, RenderPass, ShaderModule};
use crate::types::{
    BlendFactor, BlendOperation, ColorComponentFlags, CompareOperation, CullModeFlags,
    DynamicState, Format, FrontFace, PolygonMode, PrimitiveTopology, RayTracingShaderGroupType,
    SampleCount, ShaderStageFlags, StencilOperation, VertexRate,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecializationValue {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Float(f32),
    Double(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecializationConstant {
    pub constant_id: u32,
    pub value: SpecializationValue,
}

#[derive(Debug, Clone)]
pub struct ShaderStage {
    pub shader_module: Handle<ShaderModule>,
    pub stage: ShaderStageFlags,
    pub entry_point: String,
    pub specialization_constants: Vec<SpecializationConstant>,
}

impl Default for ShaderStage {
    fn default() -> Self {
        Self {
            shader_module: Handle::null(),
            stage: ShaderStageFlags::VERTEX,
            entry_point: "main".to_string(),
            specialization_constants: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
    pub shader_stages: ShaderStageFlags,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutOptions {
    pub label: Option<String>,
    pub bind_group_layouts: Vec<Handle<BindGroupLayout>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Graphics pipeline state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexBufferLayout {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Debug, Clone, Default)]
pub struct VertexOptions {
    pub buffers: Vec<VertexBufferLayout>,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendComponent {
    pub operation: BlendOperation,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            operation: BlendOperation::Add,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendOptions {
    pub blending_enabled: bool,
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderTargetOptions {
    pub format: Format,
    pub write_mask: ColorComponentFlags,
    pub blending: BlendOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilOperationOptions {
    pub fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub compare_op: CompareOperation,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilOperationOptions {
    fn default() -> Self {
        Self {
            fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            compare_op: CompareOperation::Always,
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilOptions {
    pub format: Format,
    pub depth_test_enabled: bool,
    pub depth_writes_enabled: bool,
    pub depth_compare_operation: CompareOperation,
    pub stencil_test_enabled: bool,
    pub stencil_front: StencilOperationOptions,
    pub stencil_back: StencilOperationOptions,
    /// The synthesised render pass gets a depth-stencil resolve attachment
    pub resolve_depth_stencil: bool,
}

impl Default for DepthStencilOptions {
    fn default() -> Self {
        Self {
            format: Format::Undefined,
            depth_test_enabled: true,
            depth_writes_enabled: true,
            depth_compare_operation: CompareOperation::Less,
            stencil_test_enabled: false,
            stencil_front: StencilOperationOptions::default(),
            stencil_back: StencilOperationOptions::default(),
            resolve_depth_stencil: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBiasOptions {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveOptions {
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
    pub cull_mode: CullModeFlags,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    /// Tessellation is enabled when non-zero
    pub patch_control_points: u32,
    pub depth_clamp_enabled: bool,
    pub depth_bias: Option<DepthBiasOptions>,
    pub line_width: f32,
}

impl Default for PrimitiveOptions {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart: false,
            cull_mode: CullModeFlags::BACK,
            front_face: FrontFace::CounterClockwise,
            polygon_mode: PolygonMode::Fill,
            patch_control_points: 0,
            depth_clamp_enabled: false,
            depth_bias: None,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultisampleOptions {
    pub samples: SampleCount,
    pub sample_masks: Vec<u32>,
    pub alpha_to_coverage_enabled: bool,
}

impl Default for MultisampleOptions {
    fn default() -> Self {
        Self {
            samples: SampleCount::Samples1,
            sample_masks: vec![0xffff_ffff],
            alpha_to_coverage_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphicsPipelineOptions {
    pub label: Option<String>,
    pub shader_stages: Vec<ShaderStage>,
    pub layout: Handle<PipelineLayout>,
    pub vertex: VertexOptions,
    pub render_targets: Vec<RenderTargetOptions>,
    pub depth_stencil: Option<DepthStencilOptions>,
    pub primitive: PrimitiveOptions,
    pub multisample: MultisampleOptions,
    /// Viewport and scissor are always dynamic and need not be listed
    pub dynamic_states: Vec<DynamicState>,
    pub view_count: u32,
    /// Render pass the pipeline must be compatible with. When None a
    /// compatible render pass is created and owned by the pipeline.
    pub render_pass: Option<Handle<RenderPass>>,
    pub subpass_index: u32,
    /// Build for dynamic rendering passes. `render_pass` and `subpass_index`
    /// are ignored and no render pass is created.
    pub dynamic_rendering: bool,
}

impl Default for GraphicsPipelineOptions {
    fn default() -> Self {
        Self {
            label: None,
            shader_stages: Vec::new(),
            layout: Handle::null(),
            vertex: VertexOptions::default(),
            render_targets: Vec::new(),
            depth_stencil: None,
            primitive: PrimitiveOptions::default(),
            multisample: MultisampleOptions::default(),
            dynamic_states: Vec::new(),
            view_count: 1,
            render_pass: None,
            subpass_index: 0,
            dynamic_rendering: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComputePipelineOptions {
    pub label: Option<String>,
    pub layout: Handle<PipelineLayout>,
    pub shader_stage: ShaderStage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ray tracing
// ─────────────────────────────────────────────────────────────────────────────

/// Indices refer to RayTracingPipelineOptions::shader_stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayTracingShaderGroupOptions {
    pub group_type: RayTracingShaderGroupType,
    pub general_shader_index: Option<u32>,
    pub closest_hit_shader_index: Option<u32>,
    pub any_hit_shader_index: Option<u32>,
    pub intersection_shader_index: Option<u32>,
}

impl RayTracingShaderGroupOptions {
    pub fn general(index: u32) -> Self {
        Self {
            group_type: RayTracingShaderGroupType::General,
            general_shader_index: Some(index),
            closest_hit_shader_index: None,
            any_hit_shader_index: None,
            intersection_shader_index: None,
        }
    }

    pub fn triangles_hit(closest_hit: Option<u32>, any_hit: Option<u32>) -> Self {
        Self {
            group_type: RayTracingShaderGroupType::TrianglesHit,
            general_shader_index: None,
            closest_hit_shader_index: closest_hit,
            any_hit_shader_index: any_hit,
            intersection_shader_index: None,
        }
    }

    pub fn procedural_hit(intersection: u32, closest_hit: Option<u32>, any_hit: Option<u32>) -> Self {
        Self {
            group_type: RayTracingShaderGroupType::ProceduralHit,
            general_shader_index: None,
            closest_hit_shader_index: closest_hit,
            any_hit_shader_index: any_hit,
            intersection_shader_index: Some(intersection),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RayTracingPipelineOptions {
    pub label: Option<String>,
    pub shader_stages: Vec<ShaderStage>,
    pub shader_groups: Vec<RayTracingShaderGroupOptions>,
    pub layout: Handle<PipelineLayout>,
    /// 0 uses the adapter's maximum
    pub max_recursion_depth: u32,
}

/// Region sizes of a shader binding table. The ray generation region always
/// holds exactly one group.
#[derive(Debug, Clone, Default)]
pub struct RayTracingShaderBindingTableOptions {
    pub label: Option<String>,
    pub miss_shader_count: u32,
    pub hit_shader_count: u32,
}
