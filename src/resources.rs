// Resource tags
//
// Uninhabited marker types used as the type parameter of `Handle<T>`.
// They only exist at the type level so that a `Handle<Buffer>` can never be
// passed where a `Handle<Texture>` is expected.

macro_rules! resource_tags {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub enum $name {}
        )*
    };
}

resource_tags!(
    Instance,
    Adapter,
    /// Logical GPU context
    Device,
    Queue,
    Surface,
    Swapchain,
    Texture,
    /// Typed window onto exactly one texture
    TextureView,
    Buffer,
    ShaderModule,
    RenderPass,
    Framebuffer,
    PipelineLayout,
    GraphicsPipeline,
    ComputePipeline,
    RayTracingPipeline,
    GpuSemaphore,
    Fence,
    CommandRecorder,
    RenderPassCommandRecorder,
    ComputePassCommandRecorder,
    RayTracingPassCommandRecorder,
    TimestampQueryRecorder,
    CommandBuffer,
    BindGroupLayout,
    BindGroup,
    Sampler,
    AccelerationStructure,
);
