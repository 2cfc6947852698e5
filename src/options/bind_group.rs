// Bind group layout and bind group options

use crate::handle::Handle;
use crate::resources::{AccelerationStructure, BindGroupLayout, Buffer, Sampler, TextureView};
use crate::types::{
    BindGroupLayoutFlags, DeviceSize, ResourceBindingFlags, ResourceBindingType, ShaderStageFlags,
    TextureLayout, WHOLE_SIZE,
};

#[derive(Debug, Clone)]
pub struct ResourceBindingLayout {
    pub binding: u32,
    /// Array size; the upper bound for variable-count bindings
    pub count: u32,
    pub resource_type: ResourceBindingType,
    pub shader_stages: ShaderStageFlags,
    pub flags: ResourceBindingFlags,
    pub immutable_samplers: Vec<Handle<Sampler>>,
}

impl Default for ResourceBindingLayout {
    fn default() -> Self {
        Self {
            binding: 0,
            count: 1,
            resource_type: ResourceBindingType::UniformBuffer,
            shader_stages: ShaderStageFlags::empty(),
            flags: ResourceBindingFlags::empty(),
            immutable_samplers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindGroupLayoutOptions {
    pub label: Option<String>,
    pub bindings: Vec<ResourceBindingLayout>,
    pub flags: BindGroupLayoutFlags,
}

/// Concrete resource bound at one binding slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingResource {
    UniformBuffer {
        buffer: Handle<Buffer>,
        offset: DeviceSize,
        size: DeviceSize,
    },
    StorageBuffer {
        buffer: Handle<Buffer>,
        offset: DeviceSize,
        size: DeviceSize,
    },
    DynamicUniformBuffer {
        buffer: Handle<Buffer>,
        offset: DeviceSize,
        size: DeviceSize,
    },
    DynamicStorageBuffer {
        buffer: Handle<Buffer>,
        offset: DeviceSize,
        size: DeviceSize,
    },
    SampledImage {
        view: Handle<TextureView>,
        layout: TextureLayout,
    },
    CombinedImageSampler {
        view: Handle<TextureView>,
        sampler: Handle<Sampler>,
        layout: TextureLayout,
    },
    Sampler {
        sampler: Handle<Sampler>,
    },
    StorageImage {
        view: Handle<TextureView>,
    },
    InputAttachment {
        view: Handle<TextureView>,
    },
    AccelerationStructure {
        acceleration_structure: Handle<AccelerationStructure>,
    },
}

impl BindingResource {
    pub fn uniform_buffer(buffer: Handle<Buffer>) -> Self {
        BindingResource::UniformBuffer {
            buffer,
            offset: 0,
            size: WHOLE_SIZE,
        }
    }

    pub fn storage_buffer(buffer: Handle<Buffer>) -> Self {
        BindingResource::StorageBuffer {
            buffer,
            offset: 0,
            size: WHOLE_SIZE,
        }
    }

    pub fn resource_type(&self) -> ResourceBindingType {
        match self {
            BindingResource::UniformBuffer { .. } => ResourceBindingType::UniformBuffer,
            BindingResource::StorageBuffer { .. } => ResourceBindingType::StorageBuffer,
            BindingResource::DynamicUniformBuffer { .. } => ResourceBindingType::DynamicUniformBuffer,
            BindingResource::DynamicStorageBuffer { .. } => ResourceBindingType::DynamicStorageBuffer,
            BindingResource::SampledImage { .. } => ResourceBindingType::SampledImage,
            BindingResource::CombinedImageSampler { .. } => ResourceBindingType::CombinedImageSampler,
            BindingResource::Sampler { .. } => ResourceBindingType::Sampler,
            BindingResource::StorageImage { .. } => ResourceBindingType::StorageImage,
            BindingResource::InputAttachment { .. } => ResourceBindingType::InputAttachment,
            BindingResource::AccelerationStructure { .. } => ResourceBindingType::AccelerationStructure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub array_element: u32,
    pub resource: BindingResource,
}

impl BindGroupEntry {
    pub fn new(binding: u32, resource: BindingResource) -> Self {
        Self {
            binding,
            array_element: 0,
            resource,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindGroupOptions {
    pub label: Option<String>,
    pub layout: Handle<BindGroupLayout>,
    pub resources: Vec<BindGroupEntry>,
    /// Descriptor count of a variable-count binding
    pub max_variable_array_length: u32,
}
