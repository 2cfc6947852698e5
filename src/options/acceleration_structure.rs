// Acceleration structure options
//
// Creation only describes the shape of each geometry slot and how many
// primitives it may hold. Buffers and instances are supplied at build time.

use crate::handle::Handle;
use crate::resources::{AccelerationStructure, Buffer};
use crate::types::{
    AccelerationStructureFlags, AccelerationStructureType, BuildAccelerationStructureMode,
    DeviceSize, Format, GeometryFlags, GeometryInstanceFlags, IndexType,
};
use glam::Affine3A;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccelerationStructureGeometryShape {
    Triangles {
        vertex_format: Format,
        vertex_stride: DeviceSize,
        max_vertex: u32,
        /// None for non-indexed triangle lists
        index_type: Option<IndexType>,
        max_primitive_count: u32,
        flags: GeometryFlags,
    },
    Aabbs {
        stride: DeviceSize,
        max_primitive_count: u32,
        flags: GeometryFlags,
    },
    Instances {
        max_primitive_count: u32,
        flags: GeometryFlags,
    },
}

impl AccelerationStructureGeometryShape {
    pub fn max_primitive_count(&self) -> u32 {
        match *self {
            AccelerationStructureGeometryShape::Triangles {
                max_primitive_count,
                ..
            }
            | AccelerationStructureGeometryShape::Aabbs {
                max_primitive_count,
                ..
            }
            | AccelerationStructureGeometryShape::Instances {
                max_primitive_count,
                ..
            } => max_primitive_count,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccelerationStructureOptions {
    pub label: Option<String>,
    pub structure_type: AccelerationStructureType,
    pub flags: AccelerationStructureFlags,
    pub geometry_shapes: Vec<AccelerationStructureGeometryShape>,
}

/// One instance of a bottom level structure inside a top level structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationStructureInstance {
    pub acceleration_structure: Handle<AccelerationStructure>,
    pub transform: Affine3A,
    /// Low 24 bits only
    pub instance_custom_index: u32,
    pub mask: u8,
    /// Low 24 bits only
    pub instance_shader_binding_table_record_offset: u32,
    pub flags: GeometryInstanceFlags,
}

impl Default for AccelerationStructureInstance {
    fn default() -> Self {
        Self {
            acceleration_structure: Handle::null(),
            transform: Affine3A::IDENTITY,
            instance_custom_index: 0,
            mask: 0xff,
            instance_shader_binding_table_record_offset: 0,
            flags: GeometryInstanceFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccelerationStructureGeometry {
    Triangles {
        vertex_format: Format,
        vertex_data: Handle<Buffer>,
        vertex_data_offset: DeviceSize,
        vertex_stride: DeviceSize,
        max_vertex: u32,
        index_type: IndexType,
        /// None treats the vertices as a sequential triangle list
        index_data: Option<Handle<Buffer>>,
        index_data_offset: DeviceSize,
        transform_data: Option<Handle<Buffer>>,
        transform_data_offset: DeviceSize,
        flags: GeometryFlags,
    },
    Aabbs {
        data: Handle<Buffer>,
        data_offset: DeviceSize,
        stride: DeviceSize,
        flags: GeometryFlags,
    },
    Instances {
        instances: Vec<AccelerationStructureInstance>,
        flags: GeometryFlags,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildRangeInfo {
    pub primitive_count: u32,
    pub primitive_offset: u32,
    pub first_vertex: u32,
    pub transform_offset: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BuildAccelerationStructureEntry {
    pub mode: BuildAccelerationStructureMode,
    pub destination_structure: Handle<AccelerationStructure>,
    /// Required for Update mode
    pub source_structure: Option<Handle<AccelerationStructure>>,
    pub geometries: Vec<AccelerationStructureGeometry>,
    /// One per geometry. A missing entry for an instance geometry covers
    /// every instance.
    pub build_range_infos: Vec<BuildRangeInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildAccelerationStructureOptions {
    pub build_geometry_infos: Vec<BuildAccelerationStructureEntry>,
}
