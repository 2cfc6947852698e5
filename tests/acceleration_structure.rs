// Bottom and top level builds on a ray tracing capable device

mod common;

use glam::{Affine3A, Vec3};
use gpu_forge::resources::{AccelerationStructure, Buffer};
use gpu_forge::{
    AccelerationStructureFlags, AccelerationStructureGeometry, AccelerationStructureGeometryShape,
    AccelerationStructureInstance, AccelerationStructureOptions, AccelerationStructureType, BufferOptions,
    BufferUsageFlags, BuildAccelerationStructureEntry, BuildAccelerationStructureMode,
    BuildAccelerationStructureOptions, BuildRangeInfo, CommandRecorderOptions, GeometryFlags, Handle, MemoryUsage,
    SubmitOptions,
};

const AABB_STRIDE: u64 = 24;

fn aabb_buffer(gpu: &mut common::Gpu) -> Handle<Buffer> {
    let bounds: [f32; 6] = [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
    let buffer = gpu.rm.create_buffer(
        gpu.device,
        &BufferOptions {
            label: Some("aabbs".to_string()),
            size: AABB_STRIDE,
            usage: BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY
                | BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            memory_usage: MemoryUsage::CpuToGpu,
            ..Default::default()
        },
        Some(bytemuck::cast_slice(&bounds)),
    );
    assert!(buffer.is_valid());
    buffer
}

fn bottom_level(gpu: &mut common::Gpu) -> Handle<AccelerationStructure> {
    let blas = gpu.rm.create_acceleration_structure(
        gpu.device,
        &AccelerationStructureOptions {
            label: Some("blas".to_string()),
            structure_type: AccelerationStructureType::BottomLevel,
            flags: AccelerationStructureFlags::PREFER_FAST_TRACE | AccelerationStructureFlags::ALLOW_UPDATE,
            geometry_shapes: vec![AccelerationStructureGeometryShape::Aabbs {
                stride: AABB_STRIDE,
                max_primitive_count: 1,
                flags: GeometryFlags::OPAQUE,
            }],
        },
    );
    assert!(blas.is_valid());
    blas
}

fn top_level(gpu: &mut common::Gpu, instance_count: u32) -> Handle<AccelerationStructure> {
    let tlas = gpu.rm.create_acceleration_structure(
        gpu.device,
        &AccelerationStructureOptions {
            label: Some("tlas".to_string()),
            structure_type: AccelerationStructureType::TopLevel,
            flags: AccelerationStructureFlags::PREFER_FAST_TRACE,
            geometry_shapes: vec![AccelerationStructureGeometryShape::Instances {
                max_primitive_count: instance_count,
                flags: GeometryFlags::OPAQUE,
            }],
        },
    );
    assert!(tlas.is_valid());
    tlas
}

fn aabb_build(blas: Handle<AccelerationStructure>, aabbs: Handle<Buffer>, mode: BuildAccelerationStructureMode) -> BuildAccelerationStructureEntry {
    BuildAccelerationStructureEntry {
        mode,
        destination_structure: blas,
        source_structure: None,
        geometries: vec![AccelerationStructureGeometry::Aabbs {
            data: aabbs,
            data_offset: 0,
            stride: AABB_STRIDE,
            flags: GeometryFlags::OPAQUE,
        }],
        build_range_infos: vec![BuildRangeInfo {
            primitive_count: 1,
            ..Default::default()
        }],
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn creation_reports_sizes_and_address() {
    let Some(mut gpu) = common::ray_tracing_gpu() else { return };
    let blas = bottom_level(&mut gpu);

    let native = gpu.rm.get_acceleration_structure(blas).expect("structure exists");
    assert!(native.size > 0);
    assert!(native.build_scratch_size > 0);
    assert!(gpu.rm.acceleration_structure_device_address(blas) != 0);

    gpu.rm.delete_acceleration_structure(blas);
    assert!(gpu.rm.get_acceleration_structure(blas).is_none());
    assert_eq!(gpu.rm.acceleration_structure_device_address(blas), 0);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn bottom_and_top_level_build_in_one_command_buffer() {
    let Some(mut gpu) = common::ray_tracing_gpu() else { return };
    let aabbs = aabb_buffer(&mut gpu);
    let blas = bottom_level(&mut gpu);
    let tlas = top_level(&mut gpu, 2);

    let instances = vec![
        AccelerationStructureInstance {
            acceleration_structure: blas,
            ..Default::default()
        },
        AccelerationStructureInstance {
            acceleration_structure: blas,
            transform: Affine3A::from_translation(Vec3::new(3.0, 0.0, 0.0)),
            instance_custom_index: 1,
            ..Default::default()
        },
    ];

    let command_buffer = {
        let mut recorder = gpu.rm.create_command_recorder(gpu.device, &CommandRecorderOptions::default());
        recorder.build_acceleration_structures(&BuildAccelerationStructureOptions {
            build_geometry_infos: vec![
                aabb_build(blas, aabbs, BuildAccelerationStructureMode::Build),
                BuildAccelerationStructureEntry {
                    destination_structure: tlas,
                    geometries: vec![AccelerationStructureGeometry::Instances {
                        instances,
                        flags: GeometryFlags::OPAQUE,
                    }],
                    // Range taken from the instance count
                    build_range_infos: Vec::new(),
                    ..Default::default()
                },
            ],
        });
        recorder.finish()
    };
    assert!(command_buffer.is_valid());

    gpu.rm.submit(
        gpu.queue,
        &SubmitOptions {
            command_buffers: vec![command_buffer],
            ..Default::default()
        },
    );
    gpu.rm.wait_queue_idle(gpu.queue);
    gpu.rm.delete_command_buffer(command_buffer);

    gpu.rm.delete_acceleration_structure(tlas);
    gpu.rm.delete_acceleration_structure(blas);
    gpu.rm.delete_buffer(aabbs);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn immediate_build_then_update() {
    let Some(mut gpu) = common::ray_tracing_gpu() else { return };
    let aabbs = aabb_buffer(&mut gpu);
    let blas = bottom_level(&mut gpu);

    let built = gpu.rm.build_acceleration_structure_now(
        gpu.queue,
        &BuildAccelerationStructureOptions {
            build_geometry_infos: vec![aabb_build(blas, aabbs, BuildAccelerationStructureMode::Build)],
        },
    );
    assert!(built);

    // Update in place: no source means the destination is the source
    let updated = gpu.rm.build_acceleration_structure_now(
        gpu.queue,
        &BuildAccelerationStructureOptions {
            build_geometry_infos: vec![aabb_build(blas, aabbs, BuildAccelerationStructureMode::Update)],
        },
    );
    assert!(updated);

    gpu.rm.delete_acceleration_structure(blas);
    gpu.rm.delete_buffer(aabbs);
}
