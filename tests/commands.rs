// Command recording against a real device

mod common;

use gpu_forge::config::BindGroupPoolConfig;
use gpu_forge::resources::Buffer;
use gpu_forge::{
    AccessFlags, BindGroupEntry, BindGroupLayoutOptions, BindGroupOptions, BindingResource, BufferClear, BufferCopy,
    BufferOptions, BufferUsageFlags, CommandBufferLevel, CommandRecorderOptions, DeviceOptions, FenceOptions,
    FenceStatus, Handle, MemoryBarrier, MemoryBarrierOptions, MemoryUsage, PipelineStageFlags,
    ResourceBindingLayout, ResourceBindingType, ShaderStageFlags, SubmitOptions, WHOLE_SIZE,
};

fn buffer(gpu: &mut common::Gpu, size: u64, memory_usage: MemoryUsage, data: Option<&[u8]>) -> Handle<Buffer> {
    let buffer = gpu.rm.create_buffer(
        gpu.device,
        &BufferOptions {
            label: Some("test buffer".to_string()),
            size,
            usage: BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::TRANSFER_DST | BufferUsageFlags::UNIFORM_BUFFER,
            memory_usage,
            ..Default::default()
        },
        data,
    );
    assert!(buffer.is_valid());
    buffer
}

fn transfer_barrier() -> MemoryBarrierOptions {
    MemoryBarrierOptions {
        src_stages: PipelineStageFlags::TRANSFER,
        dst_stages: PipelineStageFlags::TRANSFER,
        memory_barriers: vec![MemoryBarrier {
            src_mask: AccessFlags::TRANSFER_WRITE,
            dst_mask: AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
        }],
    }
}

fn submit_and_wait(gpu: &mut common::Gpu, command_buffer: Handle<gpu_forge::resources::CommandBuffer>) {
    let fence = gpu.rm.create_fence(gpu.device, &FenceOptions::default());
    gpu.rm.submit(
        gpu.queue,
        &SubmitOptions {
            command_buffers: vec![command_buffer],
            signal_fence: Some(fence),
            ..Default::default()
        },
    );
    assert_eq!(gpu.rm.wait_for_fence(fence, u64::MAX), FenceStatus::Signalled);
    gpu.rm.delete_fence(fence);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn upload_reads_back_for_every_host_visible_usage() {
    let Some(mut gpu) = common::gpu() else { return };
    let bytes: Vec<u8> = (0..64u8).collect();
    for usage in [MemoryUsage::CpuOnly, MemoryUsage::CpuToGpu, MemoryUsage::GpuToCpu] {
        let buffer = buffer(&mut gpu, 64, usage, Some(&bytes));
        assert_eq!(gpu.rm.read_buffer(buffer, 0, 64), Some(bytes.clone()), "{:?}", usage);
        gpu.rm.delete_buffer(buffer);
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn deleted_buffer_handle_stays_dead_after_slot_reuse() {
    let Some(mut gpu) = common::gpu() else { return };
    let first = buffer(&mut gpu, 16, MemoryUsage::CpuToGpu, None);
    gpu.rm.delete_buffer(first);
    let second = buffer(&mut gpu, 16, MemoryUsage::CpuToGpu, None);

    assert!(gpu.rm.get_buffer(first).is_none());
    assert!(gpu.rm.get_buffer(second).is_some());
    // Out of range writes are refused
    assert!(!gpu.rm.write_buffer(second, 14, &[0; 4]));
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn copies_execute_in_recording_order() {
    let Some(mut gpu) = common::gpu() else { return };
    let input: [f32; 4] = [1.0, 2.0, 3.0, 4.0];
    let a = buffer(&mut gpu, 16, MemoryUsage::CpuToGpu, Some(bytemuck::cast_slice(&input)));
    let b = buffer(&mut gpu, 16, MemoryUsage::GpuOnly, None);
    let c = buffer(&mut gpu, 16, MemoryUsage::GpuToCpu, None);

    let command_buffer = {
        let mut recorder = gpu.rm.create_command_recorder(gpu.device, &CommandRecorderOptions::default());
        recorder.copy_buffer(&BufferCopy {
            src: a,
            src_offset: 8,
            dst: b,
            dst_offset: 0,
            byte_size: 8,
        });
        recorder.copy_buffer(&BufferCopy {
            src: a,
            src_offset: 0,
            dst: b,
            dst_offset: 8,
            byte_size: 8,
        });
        recorder.memory_barrier(&transfer_barrier());
        recorder.copy_buffer(&BufferCopy {
            src: b,
            dst: c,
            byte_size: 16,
            ..Default::default()
        });
        recorder.finish()
    };
    assert!(command_buffer.is_valid());
    submit_and_wait(&mut gpu, command_buffer);

    let bytes = gpu.rm.read_buffer(c, 0, 16).unwrap_or_default();
    let output: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(output, vec![3.0, 4.0, 1.0, 2.0]);

    gpu.rm.delete_command_buffer(command_buffer);
    assert!(gpu.rm.get_command_buffer(command_buffer).is_none());
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn secondary_copy_matches_direct_copy() {
    let Some(mut gpu) = common::gpu() else { return };
    let input: Vec<u8> = (1..=16u8).collect();
    let source = buffer(&mut gpu, 16, MemoryUsage::CpuToGpu, Some(&input));
    let direct = buffer(&mut gpu, 16, MemoryUsage::GpuToCpu, None);
    let indirect = buffer(&mut gpu, 16, MemoryUsage::GpuToCpu, None);
    let copy_into = |dst| BufferCopy {
        src: source,
        dst,
        byte_size: 16,
        ..Default::default()
    };

    let secondary = {
        let mut recorder = gpu.rm.create_command_recorder(
            gpu.device,
            &CommandRecorderOptions {
                level: CommandBufferLevel::Secondary,
                ..Default::default()
            },
        );
        recorder.copy_buffer(&copy_into(indirect));
        recorder.finish()
    };
    let primary = {
        let mut recorder = gpu.rm.create_command_recorder(gpu.device, &CommandRecorderOptions::default());
        recorder.copy_buffer(&copy_into(direct));
        recorder.execute_secondary_command_buffer(secondary);
        recorder.finish()
    };
    submit_and_wait(&mut gpu, primary);

    let direct_bytes = gpu.rm.read_buffer(direct, 0, 16);
    assert_eq!(direct_bytes, Some(input));
    assert_eq!(gpu.rm.read_buffer(indirect, 0, 16), direct_bytes);

    gpu.rm.delete_command_buffer(primary);
    gpu.rm.delete_command_buffer(secondary);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn clear_fills_whole_buffer() {
    let Some(mut gpu) = common::gpu() else { return };
    let target = buffer(&mut gpu, 8, MemoryUsage::GpuToCpu, None);
    let command_buffer = {
        let mut recorder = gpu.rm.create_command_recorder(gpu.device, &CommandRecorderOptions::default());
        recorder.clear_buffer(&BufferClear {
            dst_buffer: target,
            dst_offset: 0,
            byte_size: WHOLE_SIZE,
            clear_value: 0x0101_0101,
        });
        recorder.finish()
    };
    submit_and_wait(&mut gpu, command_buffer);
    assert_eq!(gpu.rm.read_buffer(target, 0, 8), Some(vec![1u8; 8]));
    gpu.rm.delete_command_buffer(command_buffer);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn fence_starts_signalled_when_asked() {
    let Some(mut gpu) = common::gpu() else { return };
    let fence = gpu.rm.create_fence(
        gpu.device,
        &FenceOptions {
            create_signalled: true,
            ..Default::default()
        },
    );
    assert_eq!(gpu.rm.fence_status(fence), FenceStatus::Signalled);
    gpu.rm.reset_fence(fence);
    assert_eq!(gpu.rm.fence_status(fence), FenceStatus::Unsignalled);
    gpu.rm.delete_fence(fence);
    assert_eq!(gpu.rm.fence_status(fence), FenceStatus::Error);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn bind_groups_outlive_the_first_descriptor_pool() {
    let Some(mut gpu) = common::gpu_with_options(DeviceOptions {
        bind_group_pool: BindGroupPoolConfig {
            uniform_buffers: 4,
            max_sets: 4,
            ..Default::default()
        },
        ..Default::default()
    }) else {
        return;
    };
    let uniforms = buffer(&mut gpu, 256, MemoryUsage::CpuToGpu, None);
    let layout = gpu.rm.create_bind_group_layout(
        gpu.device,
        &BindGroupLayoutOptions {
            bindings: vec![ResourceBindingLayout {
                binding: 0,
                count: 1,
                resource_type: ResourceBindingType::UniformBuffer,
                shader_stages: ShaderStageFlags::COMPUTE,
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    assert!(layout.is_valid());

    let groups: Vec<_> = (0..10)
        .map(|_| {
            gpu.rm.create_bind_group(
                gpu.device,
                &BindGroupOptions {
                    layout,
                    resources: vec![BindGroupEntry::new(
                        0,
                        BindingResource::UniformBuffer {
                            buffer: uniforms,
                            offset: 0,
                            size: WHOLE_SIZE,
                        },
                    )],
                    ..Default::default()
                },
            )
        })
        .collect();
    assert!(groups.iter().all(|g| g.is_valid()));

    for group in groups {
        gpu.rm.delete_bind_group(group);
    }
    gpu.rm.delete_bind_group_layout(layout);
}
