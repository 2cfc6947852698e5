// Acceleration structures - Creation and builds
//
// Creation only sizes a structure: the geometry shapes and primitive counts
// go through the build size query and a backing buffer of exactly that size
// is allocated. Builds resolve every buffer and bottom level structure to a
// device address at record time. Instance records and scratch memory live in
// temporary buffers owned by the command buffer.

use super::align_up;
use super::command_recorder::{record_barriers, Barrier, BarrierTarget, CommandRecorder};
use super::device::VulkanDevice;
use super::enums::{
    acceleration_structure_flags_to_vk, acceleration_structure_type_to_vk, build_mode_to_vk,
    format_to_vk, geometry_flags_to_vk, geometry_instance_flags_to_vk, index_type_to_vk,
};
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::{
    AccelerationStructureGeometry, AccelerationStructureGeometryShape, AccelerationStructureInstance,
    AccelerationStructureOptions, BufferOptions, BuildAccelerationStructureEntry,
    BuildAccelerationStructureOptions, BuildRangeInfo, CommandRecorderOptions, SubmitOptions,
};
use crate::resources::{self, AccelerationStructure, Buffer, Device, Queue};
use crate::types::{
    AccelerationStructureFlags, AccelerationStructureType, AccessFlags, BufferUsageFlags,
    BuildAccelerationStructureMode, DeviceSize, MemoryUsage, PipelineStageFlags,
};
use anyhow::{bail, Context, Result};
use ash::vk;

pub struct VulkanAccelerationStructure {
    pub acceleration_structure: vk::AccelerationStructureKHR,
    pub device: Handle<Device>,
    /// Backing storage, destroyed with the structure
    pub buffer: Handle<Buffer>,
    pub structure_type: AccelerationStructureType,
    pub flags: AccelerationStructureFlags,
    pub size: DeviceSize,
    pub build_scratch_size: DeviceSize,
    pub update_scratch_size: DeviceSize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Geometry translation
// ─────────────────────────────────────────────────────────────────────────────

fn device_address(address: vk::DeviceAddress) -> vk::DeviceOrHostAddressConstKHR {
    vk::DeviceOrHostAddressConstKHR {
        device_address: address,
    }
}

/// Geometry with every address left at 0, for the size query
fn shape_to_vk(shape: &AccelerationStructureGeometryShape) -> vk::AccelerationStructureGeometryKHR {
    match *shape {
        AccelerationStructureGeometryShape::Triangles {
            vertex_format,
            vertex_stride,
            max_vertex,
            index_type,
            flags,
            ..
        } => vk::AccelerationStructureGeometryKHR::builder()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
                    .vertex_format(format_to_vk(vertex_format))
                    .vertex_stride(vertex_stride)
                    .max_vertex(max_vertex)
                    .index_type(index_type.map_or(vk::IndexType::NONE_KHR, index_type_to_vk))
                    .build(),
            })
            .flags(geometry_flags_to_vk(flags))
            .build(),
        AccelerationStructureGeometryShape::Aabbs { stride, flags, .. } => {
            vk::AccelerationStructureGeometryKHR::builder()
                .geometry_type(vk::GeometryTypeKHR::AABBS)
                .geometry(vk::AccelerationStructureGeometryDataKHR {
                    aabbs: vk::AccelerationStructureGeometryAabbsDataKHR::builder()
                        .stride(stride)
                        .build(),
                })
                .flags(geometry_flags_to_vk(flags))
                .build()
        }
        AccelerationStructureGeometryShape::Instances { flags, .. } => instances_geometry(0, flags),
    }
}

fn instances_geometry(address: vk::DeviceAddress, flags: crate::types::GeometryFlags) -> vk::AccelerationStructureGeometryKHR {
    vk::AccelerationStructureGeometryKHR::builder()
        .geometry_type(vk::GeometryTypeKHR::INSTANCES)
        .geometry(vk::AccelerationStructureGeometryDataKHR {
            instances: vk::AccelerationStructureGeometryInstancesDataKHR::builder()
                .array_of_pointers(false)
                .data(device_address(address))
                .build(),
        })
        .flags(geometry_flags_to_vk(flags))
        .build()
}

/// Native instance record. `reference` is the bottom level structure's
/// device address; the transform is written row-major.
pub fn pack_instance(
    instance: &AccelerationStructureInstance,
    reference: vk::DeviceAddress,
) -> vk::AccelerationStructureInstanceKHR {
    let m = instance.transform.matrix3;
    let t = instance.transform.translation;
    let matrix = [
        m.x_axis.x, m.y_axis.x, m.z_axis.x, t.x, //
        m.x_axis.y, m.y_axis.y, m.z_axis.y, t.y, //
        m.x_axis.z, m.y_axis.z, m.z_axis.z, t.z,
    ];
    vk::AccelerationStructureInstanceKHR {
        transform: vk::TransformMatrixKHR { matrix },
        instance_custom_index_and_mask: vk::Packed24_8::new(
            instance.instance_custom_index & 0x00ff_ffff,
            instance.mask,
        ),
        instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
            instance.instance_shader_binding_table_record_offset & 0x00ff_ffff,
            geometry_instance_flags_to_vk(instance.flags).as_raw() as u8,
        ),
        acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
            device_handle: reference,
        },
    }
}

fn instance_bytes(records: &[vk::AccelerationStructureInstanceKHR]) -> &[u8] {
    // SAFETY: the records are plain repr(C) data with no padding between
    // elements, and the slice covers exactly their memory
    unsafe {
        std::slice::from_raw_parts(
            records.as_ptr().cast::<u8>(),
            std::mem::size_of_val(records),
        )
    }
}

/// Which entries need an acceleration structure write to read barrier in
/// front of them: those that read instances once any structure has been
/// written earlier in the command buffer
pub(crate) fn plan_instance_barriers(prior_writes: bool, entries: &[BuildAccelerationStructureEntry]) -> Vec<bool> {
    let mut written = prior_writes;
    entries
        .iter()
        .map(|entry| {
            let reads_instances = entry
                .geometries
                .iter()
                .any(|g| matches!(g, AccelerationStructureGeometry::Instances { .. }));
            let needs_barrier = reads_instances && written;
            written = true;
            needs_barrier
        })
        .collect()
}

/// Range for geometry `index`. Instance geometries without an explicit range
/// cover every instance.
pub(crate) fn build_range_for(entry: &BuildAccelerationStructureEntry, index: usize) -> Result<BuildRangeInfo> {
    if let Some(range) = entry.build_range_infos.get(index) {
        return Ok(*range);
    }
    match &entry.geometries[index] {
        AccelerationStructureGeometry::Instances { instances, .. } => Ok(BuildRangeInfo {
            primitive_count: instances.len() as u32,
            ..Default::default()
        }),
        _ => bail!("Geometry {} has no build range", index),
    }
}

const STRUCTURE_BUILD_BARRIER: Barrier = Barrier {
    src_stages: PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD,
    src_access: AccessFlags::ACCELERATION_STRUCTURE_WRITE,
    dst_stages: PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD,
    dst_access: AccessFlags::ACCELERATION_STRUCTURE_READ,
    target: BarrierTarget::Memory,
};

// ─────────────────────────────────────────────────────────────────────────────
// Creation
// ─────────────────────────────────────────────────────────────────────────────

impl ResourceManager {
    pub fn create_acceleration_structure(
        &mut self,
        device: Handle<Device>,
        options: &AccelerationStructureOptions,
    ) -> Handle<AccelerationStructure> {
        match self.try_create_acceleration_structure(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create acceleration structure: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_acceleration_structure(
        &mut self,
        device_handle: Handle<Device>,
        options: &AccelerationStructureOptions,
    ) -> Result<Handle<AccelerationStructure>> {
        // Step 1: Size query over the declared shapes
        let sizes = {
            let Some(device) = self.devices.get(device_handle) else {
                bail!("Unknown device {:?}", device_handle);
            };
            let loader = device
                .loaders
                .acceleration_structure
                .as_ref()
                .context("VK_KHR_acceleration_structure is not enabled")?;
            let geometries: Vec<vk::AccelerationStructureGeometryKHR> =
                options.geometry_shapes.iter().map(shape_to_vk).collect();
            let max_primitive_counts: Vec<u32> = options
                .geometry_shapes
                .iter()
                .map(|shape| shape.max_primitive_count())
                .collect();
            let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
                .ty(acceleration_structure_type_to_vk(options.structure_type))
                .flags(acceleration_structure_flags_to_vk(options.flags))
                .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
                .geometries(&geometries);
            unsafe {
                loader.get_acceleration_structure_build_sizes(
                    vk::AccelerationStructureBuildTypeKHR::DEVICE,
                    &build_info,
                    &max_primitive_counts,
                )
            }
        };
        log::debug!(
            "Acceleration structure needs {} bytes, scratch {} build / {} update",
            sizes.acceleration_structure_size,
            sizes.build_scratch_size,
            sizes.update_scratch_size
        );

        // Step 2: Backing buffer of exactly that size
        let buffer = self.create_buffer(
            device_handle,
            &BufferOptions {
                label: options.label.clone(),
                size: sizes.acceleration_structure_size,
                usage: BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE | BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                memory_usage: MemoryUsage::GpuOnly,
                ..Default::default()
            },
            None,
        );
        let Some(vk_buffer) = self.buffers.get(buffer).map(|b| b.buffer) else {
            bail!("Could not allocate acceleration structure storage");
        };

        // Step 3: The structure itself
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let Some(loader) = device.loaders.acceleration_structure.as_ref() else {
            bail!("VK_KHR_acceleration_structure is not enabled");
        };
        let create_info = vk::AccelerationStructureCreateInfoKHR::builder()
            .buffer(vk_buffer)
            .offset(0)
            .size(sizes.acceleration_structure_size)
            .ty(acceleration_structure_type_to_vk(options.structure_type));
        let created = unsafe { loader.create_acceleration_structure(&create_info, None) };
        if let Ok(structure) = created {
            device.set_object_name(structure, &options.label);
        }
        let acceleration_structure = match created {
            Ok(structure) => structure,
            Err(e) => {
                self.delete_buffer(buffer);
                bail!("vkCreateAccelerationStructureKHR failed: {:?}", e);
            }
        };

        Ok(self.acceleration_structures.emplace(VulkanAccelerationStructure {
            acceleration_structure,
            device: device_handle,
            buffer,
            structure_type: options.structure_type,
            flags: options.flags,
            size: sizes.acceleration_structure_size,
            build_scratch_size: sizes.build_scratch_size,
            update_scratch_size: sizes.update_scratch_size,
        }))
    }

    pub fn delete_acceleration_structure(&mut self, handle: Handle<AccelerationStructure>) {
        let Some(structure) = self.acceleration_structures.remove(handle) else {
            return;
        };
        if let Some(loader) = self
            .devices
            .get(structure.device)
            .and_then(|d| d.loaders.acceleration_structure.as_ref())
        {
            unsafe { loader.destroy_acceleration_structure(structure.acceleration_structure, None) };
        }
        self.delete_buffer(structure.buffer);
    }

    pub fn get_acceleration_structure(
        &self,
        handle: Handle<AccelerationStructure>,
    ) -> Option<&VulkanAccelerationStructure> {
        self.acceleration_structures.get(handle)
    }

    /// Queried every time, never cached
    pub fn acceleration_structure_device_address(&self, handle: Handle<AccelerationStructure>) -> vk::DeviceAddress {
        let Some(structure) = self.acceleration_structures.get(handle) else {
            return 0;
        };
        let Some(loader) = self
            .devices
            .get(structure.device)
            .and_then(|d| d.loaders.acceleration_structure.as_ref())
        else {
            return 0;
        };
        let info = vk::AccelerationStructureDeviceAddressInfoKHR::builder()
            .acceleration_structure(structure.acceleration_structure);
        unsafe { loader.get_acceleration_structure_device_address(&info) }
    }

    /// Record, submit and wait for a build on `queue`. Temporary buffers are
    /// released before returning.
    pub fn build_acceleration_structure_now(
        &mut self,
        queue: Handle<Queue>,
        options: &BuildAccelerationStructureOptions,
    ) -> bool {
        let Some(device) = self.queues.get(queue).map(|q| q.device) else {
            log::error!("Unknown queue {:?}", queue);
            return false;
        };
        let command_buffer = {
            let mut recorder = self.create_command_recorder(
                device,
                &CommandRecorderOptions {
                    queue: Some(queue),
                    ..Default::default()
                },
            );
            recorder.build_acceleration_structures(options);
            recorder.finish()
        };
        if !command_buffer.is_valid() {
            return false;
        }
        self.submit(
            queue,
            &SubmitOptions {
                command_buffers: vec![command_buffer],
                ..Default::default()
            },
        );
        self.wait_queue_idle(queue);
        self.delete_command_buffer(command_buffer);
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Build recording
// ─────────────────────────────────────────────────────────────────────────────

impl ResourceManager {
    fn buffer_address(&self, buffer: Handle<Buffer>, offset: DeviceSize) -> Result<vk::DeviceAddress> {
        let address = self.buffer_device_address(buffer);
        if address == 0 {
            bail!("Buffer {:?} has no device address", buffer);
        }
        Ok(address + offset)
    }

    /// Temporary host-visible buffer for a build. It is owned by the command
    /// buffer from here on.
    fn build_temporary_buffer(
        &mut self,
        device: Handle<Device>,
        command_buffer: Handle<resources::CommandBuffer>,
        label: &str,
        size: DeviceSize,
        usage: BufferUsageFlags,
        data: Option<&[u8]>,
    ) -> Result<(Handle<Buffer>, vk::DeviceAddress)> {
        let buffer = self.create_buffer(
            device,
            &BufferOptions {
                label: Some(label.to_string()),
                size,
                usage: usage | BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                memory_usage: MemoryUsage::CpuToGpu,
                ..Default::default()
            },
            data,
        );
        if !buffer.is_valid() {
            bail!("Could not allocate {}", label);
        }
        if let Some(cb) = self.command_buffers.get_mut(command_buffer) {
            cb.temporary_buffers.push(buffer);
        }
        let address = self.buffer_address(buffer, 0)?;
        Ok((buffer, address))
    }

    fn geometry_to_vk(
        &mut self,
        device: Handle<Device>,
        command_buffer: Handle<resources::CommandBuffer>,
        geometry: &AccelerationStructureGeometry,
    ) -> Result<vk::AccelerationStructureGeometryKHR> {
        Ok(match geometry {
            AccelerationStructureGeometry::Triangles {
                vertex_format,
                vertex_data,
                vertex_data_offset,
                vertex_stride,
                max_vertex,
                index_type,
                index_data,
                index_data_offset,
                transform_data,
                transform_data_offset,
                flags,
            } => {
                let vertex_address = self.buffer_address(*vertex_data, *vertex_data_offset)?;
                let (index_type, index_address) = match index_data {
                    Some(buffer) => (index_type_to_vk(*index_type), self.buffer_address(*buffer, *index_data_offset)?),
                    None => (vk::IndexType::NONE_KHR, 0),
                };
                let transform_address = match transform_data {
                    Some(buffer) => self.buffer_address(*buffer, *transform_data_offset)?,
                    None => 0,
                };
                vk::AccelerationStructureGeometryKHR::builder()
                    .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR {
                        triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
                            .vertex_format(format_to_vk(*vertex_format))
                            .vertex_data(device_address(vertex_address))
                            .vertex_stride(*vertex_stride)
                            .max_vertex(*max_vertex)
                            .index_type(index_type)
                            .index_data(device_address(index_address))
                            .transform_data(device_address(transform_address))
                            .build(),
                    })
                    .flags(geometry_flags_to_vk(*flags))
                    .build()
            }
            AccelerationStructureGeometry::Aabbs {
                data,
                data_offset,
                stride,
                flags,
            } => {
                let address = self.buffer_address(*data, *data_offset)?;
                vk::AccelerationStructureGeometryKHR::builder()
                    .geometry_type(vk::GeometryTypeKHR::AABBS)
                    .geometry(vk::AccelerationStructureGeometryDataKHR {
                        aabbs: vk::AccelerationStructureGeometryAabbsDataKHR::builder()
                            .data(device_address(address))
                            .stride(*stride)
                            .build(),
                    })
                    .flags(geometry_flags_to_vk(*flags))
                    .build()
            }
            AccelerationStructureGeometry::Instances { instances, flags } => {
                let records = instances
                    .iter()
                    .map(|instance| {
                        let reference = self.acceleration_structure_device_address(instance.acceleration_structure);
                        if reference == 0 {
                            bail!("Instance references unknown structure {:?}", instance.acceleration_structure);
                        }
                        Ok(pack_instance(instance, reference))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let address = if records.is_empty() {
                    0
                } else {
                    let bytes = instance_bytes(&records);
                    self.build_temporary_buffer(
                        device,
                        command_buffer,
                        "acceleration structure instances",
                        bytes.len() as DeviceSize,
                        BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY,
                        Some(bytes),
                    )?
                    .1
                };
                instances_geometry(address, *flags)
            }
        })
    }

    fn record_acceleration_structure_build(
        &mut self,
        recorder: Handle<resources::CommandRecorder>,
        entry: &BuildAccelerationStructureEntry,
    ) -> Result<()> {
        let (device_handle, cmd, command_buffer) = self
            .command_recorders
            .get(recorder)
            .map(|r| (r.device, r.native, r.command_buffer))
            .with_context(|| format!("Unknown command recorder {:?}", recorder))?;
        let destination = self
            .acceleration_structures
            .get(entry.destination_structure)
            .with_context(|| format!("Unknown acceleration structure {:?}", entry.destination_structure))?;
        let (dst, structure_type, flags) = (
            destination.acceleration_structure,
            destination.structure_type,
            destination.flags,
        );
        let scratch_size = match entry.mode {
            BuildAccelerationStructureMode::Build => destination.build_scratch_size,
            BuildAccelerationStructureMode::Update => destination.update_scratch_size,
        };
        let src = match entry.mode {
            BuildAccelerationStructureMode::Build => vk::AccelerationStructureKHR::null(),
            BuildAccelerationStructureMode::Update => {
                let source = entry.source_structure.unwrap_or(entry.destination_structure);
                self.acceleration_structures
                    .get(source)
                    .map(|s| s.acceleration_structure)
                    .with_context(|| format!("Unknown source structure {:?}", source))?
            }
        };

        // Step 1: Geometries and their ranges
        let ranges = (0..entry.geometries.len())
            .map(|i| {
                build_range_for(entry, i).map(|r| vk::AccelerationStructureBuildRangeInfoKHR {
                    primitive_count: r.primitive_count,
                    primitive_offset: r.primitive_offset,
                    first_vertex: r.first_vertex,
                    transform_offset: r.transform_offset,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let geometries = entry
            .geometries
            .iter()
            .map(|geometry| self.geometry_to_vk(device_handle, command_buffer, geometry))
            .collect::<Result<Vec<_>>>()?;

        // Step 2: Scratch, aligned for the build
        let alignment = self
            .devices
            .get(device_handle)
            .map(|d| DeviceSize::from(d.properties.acceleration_structure.min_acceleration_structure_scratch_offset_alignment))
            .unwrap_or(1);
        let (_, scratch) = self.build_temporary_buffer(
            device_handle,
            command_buffer,
            "acceleration structure scratch",
            scratch_size.max(1) + alignment,
            BufferUsageFlags::STORAGE_BUFFER,
            None,
        )?;
        let scratch = align_up(scratch, alignment);

        // Step 3: Record
        let device: &VulkanDevice = self
            .devices
            .get(device_handle)
            .with_context(|| format!("Unknown device {:?}", device_handle))?;
        let loader = device
            .loaders
            .acceleration_structure
            .as_ref()
            .context("VK_KHR_acceleration_structure is not enabled")?;
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(acceleration_structure_type_to_vk(structure_type))
            .flags(acceleration_structure_flags_to_vk(flags))
            .mode(build_mode_to_vk(entry.mode))
            .src_acceleration_structure(src)
            .dst_acceleration_structure(dst)
            .geometries(&geometries)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch,
            });
        unsafe { loader.cmd_build_acceleration_structures(cmd, &[build_info.build()], &[&ranges[..]]) };
        Ok(())
    }
}

impl CommandRecorder<'_> {
    /// Record every build in order. Entries that read instances wait for the
    /// structures written before them.
    pub fn build_acceleration_structures(&mut self, options: &BuildAccelerationStructureOptions) {
        let Some(prior_writes) = self.recorder().map(|r| r.acceleration_structure_writes) else {
            return;
        };
        let barriers = plan_instance_barriers(prior_writes, &options.build_geometry_infos);

        for (entry, needs_barrier) in options.build_geometry_infos.iter().zip(barriers) {
            if needs_barrier {
                if let Some((device, cmd)) = self.target() {
                    record_barriers(device, cmd, &[STRUCTURE_BUILD_BARRIER]);
                }
            }
            if let Err(e) = self.rm.record_acceleration_structure_build(self.handle, entry) {
                log::error!("Failed to record acceleration structure build: {:#}", e);
                continue;
            }
            if let Some(recorder) = self.rm.command_recorders.get_mut(self.handle) {
                recorder.acceleration_structure_writes = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Affine3A, Vec3};

    fn instances_entry(count: usize) -> BuildAccelerationStructureEntry {
        BuildAccelerationStructureEntry {
            geometries: vec![AccelerationStructureGeometry::Instances {
                instances: vec![AccelerationStructureInstance::default(); count],
                flags: Default::default(),
            }],
            ..Default::default()
        }
    }

    fn aabbs_entry() -> BuildAccelerationStructureEntry {
        BuildAccelerationStructureEntry {
            geometries: vec![AccelerationStructureGeometry::Aabbs {
                data: Handle::null(),
                data_offset: 0,
                stride: 24,
                flags: Default::default(),
            }],
            build_range_infos: vec![BuildRangeInfo {
                primitive_count: 1,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn instance_record_is_64_bytes() {
        assert_eq!(std::mem::size_of::<vk::AccelerationStructureInstanceKHR>(), 64);
        let records = [pack_instance(&AccelerationStructureInstance::default(), 1); 3];
        assert_eq!(instance_bytes(&records).len(), 192);
    }

    #[test]
    fn instance_packing_is_row_major() {
        let instance = AccelerationStructureInstance {
            transform: Affine3A::from_scale_rotation_translation(
                Vec3::new(2.0, 3.0, 4.0),
                Default::default(),
                Vec3::new(1.0, 5.0, 7.0),
            ),
            instance_custom_index: 0x0123_4567,
            mask: 0xab,
            instance_shader_binding_table_record_offset: 9,
            ..Default::default()
        };
        let record = pack_instance(&instance, 0xdead_beef);
        let m = record.transform.matrix;
        assert_eq!([m[0], m[5], m[10]], [2.0, 3.0, 4.0]);
        assert_eq!([m[3], m[7], m[11]], [1.0, 5.0, 7.0]);
        // Custom index keeps its low 24 bits
        assert_eq!(record.instance_custom_index_and_mask.low_24(), 0x23_4567);
        assert_eq!(record.instance_custom_index_and_mask.high_8(), 0xab);
        assert_eq!(record.instance_shader_binding_table_record_offset_and_flags.low_24(), 9);
        assert_eq!(unsafe { record.acceleration_structure_reference.device_handle }, 0xdead_beef);
    }

    #[test]
    fn top_level_after_bottom_level_gets_a_barrier() {
        let entries = [aabbs_entry(), instances_entry(2)];
        assert_eq!(plan_instance_barriers(false, &entries), vec![false, true]);
    }

    #[test]
    fn lone_top_level_needs_no_barrier() {
        assert_eq!(plan_instance_barriers(false, &[instances_entry(1)]), vec![false]);
        // Unless this command buffer already built something
        assert_eq!(plan_instance_barriers(true, &[instances_entry(1)]), vec![true]);
    }

    #[test]
    fn bottom_levels_never_wait() {
        let entries = [aabbs_entry(), aabbs_entry()];
        assert_eq!(plan_instance_barriers(true, &entries), vec![false, false]);
    }

    #[test]
    fn instance_range_defaults_to_instance_count() {
        let entry = instances_entry(5);
        assert_eq!(build_range_for(&entry, 0).unwrap().primitive_count, 5);

        let mut entry = aabbs_entry();
        assert_eq!(build_range_for(&entry, 0).unwrap().primitive_count, 1);
        entry.build_range_infos.clear();
        assert!(build_range_for(&entry, 0).is_err());
    }

    #[test]
    fn size_query_shapes_have_no_addresses() {
        let shape = AccelerationStructureGeometryShape::Triangles {
            vertex_format: crate::types::Format::R32G32B32Sfloat,
            vertex_stride: 12,
            max_vertex: 3,
            index_type: None,
            max_primitive_count: 1,
            flags: Default::default(),
        };
        let geometry = shape_to_vk(&shape);
        assert_eq!(geometry.geometry_type, vk::GeometryTypeKHR::TRIANGLES);
        let triangles = unsafe { geometry.geometry.triangles };
        assert_eq!(triangles.index_type, vk::IndexType::NONE_KHR);
        assert_eq!(triangles.vertex_stride, 12);
        assert_eq!(unsafe { triangles.vertex_data.device_address }, 0);
    }

    #[test]
    fn unknown_structure_has_no_address() {
        let manager = ResourceManager::new();
        assert_eq!(manager.acceleration_structure_device_address(Handle::null()), 0);
    }
}
