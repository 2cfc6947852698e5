// Bind groups - Descriptor set layouts, pools and sets
//
// Sets are allocated from the device's newest descriptor pool. When that pool
// runs dry a fresh one is created from the configured sizes and allocation is
// retried once. Layouts that request update-after-bind use a separate pool
// list created with the matching flag.

use super::device::VulkanDevice;
use super::enums::{resource_binding_flags_to_vk, resource_binding_type_to_vk, shader_stage_flags_to_vk, texture_layout_to_vk};
use super::resource_manager::ResourceManager;
use crate::config::BindGroupPoolConfig;
use crate::handle::Handle;
use crate::options::{BindGroupEntry, BindGroupLayoutOptions, BindGroupOptions, BindingResource, ResourceBindingLayout};
use crate::resources::{BindGroup, BindGroupLayout, Device};
use crate::types::{BindGroupLayoutFlags, ResourceBindingFlags};
use anyhow::{anyhow, bail, Context, Result};
use ash::prelude::VkResult;
use ash::vk;

pub struct VulkanBindGroupLayout {
    pub layout: vk::DescriptorSetLayout,
    pub device: Handle<Device>,
    pub bindings: Vec<ResourceBindingLayout>,
    pub flags: BindGroupLayoutFlags,
    pub update_after_bind: bool,
}

impl VulkanBindGroupLayout {
    fn has_variable_count(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| b.flags.contains(ResourceBindingFlags::VARIABLE_BIND_GROUP_ENTRIES_COUNT))
    }
}

pub struct VulkanBindGroup {
    pub descriptor_set: vk::DescriptorSet,
    pub pool: vk::DescriptorPool,
    pub device: Handle<Device>,
    pub layout: Handle<BindGroupLayout>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pools
// ─────────────────────────────────────────────────────────────────────────────

/// Pool sizes from config. Dynamic storage buffers share the dynamic uniform
/// budget. Acceleration structure descriptors need the extension enabled.
pub(crate) fn descriptor_pool_sizes(
    config: &BindGroupPoolConfig,
    acceleration_structures: bool,
) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes = vec![
        (vk::DescriptorType::UNIFORM_BUFFER, config.uniform_buffers),
        (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, config.dynamic_uniform_buffers),
        (vk::DescriptorType::STORAGE_BUFFER, config.storage_buffers),
        (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, config.dynamic_uniform_buffers),
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, config.combined_image_samplers),
        (vk::DescriptorType::SAMPLED_IMAGE, config.sampled_images),
        (vk::DescriptorType::SAMPLER, config.samplers),
        (vk::DescriptorType::STORAGE_IMAGE, config.storage_images),
        (vk::DescriptorType::INPUT_ATTACHMENT, config.input_attachments),
    ];
    if acceleration_structures {
        sizes.push((
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            config.acceleration_structures,
        ));
    }
    sizes
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect()
}

fn create_descriptor_pool(device: &VulkanDevice, update_after_bind: bool) -> VkResult<vk::DescriptorPool> {
    let config = &device.bind_group_pool_config;
    let sizes = descriptor_pool_sizes(config, device.enabled_features.acceleration_structures);
    let mut flags = vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
    if update_after_bind {
        flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
    }
    let create_info = vk::DescriptorPoolCreateInfo::builder()
        .flags(flags)
        .max_sets(config.max_sets.max(1))
        .pool_sizes(&sizes);
    let pool = unsafe { device.device.create_descriptor_pool(&create_info, None) }?;
    log::debug!(
        "Created descriptor pool ({} sets{})",
        config.max_sets,
        if update_after_bind { ", update after bind" } else { "" }
    );
    Ok(pool)
}

fn allocate_from(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    variable_count: Option<u32>,
) -> VkResult<vk::DescriptorSet> {
    let layouts = [layout];
    let counts = [variable_count.unwrap_or(0)];
    let mut variable_info =
        vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder().descriptor_counts(&counts);
    let mut allocate_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    if variable_count.is_some() {
        allocate_info = allocate_info.push_next(&mut variable_info);
    }
    let sets = unsafe { device.allocate_descriptor_sets(&allocate_info) }?;
    Ok(sets[0])
}

/// Outcome of an allocation attempt. `new_pools` lists every pool created on
/// the way, whether or not the allocation succeeded.
pub(crate) struct PoolAllocation<P> {
    pub result: Result<(vk::DescriptorSet, P)>,
    pub new_pools: Vec<P>,
}

/// Allocate from `current`, creating a pool when there is none. An exhausted
/// or fragmented pool gets exactly one retry in a new pool.
pub(crate) fn allocate_with_retry<P: Copy>(
    current: Option<P>,
    mut new_pool: impl FnMut() -> VkResult<P>,
    mut allocate: impl FnMut(P) -> VkResult<vk::DescriptorSet>,
) -> PoolAllocation<P> {
    let mut new_pools = Vec::new();
    let pool = match current {
        Some(pool) => pool,
        None => match new_pool() {
            Ok(pool) => {
                new_pools.push(pool);
                pool
            }
            Err(e) => {
                return PoolAllocation {
                    result: Err(anyhow!("Failed to create descriptor pool: {:?}", e)),
                    new_pools,
                }
            }
        },
    };

    let result = match allocate(pool) {
        Ok(set) => Ok((set, pool)),
        Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
            log::debug!("Descriptor pool exhausted, creating another");
            match new_pool() {
                Ok(retry_pool) => {
                    new_pools.push(retry_pool);
                    allocate(retry_pool)
                        .map(|set| (set, retry_pool))
                        .map_err(|e| anyhow!("Descriptor set allocation failed after retry: {:?}", e))
                }
                Err(e) => Err(anyhow!("Failed to create descriptor pool: {:?}", e)),
            }
        }
        Err(e) => Err(anyhow!("Descriptor set allocation failed: {:?}", e)),
    };
    PoolAllocation { result, new_pools }
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptor writes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub(crate) enum ResolvedDescriptor {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
    AccelerationStructure(vk::AccelerationStructureKHR),
}

/// One bind group entry with its handles resolved to native objects
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedWrite {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor: ResolvedDescriptor,
}

/// Build the native writes for `set` and hand them to `f`. The info structs
/// they point at live for the duration of the call.
pub(crate) fn with_descriptor_writes<R>(
    set: vk::DescriptorSet,
    resolved: &[ResolvedWrite],
    f: impl FnOnce(&[vk::WriteDescriptorSet]) -> R,
) -> R {
    let mut acceleration_infos: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> = resolved
        .iter()
        .map(|write| match &write.descriptor {
            ResolvedDescriptor::AccelerationStructure(structure) => {
                vk::WriteDescriptorSetAccelerationStructureKHR::builder()
                    .acceleration_structures(std::slice::from_ref(structure))
                    .build()
            }
            _ => vk::WriteDescriptorSetAccelerationStructureKHR::default(),
        })
        .collect();

    let writes: Vec<vk::WriteDescriptorSet> = resolved
        .iter()
        .zip(acceleration_infos.iter_mut())
        .map(|(write, acceleration_info)| {
            let builder = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(write.binding)
                .dst_array_element(write.array_element)
                .descriptor_type(write.descriptor_type);
            match &write.descriptor {
                ResolvedDescriptor::Buffer(info) => builder.buffer_info(std::slice::from_ref(info)).build(),
                ResolvedDescriptor::Image(info) => builder.image_info(std::slice::from_ref(info)).build(),
                ResolvedDescriptor::AccelerationStructure(_) => {
                    // The count lives on the chained struct, the builder cannot see it
                    let mut native = builder.push_next(acceleration_info).build();
                    native.descriptor_count = 1;
                    native
                }
            }
        })
        .collect();
    f(&writes)
}

impl ResourceManager {
    pub(crate) fn resolve_bind_group_entry(&self, entry: &BindGroupEntry) -> Result<ResolvedWrite> {
        let buffer_info = |buffer: Handle<crate::resources::Buffer>, offset, size| {
            let native = self
                .buffers
                .get(buffer)
                .with_context(|| format!("Unknown buffer {:?}", buffer))?;
            Ok::<_, anyhow::Error>(ResolvedDescriptor::Buffer(vk::DescriptorBufferInfo {
                buffer: native.buffer,
                offset,
                range: size,
            }))
        };
        let view = |view: Handle<crate::resources::TextureView>| {
            self.texture_views
                .get(view)
                .with_context(|| format!("Unknown texture view {:?}", view))
        };
        let sampler = |sampler: Handle<crate::resources::Sampler>| {
            self.samplers
                .get(sampler)
                .map(|s| s.sampler)
                .with_context(|| format!("Unknown sampler {:?}", sampler))
        };

        let descriptor = match entry.resource {
            BindingResource::UniformBuffer { buffer, offset, size }
            | BindingResource::StorageBuffer { buffer, offset, size }
            | BindingResource::DynamicUniformBuffer { buffer, offset, size }
            | BindingResource::DynamicStorageBuffer { buffer, offset, size } => buffer_info(buffer, offset, size)?,
            BindingResource::SampledImage { view: v, layout } => ResolvedDescriptor::Image(vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view(v)?.view,
                image_layout: texture_layout_to_vk(layout),
            }),
            BindingResource::CombinedImageSampler { view: v, sampler: s, layout } => {
                ResolvedDescriptor::Image(vk::DescriptorImageInfo {
                    sampler: sampler(s)?,
                    image_view: view(v)?.view,
                    image_layout: texture_layout_to_vk(layout),
                })
            }
            BindingResource::Sampler { sampler: s } => ResolvedDescriptor::Image(vk::DescriptorImageInfo {
                sampler: sampler(s)?,
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::UNDEFINED,
            }),
            BindingResource::StorageImage { view: v } => ResolvedDescriptor::Image(vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view(v)?.view,
                image_layout: vk::ImageLayout::GENERAL,
            }),
            BindingResource::InputAttachment { view: v } => {
                let native = view(v)?;
                let layout = if native.format.is_depth_or_stencil() {
                    vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                } else {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                };
                ResolvedDescriptor::Image(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: native.view,
                    image_layout: layout,
                })
            }
            BindingResource::AccelerationStructure { acceleration_structure } => {
                let native = self
                    .acceleration_structures
                    .get(acceleration_structure)
                    .with_context(|| format!("Unknown acceleration structure {:?}", acceleration_structure))?;
                ResolvedDescriptor::AccelerationStructure(native.acceleration_structure)
            }
        };

        Ok(ResolvedWrite {
            binding: entry.binding,
            array_element: entry.array_element,
            descriptor_type: resource_binding_type_to_vk(entry.resource.resource_type()),
            descriptor,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Layouts
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_bind_group_layout(
        &mut self,
        device: Handle<Device>,
        options: &BindGroupLayoutOptions,
    ) -> Handle<BindGroupLayout> {
        match self.try_create_bind_group_layout(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create bind group layout: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_bind_group_layout(
        &mut self,
        device_handle: Handle<Device>,
        options: &BindGroupLayoutOptions,
    ) -> Result<Handle<BindGroupLayout>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };

        let immutable_samplers = options
            .bindings
            .iter()
            .map(|binding| {
                binding
                    .immutable_samplers
                    .iter()
                    .map(|h| {
                        self.samplers
                            .get(*h)
                            .map(|s| s.sampler)
                            .with_context(|| format!("Unknown immutable sampler {:?}", h))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = options
            .bindings
            .iter()
            .zip(&immutable_samplers)
            .map(|(binding, samplers)| {
                let mut native = vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(resource_binding_type_to_vk(binding.resource_type))
                    .descriptor_count(binding.count)
                    .stage_flags(shader_stage_flags_to_vk(binding.shader_stages));
                if !samplers.is_empty() {
                    native = native.immutable_samplers(samplers);
                }
                // immutable_samplers overwrites the count with the sampler count
                let mut native = native.build();
                native.descriptor_count = binding.count;
                native
            })
            .collect();

        let binding_flags: Vec<vk::DescriptorBindingFlags> = options
            .bindings
            .iter()
            .map(|b| resource_binding_flags_to_vk(b.flags))
            .collect();
        let any_binding_flags = options.bindings.iter().any(|b| !b.flags.is_empty());
        let update_after_bind = options
            .bindings
            .iter()
            .any(|b| b.flags.contains(ResourceBindingFlags::UPDATE_AFTER_BIND));

        let mut flags = vk::DescriptorSetLayoutCreateFlags::empty();
        if update_after_bind {
            flags |= vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL;
        }
        if options.flags.contains(BindGroupLayoutFlags::PUSH_BIND_GROUP) {
            flags |= vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR;
        }

        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(&binding_flags);
        let mut create_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .flags(flags)
            .bindings(&bindings);
        if any_binding_flags {
            create_info = create_info.push_next(&mut flags_info);
        }

        let layout = unsafe { device.device.create_descriptor_set_layout(&create_info, None) }
            .context("vkCreateDescriptorSetLayout failed")?;
        device.set_object_name(layout, &options.label);

        Ok(self.bind_group_layouts.emplace(VulkanBindGroupLayout {
            layout,
            device: device_handle,
            bindings: options.bindings.clone(),
            flags: options.flags,
            update_after_bind,
        }))
    }

    pub fn delete_bind_group_layout(&mut self, handle: Handle<BindGroupLayout>) {
        let Some(layout) = self.bind_group_layouts.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(layout.device) {
            unsafe { device.device.destroy_descriptor_set_layout(layout.layout, None) };
        }
    }

    pub fn get_bind_group_layout(&self, handle: Handle<BindGroupLayout>) -> Option<&VulkanBindGroupLayout> {
        self.bind_group_layouts.get(handle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bind groups
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_bind_group(&mut self, device: Handle<Device>, options: &BindGroupOptions) -> Handle<BindGroup> {
        match self.try_create_bind_group(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create bind group: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_bind_group(
        &mut self,
        device_handle: Handle<Device>,
        options: &BindGroupOptions,
    ) -> Result<Handle<BindGroup>> {
        let layout = self
            .bind_group_layouts
            .get(options.layout)
            .with_context(|| format!("Unknown bind group layout {:?}", options.layout))?;
        if layout.flags.contains(BindGroupLayoutFlags::PUSH_BIND_GROUP) {
            bail!("Push bind group layouts cannot allocate bind groups");
        }
        for entry in &options.resources {
            debug_assert!(
                entry_matches_layout(&layout.bindings, entry),
                "Bind group entry {:?} does not match its layout binding",
                entry
            );
        }
        let native_layout = layout.layout;
        let update_after_bind = layout.update_after_bind;
        let variable_count = layout
            .has_variable_count()
            .then_some(options.max_variable_array_length);

        // Resolve before allocating so a bad handle leaks nothing
        let resolved = options
            .resources
            .iter()
            .map(|entry| self.resolve_bind_group_entry(entry))
            .collect::<Result<Vec<_>>>()?;

        let Some(device) = self.devices.get_mut(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let current = if update_after_bind {
            device.update_after_bind_descriptor_pools.last().copied()
        } else {
            device.descriptor_pools.last().copied()
        };
        let device_ref: &VulkanDevice = device;
        let allocation = allocate_with_retry(
            current,
            || create_descriptor_pool(device_ref, update_after_bind),
            |pool| allocate_from(&device_ref.device, pool, native_layout, variable_count),
        );
        if update_after_bind {
            device.update_after_bind_descriptor_pools.extend(allocation.new_pools);
        } else {
            device.descriptor_pools.extend(allocation.new_pools);
        }
        let (descriptor_set, pool) = allocation.result?;

        with_descriptor_writes(descriptor_set, &resolved, |writes| unsafe {
            device.device.update_descriptor_sets(writes, &[])
        });
        device.set_object_name(descriptor_set, &options.label);

        Ok(self.bind_groups.emplace(VulkanBindGroup {
            descriptor_set,
            pool,
            device: device_handle,
            layout: options.layout,
        }))
    }

    /// Write one entry of an existing bind group
    pub fn update_bind_group(&mut self, handle: Handle<BindGroup>, entry: &BindGroupEntry) {
        let result = (|| {
            let bind_group = self
                .bind_groups
                .get(handle)
                .with_context(|| format!("Unknown bind group {:?}", handle))?;
            if let Some(layout) = self.bind_group_layouts.get(bind_group.layout) {
                debug_assert!(
                    entry_matches_layout(&layout.bindings, entry),
                    "Bind group entry {:?} does not match its layout binding",
                    entry
                );
            }
            let resolved = self.resolve_bind_group_entry(entry)?;
            let device = self
                .devices
                .get(bind_group.device)
                .context("Bind group has no device")?;
            with_descriptor_writes(bind_group.descriptor_set, &[resolved], |writes| unsafe {
                device.device.update_descriptor_sets(writes, &[])
            });
            Ok::<_, anyhow::Error>(())
        })();
        if let Err(e) = result {
            log::error!("Failed to update bind group: {:#}", e);
        }
    }

    pub fn delete_bind_group(&mut self, handle: Handle<BindGroup>) {
        let Some(bind_group) = self.bind_groups.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(bind_group.device) {
            if let Err(e) = unsafe {
                device
                    .device
                    .free_descriptor_sets(bind_group.pool, &[bind_group.descriptor_set])
            } {
                log::error!("Failed to free bind group {:?}: {:?}", handle, e);
            }
        }
    }

    pub fn get_bind_group(&self, handle: Handle<BindGroup>) -> Option<&VulkanBindGroup> {
        self.bind_groups.get(handle)
    }
}

/// Whether the layout declares `entry.binding` with the entry's resource type
fn entry_matches_layout(bindings: &[ResourceBindingLayout], entry: &BindGroupEntry) -> bool {
    bindings
        .iter()
        .find(|b| b.binding == entry.binding)
        .is_some_and(|b| b.resource_type == entry.resource.resource_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceBindingType;
    use ash::vk::Handle as _;
    use std::cell::Cell;

    fn set(raw: u64) -> vk::DescriptorSet {
        vk::DescriptorSet::from_raw(raw)
    }

    fn layout_bindings() -> Vec<ResourceBindingLayout> {
        vec![
            ResourceBindingLayout {
                binding: 0,
                resource_type: ResourceBindingType::UniformBuffer,
                ..Default::default()
            },
            ResourceBindingLayout {
                binding: 1,
                resource_type: ResourceBindingType::DynamicStorageBuffer,
                ..Default::default()
            },
        ]
    }

    #[test]
    fn entries_must_match_layout_binding_type() {
        let bindings = layout_bindings();
        let buffer = Handle::new(1, 1);
        assert!(entry_matches_layout(
            &bindings,
            &BindGroupEntry::new(0, BindingResource::uniform_buffer(buffer))
        ));
        assert!(!entry_matches_layout(
            &bindings,
            &BindGroupEntry::new(0, BindingResource::storage_buffer(buffer))
        ));

        let dynamic = BindingResource::DynamicStorageBuffer {
            buffer,
            offset: 0,
            size: 256,
        };
        assert!(entry_matches_layout(&bindings, &BindGroupEntry::new(1, dynamic)));
        assert!(!entry_matches_layout(
            &bindings,
            &BindGroupEntry::new(1, BindingResource::storage_buffer(buffer))
        ));
    }

    #[test]
    fn entries_for_undeclared_bindings_do_not_match() {
        let entry = BindGroupEntry::new(7, BindingResource::uniform_buffer(Handle::new(1, 1)));
        assert!(!entry_matches_layout(&layout_bindings(), &entry));
    }

    #[test]
    fn pool_sizes_skip_empty_and_gate_acceleration_structures() {
        let config = BindGroupPoolConfig {
            samplers: 0,
            ..Default::default()
        };
        let sizes = descriptor_pool_sizes(&config, false);
        assert!(sizes.iter().all(|s| s.ty != vk::DescriptorType::SAMPLER));
        assert!(sizes
            .iter()
            .all(|s| s.ty != vk::DescriptorType::ACCELERATION_STRUCTURE_KHR));

        let sizes = descriptor_pool_sizes(&config, true);
        let acceleration = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            .unwrap();
        assert_eq!(acceleration.descriptor_count, 8);
    }

    #[test]
    fn first_allocation_creates_a_pool() {
        let allocation = allocate_with_retry(None, || Ok(1u32), |pool| Ok(set(pool as u64 + 100)));
        let (descriptor_set, pool) = allocation.result.unwrap();
        assert_eq!(pool, 1);
        assert_eq!(descriptor_set, set(101));
        assert_eq!(allocation.new_pools, vec![1]);
    }

    #[test]
    fn exhausted_pool_is_retried_once_in_a_new_pool() {
        let next_pool = Cell::new(2u32);
        let allocation = allocate_with_retry(
            Some(1u32),
            || {
                let pool = next_pool.get();
                next_pool.set(pool + 1);
                Ok(pool)
            },
            |pool| {
                if pool == 1 {
                    Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
                } else {
                    Ok(set(7))
                }
            },
        );
        let (_, pool) = allocation.result.unwrap();
        assert_eq!(pool, 2);
        assert_eq!(allocation.new_pools, vec![2]);
    }

    #[test]
    fn second_failure_gives_up() {
        let attempts = Cell::new(0);
        let allocation = allocate_with_retry(
            Some(1u32),
            || Ok(2u32),
            |_| {
                attempts.set(attempts.get() + 1);
                Err(vk::Result::ERROR_FRAGMENTED_POOL)
            },
        );
        assert!(allocation.result.is_err());
        assert_eq!(attempts.get(), 2);
        assert_eq!(allocation.new_pools, vec![2]);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let attempts = Cell::new(0);
        let allocation = allocate_with_retry(
            Some(1u32),
            || Ok(2u32),
            |_| {
                attempts.set(attempts.get() + 1);
                Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            },
        );
        assert!(allocation.result.is_err());
        assert_eq!(attempts.get(), 1);
        assert!(allocation.new_pools.is_empty());
    }

    #[test]
    fn acceleration_structure_write_has_one_descriptor() {
        let resolved = [
            ResolvedWrite {
                binding: 0,
                array_element: 0,
                descriptor_type: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                descriptor: ResolvedDescriptor::AccelerationStructure(vk::AccelerationStructureKHR::from_raw(5)),
            },
            ResolvedWrite {
                binding: 1,
                array_element: 2,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor: ResolvedDescriptor::Buffer(vk::DescriptorBufferInfo {
                    buffer: vk::Buffer::from_raw(9),
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                }),
            },
        ];
        with_descriptor_writes(set(1), &resolved, |writes| {
            assert_eq!(writes.len(), 2);
            assert_eq!(writes[0].descriptor_count, 1);
            assert!(!writes[0].p_next.is_null());
            assert_eq!(writes[1].descriptor_count, 1);
            assert_eq!(writes[1].dst_array_element, 2);
            assert!(!writes[1].p_buffer_info.is_null());
        });
    }
}
