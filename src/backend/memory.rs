// Resource memory - Backing store of buffers and textures
//
// Ordinary resources are sub-allocated by gpu-allocator. Resources with an
// external handle type own a dedicated exportable allocation. Swapchain
// images carry no memory of their own.

use super::device::VulkanDevice;
use super::enums::{external_memory_handle_type_to_vk, memory_usage_to_location};
use super::external::{DedicatedTarget, ExternalHandleExporter, ExternalMemoryAllocator};
use crate::types::{ExternalMemoryHandleType, MemoryHandle, MemoryUsage};
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use std::ptr::NonNull;

pub(crate) enum ResourceMemory {
    Allocated(Allocation),
    External {
        handle_type: ExternalMemoryHandleType,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
        host_visible: bool,
        mapped: Option<NonNull<u8>>,
    },
    None,
}

// Mapped pointers are only dereferenced through &mut access on the owning pool
unsafe impl Send for ResourceMemory {}
unsafe impl Sync for ResourceMemory {}

pub(crate) struct MemoryRequest<'a> {
    pub name: &'a str,
    pub requirements: vk::MemoryRequirements,
    pub usage: MemoryUsage,
    pub linear: bool,
    pub external: Option<ExternalMemoryHandleType>,
    pub target: DedicatedTarget,
    pub device_address: bool,
}

impl ResourceMemory {
    pub fn allocate(device: &mut VulkanDevice, request: MemoryRequest<'_>) -> Result<Self> {
        match request.external {
            None => {
                let allocation = device
                    .allocator()?
                    .allocate(&AllocationCreateDesc {
                        name: request.name,
                        requirements: request.requirements,
                        location: memory_usage_to_location(request.usage),
                        linear: request.linear,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .with_context(|| format!("Failed to allocate memory for {}", request.name))?;
                Ok(ResourceMemory::Allocated(allocation))
            }
            Some(handle_type) => {
                let memory_properties = device.memory_properties;
                let allocator = device
                    .external_allocators
                    .entry(handle_type)
                    .or_insert_with(|| ExternalMemoryAllocator::new(handle_type, memory_properties));
                let allocation = allocator.allocate(
                    &device.device,
                    request.requirements,
                    request.usage,
                    request.target,
                    request.device_address,
                )?;
                Ok(ResourceMemory::External {
                    handle_type,
                    memory: allocation.memory,
                    size: allocation.size,
                    host_visible: allocation.host_visible,
                    mapped: None,
                })
            }
        }
    }

    /// Native memory object and the resource's offset inside it
    pub fn memory_and_offset(&self) -> Option<(vk::DeviceMemory, vk::DeviceSize)> {
        match self {
            ResourceMemory::Allocated(allocation) => Some((unsafe { allocation.memory() }, allocation.offset())),
            ResourceMemory::External { memory, .. } => Some((*memory, 0)),
            ResourceMemory::None => None,
        }
    }

    pub fn size(&self) -> vk::DeviceSize {
        match self {
            ResourceMemory::Allocated(allocation) => allocation.size(),
            ResourceMemory::External { size, .. } => *size,
            ResourceMemory::None => 0,
        }
    }

    pub fn bind_buffer(&self, device: &ash::Device, buffer: vk::Buffer) -> Result<()> {
        if let Some((memory, offset)) = self.memory_and_offset() {
            unsafe { device.bind_buffer_memory(buffer, memory, offset) }
                .context("Failed to bind buffer memory")?;
        }
        Ok(())
    }

    pub fn bind_image(&self, device: &ash::Device, image: vk::Image) -> Result<()> {
        if let Some((memory, offset)) = self.memory_and_offset() {
            unsafe { device.bind_image_memory(image, memory, offset) }
                .context("Failed to bind image memory")?;
        }
        Ok(())
    }

    /// Host pointer to the start of the resource. Allocator memory is
    /// persistently mapped; external memory is mapped on first request.
    pub fn map(&mut self, device: &ash::Device) -> Option<NonNull<u8>> {
        match self {
            ResourceMemory::Allocated(allocation) => allocation.mapped_ptr().map(|p| p.cast::<u8>()),
            ResourceMemory::External {
                memory,
                host_visible,
                mapped,
                ..
            } => {
                if !*host_visible {
                    return None;
                }
                if mapped.is_none() {
                    let ptr = unsafe {
                        device.map_memory(*memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    };
                    match ptr {
                        Ok(ptr) => *mapped = NonNull::new(ptr.cast::<u8>()),
                        Err(e) => log::error!("Failed to map external memory: {:?}", e),
                    }
                }
                *mapped
            }
            ResourceMemory::None => None,
        }
    }

    pub fn unmap(&mut self, device: &ash::Device) {
        if let ResourceMemory::External { memory, mapped, .. } = self {
            if mapped.take().is_some() {
                unsafe { device.unmap_memory(*memory) };
            }
        }
    }

    /// Range for flush/invalidate, widened to the non-coherent atom size.
    /// The memory must be mapped.
    pub fn mapped_range(&self, atom_size: vk::DeviceSize) -> Option<vk::MappedMemoryRange> {
        match self {
            ResourceMemory::Allocated(allocation) => {
                let atom = atom_size.max(1);
                let offset = allocation.offset();
                let start = offset / atom * atom;
                let end = super::align_up(offset + allocation.size(), atom);
                Some(
                    vk::MappedMemoryRange::builder()
                        .memory(unsafe { allocation.memory() })
                        .offset(start)
                        .size(end - start)
                        .build(),
                )
            }
            ResourceMemory::External {
                memory,
                mapped: Some(_),
                ..
            } => Some(
                vk::MappedMemoryRange::builder()
                    .memory(*memory)
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .build(),
            ),
            _ => None,
        }
    }

    pub fn export_handle(&self, device: &VulkanDevice) -> MemoryHandle {
        match self {
            ResourceMemory::External {
                handle_type,
                memory,
                size,
                ..
            } => MemoryHandle {
                handle: device
                    .loaders
                    .exporter
                    .export_memory(*memory, external_memory_handle_type_to_vk(*handle_type)),
                allocation_size: *size,
                allocation_offset: 0,
            },
            _ => MemoryHandle::default(),
        }
    }

    pub fn free(self, device: &mut VulkanDevice) {
        match self {
            ResourceMemory::Allocated(allocation) => {
                if let Some(allocator) = device.allocator.as_mut() {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free allocation: {}", e);
                    }
                }
            }
            ResourceMemory::External {
                handle_type,
                memory,
                mapped,
                ..
            } => {
                if mapped.is_some() {
                    unsafe { device.device.unmap_memory(memory) };
                }
                if let Some(allocator) = device.external_allocators.get_mut(&handle_type) {
                    allocator.free(&device.device, memory);
                }
            }
            ResourceMemory::None => {}
        }
    }
}
