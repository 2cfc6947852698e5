// Buffers - Vertex, index, uniform, storage and staging memory
//
// Memory comes from gpu-allocator, or from the external allocator when the
// buffer is meant to be shared with another process or API.

use super::enums::buffer_usage_to_vk;
use super::external::{usable_external_memory, DedicatedTarget};
use super::memory::{MemoryRequest, ResourceMemory};
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::BufferOptions;
use crate::resources::{Buffer, Device};
use crate::types::{BufferUsageFlags, DeviceSize, MemoryHandle, MemoryUsage};
use anyhow::{bail, Context, Result};
use ash::vk;
use std::ptr::NonNull;

pub struct VulkanBuffer {
    pub buffer: vk::Buffer,
    pub device: Handle<Device>,
    pub size: DeviceSize,
    pub usage: BufferUsageFlags,
    pub memory_usage: MemoryUsage,
    /// Set when created with SHADER_DEVICE_ADDRESS usage
    pub device_address: Option<vk::DeviceAddress>,
    pub external_memory_handle: MemoryHandle,
    pub(crate) memory: ResourceMemory,
}

impl ResourceManager {
    /// Create a buffer, optionally filled with `initial_data`.
    ///
    /// Returns an invalid handle on failure.
    pub fn create_buffer(
        &mut self,
        device: Handle<Device>,
        options: &BufferOptions,
        initial_data: Option<&[u8]>,
    ) -> Handle<Buffer> {
        match self.try_create_buffer(device, options, initial_data) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create buffer: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_buffer(
        &mut self,
        device_handle: Handle<Device>,
        options: &BufferOptions,
        initial_data: Option<&[u8]>,
    ) -> Result<Handle<Buffer>> {
        let Some(device) = self.devices.get_mut(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        if options.size == 0 {
            bail!("Buffer size must be non-zero");
        }

        // Step 1: Native buffer
        let sharing_mode = if options.queue_type_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        let external = usable_external_memory(options.external_memory_handle_type, &device.enabled_extensions);
        let mut external_info = vk::ExternalMemoryBufferCreateInfo::builder();
        if let Some(handle_type) = external {
            external_info = external_info
                .handle_types(super::enums::external_memory_handle_type_to_vk(handle_type));
        }
        let mut buffer_info = vk::BufferCreateInfo::builder()
            .size(options.size)
            .usage(buffer_usage_to_vk(options.usage))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&options.queue_type_indices);
        if external.is_some() {
            buffer_info = buffer_info.push_next(&mut external_info);
        }

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("vkCreateBuffer failed")?;

        // Step 2: Backing memory
        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };
        let device_address = options.usage.contains(BufferUsageFlags::SHADER_DEVICE_ADDRESS);
        let name = options.label.as_deref().unwrap_or("buffer");
        let memory = match ResourceMemory::allocate(
            device,
            MemoryRequest {
                name,
                requirements,
                usage: options.memory_usage,
                linear: true,
                external,
                target: DedicatedTarget::Buffer(buffer),
                device_address,
            },
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        if let Err(e) = memory.bind_buffer(&device.device, buffer) {
            memory.free(device);
            unsafe { device.device.destroy_buffer(buffer, None) };
            return Err(e);
        }

        let external_memory_handle = memory.export_handle(device);
        let address = device_address.then(|| device.buffer_device_address(buffer));
        device.set_object_name(buffer, &options.label);

        let mut vk_buffer = VulkanBuffer {
            buffer,
            device: device_handle,
            size: options.size,
            usage: options.usage,
            memory_usage: options.memory_usage,
            device_address: address,
            external_memory_handle,
            memory,
        };

        // Step 3: Initial contents
        if let Some(data) = initial_data {
            let len = data.len().min(options.size as usize);
            match vk_buffer.memory.map(&device.device) {
                Some(ptr) => {
                    unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), len) };
                    flush_memory(device, &vk_buffer.memory);
                    vk_buffer.memory.unmap(&device.device);
                }
                None => log::error!(
                    "Initial data for {} ignored, {:?} memory is not host visible",
                    name,
                    options.memory_usage
                ),
            }
        }

        log::debug!("Created buffer {} ({} bytes)", name, options.size);
        Ok(self.buffers.emplace(vk_buffer))
    }

    pub fn delete_buffer(&mut self, handle: Handle<Buffer>) {
        let Some(buffer) = self.buffers.remove(handle) else {
            return;
        };
        let Some(device) = self.devices.get_mut(buffer.device) else {
            log::error!("Buffer {:?} outlived its device", handle);
            return;
        };
        unsafe { device.device.destroy_buffer(buffer.buffer, None) };
        buffer.memory.free(device);
    }

    pub fn get_buffer(&self, handle: Handle<Buffer>) -> Option<&VulkanBuffer> {
        self.buffers.get(handle)
    }

    /// Host pointer to the buffer contents. Only host-visible memory maps.
    pub fn map_buffer(&mut self, handle: Handle<Buffer>) -> Option<NonNull<u8>> {
        let buffer = self.buffers.get_mut(handle)?;
        let device = self.devices.get(buffer.device)?;
        let ptr = buffer.memory.map(&device.device);
        if ptr.is_none() {
            log::error!("Buffer {:?} with {:?} memory cannot be mapped", handle, buffer.memory_usage);
        }
        ptr
    }

    pub fn unmap_buffer(&mut self, handle: Handle<Buffer>) {
        let Some(buffer) = self.buffers.get_mut(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(buffer.device) {
            buffer.memory.unmap(&device.device);
        }
    }

    /// Make host writes visible to the device
    pub fn flush_buffer(&self, handle: Handle<Buffer>) {
        let Some(buffer) = self.buffers.get(handle) else {
            return;
        };
        if let Some(device) = self.device(buffer.device) {
            flush_memory(device, &buffer.memory);
        }
    }

    /// Make device writes visible to the host
    pub fn invalidate_buffer(&self, handle: Handle<Buffer>) {
        let Some(buffer) = self.buffers.get(handle) else {
            return;
        };
        let Some(device) = self.device(buffer.device) else {
            return;
        };
        if let Some(range) = buffer.memory.mapped_range(device.properties.limits.non_coherent_atom_size) {
            if let Err(e) = unsafe { device.device.invalidate_mapped_memory_ranges(&[range]) } {
                log::error!("Failed to invalidate buffer {:?}: {:?}", handle, e);
            }
        }
    }

    /// Copy `data` into a host-visible buffer at `offset`
    pub fn write_buffer(&mut self, handle: Handle<Buffer>, offset: DeviceSize, data: &[u8]) -> bool {
        let size = match self.buffers.get(handle) {
            Some(buffer) => buffer.size,
            None => return false,
        };
        if !range_fits(offset, data.len(), size) {
            log::error!("Write of {} bytes at {} overflows buffer {:?}", data.len(), offset, handle);
            return false;
        }
        let Some(ptr) = self.map_buffer(handle) else {
            return false;
        };
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().add(offset as usize), data.len())
        };
        self.flush_buffer(handle);
        self.unmap_buffer(handle);
        true
    }

    /// Read `len` bytes from a host-visible buffer at `offset`
    pub fn read_buffer(&mut self, handle: Handle<Buffer>, offset: DeviceSize, len: usize) -> Option<Vec<u8>> {
        let size = self.buffers.get(handle)?.size;
        if !range_fits(offset, len, size) {
            log::error!("Read of {} bytes at {} overflows buffer {:?}", len, offset, handle);
            return None;
        }
        let ptr = self.map_buffer(handle)?;
        self.invalidate_buffer(handle);
        let mut bytes = vec![0u8; len];
        unsafe { std::ptr::copy_nonoverlapping(ptr.as_ptr().add(offset as usize), bytes.as_mut_ptr(), len) };
        self.unmap_buffer(handle);
        Some(bytes)
    }

    /// Device address recorded at creation, or 0 without SHADER_DEVICE_ADDRESS usage
    pub fn buffer_device_address(&self, handle: Handle<Buffer>) -> vk::DeviceAddress {
        self.buffers
            .get(handle)
            .and_then(|b| b.device_address)
            .unwrap_or(0)
    }

    pub fn buffer_external_memory_handle(&self, handle: Handle<Buffer>) -> MemoryHandle {
        self.buffers
            .get(handle)
            .map(|b| b.external_memory_handle)
            .unwrap_or_default()
    }
}

/// Whether `len` bytes starting at `offset` stay inside a buffer of `size` bytes
fn range_fits(offset: DeviceSize, len: usize, size: DeviceSize) -> bool {
    offset.checked_add(len as u64).is_some_and(|end| end <= size)
}

fn flush_memory(device: &super::VulkanDevice, memory: &ResourceMemory) {
    if let Some(range) = memory.mapped_range(device.properties.limits.non_coherent_atom_size) {
        if let Err(e) = unsafe { device.device.flush_mapped_memory_ranges(&[range]) } {
            log::error!("Failed to flush mapped memory: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_inside_buffer_fits() {
        assert!(range_fits(0, 64, 64));
        assert!(range_fits(60, 4, 64));
        assert!(range_fits(64, 0, 64));
    }

    #[test]
    fn range_past_end_is_refused() {
        assert!(!range_fits(61, 4, 64));
        assert!(!range_fits(65, 0, 64));
    }

    #[test]
    fn range_overflowing_offset_is_refused() {
        assert!(!range_fits(u64::MAX, 1, 64));
        assert!(!range_fits(u64::MAX - 2, 8, u64::MAX));
    }
}
