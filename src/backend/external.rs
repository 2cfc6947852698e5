// External memory - Exportable allocations and OS handle export
//
// Resources requesting an external memory handle type bypass gpu-allocator
// and get a dedicated vkAllocateMemory with VkExportMemoryAllocateInfo. One
// ExternalMemoryAllocator exists per handle type and device, created on first
// use. The platform exporter turns memory, semaphores and fences into fds or
// Win32 handles.

use super::enums::{external_memory_handle_type_to_vk, memory_usage_to_property_flags};
use crate::types::{ExternalMemoryHandleType, HandleOrFd, MemoryUsage};
use anyhow::{bail, Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::ffi::CStr;

/// Native object an external allocation is dedicated to
#[derive(Debug, Clone, Copy)]
pub(crate) enum DedicatedTarget {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

#[derive(Debug)]
pub(crate) struct ExternalAllocation {
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub host_visible: bool,
}

pub struct ExternalMemoryAllocator {
    handle_type: ExternalMemoryHandleType,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    live_allocations: Vec<vk::DeviceMemory>,
}

impl ExternalMemoryAllocator {
    pub(crate) fn new(
        handle_type: ExternalMemoryHandleType,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
    ) -> Self {
        log::debug!("Creating external memory allocator for {:?}", handle_type);
        Self {
            handle_type,
            memory_properties,
            live_allocations: Vec::new(),
        }
    }

    pub fn handle_type(&self) -> ExternalMemoryHandleType {
        self.handle_type
    }

    pub fn live_allocations(&self) -> usize {
        self.live_allocations.len()
    }

    pub(crate) fn allocate(
        &mut self,
        device: &ash::Device,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        target: DedicatedTarget,
        device_address: bool,
    ) -> Result<ExternalAllocation> {
        let properties = memory_usage_to_property_flags(usage);
        let memory_type_index =
            find_memory_type(&self.memory_properties, requirements.memory_type_bits, properties)
                .or_else(|_| {
                    // Cached readback memory is optional, plain host-visible will do
                    let relaxed = properties & !vk::MemoryPropertyFlags::HOST_CACHED;
                    find_memory_type(&self.memory_properties, requirements.memory_type_bits, relaxed)
                })?;

        let mut export_info = vk::ExportMemoryAllocateInfo::builder()
            .handle_types(external_memory_handle_type_to_vk(self.handle_type));
        let mut dedicated_info = match target {
            DedicatedTarget::Buffer(buffer) => vk::MemoryDedicatedAllocateInfo::builder().buffer(buffer),
            DedicatedTarget::Image(image) => vk::MemoryDedicatedAllocateInfo::builder().image(image),
        };
        let mut flags_info =
            vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);

        let mut alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut export_info)
            .push_next(&mut dedicated_info);
        if device_address {
            alloc_info = alloc_info.push_next(&mut flags_info);
        }

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }
            .context("Failed to allocate exportable memory")?;
        self.live_allocations.push(memory);

        let host_visible = self.memory_properties.memory_types[memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE);

        Ok(ExternalAllocation {
            memory,
            size: requirements.size,
            host_visible,
        })
    }

    pub(crate) fn free(&mut self, device: &ash::Device, memory: vk::DeviceMemory) {
        self.live_allocations.retain(|m| *m != memory);
        unsafe { device.free_memory(memory, None) };
    }

    /// Release whatever is still allocated
    pub(crate) fn destroy(mut self, device: &ash::Device) {
        if !self.live_allocations.is_empty() {
            log::warn!(
                "{} external {:?} allocations still live at device teardown",
                self.live_allocations.len(),
                self.handle_type
            );
        }
        for memory in self.live_allocations.drain(..) {
            unsafe { device.free_memory(memory, None) };
        }
    }
}

/// Device extensions that must be enabled to export memory of `handle_type`
pub(crate) fn external_memory_extensions(handle_type: ExternalMemoryHandleType) -> Vec<&'static CStr> {
    match handle_type {
        ExternalMemoryHandleType::OpaqueFd => vec![khr::ExternalMemoryFd::name()],
        ExternalMemoryHandleType::DmaBuf => {
            vec![khr::ExternalMemoryFd::name(), vk::ExtExternalMemoryDmaBufFn::name()]
        }
        ExternalMemoryHandleType::OpaqueWin32 | ExternalMemoryHandleType::OpaqueWin32Kmt => {
            vec![khr::ExternalMemoryWin32::name()]
        }
    }
}

/// The handle type a resource is actually created with. Without the export
/// extensions enabled on the device the resource falls back to ordinary
/// allocator memory.
pub(crate) fn usable_external_memory(
    requested: Option<ExternalMemoryHandleType>,
    enabled_extensions: &[String],
) -> Option<ExternalMemoryHandleType> {
    let handle_type = requested?;
    let missing = external_memory_extensions(handle_type)
        .into_iter()
        .find(|name| !enabled_extensions.iter().any(|e| e.as_str() == name.to_string_lossy()));
    match missing {
        Some(name) => {
            log::warn!(
                "{:?} memory requested but {} is not enabled, using non-exportable memory",
                handle_type,
                name.to_string_lossy()
            );
            None
        }
        None => Some(handle_type),
    }
}

/// Find a suitable memory type index
pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..memory_properties.memory_type_count {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if has_type && has_properties {
            return Ok(i);
        }
    }

    bail!("Failed to find suitable memory type for {:?}", properties)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle export
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) trait ExternalHandleExporter {
    fn export_memory(&self, memory: vk::DeviceMemory, handle_type: vk::ExternalMemoryHandleTypeFlags) -> HandleOrFd;
    fn export_semaphore(
        &self,
        semaphore: vk::Semaphore,
        handle_type: vk::ExternalSemaphoreHandleTypeFlags,
    ) -> HandleOrFd;
    fn export_fence(&self, fence: vk::Fence, handle_type: vk::ExternalFenceHandleTypeFlags) -> HandleOrFd;
}

fn enabled(extensions: &[String], name: &std::ffi::CStr) -> bool {
    extensions.iter().any(|e| e.as_str() == name.to_string_lossy())
}

#[cfg(unix)]
pub(crate) type PlatformExporter = FdExporter;
#[cfg(windows)]
pub(crate) type PlatformExporter = Win32Exporter;
#[cfg(not(any(unix, windows)))]
pub(crate) type PlatformExporter = NoExport;

/// POSIX file descriptor export
#[cfg(unix)]
pub(crate) struct FdExporter {
    memory: Option<ash::extensions::khr::ExternalMemoryFd>,
    semaphore: Option<ash::extensions::khr::ExternalSemaphoreFd>,
    fence: Option<ash::extensions::khr::ExternalFenceFd>,
}

#[cfg(unix)]
impl FdExporter {
    pub(crate) fn new(instance: &ash::Instance, device: &ash::Device, extensions: &[String]) -> Self {
        use ash::extensions::khr;
        Self {
            memory: enabled(extensions, khr::ExternalMemoryFd::name())
                .then(|| khr::ExternalMemoryFd::new(instance, device)),
            semaphore: enabled(extensions, khr::ExternalSemaphoreFd::name())
                .then(|| khr::ExternalSemaphoreFd::new(instance, device)),
            fence: enabled(extensions, khr::ExternalFenceFd::name())
                .then(|| khr::ExternalFenceFd::new(instance, device)),
        }
    }
}

#[cfg(unix)]
impl ExternalHandleExporter for FdExporter {
    fn export_memory(&self, memory: vk::DeviceMemory, handle_type: vk::ExternalMemoryHandleTypeFlags) -> HandleOrFd {
        let Some(loader) = &self.memory else {
            log::error!("VK_KHR_external_memory_fd is not enabled");
            return HandleOrFd::None;
        };
        let info = vk::MemoryGetFdInfoKHR::builder().memory(memory).handle_type(handle_type);
        match unsafe { loader.get_memory_fd(&info) } {
            Ok(fd) => HandleOrFd::Fd(fd),
            Err(e) => {
                log::error!("Failed to export memory fd: {:?}", e);
                HandleOrFd::None
            }
        }
    }

    fn export_semaphore(
        &self,
        semaphore: vk::Semaphore,
        handle_type: vk::ExternalSemaphoreHandleTypeFlags,
    ) -> HandleOrFd {
        let Some(loader) = &self.semaphore else {
            log::error!("VK_KHR_external_semaphore_fd is not enabled");
            return HandleOrFd::None;
        };
        let info = vk::SemaphoreGetFdInfoKHR::builder()
            .semaphore(semaphore)
            .handle_type(handle_type);
        match unsafe { loader.get_semaphore_fd(&info) } {
            Ok(fd) => HandleOrFd::Fd(fd),
            Err(e) => {
                log::error!("Failed to export semaphore fd: {:?}", e);
                HandleOrFd::None
            }
        }
    }

    fn export_fence(&self, fence: vk::Fence, handle_type: vk::ExternalFenceHandleTypeFlags) -> HandleOrFd {
        let Some(loader) = &self.fence else {
            log::error!("VK_KHR_external_fence_fd is not enabled");
            return HandleOrFd::None;
        };
        let info = vk::FenceGetFdInfoKHR::builder().fence(fence).handle_type(handle_type);
        match unsafe { loader.get_fence_fd(&info) } {
            Ok(fd) => HandleOrFd::Fd(fd),
            Err(e) => {
                log::error!("Failed to export fence fd: {:?}", e);
                HandleOrFd::None
            }
        }
    }
}

/// Win32 HANDLE export
#[cfg(windows)]
pub(crate) struct Win32Exporter {
    memory: Option<ash::extensions::khr::ExternalMemoryWin32>,
    semaphore: Option<ash::extensions::khr::ExternalSemaphoreWin32>,
    fence: Option<ash::extensions::khr::ExternalFenceWin32>,
}

#[cfg(windows)]
impl Win32Exporter {
    pub(crate) fn new(instance: &ash::Instance, device: &ash::Device, extensions: &[String]) -> Self {
        use ash::extensions::khr;
        Self {
            memory: enabled(extensions, khr::ExternalMemoryWin32::name())
                .then(|| khr::ExternalMemoryWin32::new(instance, device)),
            semaphore: enabled(extensions, khr::ExternalSemaphoreWin32::name())
                .then(|| khr::ExternalSemaphoreWin32::new(instance, device)),
            fence: enabled(extensions, khr::ExternalFenceWin32::name())
                .then(|| khr::ExternalFenceWin32::new(instance, device)),
        }
    }
}

#[cfg(windows)]
impl ExternalHandleExporter for Win32Exporter {
    fn export_memory(&self, memory: vk::DeviceMemory, handle_type: vk::ExternalMemoryHandleTypeFlags) -> HandleOrFd {
        let Some(loader) = &self.memory else {
            log::error!("VK_KHR_external_memory_win32 is not enabled");
            return HandleOrFd::None;
        };
        let info = vk::MemoryGetWin32HandleInfoKHR::builder()
            .memory(memory)
            .handle_type(handle_type);
        match unsafe { loader.get_memory_win32_handle(&info) } {
            Ok(handle) => HandleOrFd::Handle(handle as usize),
            Err(e) => {
                log::error!("Failed to export memory handle: {:?}", e);
                HandleOrFd::None
            }
        }
    }

    fn export_semaphore(
        &self,
        semaphore: vk::Semaphore,
        handle_type: vk::ExternalSemaphoreHandleTypeFlags,
    ) -> HandleOrFd {
        let Some(loader) = &self.semaphore else {
            log::error!("VK_KHR_external_semaphore_win32 is not enabled");
            return HandleOrFd::None;
        };
        let info = vk::SemaphoreGetWin32HandleInfoKHR::builder()
            .semaphore(semaphore)
            .handle_type(handle_type);
        match unsafe { loader.get_semaphore_win32_handle(&info) } {
            Ok(handle) => HandleOrFd::Handle(handle as usize),
            Err(e) => {
                log::error!("Failed to export semaphore handle: {:?}", e);
                HandleOrFd::None
            }
        }
    }

    fn export_fence(&self, fence: vk::Fence, handle_type: vk::ExternalFenceHandleTypeFlags) -> HandleOrFd {
        let Some(loader) = &self.fence else {
            log::error!("VK_KHR_external_fence_win32 is not enabled");
            return HandleOrFd::None;
        };
        let info = vk::FenceGetWin32HandleInfoKHR::builder()
            .fence(fence)
            .handle_type(handle_type);
        match unsafe { loader.get_fence_win32_handle(&info) } {
            Ok(handle) => HandleOrFd::Handle(handle as usize),
            Err(e) => {
                log::error!("Failed to export fence handle: {:?}", e);
                HandleOrFd::None
            }
        }
    }
}

/// Platforms without handle export
#[cfg(not(any(unix, windows)))]
pub(crate) struct NoExport;

#[cfg(not(any(unix, windows)))]
impl NoExport {
    pub(crate) fn new(_instance: &ash::Instance, _device: &ash::Device, _extensions: &[String]) -> Self {
        NoExport
    }
}

#[cfg(not(any(unix, windows)))]
impl ExternalHandleExporter for NoExport {
    fn export_memory(&self, _memory: vk::DeviceMemory, _handle_type: vk::ExternalMemoryHandleTypeFlags) -> HandleOrFd {
        HandleOrFd::None
    }

    fn export_semaphore(
        &self,
        _semaphore: vk::Semaphore,
        _handle_type: vk::ExternalSemaphoreHandleTypeFlags,
    ) -> HandleOrFd {
        HandleOrFd::None
    }

    fn export_fence(&self, _fence: vk::Fence, _handle_type: vk::ExternalFenceHandleTypeFlags) -> HandleOrFd {
        HandleOrFd::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&CStr]) -> Vec<String> {
        list.iter().map(|n| n.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn external_memory_kept_when_extension_enabled() {
        let enabled = names(&[khr::ExternalMemoryFd::name()]);
        assert_eq!(
            usable_external_memory(Some(ExternalMemoryHandleType::OpaqueFd), &enabled),
            Some(ExternalMemoryHandleType::OpaqueFd)
        );
    }

    #[test]
    fn external_memory_degrades_without_extension() {
        assert_eq!(usable_external_memory(Some(ExternalMemoryHandleType::OpaqueFd), &[]), None);
        let enabled = names(&[khr::ExternalMemoryFd::name()]);
        assert_eq!(usable_external_memory(Some(ExternalMemoryHandleType::OpaqueWin32), &enabled), None);
        // dma-buf needs its own extension on top of fd export
        assert_eq!(usable_external_memory(Some(ExternalMemoryHandleType::DmaBuf), &enabled), None);
        assert_eq!(usable_external_memory(None, &enabled), None);
    }

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn first_matching_type_is_chosen() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        let upload = memory_usage_to_property_flags(MemoryUsage::CpuToGpu);
        assert_eq!(find_memory_type(&props, 0b111, upload).unwrap(), 1);

        let local = memory_usage_to_property_flags(MemoryUsage::GpuOnly);
        assert_eq!(find_memory_type(&props, 0b111, local).unwrap(), 0);
    }

    #[test]
    fn type_filter_is_respected() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            1
        );
        assert!(find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::DEVICE_LOCAL).is_err());
    }
}
