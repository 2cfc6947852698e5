// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU sync. Both can be created
// exportable so another process or API can wait on them.

use super::enums::{
    external_fence_handle_type_to_vk, external_semaphore_handle_type_to_vk, vk_result_to_fence_status,
};
use super::external::ExternalHandleExporter;
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::{FenceOptions, GpuSemaphoreOptions};
use crate::resources::{Device, Fence, GpuSemaphore};
use crate::types::{ExternalFenceHandleType, ExternalSemaphoreHandleType, FenceStatus, HandleOrFd};
use anyhow::{bail, Context, Result};
use ash::vk;

pub struct VulkanFence {
    pub fence: vk::Fence,
    pub device: Handle<Device>,
    pub external_fence_handle_type: Option<ExternalFenceHandleType>,
}

pub struct VulkanGpuSemaphore {
    pub semaphore: vk::Semaphore,
    pub device: Handle<Device>,
    pub external_semaphore_handle_type: Option<ExternalSemaphoreHandleType>,
}

impl ResourceManager {
    pub fn create_fence(&mut self, device: Handle<Device>, options: &FenceOptions) -> Handle<Fence> {
        match self.try_create_fence(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create fence: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_fence(&mut self, device_handle: Handle<Device>, options: &FenceOptions) -> Result<Handle<Fence>> {
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };

        let flags = if options.create_signalled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let mut export_info = vk::ExportFenceCreateInfo::builder();
        if let Some(handle_type) = options.external_fence_handle_type {
            export_info = export_info.handle_types(external_fence_handle_type_to_vk(handle_type));
        }
        let mut create_info = vk::FenceCreateInfo::builder().flags(flags);
        if options.external_fence_handle_type.is_some() {
            create_info = create_info.push_next(&mut export_info);
        }

        let fence = unsafe { device.device.create_fence(&create_info, None) }.context("vkCreateFence failed")?;
        device.set_object_name(fence, &options.label);

        Ok(self.fences.emplace(VulkanFence {
            fence,
            device: device_handle,
            external_fence_handle_type: options.external_fence_handle_type,
        }))
    }

    pub fn delete_fence(&mut self, handle: Handle<Fence>) {
        let Some(fence) = self.fences.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(fence.device) {
            unsafe { device.device.destroy_fence(fence.fence, None) };
        }
    }

    pub fn get_fence(&self, handle: Handle<Fence>) -> Option<&VulkanFence> {
        self.fences.get(handle)
    }

    /// Block until the fence signals or `timeout` nanoseconds pass.
    /// Returns the status the fence ended up in.
    pub fn wait_for_fence(&self, handle: Handle<Fence>, timeout: u64) -> FenceStatus {
        let Some(fence) = self.fences.get(handle) else {
            log::error!("Unknown fence {:?}", handle);
            return FenceStatus::Error;
        };
        let Some(device) = self.device(fence.device) else {
            return FenceStatus::Error;
        };
        match unsafe { device.device.wait_for_fences(&[fence.fence], true, timeout) } {
            Ok(()) => FenceStatus::Signalled,
            Err(vk::Result::TIMEOUT) => FenceStatus::Unsignalled,
            Err(e) => {
                log::error!("Failed to wait for fence {:?}: {:?}", handle, e);
                vk_result_to_fence_status(e)
            }
        }
    }

    pub fn reset_fence(&self, handle: Handle<Fence>) {
        let Some(fence) = self.fences.get(handle) else {
            return;
        };
        if let Some(device) = self.device(fence.device) {
            if let Err(e) = unsafe { device.device.reset_fences(&[fence.fence]) } {
                log::error!("Failed to reset fence {:?}: {:?}", handle, e);
            }
        }
    }

    pub fn fence_status(&self, handle: Handle<Fence>) -> FenceStatus {
        let Some(fence) = self.fences.get(handle) else {
            return FenceStatus::Error;
        };
        let Some(device) = self.device(fence.device) else {
            return FenceStatus::Error;
        };
        match unsafe { device.device.get_fence_status(fence.fence) } {
            Ok(true) => FenceStatus::Signalled,
            Ok(false) => FenceStatus::Unsignalled,
            Err(e) => vk_result_to_fence_status(e),
        }
    }

    pub fn fence_external_handle(&self, handle: Handle<Fence>) -> HandleOrFd {
        let Some(fence) = self.fences.get(handle) else {
            return HandleOrFd::None;
        };
        let (Some(handle_type), Some(device)) = (fence.external_fence_handle_type, self.devices.get(fence.device))
        else {
            return HandleOrFd::None;
        };
        device
            .loaders
            .exporter
            .export_fence(fence.fence, external_fence_handle_type_to_vk(handle_type))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Semaphores
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_gpu_semaphore(&mut self, device: Handle<Device>, options: &GpuSemaphoreOptions) -> Handle<GpuSemaphore> {
        let Some(vk_device) = self.device(device) else {
            return Handle::null();
        };

        let mut export_info = vk::ExportSemaphoreCreateInfo::builder();
        if let Some(handle_type) = options.external_semaphore_handle_type {
            export_info = export_info.handle_types(external_semaphore_handle_type_to_vk(handle_type));
        }
        let mut create_info = vk::SemaphoreCreateInfo::builder();
        if options.external_semaphore_handle_type.is_some() {
            create_info = create_info.push_next(&mut export_info);
        }

        match unsafe { vk_device.device.create_semaphore(&create_info, None) } {
            Ok(semaphore) => {
                vk_device.set_object_name(semaphore, &options.label);
                self.gpu_semaphores.emplace(VulkanGpuSemaphore {
                    semaphore,
                    device,
                    external_semaphore_handle_type: options.external_semaphore_handle_type,
                })
            }
            Err(e) => {
                log::error!("Failed to create semaphore: {:?}", e);
                Handle::null()
            }
        }
    }

    pub fn delete_gpu_semaphore(&mut self, handle: Handle<GpuSemaphore>) {
        let Some(semaphore) = self.gpu_semaphores.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(semaphore.device) {
            unsafe { device.device.destroy_semaphore(semaphore.semaphore, None) };
        }
    }

    pub fn get_gpu_semaphore(&self, handle: Handle<GpuSemaphore>) -> Option<&VulkanGpuSemaphore> {
        self.gpu_semaphores.get(handle)
    }

    pub fn gpu_semaphore_external_handle(&self, handle: Handle<GpuSemaphore>) -> HandleOrFd {
        let Some(semaphore) = self.gpu_semaphores.get(handle) else {
            return HandleOrFd::None;
        };
        let (Some(handle_type), Some(device)) =
            (semaphore.external_semaphore_handle_type, self.devices.get(semaphore.device))
        else {
            return HandleOrFd::None;
        };
        device
            .loaders
            .exporter
            .export_semaphore(semaphore.semaphore, external_semaphore_handle_type_to_vk(handle_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fence_reports_error() {
        let manager = ResourceManager::new();
        assert_eq!(manager.fence_status(Handle::null()), FenceStatus::Error);
        assert_eq!(manager.wait_for_fence(Handle::null(), 0), FenceStatus::Error);
        assert_eq!(manager.fence_external_handle(Handle::null()), HandleOrFd::None);
    }

    #[test]
    fn semaphore_without_device_is_null() {
        let mut manager = ResourceManager::new();
        let handle = manager.create_gpu_semaphore(Handle::null(), &GpuSemaphoreOptions::default());
        assert!(!handle.is_valid());
    }
}
