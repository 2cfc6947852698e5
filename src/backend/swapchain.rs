// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The images belong to the presentation engine; they are registered as
// textures so views and render passes can use them like any other target.

use super::enums::{
    color_space_to_vk, composite_alpha_to_vk, format_to_vk, present_mode_to_vk,
    surface_transform_to_vk, texture_usage_to_vk, vk_result_to_acquire_result,
};
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::SwapchainOptions;
use crate::resources::{Device, GpuSemaphore, Surface, Swapchain, Texture};
use crate::types::{AcquireImageResult, Extent2D, Extent3D, Format, TextureUsageFlags};
use anyhow::{bail, Context, Result};
use ash::vk;

pub struct VulkanSwapchain {
    pub swapchain: vk::SwapchainKHR,
    pub device: Handle<Device>,
    pub surface: Handle<Surface>,
    pub format: Format,
    pub extent: Extent2D,
    pub array_layers: u32,
    pub usage: TextureUsageFlags,
    pub textures: Vec<Handle<Texture>>,
}

impl ResourceManager {
    pub fn create_swapchain(&mut self, device: Handle<Device>, options: &SwapchainOptions) -> Handle<Swapchain> {
        match self.try_create_swapchain(device, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create swapchain: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_swapchain(
        &mut self,
        device_handle: Handle<Device>,
        options: &SwapchainOptions,
    ) -> Result<Handle<Swapchain>> {
        log::info!(
            "Creating swapchain: {}x{}",
            options.image_extent.width,
            options.image_extent.height
        );
        let Some(device) = self.devices.get(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };
        let loader = device
            .loaders
            .swapchain
            .as_ref()
            .context("VK_KHR_swapchain is not enabled")?;
        let surface = self
            .surfaces
            .get(options.surface)
            .with_context(|| format!("Unknown surface {:?}", options.surface))?;
        let old_swapchain = match options.old_swapchain {
            Some(old) => self
                .swapchains
                .get(old)
                .map(|s| s.swapchain)
                .with_context(|| format!("Unknown old swapchain {:?}", old))?,
            None => vk::SwapchainKHR::null(),
        };

        let sharing_mode = if options.queue_type_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(options.min_image_count)
            .image_format(format_to_vk(options.format))
            .image_color_space(color_space_to_vk(options.color_space))
            .image_extent(vk::Extent2D {
                width: options.image_extent.width,
                height: options.image_extent.height,
            })
            .image_array_layers(options.image_layers.max(1))
            .image_usage(texture_usage_to_vk(options.image_usage))
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&options.queue_type_indices)
            .pre_transform(surface_transform_to_vk(options.transform))
            .composite_alpha(composite_alpha_to_vk(options.composite_alpha))
            .present_mode(present_mode_to_vk(options.present_mode))
            .clipped(options.clipped)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .context("vkCreateSwapchainKHR failed")?;
        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                bail!("vkGetSwapchainImagesKHR failed: {:?}", e);
            }
        };
        device.set_object_name(swapchain, &options.label);
        log::info!("Swapchain created with {} images", images.len());

        let extent = Extent3D {
            width: options.image_extent.width,
            height: options.image_extent.height,
            depth: 1,
        };
        let textures = images
            .into_iter()
            .map(|image| {
                self.register_swapchain_texture(
                    device_handle,
                    image,
                    options.format,
                    extent,
                    options.image_layers.max(1),
                    options.image_usage,
                )
            })
            .collect();

        Ok(self.swapchains.emplace(VulkanSwapchain {
            swapchain,
            device: device_handle,
            surface: options.surface,
            format: options.format,
            extent: options.image_extent,
            array_layers: options.image_layers.max(1),
            usage: options.image_usage,
            textures,
        }))
    }

    /// Texture handles of the swapchain images, in presentation index order
    pub fn swapchain_textures(&self, handle: Handle<Swapchain>) -> Vec<Handle<Texture>> {
        self.swapchains
            .get(handle)
            .map(|s| s.textures.clone())
            .unwrap_or_default()
    }

    /// Acquire the next image, signalling `semaphore` when it is ready
    pub fn acquire_next_image(
        &self,
        handle: Handle<Swapchain>,
        semaphore: Handle<GpuSemaphore>,
    ) -> (AcquireImageResult, u32) {
        let Some(swapchain) = self.swapchains.get(handle) else {
            log::error!("Unknown swapchain {:?}", handle);
            return (AcquireImageResult::SurfaceLost, 0);
        };
        let Some(loader) = self
            .devices
            .get(swapchain.device)
            .and_then(|d| d.loaders.swapchain.as_ref())
        else {
            return (AcquireImageResult::DeviceLost, 0);
        };
        let semaphore = self
            .gpu_semaphores
            .get(semaphore)
            .map(|s| s.semaphore)
            .unwrap_or_default();

        match unsafe { loader.acquire_next_image(swapchain.swapchain, u64::MAX, semaphore, vk::Fence::null()) } {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Swapchain {:?} is suboptimal", handle);
                }
                (AcquireImageResult::Success, index)
            }
            Err(e) => (vk_result_to_acquire_result(e), 0),
        }
    }

    pub fn delete_swapchain(&mut self, handle: Handle<Swapchain>) {
        let Some(swapchain) = self.swapchains.remove(handle) else {
            return;
        };
        for texture in &swapchain.textures {
            self.textures.remove(*texture);
        }
        if let Some(loader) = self
            .devices
            .get(swapchain.device)
            .and_then(|d| d.loaders.swapchain.as_ref())
        {
            unsafe { loader.destroy_swapchain(swapchain.swapchain, None) };
        }
    }

    pub fn get_swapchain(&self, handle: Handle<Swapchain>) -> Option<&VulkanSwapchain> {
        self.swapchains.get(handle)
    }
}
