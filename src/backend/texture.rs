// Textures and texture views
//
// Swapchain images are registered in the same pool with no memory attached,
// so deleting them never destroys an image owned by the presentation engine.

use super::enums::{
    aspect_flags_to_vk, external_memory_handle_type_to_vk, format_to_vk, sample_count_to_vk,
    subresource_range_to_vk, texture_layout_to_vk, texture_type_to_vk, texture_usage_to_vk,
    tiling_to_vk, view_type_to_vk,
};
use super::external::{usable_external_memory, DedicatedTarget};
use super::memory::{MemoryRequest, ResourceMemory};
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::{TextureOptions, TextureViewOptions};
use crate::resources::{Device, Texture, TextureView};
use crate::types::{
    Extent3D, Format, MemoryHandle, SampleCount, TextureAspectFlags, TextureSubresourceRange,
    TextureTiling, TextureType, TextureUsageFlags,
};
use anyhow::{bail, Context, Result};
use ash::vk;
use std::ptr::NonNull;

pub struct VulkanTexture {
    pub image: vk::Image,
    pub device: Handle<Device>,
    pub texture_type: TextureType,
    pub format: Format,
    pub extent: Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: SampleCount,
    pub usage: TextureUsageFlags,
    pub external_memory_handle: MemoryHandle,
    /// Presentation engine owns the image
    pub owned_by_swapchain: bool,
    pub(crate) memory: ResourceMemory,
}

pub struct VulkanTextureView {
    pub view: vk::ImageView,
    pub texture: Handle<Texture>,
    pub device: Handle<Device>,
    pub format: Format,
    pub range: TextureSubresourceRange,
}

/// Aspect used when a range or view leaves it empty
pub(crate) fn resolve_aspect(aspect: TextureAspectFlags, format: Format) -> TextureAspectFlags {
    if aspect.is_empty() {
        format.default_aspects()
    } else {
        aspect
    }
}

impl ResourceManager {
    /// Create a texture. `initial_data` is only uploaded into host-visible memory.
    pub fn create_texture(
        &mut self,
        device: Handle<Device>,
        options: &TextureOptions,
        initial_data: Option<&[u8]>,
    ) -> Handle<Texture> {
        match self.try_create_texture(device, options, initial_data) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create texture: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_texture(
        &mut self,
        device_handle: Handle<Device>,
        options: &TextureOptions,
        initial_data: Option<&[u8]>,
    ) -> Result<Handle<Texture>> {
        let Some(device) = self.devices.get_mut(device_handle) else {
            bail!("Unknown device {:?}", device_handle);
        };

        let flags = if options.texture_type == TextureType::TextureTypeCube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let sharing_mode = if options.queue_type_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let external = usable_external_memory(options.external_memory_handle_type, &device.enabled_extensions);
        let mut external_info = vk::ExternalMemoryImageCreateInfo::builder();
        if let Some(handle_type) = external {
            external_info = external_info.handle_types(external_memory_handle_type_to_vk(handle_type));
        }
        let mut image_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(texture_type_to_vk(options.texture_type))
            .format(format_to_vk(options.format))
            .extent(super::enums::extent3d_to_vk(options.extent))
            .mip_levels(options.mip_levels.max(1))
            .array_layers(options.array_layers.max(1))
            .samples(sample_count_to_vk(options.samples))
            .tiling(tiling_to_vk(options.tiling))
            .usage(texture_usage_to_vk(options.usage))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&options.queue_type_indices)
            .initial_layout(texture_layout_to_vk(options.initial_layout));
        if external.is_some() {
            image_info = image_info.push_next(&mut external_info);
        }

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("vkCreateImage failed")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let name = options.label.as_deref().unwrap_or("texture");
        let memory = match ResourceMemory::allocate(
            device,
            MemoryRequest {
                name,
                requirements,
                usage: options.memory_usage,
                linear: options.tiling == TextureTiling::Linear,
                external,
                target: DedicatedTarget::Image(image),
                device_address: false,
            },
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e);
            }
        };
        if let Err(e) = memory.bind_image(&device.device, image) {
            memory.free(device);
            unsafe { device.device.destroy_image(image, None) };
            return Err(e);
        }

        let external_memory_handle = memory.export_handle(device);
        device.set_object_name(image, &options.label);

        let mut texture = VulkanTexture {
            image,
            device: device_handle,
            texture_type: options.texture_type,
            format: options.format,
            extent: options.extent,
            mip_levels: options.mip_levels.max(1),
            array_layers: options.array_layers.max(1),
            samples: options.samples,
            usage: options.usage,
            external_memory_handle,
            owned_by_swapchain: false,
            memory,
        };

        if let Some(data) = initial_data {
            if options.memory_usage.is_host_visible() {
                if let Some(ptr) = texture.memory.map(&device.device) {
                    let len = data.len().min(texture.memory.size() as usize);
                    unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), len) };
                    if let Some(range) =
                        texture.memory.mapped_range(device.properties.limits.non_coherent_atom_size)
                    {
                        if let Err(e) = unsafe { device.device.flush_mapped_memory_ranges(&[range]) } {
                            log::error!("Failed to flush texture upload: {:?}", e);
                        }
                    }
                    texture.memory.unmap(&device.device);
                }
            } else {
                log::warn!(
                    "Initial data for {} ignored, {:?} memory is not host visible",
                    name,
                    options.memory_usage
                );
            }
        }

        log::debug!(
            "Created texture {} {}x{}x{} {:?}",
            name,
            options.extent.width,
            options.extent.height,
            options.extent.depth,
            options.format
        );
        Ok(self.textures.emplace(texture))
    }

    /// Register an image owned by a swapchain
    pub(crate) fn register_swapchain_texture(
        &mut self,
        device: Handle<Device>,
        image: vk::Image,
        format: Format,
        extent: Extent3D,
        array_layers: u32,
        usage: TextureUsageFlags,
    ) -> Handle<Texture> {
        self.textures.emplace(VulkanTexture {
            image,
            device,
            texture_type: TextureType::TextureType2D,
            format,
            extent,
            mip_levels: 1,
            array_layers,
            samples: SampleCount::Samples1,
            usage,
            external_memory_handle: MemoryHandle::default(),
            owned_by_swapchain: true,
            memory: ResourceMemory::None,
        })
    }

    pub fn delete_texture(&mut self, handle: Handle<Texture>) {
        let Some(texture) = self.textures.remove(handle) else {
            return;
        };
        if texture.owned_by_swapchain {
            return;
        }
        let Some(device) = self.devices.get_mut(texture.device) else {
            log::error!("Texture {:?} outlived its device", handle);
            return;
        };
        unsafe { device.device.destroy_image(texture.image, None) };
        texture.memory.free(device);
    }

    pub fn get_texture(&self, handle: Handle<Texture>) -> Option<&VulkanTexture> {
        self.textures.get(handle)
    }

    pub fn map_texture(&mut self, handle: Handle<Texture>) -> Option<NonNull<u8>> {
        let texture = self.textures.get_mut(handle)?;
        let device = self.devices.get(texture.device)?;
        texture.memory.map(&device.device)
    }

    pub fn unmap_texture(&mut self, handle: Handle<Texture>) {
        let Some(texture) = self.textures.get_mut(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(texture.device) {
            texture.memory.unmap(&device.device);
        }
    }

    pub fn texture_external_memory_handle(&self, handle: Handle<Texture>) -> MemoryHandle {
        self.textures
            .get(handle)
            .map(|t| t.external_memory_handle)
            .unwrap_or_default()
    }

    /// Byte layout of one subresource of a linear texture
    pub fn texture_subresource_layout(
        &self,
        handle: Handle<Texture>,
        aspect: TextureAspectFlags,
        mip_level: u32,
        array_layer: u32,
    ) -> Option<vk::SubresourceLayout> {
        let texture = self.textures.get(handle)?;
        let device = self.device(texture.device)?;
        let subresource = vk::ImageSubresource {
            aspect_mask: aspect_flags_to_vk(resolve_aspect(aspect, texture.format)),
            mip_level,
            array_layer,
        };
        Some(unsafe { device.device.get_image_subresource_layout(texture.image, subresource) })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_texture_view(
        &mut self,
        texture: Handle<Texture>,
        options: &TextureViewOptions,
    ) -> Handle<TextureView> {
        match self.try_create_texture_view(texture, options) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create texture view: {:#}", e);
                Handle::null()
            }
        }
    }

    fn try_create_texture_view(
        &mut self,
        texture_handle: Handle<Texture>,
        options: &TextureViewOptions,
    ) -> Result<Handle<TextureView>> {
        let Some(texture) = self.textures.get(texture_handle) else {
            bail!("Unknown texture {:?}", texture_handle);
        };
        let Some(device) = self.devices.get(texture.device) else {
            bail!("Texture {:?} has no device", texture_handle);
        };

        let format = if options.format == Format::Undefined {
            texture.format
        } else {
            options.format
        };
        let range = TextureSubresourceRange {
            aspect_mask: resolve_aspect(options.range.aspect_mask, format),
            ..options.range
        };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(texture.image)
            .view_type(view_type_to_vk(options.view_type))
            .format(format_to_vk(format))
            .subresource_range(subresource_range_to_vk(&range));

        let view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("vkCreateImageView failed")?;
        device.set_object_name(view, &options.label);

        let device_handle = texture.device;
        Ok(self.texture_views.emplace(VulkanTextureView {
            view,
            texture: texture_handle,
            device: device_handle,
            format,
            range,
        }))
    }

    pub fn delete_texture_view(&mut self, handle: Handle<TextureView>) {
        if !self.texture_views.contains(handle) {
            return;
        }
        self.evict_framebuffers_using(handle);
        let Some(view) = self.texture_views.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(view.device) {
            unsafe { device.device.destroy_image_view(view.view, None) };
        }
    }

    pub fn get_texture_view(&self, handle: Handle<TextureView>) -> Option<&VulkanTextureView> {
        self.texture_views.get(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aspect_follows_format() {
        assert_eq!(
            resolve_aspect(TextureAspectFlags::empty(), Format::D24UnormS8Uint),
            TextureAspectFlags::DEPTH | TextureAspectFlags::STENCIL
        );
        assert_eq!(
            resolve_aspect(TextureAspectFlags::empty(), Format::R8G8B8A8Srgb),
            TextureAspectFlags::COLOR
        );
        assert_eq!(
            resolve_aspect(TextureAspectFlags::DEPTH, Format::D24UnormS8Uint),
            TextureAspectFlags::DEPTH
        );
    }
}
