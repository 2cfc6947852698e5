// Samplers

use super::enums::{
    address_mode_to_vk, border_color_to_vk, compare_op_to_vk, filter_mode_to_vk,
    mipmap_filter_mode_to_vk,
};
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::SamplerOptions;
use crate::resources::{Device, Sampler};
use ash::vk;

pub struct VulkanSampler {
    pub sampler: vk::Sampler,
    pub device: Handle<Device>,
}

pub(crate) fn sampler_create_info(options: &SamplerOptions) -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(filter_mode_to_vk(options.mag_filter))
        .min_filter(filter_mode_to_vk(options.min_filter))
        .mipmap_mode(mipmap_filter_mode_to_vk(options.mipmap_filter))
        .address_mode_u(address_mode_to_vk(options.u))
        .address_mode_v(address_mode_to_vk(options.v))
        .address_mode_w(address_mode_to_vk(options.w))
        .mip_lod_bias(options.mip_lod_bias)
        .anisotropy_enable(options.max_anisotropy > 1.0)
        .max_anisotropy(options.max_anisotropy)
        .compare_enable(options.compare.is_some())
        .compare_op(options.compare.map(compare_op_to_vk).unwrap_or(vk::CompareOp::NEVER))
        .min_lod(options.lod_min_clamp)
        .max_lod(options.lod_max_clamp.unwrap_or(vk::LOD_CLAMP_NONE))
        .border_color(border_color_to_vk(options.border_color))
        .unnormalized_coordinates(!options.normalized)
        .build()
}

impl ResourceManager {
    pub fn create_sampler(&mut self, device: Handle<Device>, options: &SamplerOptions) -> Handle<Sampler> {
        let Some(vk_device) = self.device(device) else {
            return Handle::null();
        };
        let create_info = sampler_create_info(options);
        match unsafe { vk_device.device.create_sampler(&create_info, None) } {
            Ok(sampler) => {
                vk_device.set_object_name(sampler, &options.label);
                self.samplers.emplace(VulkanSampler { sampler, device })
            }
            Err(e) => {
                log::error!("Failed to create sampler: {:?}", e);
                Handle::null()
            }
        }
    }

    pub fn delete_sampler(&mut self, handle: Handle<Sampler>) {
        let Some(sampler) = self.samplers.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(sampler.device) {
            unsafe { device.device.destroy_sampler(sampler.sampler, None) };
        }
    }

    pub fn get_sampler(&self, handle: Handle<Sampler>) -> Option<&VulkanSampler> {
        self.samplers.get(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompareOperation, FilterMode};

    #[test]
    fn default_sampler_is_unclamped_and_normalized() {
        let info = sampler_create_info(&SamplerOptions::default());
        assert_eq!(info.max_lod, vk::LOD_CLAMP_NONE);
        assert_eq!(info.unnormalized_coordinates, vk::FALSE);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_eq!(info.compare_enable, vk::FALSE);
    }

    #[test]
    fn anisotropy_and_compare_follow_options() {
        let info = sampler_create_info(&SamplerOptions {
            mag_filter: FilterMode::Linear,
            max_anisotropy: 16.0,
            compare: Some(CompareOperation::Less),
            lod_max_clamp: Some(4.0),
            normalized: false,
            ..Default::default()
        });
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.compare_enable, vk::TRUE);
        assert_eq!(info.compare_op, vk::CompareOp::LESS);
        assert_eq!(info.max_lod, 4.0);
        assert_eq!(info.unnormalized_coordinates, vk::TRUE);
    }
}
