// Shader modules
//
// Vulkan consumes SPIR-V as 32-bit words. Modules are created from words
// already in memory, or read from a .spv file on disk.

use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::resources::{Device, ShaderModule};
use anyhow::{bail, Context, Result};
use ash::vk;
use std::path::Path;

pub struct VulkanShaderModule {
    pub module: vk::ShaderModule,
    pub device: Handle<Device>,
}

/// Decode SPIR-V bytes into words
pub(crate) fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        bail!("SPIR-V length {} is not a multiple of 4", bytes.len());
    }
    let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).context("Malformed SPIR-V")?;
    Ok(words)
}

impl ResourceManager {
    pub fn create_shader_module(&mut self, device: Handle<Device>, code: &[u32]) -> Handle<ShaderModule> {
        let Some(vk_device) = self.device(device) else {
            return Handle::null();
        };
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        match unsafe { vk_device.device.create_shader_module(&create_info, None) } {
            Ok(module) => self.shader_modules.emplace(VulkanShaderModule { module, device }),
            Err(e) => {
                log::error!("Failed to create shader module: {:?}", e);
                Handle::null()
            }
        }
    }

    /// Load a SPIR-V file. A missing or malformed file is an error.
    pub fn create_shader_module_from_file<P: AsRef<Path>>(
        &mut self,
        device: Handle<Device>,
        path: P,
    ) -> Result<Handle<ShaderModule>> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read shader file: {:?}", path))?;
        let words = spirv_words(&bytes).with_context(|| format!("Invalid shader file: {:?}", path))?;

        let handle = self.create_shader_module(device, &words);
        if !handle.is_valid() {
            bail!("Failed to create shader module from {:?}", path);
        }
        log::debug!("Loaded shader {:?} ({} words)", path, words.len());
        Ok(handle)
    }

    pub fn delete_shader_module(&mut self, handle: Handle<ShaderModule>) {
        let Some(module) = self.shader_modules.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get(module.device) {
            unsafe { device.device.destroy_shader_module(module.module, None) };
        }
    }

    pub fn get_shader_module(&self, handle: Handle<ShaderModule>) -> Option<&VulkanShaderModule> {
        self.shader_modules.get(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spirv_bytes_decode_to_words() {
        let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn truncated_spirv_is_rejected() {
        assert!(spirv_words(&[0x03, 0x02, 0x23, 0x07, 0x00]).is_err());
    }

    #[test]
    fn missing_shader_file_is_an_error() {
        let mut manager = ResourceManager::new();
        let result = manager.create_shader_module_from_file(Handle::null(), "/no/such/shader.spv");
        assert!(result.is_err());
    }
}
