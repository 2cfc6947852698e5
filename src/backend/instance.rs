// Vulkan Instance - Library entry, validation and surfaces
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Forwarding validation messages to the log facade
// - Adapter enumeration (physical devices become pooled adapters)
// - Surfaces from caller-supplied raw window handles

use super::adapter::VulkanAdapter;
use super::resource_manager::{ResourceManager, SuppressionList};
use crate::handle::Handle;
use crate::options::{AdapterDeviceType, InstanceOptions};
use crate::resources::{Adapter, Instance, Surface};
use anyhow::{bail, Context, Result};
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use parking_lot::RwLock;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashSet;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub api_version: u32,
    pub(crate) surface_loader: khr::Surface,
    pub(crate) debug_utils: Option<ext::DebugUtils>,
    debug_messenger: vk::DebugUtilsMessengerEXT,
    pub adapters: Vec<Handle<Adapter>>,
    /// Keeps the callback's user data alive for as long as the messenger
    _suppressions: SuppressionList,
    owned: bool,
}

pub struct VulkanSurface {
    pub surface: vk::SurfaceKHR,
    pub instance: Handle<Instance>,
    loader: khr::Surface,
    owned: bool,
}

impl ResourceManager {
    /// Create a Vulkan instance and enumerate its adapters
    pub fn create_instance(&mut self, options: &InstanceOptions) -> Result<Handle<Instance>> {
        log::info!("Creating Vulkan instance: {}", options.application_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let loader_version = entry
            .try_enumerate_instance_version()
            .context("Failed to query instance version")?
            .unwrap_or(vk::API_VERSION_1_0);
        let (major, minor) = options.api_version;
        let requested = vk::make_api_version(0, major, minor, 0);
        if loader_version < vk::API_VERSION_1_1 {
            bail!(
                "Vulkan loader only supports {}.{}, 1.1 is required",
                vk::api_version_major(loader_version),
                vk::api_version_minor(loader_version)
            );
        }

        // Step 2: Gather layers and extensions
        let available_layers: HashSet<String> = entry
            .enumerate_instance_layer_properties()
            .context("Failed to enumerate instance layers")?
            .iter()
            .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }.to_string_lossy().into_owned())
            .collect();
        let available_extensions: HashSet<String> = entry
            .enumerate_instance_extension_properties(None)
            .context("Failed to enumerate instance extensions")?
            .iter()
            .map(|e| {
                unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let mut layers: Vec<CString> = Vec::new();
        for layer in &options.layers {
            layers.push(CString::new(layer.as_str())?);
        }
        let mut validation = options.validation;
        if validation {
            let name = VALIDATION_LAYER.to_string_lossy().into_owned();
            if available_layers.contains(&name) {
                layers.push(VALIDATION_LAYER.to_owned());
            } else {
                log::warn!("{} not available, continuing without validation", name);
                validation = false;
            }
        }

        let mut extensions: Vec<CString> = Vec::new();
        for extension in &options.extensions {
            extensions.push(CString::new(extension.as_str())?);
        }
        if let Some(display) = options.display_handle {
            let required = ash_window::enumerate_required_extensions(display)
                .context("Failed to query surface extensions")?;
            for name in required {
                extensions.push(unsafe { CStr::from_ptr(*name) }.to_owned());
            }
        } else if available_extensions.contains("VK_KHR_surface") {
            extensions.push(khr::Surface::name().to_owned());
        }
        let debug_utils_name = ext::DebugUtils::name().to_string_lossy().into_owned();
        let with_debug_utils = available_extensions.contains(&debug_utils_name);
        if with_debug_utils {
            extensions.push(ext::DebugUtils::name().to_owned());
        }
        extensions.sort();
        extensions.dedup();

        // Step 3: Create instance
        let app_name = CString::new(options.application_name.as_str())?;
        let engine_name = CString::new("gpu-forge")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(options.application_version)
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(requested);

        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        // Step 4: Setup debug messenger if validation enabled
        let suppressions = self.suppressed_messages.clone();
        let debug_utils = with_debug_utils.then(|| ext::DebugUtils::new(&entry, &instance));
        let debug_messenger = match (&debug_utils, validation) {
            (Some(debug_utils), true) => setup_debug_messenger(debug_utils, &suppressions)?,
            _ => vk::DebugUtilsMessengerEXT::null(),
        };

        let surface_loader = khr::Surface::new(&entry, &instance);
        let handle = self.instances.emplace(VulkanInstance {
            entry,
            instance,
            api_version: requested,
            surface_loader,
            debug_utils,
            debug_messenger,
            adapters: Vec::new(),
            _suppressions: suppressions,
            owned: true,
        });

        // Step 5: Enumerate adapters
        self.enumerate_adapters(handle)?;
        Ok(handle)
    }

    /// Adopt an instance created elsewhere. It is not destroyed on delete.
    pub fn create_instance_from_existing(
        &mut self,
        entry: Entry,
        instance: vk::Instance,
        api_version: u32,
    ) -> Result<Handle<Instance>> {
        let instance = unsafe { ash::Instance::load(entry.static_fn(), instance) };
        let surface_loader = khr::Surface::new(&entry, &instance);
        let handle = self.instances.emplace(VulkanInstance {
            entry,
            instance,
            api_version,
            surface_loader,
            debug_utils: None,
            debug_messenger: vk::DebugUtilsMessengerEXT::null(),
            adapters: Vec::new(),
            _suppressions: self.suppressed_messages.clone(),
            owned: false,
        });
        self.enumerate_adapters(handle)?;
        Ok(handle)
    }

    pub fn delete_instance(&mut self, handle: Handle<Instance>) {
        let Some(instance) = self.instances.remove(handle) else {
            return;
        };
        for adapter in &instance.adapters {
            self.adapters.remove(*adapter);
        }
        if !instance.owned {
            return;
        }
        unsafe {
            if let Some(debug_utils) = &instance.debug_utils {
                if instance.debug_messenger != vk::DebugUtilsMessengerEXT::null() {
                    debug_utils.destroy_debug_utils_messenger(instance.debug_messenger, None);
                }
            }
            instance.instance.destroy_instance(None);
        }
    }

    pub fn get_instance(&self, handle: Handle<Instance>) -> Option<&VulkanInstance> {
        self.instances.get(handle)
    }

    fn enumerate_adapters(&mut self, handle: Handle<Instance>) -> Result<()> {
        let Some(instance) = self.instances.get(handle) else {
            bail!("Unknown instance {:?}", handle);
        };
        let physical_devices = unsafe { instance.instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        let adapters: Vec<VulkanAdapter> = physical_devices
            .into_iter()
            .map(|pd| VulkanAdapter::query(handle, instance, pd))
            .collect();

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            log::info!(
                "Found adapter: {} ({:?})",
                adapter.properties.device_name,
                adapter.properties.device_type
            );
            handles.push(self.adapters.emplace(adapter));
        }
        if let Some(instance) = self.instances.get_mut(handle) {
            instance.adapters = handles;
        }
        Ok(())
    }

    pub fn adapters(&self, instance: Handle<Instance>) -> Vec<Handle<Adapter>> {
        self.instances
            .get(instance)
            .map(|i| i.adapters.clone())
            .unwrap_or_default()
    }

    /// Pick the best adapter with a graphics queue (prefer discrete GPU)
    pub fn select_adapter(&self, instance: Handle<Instance>) -> Option<Handle<Adapter>> {
        let mut best = None;
        let mut best_score = 0;

        for handle in self.adapters(instance) {
            let Some(adapter) = self.adapters.get(handle) else {
                continue;
            };
            if !adapter.queue_types.iter().any(|q| q.supports_graphics()) {
                continue;
            }
            let score = match adapter.properties.device_type {
                AdapterDeviceType::DiscreteGpu => 1000,
                AdapterDeviceType::IntegratedGpu => 100,
                _ => 1,
            };
            if score > best_score {
                best_score = score;
                best = Some(handle);
            }
        }
        best
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Surfaces
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_surface(
        &mut self,
        instance: Handle<Instance>,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Handle<Surface> {
        let Some(vk_instance) = self.instances.get(instance) else {
            log::error!("Failed to create surface: unknown instance {:?}", instance);
            return Handle::null();
        };
        let surface = unsafe {
            ash_window::create_surface(
                &vk_instance.entry,
                &vk_instance.instance,
                display_handle,
                window_handle,
                None,
            )
        };
        match surface {
            Ok(surface) => self.surfaces.emplace(VulkanSurface {
                surface,
                instance,
                loader: vk_instance.surface_loader.clone(),
                owned: true,
            }),
            Err(e) => {
                log::error!("Failed to create surface: {:?}", e);
                Handle::null()
            }
        }
    }

    /// Wrap a surface created by the windowing layer. It is not destroyed on delete.
    pub fn create_surface_from_existing(
        &mut self,
        instance: Handle<Instance>,
        surface: vk::SurfaceKHR,
    ) -> Handle<Surface> {
        let Some(vk_instance) = self.instances.get(instance) else {
            log::error!("Failed to adopt surface: unknown instance {:?}", instance);
            return Handle::null();
        };
        let loader = vk_instance.surface_loader.clone();
        self.surfaces.emplace(VulkanSurface {
            surface,
            instance,
            loader,
            owned: false,
        })
    }

    pub fn delete_surface(&mut self, handle: Handle<Surface>) {
        if let Some(surface) = self.surfaces.remove(handle) {
            if surface.owned {
                unsafe { surface.loader.destroy_surface(surface.surface, None) };
            }
        }
    }

    pub fn get_surface(&self, handle: Handle<Surface>) -> Option<&VulkanSurface> {
        self.surfaces.get(handle)
    }
}

fn setup_debug_messenger(
    debug_utils: &ext::DebugUtils,
    suppressions: &SuppressionList,
) -> Result<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .user_data(Arc::as_ptr(suppressions) as *mut c_void);

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .context("Failed to create debug messenger")?;
    Ok(messenger)
}

/// True when the message id is on the suppression list
pub(crate) fn is_suppressed(list: &RwLock<HashSet<String>>, message_id: Option<&str>) -> bool {
    match message_id {
        Some(id) => list.read().contains(id),
        None => false,
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*p_callback_data;

    let message_id = (!data.p_message_id_name.is_null())
        .then(|| CStr::from_ptr(data.p_message_id_name).to_string_lossy());
    if !p_user_data.is_null() {
        let list = &*(p_user_data as *const RwLock<HashSet<String>>);
        if is_suppressed(list, message_id.as_deref()) {
            return vk::FALSE;
        }
    }

    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("")
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan] {}", message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            log::debug!("[Vulkan] {}", message);
        }
        _ => {
            log::trace!("[Vulkan] {}", message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppressed_ids_match_exactly() {
        let list = RwLock::new(HashSet::from(["VUID-x-01274".to_string()]));
        assert!(is_suppressed(&list, Some("VUID-x-01274")));
        assert!(!is_suppressed(&list, Some("VUID-x-01275")));
        assert!(!is_suppressed(&list, None));
    }
}
