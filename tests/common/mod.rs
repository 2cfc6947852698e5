// Shared GPU test setup
//
// Every GPU test starts here. The tests are #[ignore]d so a plain `cargo test`
// reports them as skipped; run them with `cargo test -- --ignored` on a machine
// with a driver. Adapters missing an optional feature still get None and the
// test returns early.

#![allow(dead_code)]

use gpu_forge::resources::{Adapter, Device, Instance, Queue};
use gpu_forge::{AdapterFeatures, DeviceOptions, Handle, InstanceOptions, ResourceManager};

pub struct Gpu {
    pub rm: ResourceManager,
    pub instance: Handle<Instance>,
    pub adapter: Handle<Adapter>,
    pub device: Handle<Device>,
    pub queue: Handle<Queue>,
}

pub fn init_logging() {
    gpu_forge::logging::init_logging_with_level(log::LevelFilter::Warn);
}

fn open(
    features: impl FnOnce(&AdapterFeatures) -> Option<AdapterFeatures>,
    options: DeviceOptions,
) -> Option<Gpu> {
    init_logging();
    let mut rm = ResourceManager::new();
    let instance = match rm.create_instance(&InstanceOptions {
        application_name: "gpu-forge tests".to_string(),
        validation: false,
        ..Default::default()
    }) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("skipping: no Vulkan driver ({:#})", e);
            return None;
        }
    };
    let Some(adapter) = rm.select_adapter(instance) else {
        eprintln!("skipping: no Vulkan adapter");
        return None;
    };
    let available = rm.get_adapter(adapter)?.features.clone();
    let Some(requested_features) = features(&available) else {
        eprintln!("skipping: adapter lacks a required feature");
        return None;
    };
    let device = match rm.create_device(
        adapter,
        &DeviceOptions {
            requested_features,
            ..options
        },
    ) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("skipping: device creation failed ({:#})", e);
            return None;
        }
    };
    let queue = *rm.device_queues(device).first()?;
    Some(Gpu {
        rm,
        instance,
        adapter,
        device,
        queue,
    })
}

/// Any device with default features
pub fn gpu() -> Option<Gpu> {
    gpu_with_options(DeviceOptions::default())
}

pub fn gpu_with_options(options: DeviceOptions) -> Option<Gpu> {
    open(|_| Some(AdapterFeatures::default()), options)
}

/// A device with acceleration structures and buffer device addresses
pub fn ray_tracing_gpu() -> Option<Gpu> {
    open(|available| {
        if !available.acceleration_structures || !available.buffer_device_address {
            return None;
        }
        Some(AdapterFeatures {
            acceleration_structures: true,
            buffer_device_address: true,
            ..Default::default()
        })
    }, DeviceOptions::default())
}
