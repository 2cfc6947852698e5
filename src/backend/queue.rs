// Queues - Submission and presentation
//
// Queues are fetched when the device is created and live as long as it does.
// They have no create/delete of their own; delete_device drops them.

use super::enums::vk_result_to_present_result;
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::{PresentOptions, SubmitOptions};
use crate::resources::{Device, GpuSemaphore, Queue, Swapchain};
use crate::types::{Extent3D, PresentResult, QueueFlags};
use ash::vk;

pub struct VulkanQueue {
    pub queue: vk::Queue,
    pub device: Handle<Device>,
    pub queue_type_index: u32,
    pub flags: QueueFlags,
    pub timestamp_valid_bits: u32,
    pub min_image_transfer_granularity: Extent3D,
    /// Per-swapchain outcome of the last present on this queue
    pub last_present_results: Vec<(Handle<Swapchain>, PresentResult)>,
}

impl ResourceManager {
    pub fn get_queue(&self, handle: Handle<Queue>) -> Option<&VulkanQueue> {
        self.queues.get(handle)
    }

    fn native_semaphores(&self, handles: &[Handle<GpuSemaphore>]) -> Vec<vk::Semaphore> {
        handles
            .iter()
            .filter_map(|h| match self.gpu_semaphores.get(*h) {
                Some(s) => Some(s.semaphore),
                None => {
                    log::error!("Unknown semaphore {:?} skipped", h);
                    None
                }
            })
            .collect()
    }

    /// Submit finished command buffers. Wait semaphores block at the top of the pipe.
    pub fn submit(&self, queue: Handle<Queue>, options: &SubmitOptions) {
        let Some(vk_queue) = self.queues.get(queue) else {
            log::error!("Unknown queue {:?}", queue);
            return;
        };
        let Some(device) = self.device(vk_queue.device) else {
            return;
        };

        let command_buffers: Vec<vk::CommandBuffer> = options
            .command_buffers
            .iter()
            .filter_map(|h| match self.command_buffers.get(*h) {
                Some(cb) => Some(cb.command_buffer),
                None => {
                    log::error!("Unknown command buffer {:?} skipped", h);
                    None
                }
            })
            .collect();
        let wait_semaphores = self.native_semaphores(&options.wait_semaphores);
        let wait_stages = vec![vk::PipelineStageFlags::TOP_OF_PIPE; wait_semaphores.len()];
        let signal_semaphores = self.native_semaphores(&options.signal_semaphores);
        let fence = options
            .signal_fence
            .and_then(|h| self.fences.get(h))
            .map(|f| f.fence)
            .unwrap_or_default();

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        if let Err(e) = unsafe { device.device.queue_submit(vk_queue.queue, &[submit_info.build()], fence) } {
            log::error!("vkQueueSubmit failed: {:?}", e);
        }
    }

    /// Present swapchain images. The overall result is the first failure, if any.
    pub fn present(&mut self, queue: Handle<Queue>, options: &PresentOptions) -> PresentResult {
        let Some(vk_queue) = self.queues.get(queue) else {
            log::error!("Unknown queue {:?}", queue);
            return PresentResult::DeviceLost;
        };
        let Some(loader) = self
            .devices
            .get(vk_queue.device)
            .and_then(|d| d.loaders.swapchain.as_ref())
        else {
            log::error!("Queue {:?} has no swapchain support", queue);
            return PresentResult::DeviceLost;
        };

        let wait_semaphores = self.native_semaphores(&options.wait_semaphores);
        let mut presented = Vec::with_capacity(options.swapchain_images.len());
        let mut swapchains = Vec::with_capacity(options.swapchain_images.len());
        let mut image_indices = Vec::with_capacity(options.swapchain_images.len());
        for image in &options.swapchain_images {
            match self.swapchains.get(image.swapchain) {
                Some(s) => {
                    presented.push(image.swapchain);
                    swapchains.push(s.swapchain);
                    image_indices.push(image.image_index);
                }
                None => log::error!("Unknown swapchain {:?} skipped", image.swapchain),
            }
        }
        let mut results = vec![vk::Result::SUCCESS; swapchains.len()];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices)
            .results(&mut results);

        let overall = match unsafe { loader.queue_present(vk_queue.queue, &present_info) } {
            Ok(_) => PresentResult::Success,
            Err(e) => vk_result_to_present_result(e),
        };

        let per_swapchain = presented
            .into_iter()
            .zip(results.iter().map(|r| vk_result_to_present_result(*r)))
            .collect();
        if let Some(vk_queue) = self.queues.get_mut(queue) {
            vk_queue.last_present_results = per_swapchain;
        }
        overall
    }

    /// Results recorded by the last `present` on this queue
    pub fn last_present_results(&self, queue: Handle<Queue>) -> Vec<(Handle<Swapchain>, PresentResult)> {
        self.queues
            .get(queue)
            .map(|q| q.last_present_results.clone())
            .unwrap_or_default()
    }

    pub fn wait_queue_idle(&self, queue: Handle<Queue>) {
        let Some(vk_queue) = self.queues.get(queue) else {
            return;
        };
        if let Some(device) = self.device(vk_queue.device) {
            if let Err(e) = unsafe { device.device.queue_wait_idle(vk_queue.queue) } {
                log::error!("Failed to wait for queue idle: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_on_unknown_queue_fails() {
        let mut manager = ResourceManager::new();
        let result = manager.present(Handle::null(), &PresentOptions::default());
        assert_eq!(result, PresentResult::DeviceLost);
        assert!(manager.last_present_results(Handle::null()).is_empty());
    }
}
