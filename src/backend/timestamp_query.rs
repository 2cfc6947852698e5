// Timestamp queries
//
// Every device owns one timestamp query pool. Recorders borrow a contiguous
// bucket of it for as long as they live, so several command buffers can
// time themselves without sharing query indices.

use super::enums::pipeline_stage_flags_to_vk;
use super::resource_manager::ResourceManager;
use crate::handle::Handle;
use crate::options::TimestampQueryRecorderOptions;
use crate::resources::{Device, TimestampQueryRecorder};
use crate::types::PipelineStageFlags;
use ash::vk;

/// First-fit allocator over `[0, capacity)` of the device query pool
#[derive(Debug, Clone, Default)]
pub(crate) struct TimestampBuckets {
    capacity: u32,
    /// (start, count), sorted by start
    buckets: Vec<(u32, u32)>,
}

impl TimestampBuckets {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            buckets: Vec::new(),
        }
    }

    /// Start of a free range of `count` queries
    pub fn allocate(&mut self, count: u32) -> Option<u32> {
        if count == 0 || count > self.capacity {
            return None;
        }
        let mut gap_start = 0u32;
        for (i, &(start, len)) in self.buckets.iter().enumerate() {
            if start - gap_start >= count {
                self.buckets.insert(i, (gap_start, count));
                return Some(gap_start);
            }
            gap_start = start + len;
        }
        if self.capacity - gap_start >= count {
            self.buckets.push((gap_start, count));
            return Some(gap_start);
        }
        None
    }

    pub fn free(&mut self, start: u32) {
        self.buckets.retain(|&(s, _)| s != start);
    }

    pub fn allocated(&self) -> u32 {
        self.buckets.iter().map(|&(_, count)| count).sum()
    }
}

pub struct VulkanTimestampQueryRecorder {
    pub device: Handle<Device>,
    pub command_buffer: vk::CommandBuffer,
    pub start_query: u32,
    pub max_query_count: u32,
    /// Queries written since the last reset
    pub query_count: u32,
    /// Nanoseconds per tick
    pub timestamp_period: f32,
    last_results: Vec<u64>,
}

impl ResourceManager {
    /// Reserve a bucket and record its reset into `command_buffer`
    pub(crate) fn create_timestamp_query_recorder(
        &mut self,
        device_handle: Handle<Device>,
        command_buffer: vk::CommandBuffer,
        options: &TimestampQueryRecorderOptions,
    ) -> Handle<TimestampQueryRecorder> {
        let Some(device) = self.devices.get_mut(device_handle) else {
            log::error!("Unknown device {:?}", device_handle);
            return Handle::null();
        };
        if device.timestamp_query_pool == vk::QueryPool::null() {
            log::error!("Device {:?} has no timestamp query pool", device_handle);
            return Handle::null();
        }
        let Some(start_query) = device.timestamp_buckets.allocate(options.query_count) else {
            log::error!(
                "No room for {} timestamp queries ({} in use)",
                options.query_count,
                device.timestamp_buckets.allocated()
            );
            return Handle::null();
        };

        unsafe {
            device.device.cmd_reset_query_pool(
                command_buffer,
                device.timestamp_query_pool,
                start_query,
                options.query_count,
            );
        }
        let timestamp_period = device.properties.limits.timestamp_period;

        self.timestamp_query_recorders.emplace(VulkanTimestampQueryRecorder {
            device: device_handle,
            command_buffer,
            start_query,
            max_query_count: options.query_count,
            query_count: 0,
            timestamp_period,
            last_results: Vec::new(),
        })
    }

    /// Write a timestamp after `stage` completes. Returns the index into the
    /// results; once the bucket is full the last query is overwritten.
    pub fn write_timestamp(&mut self, handle: Handle<TimestampQueryRecorder>, stage: PipelineStageFlags) -> u32 {
        let Some(recorder) = self.timestamp_query_recorders.get_mut(handle) else {
            log::error!("Unknown timestamp query recorder {:?}", handle);
            return 0;
        };
        let Some(device) = self.devices.get(recorder.device) else {
            return 0;
        };
        if recorder.query_count == recorder.max_query_count {
            log::warn!("Timestamp query count exceeded, overwriting last query");
        }
        let index = recorder.query_count.min(recorder.max_query_count - 1);
        unsafe {
            device.device.cmd_write_timestamp(
                recorder.command_buffer,
                pipeline_stage_flags_to_vk(stage),
                device.timestamp_query_pool,
                recorder.start_query + index,
            );
        }
        recorder.query_count = (recorder.query_count + 1).min(recorder.max_query_count);
        index
    }

    /// Record a reset of the whole bucket. The recorder's command buffer must
    /// still be recording.
    pub fn reset_timestamp_queries(&mut self, handle: Handle<TimestampQueryRecorder>) {
        let Some(recorder) = self.timestamp_query_recorders.get_mut(handle) else {
            return;
        };
        let Some(device) = self.devices.get(recorder.device) else {
            return;
        };
        unsafe {
            device.device.cmd_reset_query_pool(
                recorder.command_buffer,
                device.timestamp_query_pool,
                recorder.start_query,
                recorder.max_query_count,
            );
        }
        recorder.query_count = 0;
        recorder.last_results.clear();
    }

    /// Timestamps in nanoseconds. Queries that are not available yet read as 0.
    pub fn timestamp_query_results(&mut self, handle: Handle<TimestampQueryRecorder>) -> Vec<u64> {
        let Some(recorder) = self.timestamp_query_recorders.get_mut(handle) else {
            return Vec::new();
        };
        let Some(device) = self.devices.get(recorder.device) else {
            return Vec::new();
        };
        if recorder.query_count == 0 {
            return Vec::new();
        }

        // (value, availability) pairs
        let mut raw = vec![[0u64; 2]; recorder.query_count as usize];
        let result = unsafe {
            device.device.get_query_pool_results(
                device.timestamp_query_pool,
                recorder.start_query,
                recorder.query_count,
                &mut raw,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WITH_AVAILABILITY,
            )
        };
        match result {
            Ok(()) => {}
            Err(vk::Result::NOT_READY) => log::warn!("Timestamp query results not ready"),
            Err(e) => {
                log::error!("Failed to read timestamp query results: {:?}", e);
                return Vec::new();
            }
        }

        let period = f64::from(recorder.timestamp_period);
        recorder.last_results = raw
            .iter()
            .map(|&[value, available]| {
                if available == 0 {
                    0
                } else {
                    (value as f64 * period) as u64
                }
            })
            .collect();
        recorder.last_results.clone()
    }

    /// Nanoseconds between two indices returned by `write_timestamp`
    pub fn timestamp_nanosecond_interval(
        &mut self,
        handle: Handle<TimestampQueryRecorder>,
        begin: u32,
        end: u32,
    ) -> u64 {
        let cached = self
            .timestamp_query_recorders
            .get(handle)
            .is_some_and(|r| !r.last_results.is_empty());
        let results = if cached {
            self.timestamp_query_recorders
                .get(handle)
                .map(|r| r.last_results.clone())
                .unwrap_or_default()
        } else {
            self.timestamp_query_results(handle)
        };
        nanosecond_interval(&results, begin, end)
    }

    pub fn delete_timestamp_query_recorder(&mut self, handle: Handle<TimestampQueryRecorder>) {
        let Some(recorder) = self.timestamp_query_recorders.remove(handle) else {
            return;
        };
        if let Some(device) = self.devices.get_mut(recorder.device) {
            device.timestamp_buckets.free(recorder.start_query);
        }
    }

    pub fn get_timestamp_query_recorder(
        &self,
        handle: Handle<TimestampQueryRecorder>,
    ) -> Option<&VulkanTimestampQueryRecorder> {
        self.timestamp_query_recorders.get(handle)
    }
}

fn nanosecond_interval(results: &[u64], begin: u32, end: u32) -> u64 {
    match (results.get(begin as usize), results.get(end as usize)) {
        (Some(b), Some(e)) => e.saturating_sub(*b),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_first_fit() {
        let mut buckets = TimestampBuckets::new(100);
        assert_eq!(buckets.allocate(30), Some(0));
        assert_eq!(buckets.allocate(30), Some(30));
        assert_eq!(buckets.allocate(30), Some(60));
        assert_eq!(buckets.allocate(30), None);

        // Freed gap in the middle is reused first
        buckets.free(30);
        assert_eq!(buckets.allocate(20), Some(30));
        assert_eq!(buckets.allocate(10), Some(50));
        assert_eq!(buckets.allocate(10), Some(90));
        assert_eq!(buckets.allocated(), 100);
    }

    #[test]
    fn neighbouring_gaps_coalesce() {
        let mut buckets = TimestampBuckets::new(64);
        let a = buckets.allocate(16).unwrap();
        let b = buckets.allocate(16).unwrap();
        let _c = buckets.allocate(32).unwrap();
        buckets.free(a);
        buckets.free(b);
        assert_eq!(buckets.allocate(32), Some(0));
    }

    #[test]
    fn oversized_and_empty_requests_fail() {
        let mut buckets = TimestampBuckets::new(8);
        assert_eq!(buckets.allocate(9), None);
        assert_eq!(buckets.allocate(0), None);
        assert_eq!(TimestampBuckets::new(0).allocate(1), None);
    }

    #[test]
    fn interval_needs_both_indices() {
        let results = [100, 250, 400];
        assert_eq!(nanosecond_interval(&results, 0, 2), 300);
        assert_eq!(nanosecond_interval(&results, 1, 5), 0);
        assert_eq!(nanosecond_interval(&results, 2, 0), 0);
    }

    #[test]
    fn unknown_recorder_is_harmless() {
        let mut manager = ResourceManager::new();
        assert_eq!(manager.write_timestamp(Handle::null(), PipelineStageFlags::TOP_OF_PIPE), 0);
        assert!(manager.timestamp_query_results(Handle::null()).is_empty());
        manager.delete_timestamp_query_recorder(Handle::null());
    }
}
