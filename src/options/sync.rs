// Fence and semaphore options

use crate::types::{ExternalFenceHandleType, ExternalSemaphoreHandleType};

#[derive(Debug, Clone, Default)]
pub struct FenceOptions {
    pub label: Option<String>,
    pub create_signalled: bool,
    pub external_fence_handle_type: Option<ExternalFenceHandleType>,
}

#[derive(Debug, Clone, Default)]
pub struct GpuSemaphoreOptions {
    pub label: Option<String>,
    pub external_semaphore_handle_type: Option<ExternalSemaphoreHandleType>,
}
