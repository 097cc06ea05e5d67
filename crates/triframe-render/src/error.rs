// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use thiserror::Error;

/// Underlying API failure, with the platform status code when there is one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendFailure {
    pub status: Option<i32>,
    pub message: String,
}

impl BackendFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: i32, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} (status 0x{:08X})", self.message, code as u32),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Queue,
    DescriptorTable,
    CommandAllocator,
    CommandList,
    Fence,
    WaitEvent,
    SwapChain,
    BackBuffer,
    RenderTargetView,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Queue => "command queue",
            Resource::DescriptorTable => "descriptor table",
            Resource::CommandAllocator => "command allocator",
            Resource::CommandList => "command list",
            Resource::Fence => "fence",
            Resource::WaitEvent => "fence wait event",
            Resource::SwapChain => "swap chain",
            Resource::BackBuffer => "back buffer",
            Resource::RenderTargetView => "render target view",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no usable adapter: {0}")]
    AdapterUnavailable(BackendFailure),

    #[error("device creation failed: {0}")]
    DeviceCreationFailed(BackendFailure),

    #[error("could not create {resource}: {cause}")]
    ResourceCreationFailed {
        resource: Resource,
        cause: BackendFailure,
    },

    #[error("present failed: {0}")]
    PresentFailed(BackendFailure),

    #[error("fence wait failed: {0}")]
    FenceWait(BackendFailure),

    #[error("command recording or submission failed: {0}")]
    Command(BackendFailure),

    #[error("frame slot {index} out of range ({count} slots)")]
    SlotOutOfRange { index: usize, count: usize },

    #[error("frame slot {index} still in flight (needs fence {required}, completed {completed})")]
    SlotInFlight {
        index: usize,
        required: u64,
        completed: u64,
    },

    #[error("frame slot {index} has no back buffer attached")]
    BackBufferDetached { index: usize },
}

impl RenderError {
    pub fn resource(resource: Resource, cause: BackendFailure) -> Self {
        RenderError::ResourceCreationFailed { resource, cause }
    }

    /// Initialization and present failures leave no safe way to continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RenderError::SlotOutOfRange { .. } | RenderError::BackBufferDetached { .. }
        )
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
