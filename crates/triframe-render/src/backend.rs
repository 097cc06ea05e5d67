// SPDX-License-Identifier: CEPL-1.0
//! The calls the frame engine makes into the graphics API.
//!
//! Every type here maps one-to-one onto a Direct3D 12 / DXGI object. Handles
//! are used from a single thread only; nothing here is `Sync`.

use std::time::Duration;

use bitflags::bitflags;
use raw_window_handle::RawWindowHandle;

use crate::RenderResult;

pub trait Api: Sized + 'static {
    type Instance: Instance<Self>;
    type Adapter: Adapter<Self>;
    type Device: Device<Self>;
    type Queue: Queue<Self>;
    type Fence: Fence;
    type CommandAllocator: CommandAllocator;
    type CommandList: CommandList<Self>;
    type SwapChain: SwapChain<Self>;
    type Image;
    type DescriptorTable;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub software: bool,
    pub dedicated_video_memory: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterPreference {
    /// The software rasterizer (WARP).
    Software,
    HighPerformance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Direct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuePriority {
    Normal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueDesc {
    pub kind: QueueKind,
    pub priority: QueuePriority,
    pub node_mask: u32,
}

impl QueueDesc {
    /// Normal priority, no flags, node 0.
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            priority: QueuePriority::Normal,
            node_mask: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Rgba8Unorm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageState {
    Present,
    RenderTarget,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SwapChainFlags: u32 {
        const ALLOW_TEARING = 1 << 0;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PresentFlags: u32 {
        const ALLOW_TEARING = 1 << 0;
    }
}

/// Flip-model swap chain description; scaling is always stretch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub buffer_count: u32,
    pub sample_count: u32,
    pub stereo: bool,
    pub flags: SwapChainFlags,
}

pub trait Instance<A: Api> {
    fn enumerate_adapter(&self, preference: AdapterPreference) -> RenderResult<A::Adapter>;

    /// Feature probe; a failed probe reads as "not supported".
    fn tearing_supported(&self) -> bool;

    fn create_swap_chain(
        &self,
        queue: &A::Queue,
        window: RawWindowHandle,
        desc: &SwapChainDesc,
    ) -> RenderResult<A::SwapChain>;
}

pub trait Adapter<A: Api> {
    fn info(&self) -> &AdapterInfo;

    /// Checks a device can be created on this adapter without creating one.
    fn probe(&self) -> RenderResult<()>;

    fn create_device(&self, diagnostics: bool) -> RenderResult<A::Device>;
}

pub trait Device<A: Api> {
    fn create_queue(&self, desc: &QueueDesc) -> RenderResult<A::Queue>;

    /// The fence owns the OS event used to block on it.
    fn create_fence(&self, initial_value: u64) -> RenderResult<A::Fence>;

    fn create_command_allocator(&self, kind: QueueKind) -> RenderResult<A::CommandAllocator>;

    /// Returned closed, ready to be reset against any allocator.
    fn create_command_list(
        &self,
        kind: QueueKind,
        allocator: &A::CommandAllocator,
    ) -> RenderResult<A::CommandList>;

    fn create_descriptor_table(&self, capacity: u32) -> RenderResult<A::DescriptorTable>;

    fn create_render_target_view(
        &self,
        image: &A::Image,
        table: &A::DescriptorTable,
        index: u32,
    ) -> RenderResult<()>;
}

pub trait Queue<A: Api> {
    /// Marks `value` complete on `fence` once all earlier work has finished.
    fn signal(&self, fence: &A::Fence, value: u64) -> RenderResult<()>;

    fn execute(&self, list: &A::CommandList) -> RenderResult<()>;
}

pub trait Fence {
    fn completed_value(&self) -> u64;

    /// Arms the wait event for `value` and blocks. `None` waits forever.
    /// Returns whether the value was reached.
    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> RenderResult<bool>;
}

pub trait CommandAllocator {
    fn reset(&self) -> RenderResult<()>;
}

pub trait CommandList<A: Api> {
    fn reset(&mut self, allocator: &A::CommandAllocator) -> RenderResult<()>;
    fn transition(&mut self, image: &A::Image, before: ImageState, after: ImageState);
    fn clear_render_target(&mut self, table: &A::DescriptorTable, index: u32, rgba: [f32; 4]);
    fn close(&mut self) -> RenderResult<()>;
}

pub trait SwapChain<A: Api> {
    /// Advanced by the presentation engine on every present.
    fn current_image_index(&self) -> u32;

    /// A new reference to buffer `index`. Every reference must be dropped
    /// before [`SwapChain::resize_buffers`].
    fn image(&self, index: u32) -> RenderResult<A::Image>;

    /// Recreates every buffer at the new size, keeping format and flags.
    fn resize_buffers(&mut self, buffer_count: u32, width: u32, height: u32) -> RenderResult<()>;

    fn present(&mut self, sync_interval: u32, flags: PresentFlags) -> RenderResult<()>;
}
