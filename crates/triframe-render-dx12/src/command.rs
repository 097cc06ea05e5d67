// SPDX-License-Identifier: CEPL-1.0
use triframe_render::backend::{CommandAllocator, CommandList, ImageState};
use triframe_render::{RenderError, RenderResult};
use windows::Win32::Graphics::Direct3D12::{
    ID3D12CommandAllocator, ID3D12GraphicsCommandList, ID3D12PipelineState, ID3D12Resource,
    D3D12_RESOURCE_BARRIER, D3D12_RESOURCE_BARRIER_0, D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
    D3D12_RESOURCE_BARRIER_FLAG_NONE, D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
    D3D12_RESOURCE_STATES, D3D12_RESOURCE_STATE_PRESENT, D3D12_RESOURCE_STATE_RENDER_TARGET,
    D3D12_RESOURCE_TRANSITION_BARRIER,
};

use crate::status::StatusExt;
use crate::swapchain::Dx12DescriptorTable;
use crate::Dx12;

pub struct Dx12CommandAllocator {
    allocator: ID3D12CommandAllocator,
}

impl Dx12CommandAllocator {
    pub(crate) fn new(allocator: ID3D12CommandAllocator) -> Self {
        Self { allocator }
    }

    pub fn raw(&self) -> &ID3D12CommandAllocator {
        &self.allocator
    }
}

impl CommandAllocator for Dx12CommandAllocator {
    fn reset(&self) -> RenderResult<()> {
        unsafe { self.allocator.Reset() }
            .or_render(RenderError::Command, "ID3D12CommandAllocator::Reset")
    }
}

pub struct Dx12CommandList {
    list: ID3D12GraphicsCommandList,
}

impl Dx12CommandList {
    pub(crate) fn new(list: ID3D12GraphicsCommandList) -> Self {
        Self { list }
    }

    pub fn raw(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}

fn resource_state(state: ImageState) -> D3D12_RESOURCE_STATES {
    match state {
        ImageState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ImageState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
    }
}

/// Borrows `resource` without an AddRef; the barrier must not outlive it.
fn transition_barrier(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: std::mem::ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

impl CommandList<Dx12> for Dx12CommandList {
    fn reset(&mut self, allocator: &Dx12CommandAllocator) -> RenderResult<()> {
        unsafe { self.list.Reset(allocator.raw(), None::<&ID3D12PipelineState>) }
            .or_render(RenderError::Command, "ID3D12GraphicsCommandList::Reset")
    }

    fn transition(&mut self, image: &ID3D12Resource, before: ImageState, after: ImageState) {
        let barrier = transition_barrier(image, resource_state(before), resource_state(after));
        unsafe { self.list.ResourceBarrier(&[barrier]) };
    }

    fn clear_render_target(&mut self, table: &Dx12DescriptorTable, index: u32, rgba: [f32; 4]) {
        let Some(handle) = table.handle(index) else {
            tracing::error!(index, "clear of a descriptor outside the rtv heap");
            return;
        };
        unsafe { self.list.ClearRenderTargetView(handle, rgba.as_ptr(), None) };
    }

    fn close(&mut self) -> RenderResult<()> {
        unsafe { self.list.Close() }
            .or_render(RenderError::Command, "ID3D12GraphicsCommandList::Close")
    }
}
