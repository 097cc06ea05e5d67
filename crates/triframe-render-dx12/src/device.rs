// SPDX-License-Identifier: CEPL-1.0
use triframe_render::backend::{Device, Queue, QueueDesc, QueueKind, QueuePriority};
use triframe_render::{BackendFailure, RenderError, RenderResult, Resource};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12CommandAllocator, ID3D12CommandList, ID3D12CommandQueue, ID3D12DescriptorHeap,
    ID3D12Device, ID3D12Fence, ID3D12GraphicsCommandList, ID3D12PipelineState, ID3D12Resource,
    D3D12_COMMAND_LIST_TYPE, D3D12_COMMAND_LIST_TYPE_DIRECT, D3D12_COMMAND_QUEUE_DESC,
    D3D12_COMMAND_QUEUE_FLAG_NONE, D3D12_COMMAND_QUEUE_PRIORITY_NORMAL,
    D3D12_DESCRIPTOR_HEAP_DESC, D3D12_DESCRIPTOR_HEAP_FLAG_NONE, D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
    D3D12_FENCE_FLAG_NONE,
};

use crate::command::{Dx12CommandAllocator, Dx12CommandList};
use crate::status::StatusExt;
use crate::swapchain::Dx12DescriptorTable;
use crate::sync::Dx12Fence;
use crate::Dx12;

pub(crate) fn list_type(kind: QueueKind) -> D3D12_COMMAND_LIST_TYPE {
    match kind {
        QueueKind::Direct => D3D12_COMMAND_LIST_TYPE_DIRECT,
    }
}

pub struct Dx12Device {
    device: ID3D12Device,
}

impl Dx12Device {
    pub(crate) fn new(device: ID3D12Device) -> Self {
        Self { device }
    }

    pub fn raw(&self) -> &ID3D12Device {
        &self.device
    }
}

impl Device<Dx12> for Dx12Device {
    fn create_queue(&self, desc: &QueueDesc) -> RenderResult<Dx12Queue> {
        let priority = match desc.priority {
            QueuePriority::Normal => D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
        };
        let raw = D3D12_COMMAND_QUEUE_DESC {
            Type: list_type(desc.kind),
            Priority: priority,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: desc.node_mask,
        };
        let queue = unsafe { self.device.CreateCommandQueue::<ID3D12CommandQueue>(&raw) }
            .or_resource(Resource::Queue, "CreateCommandQueue")?;
        Ok(Dx12Queue { queue })
    }

    fn create_fence(&self, initial_value: u64) -> RenderResult<Dx12Fence> {
        let fence =
            unsafe { self.device.CreateFence::<ID3D12Fence>(initial_value, D3D12_FENCE_FLAG_NONE) }
                .or_resource(Resource::Fence, "CreateFence")?;
        Dx12Fence::new(fence)
    }

    fn create_command_allocator(&self, kind: QueueKind) -> RenderResult<Dx12CommandAllocator> {
        let allocator = unsafe {
            self.device
                .CreateCommandAllocator::<ID3D12CommandAllocator>(list_type(kind))
        }
        .or_resource(Resource::CommandAllocator, "CreateCommandAllocator")?;
        Ok(Dx12CommandAllocator::new(allocator))
    }

    fn create_command_list(
        &self,
        kind: QueueKind,
        allocator: &Dx12CommandAllocator,
    ) -> RenderResult<Dx12CommandList> {
        let list = unsafe {
            self.device.CreateCommandList::<_, _, ID3D12GraphicsCommandList>(
                0,
                list_type(kind),
                allocator.raw(),
                None::<&ID3D12PipelineState>,
            )
        }
        .or_resource(Resource::CommandList, "CreateCommandList")?;
        // Lists are created open; the frame loop expects a closed one.
        unsafe { list.Close() }.or_resource(Resource::CommandList, "Close")?;
        Ok(Dx12CommandList::new(list))
    }

    fn create_descriptor_table(&self, capacity: u32) -> RenderResult<Dx12DescriptorTable> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
            NumDescriptors: capacity,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        };
        let heap = unsafe { self.device.CreateDescriptorHeap::<ID3D12DescriptorHeap>(&desc) }
            .or_resource(Resource::DescriptorTable, "CreateDescriptorHeap")?;
        let increment =
            unsafe { self.device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) };
        Ok(Dx12DescriptorTable::new(heap, increment, capacity))
    }

    fn create_render_target_view(
        &self,
        image: &ID3D12Resource,
        table: &Dx12DescriptorTable,
        index: u32,
    ) -> RenderResult<()> {
        let handle = table.handle(index).ok_or_else(|| {
            RenderError::resource(
                Resource::RenderTargetView,
                BackendFailure::new(format!(
                    "descriptor {index} out of {}",
                    table.capacity()
                )),
            )
        })?;
        unsafe { self.device.CreateRenderTargetView(image, None, handle) };
        Ok(())
    }
}

pub struct Dx12Queue {
    queue: ID3D12CommandQueue,
}

impl Dx12Queue {
    pub fn raw(&self) -> &ID3D12CommandQueue {
        &self.queue
    }
}

impl Queue<Dx12> for Dx12Queue {
    fn signal(&self, fence: &Dx12Fence, value: u64) -> RenderResult<()> {
        unsafe { self.queue.Signal(fence.raw(), value) }
            .or_render(RenderError::FenceWait, "ID3D12CommandQueue::Signal")
    }

    fn execute(&self, list: &Dx12CommandList) -> RenderResult<()> {
        let list = list
            .raw()
            .cast::<ID3D12CommandList>()
            .or_render(RenderError::Command, "ID3D12CommandList")?;
        unsafe { self.queue.ExecuteCommandLists(&[Some(list)]) };
        Ok(())
    }
}
