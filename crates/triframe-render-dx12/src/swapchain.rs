// SPDX-License-Identifier: CEPL-1.0
use triframe_render::backend::{ImageFormat, PresentFlags, SwapChain, SwapChainDesc, SwapChainFlags};
use triframe_render::{RenderError, RenderResult, Resource};
use windows::core::Interface;
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12DescriptorHeap, ID3D12Resource, D3D12_CPU_DESCRIPTOR_HANDLE,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_ALPHA_MODE_UNSPECIFIED, DXGI_FORMAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGISwapChain1, IDXGISwapChain4, DXGI_PRESENT, DXGI_PRESENT_ALLOW_TEARING, DXGI_SCALING_STRETCH,
    DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_CHAIN_FLAG, DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING,
    DXGI_SWAP_EFFECT_FLIP_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use crate::status::StatusExt;
use crate::Dx12;

fn format(format: ImageFormat) -> DXGI_FORMAT {
    match format {
        ImageFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
    }
}

pub(crate) fn raw_desc(desc: &SwapChainDesc) -> DXGI_SWAP_CHAIN_DESC1 {
    let flags = if desc.flags.contains(SwapChainFlags::ALLOW_TEARING) {
        DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32
    } else {
        0
    };
    DXGI_SWAP_CHAIN_DESC1 {
        Width: desc.width,
        Height: desc.height,
        Format: format(desc.format),
        Stereo: BOOL::from(desc.stereo),
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: desc.sample_count,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: desc.buffer_count,
        Scaling: DXGI_SCALING_STRETCH,
        SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
        AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
        Flags: flags,
    }
}

pub struct Dx12SwapChain {
    swap_chain: IDXGISwapChain4,
}

impl Dx12SwapChain {
    pub(crate) fn new(swap_chain: IDXGISwapChain1) -> RenderResult<Self> {
        let swap_chain = swap_chain
            .cast::<IDXGISwapChain4>()
            .or_resource(Resource::SwapChain, "IDXGISwapChain4")?;
        Ok(Self { swap_chain })
    }

    pub fn raw(&self) -> &IDXGISwapChain4 {
        &self.swap_chain
    }
}

impl SwapChain<Dx12> for Dx12SwapChain {
    fn current_image_index(&self) -> u32 {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() }
    }

    fn image(&self, index: u32) -> RenderResult<ID3D12Resource> {
        unsafe { self.swap_chain.GetBuffer::<ID3D12Resource>(index) }
            .or_resource(Resource::BackBuffer, "IDXGISwapChain::GetBuffer")
    }

    fn resize_buffers(&mut self, buffer_count: u32, width: u32, height: u32) -> RenderResult<()> {
        let desc = unsafe { self.swap_chain.GetDesc() }
            .or_resource(Resource::SwapChain, "IDXGISwapChain::GetDesc")?;
        unsafe {
            self.swap_chain.ResizeBuffers(
                buffer_count,
                width,
                height,
                desc.BufferDesc.Format,
                DXGI_SWAP_CHAIN_FLAG(desc.Flags as i32),
            )
        }
        .or_resource(Resource::BackBuffer, "IDXGISwapChain::ResizeBuffers")
    }

    fn present(&mut self, sync_interval: u32, flags: PresentFlags) -> RenderResult<()> {
        let raw_flags = if flags.contains(PresentFlags::ALLOW_TEARING) {
            DXGI_PRESENT_ALLOW_TEARING
        } else {
            DXGI_PRESENT(0)
        };
        unsafe { self.swap_chain.Present(sync_interval, raw_flags) }
            .ok()
            .or_render(RenderError::PresentFailed, "IDXGISwapChain::Present")
    }
}

/// Non shader-visible RTV heap.
pub struct Dx12DescriptorTable {
    heap: ID3D12DescriptorHeap,
    start: D3D12_CPU_DESCRIPTOR_HANDLE,
    increment: u32,
    capacity: u32,
}

impl Dx12DescriptorTable {
    pub(crate) fn new(heap: ID3D12DescriptorHeap, increment: u32, capacity: u32) -> Self {
        let start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };
        Self {
            heap,
            start,
            increment,
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn handle(&self, index: u32) -> Option<D3D12_CPU_DESCRIPTOR_HANDLE> {
        (index < self.capacity).then(|| D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.start.ptr + (index as usize) * (self.increment as usize),
        })
    }

    pub fn raw(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }
}
