// SPDX-License-Identifier: CEPL-1.0
#![cfg(windows)]
#![deny(unsafe_op_in_unsafe_fn)]
//! Direct3D 12 / DXGI implementation of [`triframe_render::backend::Api`].

mod command;
mod device;
mod instance;
mod status;
mod swapchain;
mod sync;

use triframe_render::backend::Api;
use windows::Win32::Graphics::Direct3D12::ID3D12Resource;

pub use command::{Dx12CommandAllocator, Dx12CommandList};
pub use device::{Dx12Device, Dx12Queue};
pub use instance::{Dx12Adapter, Dx12Instance};
pub use swapchain::{Dx12DescriptorTable, Dx12SwapChain};
pub use sync::Dx12Fence;

pub struct Dx12;

impl Api for Dx12 {
    type Instance = Dx12Instance;
    type Adapter = Dx12Adapter;
    type Device = Dx12Device;
    type Queue = Dx12Queue;
    type Fence = Dx12Fence;
    type CommandAllocator = Dx12CommandAllocator;
    type CommandList = Dx12CommandList;
    type SwapChain = Dx12SwapChain;
    type Image = ID3D12Resource;
    type DescriptorTable = Dx12DescriptorTable;
}
