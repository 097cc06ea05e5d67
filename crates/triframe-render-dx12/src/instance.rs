// SPDX-License-Identifier: CEPL-1.0
use std::ffi::c_void;

use raw_window_handle::RawWindowHandle;
use tracing::{info, warn};
use triframe_render::backend::{
    Adapter, AdapterInfo, AdapterPreference, Instance, SwapChainDesc,
};
use triframe_render::{BackendFailure, RenderError, RenderResult, Resource};
use windows::core::Interface;
use windows::Win32::Foundation::{BOOL, HWND};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_12_0;
use windows::Win32::Graphics::Direct3D12::{
    D3D12CreateDevice, D3D12GetDebugInterface, ID3D12Debug, ID3D12Debug1, ID3D12Device,
    ID3D12InfoQueue, D3D12_MESSAGE_SEVERITY_CORRUPTION, D3D12_MESSAGE_SEVERITY_ERROR,
    D3D12_MESSAGE_SEVERITY_WARNING,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory2, IDXGIAdapter4, IDXGIFactory5, IDXGIFactory6, IDXGIOutput,
    DXGI_ADAPTER_FLAG3_SOFTWARE, DXGI_CREATE_FACTORY_DEBUG, DXGI_CREATE_FACTORY_FLAGS,
    DXGI_FEATURE_PRESENT_ALLOW_TEARING, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
    DXGI_MWA_NO_ALT_ENTER,
};

use crate::device::{Dx12Device, Dx12Queue};
use crate::status::StatusExt;
use crate::swapchain::{self, Dx12SwapChain};

/// The DXGI factory. Created with the debug flag, and after the debug layer
/// is enabled, when diagnostics are on.
pub struct Dx12Instance {
    factory: IDXGIFactory6,
}

impl Dx12Instance {
    pub fn new(diagnostics: bool) -> RenderResult<Self> {
        let flags = if diagnostics {
            enable_debug_layer();
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };
        let factory = unsafe { CreateDXGIFactory2::<IDXGIFactory6>(flags) }
            .or_render(RenderError::AdapterUnavailable, "CreateDXGIFactory2")?;
        Ok(Self { factory })
    }
}

fn enable_debug_layer() {
    let mut debug: Option<ID3D12Debug> = None;
    if let Err(e) = unsafe { D3D12GetDebugInterface(&mut debug) } {
        warn!("debug layer unavailable: {}", e.message());
        return;
    }
    let Some(debug) = debug else { return };
    unsafe { debug.EnableDebugLayer() };

    match debug.cast::<ID3D12Debug1>() {
        Ok(debug1) => unsafe { debug1.SetEnableGPUBasedValidation(true) },
        Err(e) => warn!("gpu-based validation unavailable: {}", e.message()),
    }
    info!("d3d12 debug layer enabled");
}

fn hwnd(window: RawWindowHandle) -> RenderResult<HWND> {
    match window {
        RawWindowHandle::Win32(h) => Ok(HWND(h.hwnd.get() as *mut c_void)),
        other => Err(RenderError::resource(
            Resource::SwapChain,
            BackendFailure::new(format!("not a Win32 window: {other:?}")),
        )),
    }
}

fn utf16_name(raw: &[u16]) -> String {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..len]).trim().to_owned()
}

impl Instance<crate::Dx12> for Dx12Instance {
    fn enumerate_adapter(&self, preference: AdapterPreference) -> RenderResult<Dx12Adapter> {
        let adapter = match preference {
            AdapterPreference::Software => unsafe {
                self.factory.EnumWarpAdapter::<IDXGIAdapter4>()
            }
            .or_render(RenderError::AdapterUnavailable, "EnumWarpAdapter")?,
            AdapterPreference::HighPerformance => unsafe {
                self.factory.EnumAdapterByGpuPreference::<IDXGIAdapter4>(
                    0,
                    DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
                )
            }
            .or_render(RenderError::AdapterUnavailable, "EnumAdapterByGpuPreference")?,
        };

        let desc = unsafe { adapter.GetDesc3() }
            .or_render(RenderError::AdapterUnavailable, "GetDesc3")?;
        let info = AdapterInfo {
            name: utf16_name(&desc.Description),
            software: desc.Flags.0 & DXGI_ADAPTER_FLAG3_SOFTWARE.0 != 0,
            dedicated_video_memory: desc.DedicatedVideoMemory as u64,
        };
        Ok(Dx12Adapter { adapter, info })
    }

    fn tearing_supported(&self) -> bool {
        let Ok(factory5) = self.factory.cast::<IDXGIFactory5>() else {
            return false;
        };
        let mut allow = BOOL::default();
        let probed = unsafe {
            factory5.CheckFeatureSupport(
                DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                &mut allow as *mut BOOL as *mut c_void,
                std::mem::size_of::<BOOL>() as u32,
            )
        };
        probed.is_ok() && allow.as_bool()
    }

    fn create_swap_chain(
        &self,
        queue: &Dx12Queue,
        window: RawWindowHandle,
        desc: &SwapChainDesc,
    ) -> RenderResult<Dx12SwapChain> {
        let hwnd = hwnd(window)?;
        let raw_desc = swapchain::raw_desc(desc);
        let swap_chain = unsafe {
            self.factory.CreateSwapChainForHwnd(
                queue.raw(),
                hwnd,
                &raw_desc,
                None,
                None::<&IDXGIOutput>,
            )
        }
        .or_resource(Resource::SwapChain, "CreateSwapChainForHwnd")?;

        // Fullscreen is handled by the window, not by DXGI's Alt+Enter.
        if let Err(e) = unsafe { self.factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) } {
            warn!("MakeWindowAssociation failed: {}", e.message());
        }

        Dx12SwapChain::new(swap_chain)
    }
}

pub struct Dx12Adapter {
    adapter: IDXGIAdapter4,
    info: AdapterInfo,
}

impl Adapter<crate::Dx12> for Dx12Adapter {
    fn info(&self) -> &AdapterInfo {
        &self.info
    }

    fn probe(&self) -> RenderResult<()> {
        unsafe {
            D3D12CreateDevice(
                &self.adapter,
                D3D_FEATURE_LEVEL_12_0,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .or_render(RenderError::AdapterUnavailable, "D3D12CreateDevice (probe)")
    }

    fn create_device(&self, diagnostics: bool) -> RenderResult<Dx12Device> {
        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&self.adapter, D3D_FEATURE_LEVEL_12_0, &mut device) }
            .or_render(RenderError::DeviceCreationFailed, "D3D12CreateDevice")?;
        let device = device.ok_or_else(|| {
            RenderError::DeviceCreationFailed(BackendFailure::new(
                "D3D12CreateDevice returned no device",
            ))
        })?;

        if diagnostics {
            let queue = device
                .cast::<ID3D12InfoQueue>()
                .or_render(RenderError::DeviceCreationFailed, "ID3D12InfoQueue")?;
            for severity in [
                D3D12_MESSAGE_SEVERITY_CORRUPTION,
                D3D12_MESSAGE_SEVERITY_ERROR,
                D3D12_MESSAGE_SEVERITY_WARNING,
            ] {
                unsafe { queue.SetBreakOnSeverity(severity, true) }
                    .or_render(RenderError::DeviceCreationFailed, "SetBreakOnSeverity")?;
            }
        }

        Ok(Dx12Device::new(device))
    }
}
