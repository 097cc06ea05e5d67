// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use triframe_platform::winit::window::Window;
use triframe_render::{RenderOptions, RenderSize, Renderer};

#[cfg(windows)]
pub fn create(window: &Window, size: RenderSize, options: RenderOptions) -> Result<Box<dyn Renderer>> {
    use anyhow::Context;
    use triframe_render::FrameLoop;
    use triframe_render_dx12::{Dx12, Dx12Instance};

    let handle = triframe_platform::raw_window_handle(window)?;
    let instance = Dx12Instance::new(options.diagnostics).context("DXGI factory")?;
    let frame_loop = FrameLoop::<Dx12>::new(&instance, handle, size, options)
        .context("Direct3D 12 initialization")?;
    Ok(Box::new(frame_loop))
}

#[cfg(not(windows))]
pub fn create(window: &Window, size: RenderSize, options: RenderOptions) -> Result<Box<dyn Renderer>> {
    let _ = (window, size, options);
    anyhow::bail!("the Direct3D 12 renderer is only available on Windows")
}
