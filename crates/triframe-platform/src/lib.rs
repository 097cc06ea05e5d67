// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Window helpers over winit.

pub use winit;

use anyhow::{Context, Result};
use tracing::info;
use winit::dpi::PhysicalSize;
use winit::raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::{Fullscreen, Window, WindowAttributes};

/// Client area of `width` x `height` physical pixels.
pub fn window_attributes(title: &str, width: u32, height: u32) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(width, height))
}

/// The raw handle, for handing to a graphics backend.
pub fn raw_window_handle(window: &Window) -> Result<RawWindowHandle> {
    let handle = window.window_handle().context("window handle unavailable")?;
    Ok(handle.as_raw())
}

/// Client area in physical pixels.
pub fn client_size(window: &Window) -> PhysicalSize<u32> {
    window.inner_size()
}

/// Switches between windowed and borderless fullscreen on the current
/// monitor. Returns whether the window is now fullscreen.
pub fn toggle_fullscreen(window: &Window) -> bool {
    let fullscreen = window.fullscreen().is_none();
    if fullscreen {
        window.set_fullscreen(Some(Fullscreen::Borderless(window.current_monitor())));
    } else {
        window.set_fullscreen(None);
    }
    info!(fullscreen, "fullscreen toggled");
    fullscreen
}
