// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Frame synchronization and swap chain lifecycle engine.
//!
//! The engine is written against the [`backend::Api`] seam. Direct3D 12 is the
//! production implementation (`triframe-render-dx12`); [`headless`] simulates
//! the GPU timeline so the synchronization rules can be exercised anywhere.

pub mod backend;
pub mod device;
pub mod error;
pub mod fence;
pub mod frame;
pub mod frame_loop;
pub mod headless;
pub mod swapchain;

pub use error::{BackendFailure, RenderError, RenderResult, Resource};
pub use frame::FRAME_COUNT;
pub use frame_loop::{FrameLoop, FrameOutcome, FrameState, RenderOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area surface (minimized window) cannot back a swap chain.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What the application drives once per redraw / resize / key press.
pub trait Renderer {
    fn resize(&mut self, size: RenderSize) -> RenderResult<()>;
    /// Only [`FrameOutcome::Presented`] reached the screen.
    fn render(&mut self) -> RenderResult<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    /// Returns the new vsync setting; applies from the next present.
    fn toggle_vsync(&mut self) -> bool;
    fn shutdown(&mut self) -> RenderResult<()>;
}
