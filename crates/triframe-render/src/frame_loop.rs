// SPDX-License-Identifier: CEPL-1.0
//! One render/present iteration per call, plus resize and teardown.
//!
//! ```text
//! Idle -> Recording -> Submitted -> Presented -> Idle
//!   \________________ shutdown: wait idle ________________-> ShutDown
//! ```

use std::time::Duration;

use raw_window_handle::RawWindowHandle;
use tracing::{debug, info, warn};

use crate::backend::{AdapterInfo, Api, CommandList, Device, ImageState, Queue, QueueKind};
use crate::device::GpuContext;
use crate::fence::{FenceSync, WaitStatus};
use crate::frame::FrameSlots;
use crate::swapchain::SwapChainManager;
use crate::{RenderResult, RenderSize, Renderer};

#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
    pub prefer_software: bool,
    pub vsync: bool,
    /// Validation layers, break-on-severity and frame slot checks.
    pub diagnostics: bool,
    pub clear_color: [f32; 4],
    /// Upper bound on the per-frame slot wait. `None` waits forever.
    pub frame_timeout: Option<Duration>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            prefer_software: false,
            vsync: true,
            diagnostics: cfg!(debug_assertions),
            clear_color: [0.4, 0.6, 0.9, 1.0],
            frame_timeout: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
    Presented,
    ShutDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, fence_value: u64 },
    /// The slot's previous work did not retire within the frame timeout.
    Skipped { slot: usize },
    /// The loop was shut down.
    Halted,
}

/// Owns every GPU object; fields drop in reverse creation order.
pub struct FrameLoop<A: Api> {
    fence: FenceSync<A>,
    command_list: A::CommandList,
    slots: FrameSlots<A>,
    swap_chain: SwapChainManager<A>,
    gpu: GpuContext<A>,
    options: RenderOptions,
    state: FrameState,
}

impl<A: Api> FrameLoop<A> {
    pub fn new(
        instance: &A::Instance,
        window: RawWindowHandle,
        size: RenderSize,
        options: RenderOptions,
    ) -> RenderResult<Self> {
        let gpu = GpuContext::<A>::new(instance, options.prefer_software, options.diagnostics)?;
        let swap_chain = SwapChainManager::create(
            instance,
            gpu.device(),
            gpu.queue(),
            window,
            size,
            options.vsync,
        )?;
        let slots = FrameSlots::new(gpu.device(), swap_chain.back_buffers(gpu.device())?)?;

        let current = swap_chain.current_image_index() as usize;
        let command_list = gpu
            .device()
            .create_command_list(QueueKind::Direct, slots.get(current)?.allocator())?;
        let fence = FenceSync::new(gpu.device())?;

        info!("frame loop ready");
        Ok(Self {
            fence,
            command_list,
            slots,
            swap_chain,
            gpu,
            options,
            state: FrameState::Idle,
        })
    }

    pub fn render_frame(&mut self) -> RenderResult<FrameOutcome> {
        if self.state == FrameState::ShutDown {
            return Ok(FrameOutcome::Halted);
        }

        let slot = self.swap_chain.current_image_index() as usize;
        let required = self.slots.fence_value(slot)?;
        if self.fence.wait(required, self.options.frame_timeout)? == WaitStatus::TimedOut {
            warn!(slot, required, "frame slot still in flight, skipping frame");
            return Ok(FrameOutcome::Skipped { slot });
        }

        self.state = FrameState::Recording;
        let outcome = self.record_and_submit(slot);
        if outcome.is_err() {
            self.state = FrameState::Idle;
        }
        outcome
    }

    fn record_and_submit(&mut self, slot: usize) -> RenderResult<FrameOutcome> {
        if self.options.diagnostics {
            let completed = self.fence.completed_value();
            self.slots
                .prepare_checked(slot, &mut self.command_list, completed)?;
        } else {
            self.slots.prepare(slot, &mut self.command_list)?;
        }

        let image = match self.slots.back_buffer(slot) {
            Ok(image) => image,
            Err(e) => {
                // The list is open; close it so the next prepare can reset it.
                if let Err(close) = self.command_list.close() {
                    warn!("closing abandoned command list failed: {close}");
                }
                return Err(e);
            }
        };
        let list = &mut self.command_list;
        list.transition(image, ImageState::Present, ImageState::RenderTarget);
        list.clear_render_target(
            self.swap_chain.descriptor_table(),
            slot as u32,
            self.options.clear_color,
        );
        list.transition(image, ImageState::RenderTarget, ImageState::Present);
        list.close()?;

        self.gpu.queue().execute(&self.command_list)?;
        self.state = FrameState::Submitted;

        self.swap_chain.present()?;
        self.state = FrameState::Presented;

        let fence_value = self.fence.signal(self.gpu.queue())?;
        self.slots.record_fence(slot, fence_value)?;
        self.state = FrameState::Idle;

        Ok(FrameOutcome::Presented { slot, fence_value })
    }

    /// Zero-area sizes are ignored; the window is minimized.
    pub fn resize(&mut self, size: RenderSize) -> RenderResult<()> {
        if self.state == FrameState::ShutDown {
            return Ok(());
        }
        if size.is_empty() {
            debug!("ignoring resize to {}x{}", size.width, size.height);
            return Ok(());
        }
        self.swap_chain.resize(
            self.gpu.device(),
            self.gpu.queue(),
            &mut self.fence,
            &mut self.slots,
            size,
        )
    }

    pub fn toggle_vsync(&mut self) -> bool {
        self.swap_chain.toggle_vsync()
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.options.clear_color = rgba;
    }

    /// Drains the GPU. Safe to call more than once.
    pub fn shutdown(&mut self) -> RenderResult<()> {
        if self.state == FrameState::ShutDown {
            return Ok(());
        }
        let idle = self.fence.wait_idle(self.gpu.queue())?;
        self.state = FrameState::ShutDown;
        info!(idle, "gpu idle, frame loop shut down");
        Ok(())
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn current_slot(&self) -> usize {
        self.swap_chain.current_image_index() as usize
    }

    pub fn size(&self) -> RenderSize {
        self.swap_chain.size()
    }

    pub fn vsync(&self) -> bool {
        self.swap_chain.vsync()
    }

    pub fn tearing_supported(&self) -> bool {
        self.swap_chain.tearing_supported()
    }

    pub fn adapter(&self) -> &AdapterInfo {
        self.gpu.adapter()
    }

    pub fn slots(&self) -> &FrameSlots<A> {
        &self.slots
    }

    pub fn fence(&self) -> &FenceSync<A> {
        &self.fence
    }

    pub fn swap_chain(&self) -> &SwapChainManager<A> {
        &self.swap_chain
    }
}

impl<A: Api> Renderer for FrameLoop<A> {
    fn resize(&mut self, size: RenderSize) -> RenderResult<()> {
        FrameLoop::resize(self, size)
    }

    fn render(&mut self) -> RenderResult<FrameOutcome> {
        self.render_frame()
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        FrameLoop::set_clear_color(self, rgba)
    }

    fn toggle_vsync(&mut self) -> bool {
        FrameLoop::toggle_vsync(self)
    }

    fn shutdown(&mut self) -> RenderResult<()> {
        FrameLoop::shutdown(self)
    }
}

impl<A: Api> Drop for FrameLoop<A> {
    fn drop(&mut self) {
        if self.state != FrameState::ShutDown {
            if let Err(e) = self.fence.wait_idle(self.gpu.queue()) {
                warn!("idle wait during teardown failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::headless::{window_handle, Headless, SimConfig, SimInstance};

    #[test]
    fn detached_back_buffer_leaves_loop_ready_for_next_frame() {
        let instance = SimInstance::new(SimConfig::default());
        let gpu = instance.gpu();
        let options = RenderOptions {
            diagnostics: true,
            ..RenderOptions::default()
        };
        let mut frame_loop =
            FrameLoop::<Headless>::new(&instance, window_handle(), RenderSize::new(640, 480), options)
                .unwrap();

        frame_loop.slots.release_back_buffers();
        let err = frame_loop.render_frame().unwrap_err();
        assert!(matches!(err, RenderError::BackBufferDetached { .. }));
        assert!(!err.is_fatal());
        assert_eq!(frame_loop.state(), FrameState::Idle);
        assert!(!frame_loop.command_list.is_open());

        let buffers = frame_loop
            .swap_chain
            .back_buffers(frame_loop.gpu.device())
            .unwrap();
        frame_loop.slots.attach_back_buffers(buffers).unwrap();
        assert!(matches!(
            frame_loop.render_frame().unwrap(),
            FrameOutcome::Presented { .. }
        ));
        assert_eq!(frame_loop.state(), FrameState::Idle);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }
}
