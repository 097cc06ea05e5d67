// SPDX-License-Identifier: CEPL-1.0
//! Presentation surface: creation, resize and the vsync/tearing policy.

use raw_window_handle::RawWindowHandle;
use tracing::{debug, info};

use crate::backend::{
    Api, Device, ImageFormat, Instance, PresentFlags, SwapChain, SwapChainDesc, SwapChainFlags,
};
use crate::fence::FenceSync;
use crate::frame::{FrameSlots, FRAME_COUNT};
use crate::{RenderResult, RenderSize};

pub fn swap_chain_desc(size: RenderSize, tearing_supported: bool) -> SwapChainDesc {
    SwapChainDesc {
        width: size.width,
        height: size.height,
        format: ImageFormat::Rgba8Unorm,
        buffer_count: FRAME_COUNT as u32,
        sample_count: 1,
        stereo: false,
        flags: if tearing_supported {
            SwapChainFlags::ALLOW_TEARING
        } else {
            SwapChainFlags::empty()
        },
    }
}

/// Sync interval and present flags. Tearing only when vsync is off and the
/// platform supports it.
pub fn present_parameters(vsync: bool, tearing_supported: bool) -> (u32, PresentFlags) {
    let interval = if vsync { 1 } else { 0 };
    let flags = if tearing_supported && !vsync {
        PresentFlags::ALLOW_TEARING
    } else {
        PresentFlags::empty()
    };
    (interval, flags)
}

pub struct SwapChainManager<A: Api> {
    rtv_table: A::DescriptorTable,
    swap_chain: A::SwapChain,
    current_index: u32,
    size: RenderSize,
    vsync: bool,
    tearing_supported: bool,
}

impl<A: Api> SwapChainManager<A> {
    pub fn create(
        instance: &A::Instance,
        device: &A::Device,
        queue: &A::Queue,
        window: RawWindowHandle,
        size: RenderSize,
        vsync: bool,
    ) -> RenderResult<Self> {
        let tearing_supported = instance.tearing_supported();
        info!(tearing_supported, "tearing probe");

        let desc = swap_chain_desc(size, tearing_supported);
        let swap_chain = instance.create_swap_chain(queue, window, &desc)?;
        let rtv_table = device.create_descriptor_table(FRAME_COUNT as u32)?;
        let current_index = swap_chain.current_image_index();

        info!(
            "swap chain ready ({}x{}, {} buffers, current {})",
            size.width, size.height, FRAME_COUNT, current_index
        );

        Ok(Self {
            rtv_table,
            swap_chain,
            current_index,
            size,
            vsync,
            tearing_supported,
        })
    }

    /// Takes a reference to every buffer and (re)writes its render target view.
    pub fn back_buffers(&self, device: &A::Device) -> RenderResult<Vec<A::Image>> {
        let mut images = Vec::with_capacity(FRAME_COUNT);
        for index in 0..FRAME_COUNT as u32 {
            let image = self.swap_chain.image(index)?;
            device.create_render_target_view(&image, &self.rtv_table, index)?;
            images.push(image);
        }
        Ok(images)
    }

    /// Recreates the buffers at `size`.
    ///
    /// The GPU is drained first: the old buffers may still be referenced by
    /// queued work. Same-size resizes go through the full cycle.
    pub fn resize(
        &mut self,
        device: &A::Device,
        queue: &A::Queue,
        fence: &mut FenceSync<A>,
        slots: &mut FrameSlots<A>,
        size: RenderSize,
    ) -> RenderResult<()> {
        let idle = fence.wait_idle(queue)?;
        debug!(idle, "gpu idle before resize");

        slots.release_back_buffers();

        // Every slot waits for the newest frame, never an older slot's value.
        let newest = slots.max_fence_value();
        slots.retag_all(newest);

        self.swap_chain
            .resize_buffers(FRAME_COUNT as u32, size.width, size.height)?;
        self.current_index = self.swap_chain.current_image_index();
        slots.attach_back_buffers(self.back_buffers(device)?)?;
        self.size = size;

        info!(
            "swap chain resized ({}x{}, current {})",
            size.width, size.height, self.current_index
        );
        Ok(())
    }

    /// Presents the current buffer and picks up the index the presentation
    /// engine moved to.
    pub fn present(&mut self) -> RenderResult<()> {
        let (interval, flags) = present_parameters(self.vsync, self.tearing_supported);
        self.swap_chain.present(interval, flags)?;
        self.current_index = self.swap_chain.current_image_index();
        Ok(())
    }

    pub fn toggle_vsync(&mut self) -> bool {
        self.vsync = !self.vsync;
        info!(vsync = self.vsync, "vsync toggled");
        self.vsync
    }

    pub fn current_image_index(&self) -> u32 {
        self.current_index
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }

    pub fn descriptor_table(&self) -> &A::DescriptorTable {
        &self.rtv_table
    }

    pub fn raw(&self) -> &A::SwapChain {
        &self.swap_chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_parameters_follow_vsync_and_tearing() {
        assert_eq!(present_parameters(true, false), (1, PresentFlags::empty()));
        assert_eq!(present_parameters(true, true), (1, PresentFlags::empty()));
        assert_eq!(present_parameters(false, false), (0, PresentFlags::empty()));
        assert_eq!(
            present_parameters(false, true),
            (0, PresentFlags::ALLOW_TEARING)
        );
    }

    #[test]
    fn description_is_fixed_except_size_and_tearing() {
        let desc = swap_chain_desc(RenderSize::new(1280, 720), true);
        assert_eq!(desc.width, 1280);
        assert_eq!(desc.height, 720);
        assert_eq!(desc.buffer_count, 3);
        assert_eq!(desc.format, ImageFormat::Rgba8Unorm);
        assert_eq!(desc.sample_count, 1);
        assert!(!desc.stereo);
        assert_eq!(desc.flags, SwapChainFlags::ALLOW_TEARING);

        let desc = swap_chain_desc(RenderSize::new(8, 8), false);
        assert!(desc.flags.is_empty());
    }
}
