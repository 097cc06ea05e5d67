// SPDX-License-Identifier: CEPL-1.0
//! Per-slot resources for frames in flight.
//!
//! Slot `i` pairs with swap chain buffer `i`. A slot's allocator may only be
//! reset after the fence value recorded for it has completed; waiting for that
//! is the frame loop's job, not this type's.

use tracing::debug;

use crate::backend::{Api, CommandAllocator, CommandList, Device, QueueKind};
use crate::{BackendFailure, RenderError, RenderResult, Resource};

/// Swap chain buffers, and therefore frame slots.
pub const FRAME_COUNT: usize = 3;

pub struct FrameSlot<A: Api> {
    allocator: A::CommandAllocator,
    fence_value: u64,
    back_buffer: Option<A::Image>,
}

impl<A: Api> FrameSlot<A> {
    pub fn allocator(&self) -> &A::CommandAllocator {
        &self.allocator
    }

    /// Fence value that must complete before this slot is reused. 0 means
    /// nothing to wait on.
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub fn back_buffer(&self) -> Option<&A::Image> {
        self.back_buffer.as_ref()
    }
}

pub struct FrameSlots<A: Api> {
    slots: [FrameSlot<A>; FRAME_COUNT],
}

impl<A: Api> FrameSlots<A> {
    /// `back_buffers` must hold one image per slot, in buffer order.
    pub fn new(device: &A::Device, back_buffers: Vec<A::Image>) -> RenderResult<Self> {
        check_buffer_count(back_buffers.len())?;

        let mut slots = Vec::with_capacity(FRAME_COUNT);
        for image in back_buffers {
            slots.push(FrameSlot {
                allocator: device.create_command_allocator(QueueKind::Direct)?,
                fence_value: 0,
                back_buffer: Some(image),
            });
        }
        let slots: [FrameSlot<A>; FRAME_COUNT] =
            slots.try_into().map_err(|rest: Vec<FrameSlot<A>>| {
                RenderError::SlotOutOfRange {
                    index: rest.len(),
                    count: FRAME_COUNT,
                }
            })?;

        debug!(count = FRAME_COUNT, "frame slots created");
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> RenderResult<&FrameSlot<A>> {
        self.slots.get(index).ok_or(RenderError::SlotOutOfRange {
            index,
            count: FRAME_COUNT,
        })
    }

    fn get_mut(&mut self, index: usize) -> RenderResult<&mut FrameSlot<A>> {
        self.slots.get_mut(index).ok_or(RenderError::SlotOutOfRange {
            index,
            count: FRAME_COUNT,
        })
    }

    /// Resets the slot's allocator and reopens `list` on it.
    ///
    /// The caller must already have waited for the slot's fence value.
    pub fn prepare(&self, index: usize, list: &mut A::CommandList) -> RenderResult<()> {
        let slot = self.get(index)?;
        slot.allocator.reset()?;
        list.reset(&slot.allocator)
    }

    /// [`FrameSlots::prepare`], refusing when the slot is still in flight.
    pub fn prepare_checked(
        &self,
        index: usize,
        list: &mut A::CommandList,
        completed: u64,
    ) -> RenderResult<()> {
        let required = self.get(index)?.fence_value;
        if required > completed {
            return Err(RenderError::SlotInFlight {
                index,
                required,
                completed,
            });
        }
        self.prepare(index, list)
    }

    pub fn fence_value(&self, index: usize) -> RenderResult<u64> {
        Ok(self.get(index)?.fence_value)
    }

    pub fn record_fence(&mut self, index: usize, value: u64) -> RenderResult<()> {
        self.get_mut(index)?.fence_value = value;
        Ok(())
    }

    /// Highest value any slot still waits on: the most recent frame's.
    pub fn max_fence_value(&self) -> u64 {
        self.slots.iter().map(|s| s.fence_value).max().unwrap_or(0)
    }

    pub fn retag_all(&mut self, value: u64) {
        for slot in &mut self.slots {
            slot.fence_value = value;
        }
    }

    pub fn back_buffer(&self, index: usize) -> RenderResult<&A::Image> {
        self.get(index)?
            .back_buffer
            .as_ref()
            .ok_or(RenderError::BackBufferDetached { index })
    }

    /// Drops every back buffer reference held by the slots.
    pub fn release_back_buffers(&mut self) {
        for slot in &mut self.slots {
            slot.back_buffer = None;
        }
    }

    pub fn attach_back_buffers(&mut self, back_buffers: Vec<A::Image>) -> RenderResult<()> {
        check_buffer_count(back_buffers.len())?;
        for (slot, image) in self.slots.iter_mut().zip(back_buffers) {
            slot.back_buffer = Some(image);
        }
        Ok(())
    }
}

fn check_buffer_count(count: usize) -> RenderResult<()> {
    if count != FRAME_COUNT {
        return Err(RenderError::resource(
            Resource::BackBuffer,
            BackendFailure::new(format!(
                "expected {FRAME_COUNT} back buffers, got {count}"
            )),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Instance, SwapChain};
    use crate::headless::{
        window_handle, Headless, SimCommandList, SimConfig, SimEvent, SimInstance, SimSwapChain,
    };
    use crate::swapchain::swap_chain_desc;
    use crate::RenderSize;

    struct Fixture {
        instance: SimInstance,
        swap_chain: SimSwapChain,
        list: SimCommandList,
        slots: FrameSlots<Headless>,
    }

    fn fixture() -> Fixture {
        let instance = SimInstance::new(SimConfig::default());
        let device = instance.device();
        let queue = device
            .create_queue(&crate::backend::QueueDesc::new(QueueKind::Direct))
            .unwrap();
        let desc = swap_chain_desc(RenderSize::new(64, 64), false);
        let swap_chain = instance
            .create_swap_chain(&queue, window_handle(), &desc)
            .unwrap();
        let images = (0..FRAME_COUNT as u32)
            .map(|i| swap_chain.image(i).unwrap())
            .collect();
        let slots = FrameSlots::<Headless>::new(&device, images).unwrap();
        let list = device
            .create_command_list(QueueKind::Direct, slots.get(0).unwrap().allocator())
            .unwrap();
        Fixture {
            instance,
            swap_chain,
            list,
            slots,
        }
    }

    #[test]
    fn slots_start_with_nothing_to_wait_on() {
        let f = fixture();
        assert_eq!(f.slots.len(), FRAME_COUNT);
        for i in 0..FRAME_COUNT {
            assert_eq!(f.slots.fence_value(i).unwrap(), 0);
            assert!(f.slots.back_buffer(i).is_ok());
        }
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut f = fixture();
        assert!(matches!(
            f.slots.get(FRAME_COUNT),
            Err(RenderError::SlotOutOfRange { index: 3, count: 3 })
        ));
        assert!(f.slots.record_fence(7, 1).is_err());
    }

    #[test]
    fn prepare_resets_allocator_then_list() {
        let mut f = fixture();
        f.slots.prepare(1, &mut f.list).unwrap();
        let gpu = f.instance.gpu();
        assert!(gpu
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::AllocatorReset { .. })));
        assert!(f.list.is_open());
    }

    #[test]
    fn checked_prepare_refuses_slot_in_flight() {
        let mut f = fixture();
        f.slots.record_fence(2, 9).unwrap();
        let err = f.slots.prepare_checked(2, &mut f.list, 8).unwrap_err();
        assert!(matches!(
            err,
            RenderError::SlotInFlight {
                index: 2,
                required: 9,
                completed: 8
            }
        ));
        assert!(!f.list.is_open());
        f.slots.prepare_checked(2, &mut f.list, 9).unwrap();
    }

    #[test]
    fn retag_uses_given_value_everywhere() {
        let mut f = fixture();
        f.slots.record_fence(0, 4).unwrap();
        f.slots.record_fence(1, 6).unwrap();
        f.slots.record_fence(2, 5).unwrap();
        assert_eq!(f.slots.max_fence_value(), 6);
        f.slots.retag_all(6);
        assert!((0..FRAME_COUNT).all(|i| f.slots.fence_value(i).unwrap() == 6));
    }

    #[test]
    fn released_back_buffers_can_be_reattached() {
        let mut f = fixture();
        f.slots.release_back_buffers();
        assert!(matches!(
            f.slots.back_buffer(0),
            Err(RenderError::BackBufferDetached { index: 0 })
        ));

        f.swap_chain.resize_buffers(FRAME_COUNT as u32, 32, 32).unwrap();
        let images = (0..FRAME_COUNT as u32)
            .map(|i| f.swap_chain.image(i).unwrap())
            .collect();
        f.slots.attach_back_buffers(images).unwrap();
        assert_eq!(f.slots.back_buffer(0).unwrap().size(), (32, 32));
    }

    #[test]
    fn wrong_buffer_count_is_rejected() {
        let mut f = fixture();
        let one = vec![f.swap_chain.image(0).unwrap()];
        assert!(matches!(
            f.slots.attach_back_buffers(one),
            Err(RenderError::ResourceCreationFailed {
                resource: Resource::BackBuffer,
                ..
            })
        ));
    }
}
