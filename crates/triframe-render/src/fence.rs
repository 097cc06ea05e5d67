// SPDX-License-Identifier: CEPL-1.0
//! CPU/GPU handshake over a single monotonic 64-bit fence.

use std::time::Duration;

use tracing::{debug, trace};

use crate::backend::{Api, Device, Fence, Queue};
use crate::RenderResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// Already complete; no wait was registered.
    Ready,
    /// Blocked until the GPU reached the target.
    Reached,
    /// The timeout elapsed first. GPU work is unaffected.
    TimedOut,
}

pub struct FenceSync<A: Api> {
    fence: A::Fence,
    value: u64,
}

impl<A: Api> FenceSync<A> {
    pub fn new(device: &A::Device) -> RenderResult<Self> {
        let fence = device.create_fence(0)?;
        debug!("fence created");
        Ok(Self { fence, value: 0 })
    }

    /// Queues a signal for the next value and returns it. Never blocks.
    pub fn signal(&mut self, queue: &A::Queue) -> RenderResult<u64> {
        let next = self.value + 1;
        queue.signal(&self.fence, next)?;
        self.value = next;
        trace!(value = next, "fence signal queued");
        Ok(next)
    }

    pub fn wait(&self, target: u64, timeout: Option<Duration>) -> RenderResult<WaitStatus> {
        if self.fence.completed_value() >= target {
            return Ok(WaitStatus::Ready);
        }
        trace!(target, "waiting on fence");
        if self.fence.wait_for(target, timeout)? {
            Ok(WaitStatus::Reached)
        } else {
            Ok(WaitStatus::TimedOut)
        }
    }

    /// Returns once every piece of work queued so far has retired.
    pub fn wait_idle(&mut self, queue: &A::Queue) -> RenderResult<u64> {
        let value = self.signal(queue)?;
        self.wait(value, None)?;
        Ok(value)
    }

    pub fn completed_value(&self) -> u64 {
        self.fence.completed_value()
    }

    pub fn last_signaled(&self) -> u64 {
        self.value
    }

    pub fn fence(&self) -> &A::Fence {
        &self.fence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueueDesc;
    use crate::backend::QueueKind;
    use crate::headless::{Headless, SimConfig, SimDevice, SimEvent, SimGpu, SimInstance, SimQueue};

    fn setup(config: SimConfig) -> (SimGpu, SimDevice, SimQueue) {
        let instance = SimInstance::new(config);
        let device = instance.device();
        let queue = device.create_queue(&QueueDesc::new(QueueKind::Direct)).unwrap();
        (instance.gpu(), device, queue)
    }

    #[test]
    fn signal_values_increase_by_one() {
        let (_gpu, device, queue) = setup(SimConfig::default());
        let mut fence = FenceSync::<Headless>::new(&device).unwrap();
        let values: Vec<u64> = (0..5).map(|_| fence.signal(&queue).unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
        assert_eq!(fence.last_signaled(), 5);
    }

    #[test]
    fn completed_target_does_not_register_a_wait() {
        let (gpu, device, queue) = setup(SimConfig::default());
        let mut fence = FenceSync::<Headless>::new(&device).unwrap();
        assert_eq!(fence.wait(0, None).unwrap(), WaitStatus::Ready);

        let value = fence.signal(&queue).unwrap();
        gpu.retire_all();
        assert_eq!(fence.wait(value, None).unwrap(), WaitStatus::Ready);
        assert!(!gpu
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::WaitArmed(_))));
    }

    #[test]
    fn pending_target_blocks_until_reached() {
        let (gpu, device, queue) = setup(SimConfig {
            gpu_lag: usize::MAX,
            ..SimConfig::default()
        });
        let mut fence = FenceSync::<Headless>::new(&device).unwrap();
        let value = fence.signal(&queue).unwrap();
        assert_eq!(fence.completed_value(), 0);

        assert_eq!(fence.wait(value, None).unwrap(), WaitStatus::Reached);
        assert_eq!(fence.completed_value(), value);
        assert!(gpu.events().contains(&SimEvent::WaitArmed(value)));
    }

    #[test]
    fn slow_gpu_times_out_without_losing_work() {
        let (gpu, device, queue) = setup(SimConfig {
            gpu_lag: usize::MAX,
            slow_gpu: true,
            ..SimConfig::default()
        });
        let mut fence = FenceSync::<Headless>::new(&device).unwrap();
        let value = fence.signal(&queue).unwrap();

        let status = fence.wait(value, Some(Duration::from_millis(5))).unwrap();
        assert_eq!(status, WaitStatus::TimedOut);
        assert_eq!(gpu.outstanding(), 1);

        assert_eq!(fence.wait(value, None).unwrap(), WaitStatus::Reached);
        assert_eq!(gpu.outstanding(), 0);
    }

    #[test]
    fn wait_idle_retires_everything() {
        let (gpu, device, queue) = setup(SimConfig {
            gpu_lag: usize::MAX,
            ..SimConfig::default()
        });
        let mut fence = FenceSync::<Headless>::new(&device).unwrap();
        for _ in 0..3 {
            fence.signal(&queue).unwrap();
        }
        let idle = fence.wait_idle(&queue).unwrap();
        assert_eq!(idle, 4);
        assert_eq!(fence.completed_value(), 4);
        assert_eq!(gpu.outstanding(), 0);
    }
}
