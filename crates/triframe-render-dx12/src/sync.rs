// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

use tracing::warn;
use triframe_render::backend::Fence;
use triframe_render::{BackendFailure, RenderError, RenderResult, Resource};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D12::ID3D12Fence;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use crate::status::StatusExt;

/// Fence plus the auto-reset event used to block on it. The event is closed
/// when the fence is dropped.
pub struct Dx12Fence {
    fence: ID3D12Fence,
    event: HANDLE,
}

impl Dx12Fence {
    pub(crate) fn new(fence: ID3D12Fence) -> RenderResult<Self> {
        let event = unsafe { CreateEventW(None, false, false, None) }
            .or_resource(Resource::WaitEvent, "CreateEventW")?;
        Ok(Self { fence, event })
    }

    pub fn raw(&self) -> &ID3D12Fence {
        &self.fence
    }
}

/// Milliseconds left before `deadline`, or `INFINITE` without one.
fn remaining_millis(deadline: Option<Instant>, now: Instant) -> u32 {
    match deadline {
        None => INFINITE,
        Some(deadline) => {
            let left = deadline.saturating_duration_since(now);
            // INFINITE is u32::MAX; stay one below it for finite waits.
            left.as_millis().min(u128::from(INFINITE - 1)) as u32
        }
    }
}

impl Fence for Dx12Fence {
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> RenderResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        // An auto-reset event left signaled by an earlier, abandoned wait can
        // wake us early; re-arm until the value is actually reached.
        loop {
            if self.completed_value() >= value {
                return Ok(true);
            }
            unsafe { self.fence.SetEventOnCompletion(value, self.event) }
                .or_render(RenderError::FenceWait, "SetEventOnCompletion")?;

            let millis = remaining_millis(deadline, Instant::now());
            let status = unsafe { WaitForSingleObject(self.event, millis) };
            if status == WAIT_OBJECT_0 {
                continue;
            }
            if status == WAIT_TIMEOUT {
                return Ok(self.completed_value() >= value);
            }
            return Err(RenderError::FenceWait(BackendFailure::new(format!(
                "WaitForSingleObject returned 0x{:08X}",
                status.0
            ))));
        }
    }
}

impl Drop for Dx12Fence {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.event) } {
            warn!("closing fence event failed: {}", e.message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_waits_forever() {
        assert_eq!(remaining_millis(None, Instant::now()), INFINITE);
    }

    #[test]
    fn deadline_counts_down_and_saturates() {
        let now = Instant::now();
        assert_eq!(remaining_millis(Some(now + Duration::from_millis(250)), now), 250);
        assert_eq!(remaining_millis(Some(now), now + Duration::from_secs(1)), 0);
        let far = now + Duration::from_secs(60 * 60 * 24 * 60);
        assert_eq!(remaining_millis(Some(far), now), INFINITE - 1);
    }
}
