// SPDX-License-Identifier: CEPL-1.0
//! Adapter selection, device creation and the direct command queue.

use tracing::info;

use crate::backend::{Adapter, AdapterInfo, AdapterPreference, Api, Device, Instance, QueueDesc, QueueKind};
use crate::{BackendFailure, RenderError, RenderResult};

/// Picks WARP when `prefer_software`, otherwise the high-performance GPU, and
/// dry-runs device creation on it.
pub fn select_adapter<A: Api>(
    instance: &A::Instance,
    prefer_software: bool,
) -> RenderResult<A::Adapter> {
    let preference = if prefer_software {
        AdapterPreference::Software
    } else {
        AdapterPreference::HighPerformance
    };
    let adapter = instance.enumerate_adapter(preference)?;

    let info = adapter.info();
    if info.software != prefer_software {
        return Err(RenderError::AdapterUnavailable(BackendFailure::new(format!(
            "adapter '{}' reports software={}, expected {}",
            info.name, info.software, prefer_software
        ))));
    }

    adapter.probe()?;
    Ok(adapter)
}

pub fn create_device<A: Api>(adapter: &A::Adapter, diagnostics: bool) -> RenderResult<A::Device> {
    adapter.create_device(diagnostics)
}

pub fn create_queue<A: Api>(device: &A::Device, kind: QueueKind) -> RenderResult<A::Queue> {
    device.create_queue(&QueueDesc::new(kind))
}

/// Device and its single direct queue.
pub struct GpuContext<A: Api> {
    queue: A::Queue,
    device: A::Device,
    adapter: AdapterInfo,
}

impl<A: Api> GpuContext<A> {
    pub fn new(
        instance: &A::Instance,
        prefer_software: bool,
        diagnostics: bool,
    ) -> RenderResult<Self> {
        let adapter = select_adapter::<A>(instance, prefer_software)?;
        let info = adapter.info().clone();
        info!(
            "adapter: {} (software={}, {} MiB)",
            info.name,
            info.software,
            info.dedicated_video_memory / (1024 * 1024)
        );

        let device = create_device::<A>(&adapter, diagnostics)?;
        info!(diagnostics, "device created");
        let queue = create_queue::<A>(&device, QueueKind::Direct)?;

        Ok(Self {
            queue,
            device,
            adapter: info,
        })
    }

    pub fn device(&self) -> &A::Device {
        &self.device
    }

    pub fn queue(&self) -> &A::Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{Headless, SimConfig, SimInstance};

    fn select(config: SimConfig, prefer_software: bool) -> RenderResult<AdapterInfo> {
        let instance = SimInstance::new(config);
        select_adapter::<Headless>(&instance, prefer_software).map(|a| a.info().clone())
    }

    #[test]
    fn hardware_preference_selects_hardware_adapter() {
        let info = select(SimConfig::default(), false).unwrap();
        assert!(!info.software);
    }

    #[test]
    fn software_preference_selects_warp() {
        let info = select(SimConfig::default(), true).unwrap();
        assert!(info.software);
    }

    #[test]
    fn hardware_adapter_reporting_software_is_rejected() {
        let config = SimConfig {
            hardware_reports_software: true,
            ..SimConfig::default()
        };
        assert!(matches!(
            select(config, false),
            Err(RenderError::AdapterUnavailable(_))
        ));
    }

    #[test]
    fn missing_adapter_is_unavailable() {
        let config = SimConfig {
            software_adapter: false,
            ..SimConfig::default()
        };
        assert!(matches!(
            select(config, true),
            Err(RenderError::AdapterUnavailable(_))
        ));
    }

    #[test]
    fn failed_dry_run_is_unavailable() {
        let config = SimConfig {
            probe_fails: true,
            ..SimConfig::default()
        };
        assert!(matches!(
            select(config, false),
            Err(RenderError::AdapterUnavailable(_))
        ));
    }

    #[test]
    fn device_failure_is_reported_as_such() {
        let instance = SimInstance::new(SimConfig {
            device_fails: true,
            ..SimConfig::default()
        });
        assert!(matches!(
            GpuContext::<Headless>::new(&instance, false, false),
            Err(RenderError::DeviceCreationFailed(_))
        ));
    }

    #[test]
    fn context_records_adapter_and_diagnostics() {
        let instance = SimInstance::new(SimConfig::default());
        let gpu = GpuContext::<Headless>::new(&instance, false, true).unwrap();
        assert!(!gpu.adapter().software);
        assert!(gpu.device().diagnostics());
    }
}
