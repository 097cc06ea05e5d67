// SPDX-License-Identifier: CEPL-1.0
//! A simulated GPU timeline implementing [`Api`].
//!
//! Work "executes" when it is signaled and "retires" either when more than
//! `gpu_lag` signals are pending or when the CPU waits on it. Everything the
//! real runtime would reject (or silently corrupt) is recorded as a
//! [`Violation`] and, where the real call returns an error, fails the call.
//!
//! All handles of one [`SimInstance`] share a single timeline.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};
use std::time::Duration;

use raw_window_handle::{RawWindowHandle, WebWindowHandle};

use crate::backend::{
    self, AdapterInfo, AdapterPreference, Api, ImageState, PresentFlags, QueueDesc, QueueKind,
    SwapChainDesc, SwapChainFlags,
};
use crate::{BackendFailure, RenderError, RenderResult, Resource};

const DXGI_ERROR_NOT_FOUND: i32 = 0x887A_0002_u32 as i32;
const DXGI_ERROR_UNSUPPORTED: i32 = 0x887A_0004_u32 as i32;
const DXGI_ERROR_DEVICE_REMOVED: i32 = 0x887A_0005_u32 as i32;
const DXGI_ERROR_INVALID_CALL: i32 = 0x887A_0001_u32 as i32;
const E_FAIL: i32 = 0x8000_4005_u32 as i32;

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub hardware_adapter: bool,
    pub software_adapter: bool,
    /// The hardware adapter carries the software flag.
    pub hardware_reports_software: bool,
    /// The device-creation dry run fails.
    pub probe_fails: bool,
    pub device_fails: bool,
    /// Result of the tearing feature probe.
    pub tearing: bool,
    /// Bounded waits always time out.
    pub slow_gpu: bool,
    /// Signals allowed to stay pending before the oldest retires on its own.
    pub gpu_lag: usize,
    pub fail_present: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            hardware_adapter: true,
            software_adapter: true,
            hardware_reports_software: false,
            probe_fails: false,
            device_fails: false,
            tearing: true,
            slow_gpu: false,
            gpu_lag: 2,
            fail_present: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimEvent {
    Signal(u64),
    Retired(u64),
    /// The CPU registered a blocking wait for this value.
    WaitArmed(u64),
    AllocatorReset { allocator: u64 },
    Executed { allocator: u64 },
    ImageReleased { image: u64 },
    BuffersResized { width: u32, height: u32 },
    ViewCreated { index: u32, image: u64 },
    Presented {
        image: u64,
        sync_interval: u32,
        flags: PresentFlags,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// Allocator reset while work recorded from it had not retired.
    AllocatorResetInFlight { allocator: u64, busy_until: u64, completed: u64 },
    /// Swap chain resized while a buffer reference was still held.
    OutstandingImageReference { image: u64 },
    WrongImageState {
        image: u64,
        expected: ImageState,
        actual: ImageState,
    },
    ListNotClosed,
    ListNotOpen,
    InvalidPresentFlags,
    ViewOutOfRange { index: u32, capacity: u32 },
}

struct GpuState {
    config: SimConfig,
    completed: u64,
    pending: VecDeque<u64>,
    /// Executed since the last signal; not yet covered by a fence value.
    unfenced: Vec<u64>,
    busy_until: HashMap<u64, u64>,
    next_id: u64,
    events: Vec<SimEvent>,
    violations: Vec<Violation>,
}

impl GpuState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn retire_through(&mut self, value: u64) {
        while let Some(&front) = self.pending.front() {
            if front > value {
                break;
            }
            self.pending.pop_front();
            self.completed = self.completed.max(front);
            self.events.push(SimEvent::Retired(front));
        }
    }

    fn violation(&mut self, violation: Violation) {
        tracing::warn!(?violation, "simulated runtime violation");
        self.violations.push(violation);
    }
}

/// Shared view of the simulated timeline.
#[derive(Clone)]
pub struct SimGpu(Rc<RefCell<GpuState>>);

impl SimGpu {
    fn new(config: SimConfig) -> Self {
        Self(Rc::new(RefCell::new(GpuState {
            config,
            completed: 0,
            pending: VecDeque::new(),
            unfenced: Vec::new(),
            busy_until: HashMap::new(),
            next_id: 0,
            events: Vec::new(),
            violations: Vec::new(),
        })))
    }

    fn config(&self) -> SimConfig {
        self.0.borrow().config.clone()
    }

    fn next_id(&self) -> u64 {
        self.0.borrow_mut().alloc_id()
    }

    fn push(&self, event: SimEvent) {
        self.0.borrow_mut().events.push(event);
    }

    fn violation(&self, violation: Violation) {
        self.0.borrow_mut().violation(violation);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.0.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.0.borrow_mut().events.clear();
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.0.borrow().violations.clone()
    }

    pub fn completed_value(&self) -> u64 {
        self.0.borrow().completed
    }

    /// Signals queued but not yet retired.
    pub fn outstanding(&self) -> usize {
        self.0.borrow().pending.len()
    }

    pub fn retire_all(&self) {
        let mut state = self.0.borrow_mut();
        state.retire_through(u64::MAX);
    }

    pub fn set_slow(&self, slow: bool) {
        self.0.borrow_mut().config.slow_gpu = slow;
    }
}

pub struct Headless;

impl Api for Headless {
    type Instance = SimInstance;
    type Adapter = SimAdapter;
    type Device = SimDevice;
    type Queue = SimQueue;
    type Fence = SimFence;
    type CommandAllocator = SimAllocator;
    type CommandList = SimCommandList;
    type SwapChain = SimSwapChain;
    type Image = SimImage;
    type DescriptorTable = SimDescriptorTable;
}

/// Stand-in window; the simulator never dereferences it.
pub fn window_handle() -> RawWindowHandle {
    RawWindowHandle::Web(WebWindowHandle::new(1))
}

pub struct SimInstance {
    gpu: SimGpu,
}

impl SimInstance {
    pub fn new(config: SimConfig) -> Self {
        Self {
            gpu: SimGpu::new(config),
        }
    }

    pub fn gpu(&self) -> SimGpu {
        self.gpu.clone()
    }

    /// A device without going through adapter selection.
    pub fn device(&self) -> SimDevice {
        SimDevice {
            gpu: self.gpu.clone(),
            diagnostics: false,
        }
    }
}

impl backend::Instance<Headless> for SimInstance {
    fn enumerate_adapter(&self, preference: AdapterPreference) -> RenderResult<SimAdapter> {
        let config = self.gpu.config();
        let info = match preference {
            AdapterPreference::Software if config.software_adapter => AdapterInfo {
                name: "Simulated WARP".into(),
                software: true,
                dedicated_video_memory: 0,
            },
            AdapterPreference::HighPerformance if config.hardware_adapter => AdapterInfo {
                name: "Simulated GPU".into(),
                software: config.hardware_reports_software,
                dedicated_video_memory: 4 << 30,
            },
            _ => {
                return Err(RenderError::AdapterUnavailable(BackendFailure::with_status(
                    DXGI_ERROR_NOT_FOUND,
                    format!("no {preference:?} adapter"),
                )))
            }
        };
        Ok(SimAdapter {
            gpu: self.gpu.clone(),
            info,
        })
    }

    fn tearing_supported(&self) -> bool {
        self.gpu.config().tearing
    }

    fn create_swap_chain(
        &self,
        _queue: &SimQueue,
        _window: RawWindowHandle,
        desc: &SwapChainDesc,
    ) -> RenderResult<SimSwapChain> {
        if desc.flags.contains(SwapChainFlags::ALLOW_TEARING) && !self.gpu.config().tearing {
            return Err(RenderError::resource(
                Resource::SwapChain,
                BackendFailure::with_status(DXGI_ERROR_INVALID_CALL, "tearing not supported"),
            ));
        }
        let mut swap_chain = SimSwapChain {
            gpu: self.gpu.clone(),
            desc: *desc,
            images: Vec::new(),
            current: 0,
        };
        swap_chain.allocate(desc.buffer_count, desc.width, desc.height);
        Ok(swap_chain)
    }
}

pub struct SimAdapter {
    gpu: SimGpu,
    info: AdapterInfo,
}

impl backend::Adapter<Headless> for SimAdapter {
    fn info(&self) -> &AdapterInfo {
        &self.info
    }

    fn probe(&self) -> RenderResult<()> {
        if self.gpu.config().probe_fails {
            return Err(RenderError::AdapterUnavailable(BackendFailure::with_status(
                DXGI_ERROR_UNSUPPORTED,
                format!("'{}' cannot create a device", self.info.name),
            )));
        }
        Ok(())
    }

    fn create_device(&self, diagnostics: bool) -> RenderResult<SimDevice> {
        if self.gpu.config().device_fails {
            return Err(RenderError::DeviceCreationFailed(BackendFailure::with_status(
                E_FAIL,
                "simulated device creation failure",
            )));
        }
        Ok(SimDevice {
            gpu: self.gpu.clone(),
            diagnostics,
        })
    }
}

pub struct SimDevice {
    gpu: SimGpu,
    diagnostics: bool,
}

impl SimDevice {
    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }
}

impl backend::Device<Headless> for SimDevice {
    fn create_queue(&self, desc: &QueueDesc) -> RenderResult<SimQueue> {
        Ok(SimQueue {
            gpu: self.gpu.clone(),
            kind: desc.kind,
        })
    }

    fn create_fence(&self, initial_value: u64) -> RenderResult<SimFence> {
        {
            let mut state = self.gpu.0.borrow_mut();
            state.completed = state.completed.max(initial_value);
        }
        Ok(SimFence {
            gpu: self.gpu.clone(),
        })
    }

    fn create_command_allocator(&self, _kind: QueueKind) -> RenderResult<SimAllocator> {
        Ok(SimAllocator {
            gpu: self.gpu.clone(),
            id: self.gpu.next_id(),
        })
    }

    fn create_command_list(
        &self,
        _kind: QueueKind,
        allocator: &SimAllocator,
    ) -> RenderResult<SimCommandList> {
        Ok(SimCommandList {
            gpu: self.gpu.clone(),
            allocator: allocator.id,
            open: false,
        })
    }

    fn create_descriptor_table(&self, capacity: u32) -> RenderResult<SimDescriptorTable> {
        Ok(SimDescriptorTable {
            views: RefCell::new(vec![None; capacity as usize]),
        })
    }

    fn create_render_target_view(
        &self,
        image: &SimImage,
        table: &SimDescriptorTable,
        index: u32,
    ) -> RenderResult<()> {
        let mut views = table.views.borrow_mut();
        let capacity = views.len() as u32;
        let Some(slot) = views.get_mut(index as usize) else {
            self.gpu.violation(Violation::ViewOutOfRange { index, capacity });
            return Err(RenderError::resource(
                Resource::RenderTargetView,
                BackendFailure::new(format!("descriptor {index} out of {capacity}")),
            ));
        };
        *slot = Some(Rc::downgrade(&image.data));
        self.gpu.push(SimEvent::ViewCreated {
            index,
            image: image.id(),
        });
        Ok(())
    }
}

pub struct SimQueue {
    gpu: SimGpu,
    kind: QueueKind,
}

impl SimQueue {
    pub fn kind(&self) -> QueueKind {
        self.kind
    }
}

impl backend::Queue<Headless> for SimQueue {
    fn signal(&self, _fence: &SimFence, value: u64) -> RenderResult<()> {
        let mut state = self.gpu.0.borrow_mut();
        for allocator in std::mem::take(&mut state.unfenced) {
            state.busy_until.insert(allocator, value);
        }
        state.pending.push_back(value);
        state.events.push(SimEvent::Signal(value));

        while state.pending.len() > state.config.gpu_lag {
            let Some(&oldest) = state.pending.front() else {
                break;
            };
            state.retire_through(oldest);
        }
        Ok(())
    }

    fn execute(&self, list: &SimCommandList) -> RenderResult<()> {
        if list.open {
            self.gpu.violation(Violation::ListNotClosed);
            return Err(RenderError::Command(BackendFailure::with_status(
                DXGI_ERROR_INVALID_CALL,
                "executing an open command list",
            )));
        }
        let mut state = self.gpu.0.borrow_mut();
        state.busy_until.insert(list.allocator, u64::MAX);
        state.unfenced.push(list.allocator);
        state.events.push(SimEvent::Executed {
            allocator: list.allocator,
        });
        Ok(())
    }
}

pub struct SimFence {
    gpu: SimGpu,
}

impl backend::Fence for SimFence {
    fn completed_value(&self) -> u64 {
        self.gpu.completed_value()
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> RenderResult<bool> {
        let mut state = self.gpu.0.borrow_mut();
        if state.completed >= value {
            return Ok(true);
        }
        state.events.push(SimEvent::WaitArmed(value));
        if state.config.slow_gpu && timeout.is_some() {
            return Ok(false);
        }
        if !state.pending.iter().any(|&v| v >= value) {
            return Err(RenderError::FenceWait(BackendFailure::new(format!(
                "waiting for {value}, which was never signaled"
            ))));
        }
        state.retire_through(value);
        Ok(true)
    }
}

pub struct SimAllocator {
    gpu: SimGpu,
    id: u64,
}

impl SimAllocator {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl backend::CommandAllocator for SimAllocator {
    fn reset(&self) -> RenderResult<()> {
        let mut state = self.gpu.0.borrow_mut();
        let busy_until = state.busy_until.get(&self.id).copied().unwrap_or(0);
        let completed = state.completed;
        if busy_until > completed {
            state.violation(Violation::AllocatorResetInFlight {
                allocator: self.id,
                busy_until,
                completed,
            });
            return Err(RenderError::Command(BackendFailure::with_status(
                E_FAIL,
                format!("allocator {} reset while in flight", self.id),
            )));
        }
        state.events.push(SimEvent::AllocatorReset { allocator: self.id });
        Ok(())
    }
}

pub struct SimCommandList {
    gpu: SimGpu,
    allocator: u64,
    open: bool,
}

impl SimCommandList {
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn require_open(&self) -> bool {
        if !self.open {
            self.gpu.violation(Violation::ListNotOpen);
        }
        self.open
    }

    fn expect_state(&self, data: &ImageData, expected: ImageState) {
        let actual = data.state.get();
        if actual != expected {
            self.gpu.violation(Violation::WrongImageState {
                image: data.id,
                expected,
                actual,
            });
        }
    }
}

impl backend::CommandList<Headless> for SimCommandList {
    fn reset(&mut self, allocator: &SimAllocator) -> RenderResult<()> {
        if self.open {
            self.gpu.violation(Violation::ListNotClosed);
            return Err(RenderError::Command(BackendFailure::with_status(
                E_FAIL,
                "resetting an open command list",
            )));
        }
        self.allocator = allocator.id;
        self.open = true;
        Ok(())
    }

    fn transition(&mut self, image: &SimImage, before: ImageState, after: ImageState) {
        if !self.require_open() {
            return;
        }
        self.expect_state(&image.data, before);
        image.data.state.set(after);
    }

    fn clear_render_target(&mut self, table: &SimDescriptorTable, index: u32, rgba: [f32; 4]) {
        if !self.require_open() {
            return;
        }
        let views = table.views.borrow();
        let capacity = views.len() as u32;
        let Some(view) = views.get(index as usize) else {
            self.gpu.violation(Violation::ViewOutOfRange { index, capacity });
            return;
        };
        match view.as_ref().and_then(Weak::upgrade) {
            Some(data) => {
                self.expect_state(&data, ImageState::RenderTarget);
                data.clear.set(Some(rgba));
            }
            None => self.gpu.violation(Violation::ViewOutOfRange { index, capacity }),
        }
    }

    fn close(&mut self) -> RenderResult<()> {
        if !self.require_open() {
            return Err(RenderError::Command(BackendFailure::with_status(
                E_FAIL,
                "closing a closed command list",
            )));
        }
        self.open = false;
        Ok(())
    }
}

struct ImageData {
    id: u64,
    width: u32,
    height: u32,
    state: Cell<ImageState>,
    clear: Cell<Option<[f32; 4]>>,
}

/// A counted reference to a swap chain buffer.
pub struct SimImage {
    data: Rc<ImageData>,
    gpu: SimGpu,
}

impl SimImage {
    pub fn id(&self) -> u64 {
        self.data.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.data.width, self.data.height)
    }

    pub fn state(&self) -> ImageState {
        self.data.state.get()
    }

    /// Last color the image was cleared to.
    pub fn clear_color(&self) -> Option<[f32; 4]> {
        self.data.clear.get()
    }
}

impl Drop for SimImage {
    fn drop(&mut self) {
        self.gpu.push(SimEvent::ImageReleased { image: self.data.id });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimView {
    pub image: u64,
    pub width: u32,
    pub height: u32,
}

pub struct SimDescriptorTable {
    views: RefCell<Vec<Option<Weak<ImageData>>>>,
}

impl SimDescriptorTable {
    /// Views whose image is still alive.
    pub fn views(&self) -> Vec<Option<SimView>> {
        self.views
            .borrow()
            .iter()
            .map(|view| {
                view.as_ref().and_then(Weak::upgrade).map(|data| SimView {
                    image: data.id,
                    width: data.width,
                    height: data.height,
                })
            })
            .collect()
    }
}

pub struct SimSwapChain {
    gpu: SimGpu,
    desc: SwapChainDesc,
    images: Vec<Rc<ImageData>>,
    current: u32,
}

impl SimSwapChain {
    fn allocate(&mut self, count: u32, width: u32, height: u32) {
        let gpu = self.gpu.clone();
        self.images = (0..count)
            .map(|_| {
                Rc::new(ImageData {
                    id: gpu.next_id(),
                    width,
                    height,
                    state: Cell::new(ImageState::Present),
                    clear: Cell::new(None),
                })
            })
            .collect();
        self.desc.buffer_count = count;
        self.desc.width = width;
        self.desc.height = height;
        self.current = 0;
    }

    pub fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }
}

impl backend::SwapChain<Headless> for SimSwapChain {
    fn current_image_index(&self) -> u32 {
        self.current
    }

    fn image(&self, index: u32) -> RenderResult<SimImage> {
        let data = self.images.get(index as usize).ok_or_else(|| {
            RenderError::resource(
                Resource::BackBuffer,
                BackendFailure::with_status(
                    DXGI_ERROR_INVALID_CALL,
                    format!("buffer {index} of {}", self.images.len()),
                ),
            )
        })?;
        Ok(SimImage {
            data: Rc::clone(data),
            gpu: self.gpu.clone(),
        })
    }

    fn resize_buffers(&mut self, buffer_count: u32, width: u32, height: u32) -> RenderResult<()> {
        if let Some(held) = self.images.iter().find(|d| Rc::strong_count(d) > 1) {
            let image = held.id;
            self.gpu
                .violation(Violation::OutstandingImageReference { image });
            return Err(RenderError::resource(
                Resource::BackBuffer,
                BackendFailure::with_status(
                    DXGI_ERROR_INVALID_CALL,
                    format!("buffer {image} still referenced"),
                ),
            ));
        }
        self.allocate(buffer_count, width, height);
        self.gpu.push(SimEvent::BuffersResized { width, height });
        Ok(())
    }

    fn present(&mut self, sync_interval: u32, flags: PresentFlags) -> RenderResult<()> {
        if self.gpu.config().fail_present {
            return Err(RenderError::PresentFailed(BackendFailure::with_status(
                DXGI_ERROR_DEVICE_REMOVED,
                "simulated device removal",
            )));
        }
        if flags.contains(PresentFlags::ALLOW_TEARING)
            && (sync_interval != 0 || !self.desc.flags.contains(SwapChainFlags::ALLOW_TEARING))
        {
            self.gpu.violation(Violation::InvalidPresentFlags);
            return Err(RenderError::PresentFailed(BackendFailure::with_status(
                DXGI_ERROR_INVALID_CALL,
                "tearing present on a non-tearing swap chain or with sync interval",
            )));
        }

        let data = self
            .images
            .get(self.current as usize)
            .ok_or(RenderError::SlotOutOfRange {
                index: self.current as usize,
                count: self.images.len(),
            })?;
        let actual = data.state.get();
        if actual != ImageState::Present {
            self.gpu.violation(Violation::WrongImageState {
                image: data.id,
                expected: ImageState::Present,
                actual,
            });
        }
        self.gpu.push(SimEvent::Presented {
            image: data.id,
            sync_interval,
            flags,
        });
        self.current = (self.current + 1) % self.images.len().max(1) as u32;
        Ok(())
    }
}
