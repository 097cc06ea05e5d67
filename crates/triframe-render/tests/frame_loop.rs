// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use triframe_render::backend::{ImageState, PresentFlags};
use triframe_render::headless::{window_handle, Headless, SimConfig, SimEvent, SimGpu, SimInstance};
use triframe_render::{
    FrameLoop, FrameOutcome, FrameState, RenderError, RenderOptions, RenderSize, Renderer,
    FRAME_COUNT,
};

fn options() -> RenderOptions {
    RenderOptions {
        diagnostics: true,
        ..RenderOptions::default()
    }
}

fn start(config: SimConfig, options: RenderOptions) -> (SimInstance, SimGpu, FrameLoop<Headless>) {
    let instance = SimInstance::new(config);
    let gpu = instance.gpu();
    let frame_loop =
        FrameLoop::<Headless>::new(&instance, window_handle(), RenderSize::new(1280, 720), options)
            .unwrap();
    (instance, gpu, frame_loop)
}

fn present(frame_loop: &mut FrameLoop<Headless>) -> (usize, u64) {
    match frame_loop.render_frame().unwrap() {
        FrameOutcome::Presented { slot, fence_value } => (slot, fence_value),
        other => panic!("expected a presented frame, got {other:?}"),
    }
}

fn view_ids(frame_loop: &FrameLoop<Headless>) -> Vec<u64> {
    frame_loop
        .swap_chain()
        .descriptor_table()
        .views()
        .into_iter()
        .map(|v| v.expect("live view").image)
        .collect()
}

#[test]
fn initializes_three_buffers_at_requested_size() {
    let (_instance, gpu, frame_loop) = start(SimConfig::default(), options());

    assert_eq!(frame_loop.state(), FrameState::Idle);
    assert!(frame_loop.current_slot() < FRAME_COUNT);
    assert_eq!(frame_loop.size(), RenderSize::new(1280, 720));
    assert!(frame_loop.tearing_supported());
    assert!(!frame_loop.adapter().software);
    assert_eq!(frame_loop.slots().len(), FRAME_COUNT);

    let views = frame_loop.swap_chain().descriptor_table().views();
    assert_eq!(views.len(), FRAME_COUNT);
    for view in views {
        let view = view.expect("every buffer has a view");
        assert_eq!((view.width, view.height), (1280, 720));
    }
    assert!(gpu.violations().is_empty());
}

#[test]
fn tearing_follows_the_platform_probe() {
    let config = SimConfig {
        tearing: false,
        ..SimConfig::default()
    };
    let (_instance, _gpu, frame_loop) = start(config, options());
    assert!(!frame_loop.tearing_supported());
}

#[test]
fn warp_option_selects_software_adapter() {
    let opts = RenderOptions {
        prefer_software: true,
        ..options()
    };
    let (_instance, _gpu, frame_loop) = start(SimConfig::default(), opts);
    assert!(frame_loop.adapter().software);
}

#[test]
fn frames_cycle_slots_without_violations() {
    let (_instance, gpu, mut frame_loop) = start(SimConfig::default(), options());

    let mut last = 0;
    for frame in 0..12 {
        let (slot, value) = present(&mut frame_loop);
        assert_eq!(slot, frame % FRAME_COUNT);
        assert!(value > last);
        last = value;
        assert_eq!(frame_loop.slots().fence_value(slot).unwrap(), value);
        assert_eq!(frame_loop.state(), FrameState::Idle);
    }
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn at_most_three_frames_are_in_flight() {
    let config = SimConfig {
        gpu_lag: usize::MAX,
        ..SimConfig::default()
    };
    let (_instance, gpu, mut frame_loop) = start(config, options());

    for _ in 0..20 {
        present(&mut frame_loop);
        assert!(gpu.outstanding() <= FRAME_COUNT);
    }
    assert!(gpu
        .events()
        .iter()
        .any(|e| matches!(e, SimEvent::WaitArmed(_))));
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn cleared_image_is_back_in_present_state() {
    let color = [0.1, 0.2, 0.3, 1.0];
    let opts = RenderOptions {
        clear_color: color,
        ..options()
    };
    let (_instance, _gpu, mut frame_loop) = start(SimConfig::default(), opts);

    let (slot, _) = present(&mut frame_loop);
    let image = frame_loop.slots().back_buffer(slot).unwrap();
    assert_eq!(image.clear_color(), Some(color));
    assert_eq!(image.state(), ImageState::Present);

    let next = [1.0, 0.0, 0.0, 1.0];
    frame_loop.set_clear_color(next);
    let (slot, _) = present(&mut frame_loop);
    assert_eq!(
        frame_loop.slots().back_buffer(slot).unwrap().clear_color(),
        Some(next)
    );
}

#[test]
fn resize_drains_gpu_before_releasing_buffers() {
    let (_instance, gpu, mut frame_loop) = start(SimConfig::default(), options());
    let mut newest = 0;
    for _ in 0..5 {
        newest = present(&mut frame_loop).1;
    }
    let old_ids = view_ids(&frame_loop);

    gpu.clear_events();
    frame_loop.resize(RenderSize::new(1920, 1080)).unwrap();
    let events = gpu.events();

    let idle = frame_loop.fence().last_signaled();
    let drained = events
        .iter()
        .position(|e| *e == SimEvent::Retired(idle))
        .expect("idle value retired");
    let first_release = events
        .iter()
        .position(|e| matches!(e, SimEvent::ImageReleased { .. }))
        .expect("buffers released");
    assert!(drained < first_release);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SimEvent::ImageReleased { .. }))
            .count(),
        FRAME_COUNT
    );

    let views = frame_loop.swap_chain().descriptor_table().views();
    for view in &views {
        let view = view.expect("view recreated");
        assert_eq!((view.width, view.height), (1920, 1080));
        assert!(!old_ids.contains(&view.image));
    }
    assert!((0..FRAME_COUNT).all(|i| frame_loop.slots().fence_value(i).unwrap() == newest));
    assert_eq!(frame_loop.size(), RenderSize::new(1920, 1080));
    assert!(frame_loop.current_slot() < FRAME_COUNT);

    present(&mut frame_loop);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn same_size_resize_still_recreates_buffers() {
    let (_instance, gpu, mut frame_loop) = start(SimConfig::default(), options());
    present(&mut frame_loop);
    gpu.clear_events();

    frame_loop.resize(RenderSize::new(1280, 720)).unwrap();
    assert!(gpu.events().contains(&SimEvent::BuffersResized {
        width: 1280,
        height: 720
    }));
}

#[test]
fn zero_area_resize_is_ignored() {
    let (_instance, gpu, mut frame_loop) = start(SimConfig::default(), options());
    gpu.clear_events();

    frame_loop.resize(RenderSize::new(0, 720)).unwrap();
    frame_loop.resize(RenderSize::new(1280, 0)).unwrap();
    assert!(gpu.events().is_empty());
    assert_eq!(frame_loop.size(), RenderSize::new(1280, 720));
}

#[test]
fn vsync_toggle_applies_to_next_present() {
    let (_instance, gpu, mut frame_loop) = start(SimConfig::default(), options());
    present(&mut frame_loop);

    gpu.clear_events();
    assert!(!frame_loop.toggle_vsync());
    assert!(gpu.events().is_empty());

    present(&mut frame_loop);
    let presented: Vec<_> = gpu
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SimEvent::Presented {
                sync_interval,
                flags,
                ..
            } => Some((sync_interval, flags)),
            _ => None,
        })
        .collect();
    assert_eq!(presented, vec![(0, PresentFlags::ALLOW_TEARING)]);

    assert!(frame_loop.toggle_vsync());
    gpu.clear_events();
    present(&mut frame_loop);
    assert!(gpu.events().iter().any(|e| matches!(
        e,
        SimEvent::Presented { sync_interval: 1, flags, .. } if flags.is_empty()
    )));
}

#[test]
fn vsync_off_without_tearing_support_presents_plainly() {
    let config = SimConfig {
        tearing: false,
        ..SimConfig::default()
    };
    let opts = RenderOptions {
        vsync: false,
        ..options()
    };
    let (_instance, gpu, mut frame_loop) = start(config, opts);
    present(&mut frame_loop);
    assert!(gpu.events().iter().any(|e| matches!(
        e,
        SimEvent::Presented { sync_interval: 0, flags, .. } if flags.is_empty()
    )));
}

#[test]
fn present_failure_is_reported() {
    let config = SimConfig {
        fail_present: true,
        ..SimConfig::default()
    };
    let (_instance, _gpu, mut frame_loop) = start(config, options());
    let err = frame_loop.render_frame().unwrap_err();
    assert!(matches!(err, RenderError::PresentFailed(_)));
    assert!(err.is_fatal());
}

#[test]
fn slow_gpu_skips_frame_after_timeout() {
    let config = SimConfig {
        gpu_lag: usize::MAX,
        ..SimConfig::default()
    };
    let opts = RenderOptions {
        frame_timeout: Some(Duration::from_millis(1)),
        ..options()
    };
    let (_instance, gpu, mut frame_loop) = start(config, opts);
    for _ in 0..FRAME_COUNT {
        present(&mut frame_loop);
    }

    gpu.set_slow(true);
    assert_eq!(
        frame_loop.render_frame().unwrap(),
        FrameOutcome::Skipped { slot: 0 }
    );
    assert_eq!(frame_loop.state(), FrameState::Idle);

    gpu.set_slow(false);
    let (slot, _) = present(&mut frame_loop);
    assert_eq!(slot, 0);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn renderer_reports_skipped_frames_as_not_presented() {
    let config = SimConfig {
        gpu_lag: usize::MAX,
        ..SimConfig::default()
    };
    let opts = RenderOptions {
        frame_timeout: Some(Duration::from_millis(1)),
        ..options()
    };
    let (_instance, gpu, mut frame_loop) = start(config, opts);
    let renderer: &mut dyn Renderer = &mut frame_loop;
    for _ in 0..FRAME_COUNT {
        assert!(matches!(renderer.render().unwrap(), FrameOutcome::Presented { .. }));
    }

    gpu.set_slow(true);
    assert!(matches!(renderer.render().unwrap(), FrameOutcome::Skipped { .. }));
    gpu.set_slow(false);
    renderer.shutdown().unwrap();
    assert_eq!(renderer.render().unwrap(), FrameOutcome::Halted);
}

#[test]
fn shutdown_drains_and_halts() {
    let config = SimConfig {
        gpu_lag: usize::MAX,
        ..SimConfig::default()
    };
    let (_instance, gpu, mut frame_loop) = start(config, options());
    for _ in 0..4 {
        present(&mut frame_loop);
    }
    assert!(gpu.outstanding() > 0);

    frame_loop.shutdown().unwrap();
    assert_eq!(gpu.outstanding(), 0);
    assert_eq!(frame_loop.state(), FrameState::ShutDown);
    assert_eq!(frame_loop.render_frame().unwrap(), FrameOutcome::Halted);

    frame_loop.shutdown().unwrap();
    frame_loop.resize(RenderSize::new(640, 480)).unwrap();
    assert_eq!(frame_loop.size(), RenderSize::new(1280, 720));
}

#[test]
fn dropping_the_loop_waits_for_idle() {
    let config = SimConfig {
        gpu_lag: usize::MAX,
        ..SimConfig::default()
    };
    let (_instance, gpu, mut frame_loop) = start(config, options());
    for _ in 0..2 {
        present(&mut frame_loop);
    }
    drop(frame_loop);
    assert_eq!(gpu.outstanding(), 0);
}
