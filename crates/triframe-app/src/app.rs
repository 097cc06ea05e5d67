// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use tracing::{info, warn};
use triframe_core::FpsCounter;
use triframe_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow},
    keyboard::{Key, ModifiersState, NamedKey},
    window::{Window, WindowId},
};
use triframe_render::{FrameOutcome, RenderError, RenderSize, Renderer};

use crate::config::Settings;
use crate::renderer;

pub struct App {
    settings: Settings,
    window: Option<Window>,
    renderer: Option<Box<dyn Renderer>>,
    render_size: RenderSize,
    modifiers: ModifiersState,

    paused: bool,
    exiting: bool,
    fps: FpsCounter,
    failure: Option<anyhow::Error>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let render_size = settings.size;
        App {
            settings,
            window: None,
            renderer: None,
            render_size,
            modifiers: ModifiersState::empty(),
            paused: false,
            exiting: false,
            fps: FpsCounter::new(),
            failure: None,
        }
    }

    /// The error that ended the event loop, if any.
    pub fn finish(self) -> Result<()> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = triframe_platform::window_attributes(
            &self.settings.title,
            self.settings.size.width,
            self.settings.size.height,
        );
        let window = event_loop.create_window(attrs).context("create_window")?;

        let size = triframe_platform::client_size(&window);
        self.render_size = RenderSize::new(size.width, size.height);
        self.paused = self.render_size.is_empty();

        let renderer = renderer::create(&window, self.render_size, self.settings.options.clone())?;
        info!(
            "renderer ready ({}x{}, vsync={}, warp={})",
            self.render_size.width,
            self.render_size.height,
            self.settings.options.vsync,
            self.settings.options.prefer_software
        );

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// GPU work is drained before the window goes away.
    fn teardown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                warn!("renderer shutdown: {e}");
            }
        }
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.failure = Some(err);
        self.teardown(event_loop);
    }

    /// Fatal render errors end the application; the rest are logged.
    fn check(&mut self, event_loop: &ActiveEventLoop, what: &str, res: Result<(), RenderError>) {
        match res {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                self.fail(event_loop, anyhow::Error::new(e).context(what.to_owned()))
            }
            Err(e) => warn!("{what}: {e}"),
        }
    }

    fn resize(&mut self, event_loop: &ActiveEventLoop, width: u32, height: u32) {
        self.render_size = RenderSize::new(width, height);
        let now_paused = self.render_size.is_empty();
        if self.paused != now_paused {
            self.paused = now_paused;
            self.fps.reset();
        }
        info!("Resized → {}x{} (paused={})", width, height, self.paused);

        if self.paused {
            return;
        }
        if let Some(renderer) = &mut self.renderer {
            let res = renderer.resize(self.render_size);
            self.check(event_loop, "resize", res);
        }
    }

    fn key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.logical_key {
            Key::Named(NamedKey::Escape) => {
                info!("Escape pressed");
                self.teardown(event_loop);
            }
            Key::Named(NamedKey::F11) => self.toggle_fullscreen(),
            Key::Named(NamedKey::Enter) if self.modifiers.alt_key() => self.toggle_fullscreen(),
            Key::Character(ref c) if c.eq_ignore_ascii_case("v") => {
                if let Some(renderer) = &mut self.renderer {
                    let vsync = renderer.toggle_vsync();
                    info!("vsync = {vsync}");
                }
            }
            _ => {}
        }
    }

    // winit reports the new client size through `Resized`, which resizes the
    // swap chain.
    fn toggle_fullscreen(&self) {
        if let Some(window) = &self.window {
            triframe_platform::toggle_fullscreen(window);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        info!("resumed → paused={}", self.paused);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.teardown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.resize(event_loop, new_size.width, new_size.height)
            }

            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),

            WindowEvent::KeyboardInput { event, .. } => self.key(event_loop, event),

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                match renderer.render() {
                    Ok(FrameOutcome::Presented { .. }) => {
                        if let Some(fps) = self.fps.tick() {
                            info!("fps ~ {:.0}", fps);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => self.check(event_loop, "render", Err(e)),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.paused {
            // Minimized: sleep until the next event.
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
