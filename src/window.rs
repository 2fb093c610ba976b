//! Windowed runner.
//!
//! Each redraw runs the frame in a fixed order: input commands, due steps
//! and bakes, then drawing. The window title doubles as the status line.

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::clock::FrameClock;
use crate::config::{ConfigSource, RuntimeConfig};
use crate::error::{AppError, ConfigError};
use crate::gpu::{GpuBatch, GpuState};
use crate::input::{Action, Input, KeyBindings};
use crate::iterator::Mode;
use crate::session::Session;

const HELP: &str = "Esc: Exit / P: Start|Stop / R: Reset / T: Reload config / E: Enable|Disable rotation \
/ Z: Reset rotation / Space: Step / A: Random attractors";

/// Open a window and run until it is closed.
pub fn run(config: RuntimeConfig, source: Box<dyn ConfigSource>) -> Result<(), AppError> {
    let mut app = App::new(config, source)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct App {
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
    session: Session<GpuBatch>,
    source: Box<dyn ConfigSource>,
    input: Input,
    bindings: KeyBindings,
    clock: FrameClock,
    error: Option<AppError>,
}

impl App {
    fn new(config: RuntimeConfig, source: Box<dyn ConfigSource>) -> Result<Self, ConfigError> {
        Ok(Self {
            window: None,
            gpu_state: None,
            session: Session::new(config)?,
            source,
            input: Input::new(),
            bindings: KeyBindings::default(),
            clock: FrameClock::new(),
            error: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: AppError) {
        log::error!("{}", error);
        self.error = Some(error);
        event_loop.exit();
    }

    /// Input, then stepping and baking, then drawing.
    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu_state) = self.gpu_state.as_mut() else {
            return;
        };

        let elapsed = self.clock.update();

        for action in self.bindings.actions(&self.input) {
            match action {
                Action::Exit => event_loop.exit(),
                Action::Command(command) => {
                    self.session.apply(command, gpu_state, self.source.as_ref())
                }
            }
        }
        gpu_state.camera.orbit(self.input.drag_delta());
        gpu_state.camera.zoom(self.input.scroll_delta());
        self.input.begin_frame();

        self.session.update(elapsed, gpu_state);

        match gpu_state.render(&self.session) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => gpu_state.reconfigure(),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("surface out of memory, exiting");
                event_loop.exit();
            }
            Err(e) => log::error!("render error: {:?}", e),
        }

        if let Some(window) = &self.window {
            window.set_title(&self.status_line());
        }
    }

    fn status_line(&self) -> String {
        let config = self.session.config();
        let state = match self.session.mode() {
            Mode::Running => "running",
            Mode::Idle => "stopped",
        };
        format!(
            "{} | Iteration ({}/s): {} [{}] | {} batches | {:.0} fps",
            HELP,
            config.iterations_per_second,
            self.session.iterations(),
            state,
            self.session.batches().len(),
            self.clock.fps()
        )
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("Chaos Cubes")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };
        self.window = Some(window.clone());

        match pollster::block_on(GpuState::new(window)) {
            Ok(gpu_state) => {
                self.gpu_state = Some(gpu_state);
                self.clock.restart();
            }
            Err(e) => self.fail(event_loop, e.into()),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.resize(physical_size);
                }
            }
            WindowEvent::RedrawRequested => {
                self.frame(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
