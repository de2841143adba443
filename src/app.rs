use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::compute::ComputeBackend;
use crate::compute::ImageLayout;
use crate::compute::gpu::GpuBackend;
use crate::compute::software::SoftwareBackend;
use crate::config::{BackendKind, Config};
use crate::error::AppError;
use crate::frame::{FrameOrchestrator, FrameReport, FrameStatus};
use crate::input::InputState;
use crate::rendering::{Renderer, WINDOW_TITLE};
use crate::simulation::init::{create_random_particles, create_rng};

const FPS_LOG_INTERVAL: Duration = Duration::from_secs(1);

// Frame rate over the last interval, logged at debug level
struct FrameRate {
    since: Instant,
    frames: u32,
}

impl FrameRate {
    fn new() -> Self {
        Self {
            since: Instant::now(),
            frames: 0,
        }
    }

    fn tick(&mut self, report: &FrameReport) {
        self.frames += 1;
        let elapsed = self.since.elapsed();
        if elapsed >= FPS_LOG_INTERVAL {
            log::debug!(
                "{:.1} fps (frame {}, {} sub-steps, zoom stage {})",
                self.frames as f64 / elapsed.as_secs_f64(),
                report.frame,
                report.sub_steps,
                report.zoom_stage
            );
            self.since = Instant::now();
            self.frames = 0;
        }
    }
}

struct App<B: ComputeBackend> {
    orchestrator: FrameOrchestrator<B>,
    renderer: Option<Renderer>,
    input: InputState,
    frame_rate: FrameRate,
    window_size: PhysicalSize<u32>,
    trail_alpha: f64,
    result: Result<(), AppError>,
}

impl<B: ComputeBackend> App<B> {
    fn new(orchestrator: FrameOrchestrator<B>, config: &Config) -> Self {
        Self {
            orchestrator,
            renderer: None,
            input: InputState::default(),
            frame_rate: FrameRate::new(),
            window_size: PhysicalSize::new(config.window_width, config.window_height),
            trail_alpha: config.trail_alpha,
            result: Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: AppError) {
        self.result = Err(error);
        event_loop.exit();
    }

    fn create_renderer(&self, event_loop: &ActiveEventLoop) -> Result<Renderer, AppError> {
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(self.window_size)
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attributes)?);
        pollster::block_on(Renderer::new(window, self.orchestrator.layout(), self.trail_alpha))
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let input = self.input.take_frame_input();
        match self.orchestrator.run_frame(&input, renderer) {
            Ok(FrameStatus::Presented(report)) => {
                self.frame_rate.tick(&report);
                renderer.window().request_redraw();
            }
            Ok(FrameStatus::Skipped) => renderer.window().request_redraw(),
            Ok(FrameStatus::Quit) => {
                log::info!("Quit requested after {} frames", self.orchestrator.frames());
                event_loop.exit();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }
}

impl<B: ComputeBackend> ApplicationHandler for App<B> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        match self.create_renderer(event_loop) {
            Ok(renderer) => {
                renderer.window().request_redraw();
                self.renderer = Some(renderer);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size);
                }
            }
            event => self.input.handle_window_event(&event),
        }
    }
}

fn run_with<B: ComputeBackend>(backend: B, config: &Config) -> Result<(), AppError> {
    log::info!("Compute device: {}", backend.device_info());
    let orchestrator = FrameOrchestrator::new(backend, config.simulation_depth);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(orchestrator, config);
    event_loop.run_app(&mut app)?;
    app.result
}

/// Loads the config named by the first argument, sets up the compute backend and
/// runs the frame loop until quit, close or the first error.
pub(crate) fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let layout = ImageLayout::new(config.window_width, config.window_height);
    let particles = create_random_particles(config.particle_count, &mut create_rng(config.seed));

    match config.backend {
        BackendKind::Gpu => {
            let backend = GpuBackend::new(&config, layout, &particles)?;
            run_with(backend, &config)
        }
        BackendKind::Software => {
            let backend = SoftwareBackend::new(layout, particles, config.step_width());
            run_with(backend, &config)
        }
    }
}
