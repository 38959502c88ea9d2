//! trellis viewer
//!
//! Opens a window, mounts the configured scene file and runs the frame loop.
//! Clicking the body named `ball` kicks it upwards.

use std::error::Error;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use trellis::{AppConfig, Canvas, SceneFile};
use trellis_core::{EventKind, Handlers, RendererHandle, Vec3};
use trellis_input::{PointerTranslator, WindowPointerTarget};
use trellis_physics::{PhysicsBridge, ThreadTransport};
use trellis_render::{RenderContext, Scheduler, SurfaceRenderer};

/// Upward impulse applied to a clicked ball
const KICK: f32 = 6.0;

/// Main application state
struct App {
    config: AppConfig,
    window: Option<Arc<Window>>,
    canvas: Option<Canvas>,
    scheduler: Scheduler,
    translator: PointerTranslator,
    start: Instant,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            canvas: None,
            scheduler: Scheduler::new(),
            translator: PointerTranslator::new(),
            start: Instant::now(),
        }
    }

    /// Build the canvas for a freshly created window
    fn create_canvas(&mut self, window: &Arc<Window>) -> Result<Canvas, Box<dyn Error>> {
        let root_config = self.config.root_config()?;
        let context = pollster::block_on(RenderContext::new(window.clone(), self.config.window.vsync))?;
        let renderer = RendererHandle::new(SurfaceRenderer::new(context));

        let mut canvas = Canvas::new(&root_config, renderer, Rc::new(WindowPointerTarget::new()))?;
        if self.config.physics.enabled {
            // Physics steps schedule a redraw so on-demand canvases keep moving
            let redraw = window.clone();
            let transport = ThreadTransport::spawn_with_waker(
                self.config.physics.to_physics_config(),
                Arc::new(move || redraw.request_redraw()),
            )?;
            canvas = canvas.with_physics(PhysicsBridge::new(Box::new(transport)));
        }

        let scale = window.scale_factor();
        let size = window.inner_size().to_logical::<f32>(scale);
        canvas.set_dpr(scale as f32);
        canvas.resize(size.width, size.height);

        match SceneFile::load(&self.config.canvas.scene) {
            Ok(file) => {
                canvas.mount_scene(&file)?;
            }
            Err(e) => log::warn!("Failed to load scene '{}': {}", self.config.canvas.scene, e),
        }
        Self::bind_kick(&canvas);
        Ok(canvas)
    }

    /// Kick the ball when it is clicked
    fn bind_kick(canvas: &Canvas) {
        let (Some(ball), Some(bridge)) = (canvas.body("ball"), canvas.physics().cloned()) else {
            return;
        };
        let handlers = Handlers::new().on(EventKind::Click, move |event| {
            let Ok(mut bridge) = bridge.try_borrow_mut() else {
                return;
            };
            if let Err(e) = bridge.apply_impulse(ball.id, Vec3::Y * KICK, event.point()) {
                log::warn!("Kick failed: {}", e);
            }
            event.stop_propagation();
        });
        canvas.reconciler().set_handlers(ball.node, handlers);
    }

    fn report_errors(&self) {
        for error in self.scheduler.errors().try_iter() {
            log::error!("{}", error);
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut canvas) = self.canvas.take() {
            canvas.unmount(&mut self.scheduler);
        }
        self.scheduler.set_requester(None);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let mut canvas = match self.create_canvas(&window) {
            Ok(canvas) => canvas,
            Err(e) => {
                log::error!("Failed to create canvas: {}", e);
                event_loop.exit();
                return;
            }
        };
        canvas.register(&mut self.scheduler);
        self.scheduler.set_requester(Some(Rc::new(window.clone())));
        self.translator = PointerTranslator::new().with_scale_factor(window.scale_factor() as f32);

        window.request_redraw();
        self.window = Some(window);
        self.canvas = Some(canvas);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        for native in self.translator.translate(&event) {
            if let Some(canvas) = &mut self.canvas {
                let handled = canvas.handle_pointer(&native);
                if self.config.debug.trace_events && handled > 0 {
                    log::debug!("{} reached {} handlers", native.kind.name(), handled);
                }
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(physical_size) => {
                if let (Some(canvas), Some(window)) = (&self.canvas, &self.window) {
                    let size = physical_size.to_logical::<f32>(window.scale_factor());
                    canvas.resize(size.width, size.height);
                }
            }

            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(canvas) = &self.canvas {
                    canvas.set_dpr(scale_factor as f32);
                }
            }

            WindowEvent::RedrawRequested => {
                let timestamp = self.start.elapsed().as_secs_f64() * 1000.0;
                self.scheduler.tick(timestamp);
                // Bodies move under a resting cursor
                if let Some(canvas) = &mut self.canvas {
                    canvas.update_pointer();
                }
                self.report_errors();
            }

            _ => {}
        }
    }
}

fn main() {
    let loaded = AppConfig::load();
    let level = loaded.as_ref().map(|c| c.debug.log_level.as_str()).unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });
    log::info!("Starting trellis");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
    }
    app.shutdown();
}
